use std::time::Duration;

use courier_logging::net_debug;

/// Timing of a periodic trigger.
pub trait TriggerSchedule: Send {
    /// Delay before the first firing.
    fn initial(&self) -> Duration;

    /// Records a firing and returns the delay until the next one.
    fn fire(&mut self) -> Duration;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Short,
    Long,
}

/// Fires once after the short interval, then forever at the long one.
#[derive(Debug, Clone)]
pub struct AdaptivePoll {
    short: Duration,
    long: Duration,
    phase: PollPhase,
}

impl AdaptivePoll {
    pub fn new(short: Duration, long: Duration) -> Self {
        Self {
            short,
            long,
            phase: PollPhase::Short,
        }
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    pub fn interval(&self) -> Duration {
        match self.phase {
            PollPhase::Short => self.short,
            PollPhase::Long => self.long,
        }
    }
}

impl TriggerSchedule for AdaptivePoll {
    fn initial(&self) -> Duration {
        self.interval()
    }

    fn fire(&mut self) -> Duration {
        if self.phase == PollPhase::Short {
            net_debug!("increasing poll interval to {:?}", self.long);
            self.phase = PollPhase::Long;
        }
        self.long
    }
}

#[derive(Debug, Clone)]
pub struct FixedInterval {
    period: Duration,
}

impl FixedInterval {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }
}

impl TriggerSchedule for FixedInterval {
    fn initial(&self) -> Duration {
        self.period
    }

    fn fire(&mut self) -> Duration {
        self.period
    }
}
