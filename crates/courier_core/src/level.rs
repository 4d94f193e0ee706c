use courier_logging::{net_debug, net_warn};

use crate::Command;

/// How much local wallet data has been hydrated. Only ever advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LoadingLevel {
    #[default]
    None,
    Addresses,
    Transactions,
    Inputs,
}

#[derive(Debug, Clone, Default)]
pub struct LevelGate {
    current: LoadingLevel,
}

impl LevelGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> LoadingLevel {
        self.current
    }

    /// Sets the loaded level. The loading subsystem only moves it forward;
    /// a regression is applied as asked but logged.
    pub fn advance(&mut self, level: LoadingLevel) {
        if level < self.current {
            net_warn!(
                "loading level moved backwards: {:?} -> {:?}",
                self.current,
                level
            );
        } else {
            net_debug!("loading level {:?} -> {:?}", self.current, level);
        }
        self.current = level;
    }

    pub fn permits_level(&self, required: LoadingLevel) -> bool {
        required <= self.current
    }

    pub fn permits(&self, command: &dyn Command) -> bool {
        self.permits_level(command.required_level())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_totally_ordered() {
        assert!(LoadingLevel::None < LoadingLevel::Addresses);
        assert!(LoadingLevel::Addresses < LoadingLevel::Transactions);
        assert!(LoadingLevel::Transactions < LoadingLevel::Inputs);
    }

    #[test]
    fn gate_permits_up_to_current_level() {
        let mut gate = LevelGate::new();
        assert!(gate.permits_level(LoadingLevel::None));
        assert!(!gate.permits_level(LoadingLevel::Addresses));

        gate.advance(LoadingLevel::Transactions);
        assert!(gate.permits_level(LoadingLevel::Addresses));
        assert!(gate.permits_level(LoadingLevel::Transactions));
        assert!(!gate.permits_level(LoadingLevel::Inputs));
    }
}
