//! Courier core: pure dispatch state machines with no IO.
//!
//! The [`Dispatcher`] owns the [`CommandQueue`] and the [`LevelGate`] and is
//! driven by its owner one scheduling turn at a time: `tick`, `handle` and
//! `abort` mutate state and return the [`Effect`]s the IO layer must carry out.
mod command;
mod dispatcher;
mod level;
mod queue;
mod status;
mod trigger;

pub use command::{
    Body, Command, CommandError, CommandOutcome, CommandState, FollowUp, Host, HttpMethod,
    Priority, Request,
};
pub use dispatcher::{
    CommandId, Dispatcher, Effect, ExchangeId, FinishPolicy, ProtocolViolation, TransportEvent,
};
pub use level::{LevelGate, LoadingLevel};
pub use queue::{CommandQueue, CompletionCallback, PushOutcome, QueuedCommand};
pub use status::{classify_status, is_ok_status, Health, MISSING_STATUS};
pub use trigger::{AdaptivePoll, FixedInterval, PollPhase, TriggerSchedule};
