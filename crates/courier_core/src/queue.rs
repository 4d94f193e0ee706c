use std::collections::VecDeque;
use std::fmt;

use courier_logging::{net_debug, net_warn};

use crate::{Command, CommandId, CommandOutcome, Priority};

/// Runs once when a queued command reaches a final outcome.
pub type CompletionCallback = Box<dyn FnOnce(CommandId, &CommandOutcome) + Send>;

pub struct QueuedCommand {
    id: CommandId,
    command: Box<dyn Command>,
    on_complete: Option<CompletionCallback>,
}

impl QueuedCommand {
    pub fn new(id: CommandId, command: Box<dyn Command>) -> Self {
        Self {
            id,
            command,
            on_complete: None,
        }
    }

    pub fn with_callback(mut self, callback: CompletionCallback) -> Self {
        self.on_complete = Some(callback);
        self
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn command(&self) -> &dyn Command {
        self.command.as_ref()
    }

    pub(crate) fn command_mut(&mut self) -> &mut dyn Command {
        self.command.as_mut()
    }

    pub(crate) fn finish(mut self, outcome: &CommandOutcome) {
        if let Some(callback) = self.on_complete.take() {
            callback(self.id, outcome);
        }
    }
}

impl fmt::Debug for QueuedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedCommand")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("has_callback", &self.on_complete.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued { position: usize },
    Duplicate,
}

/// Pending commands in dispatch order.
#[derive(Debug, Default)]
pub struct CommandQueue {
    entries: VecDeque<QueuedCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts `entry` honouring priority bands and uniqueness.
    ///
    /// Forced and `High` entries go to the very front. Everything else keeps
    /// FIFO order inside its band, with `Normal` entries always ahead of the
    /// trailing run of `Low` entries.
    pub fn push(&mut self, entry: QueuedCommand, force: bool) -> PushOutcome {
        let priority = entry.command.priority();
        if force || priority == Priority::High {
            self.entries.push_front(entry);
            return PushOutcome::Queued { position: 0 };
        }

        if entry.command.unique() && self.contains_kind(entry.command.kind()) {
            net_warn!("unique command {:?} already queued", entry.command);
            return PushOutcome::Duplicate;
        }

        let position = if priority == Priority::Low {
            self.entries.len()
        } else {
            self.entries
                .iter()
                .rposition(|queued| queued.command.priority() != Priority::Low)
                .map_or(0, |index| index + 1)
        };
        self.entries.insert(position, entry);
        PushOutcome::Queued { position }
    }

    /// Head of the queue after dropping commands that asked to be skipped.
    pub fn peek_next(&mut self) -> Option<&QueuedCommand> {
        self.discard_skipped();
        self.entries.front()
    }

    pub fn pop_next(&mut self) -> Option<QueuedCommand> {
        self.discard_skipped();
        self.entries.pop_front()
    }

    pub fn contains_kind(&self, kind: &str) -> bool {
        self.entries
            .iter()
            .any(|queued| queued.command.kind() == kind)
    }

    pub fn ids(&self) -> Vec<CommandId> {
        self.entries.iter().map(QueuedCommand::id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedCommand> {
        self.entries.iter()
    }

    fn discard_skipped(&mut self) {
        while self
            .entries
            .front()
            .is_some_and(|queued| queued.command.skip())
        {
            if let Some(skipped) = self.entries.pop_front() {
                net_debug!("skipping {:?}", skipped.command);
                skipped.finish(&CommandOutcome::Skipped);
            }
        }
    }
}
