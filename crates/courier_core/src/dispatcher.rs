use courier_logging::{net_debug, net_error, net_trace, net_warn};

use crate::{
    classify_status, Command, CommandError, CommandOutcome, CommandQueue, CompletionCallback,
    Health, LevelGate, LoadingLevel, PushOutcome, QueuedCommand, Request, MISSING_STATUS,
};

pub type CommandId = u64;
pub type ExchangeId = u64;

/// Events a transport reports for one exchange, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Response headers arrived.
    Status(u16),
    Data(Vec<u8>),
    /// A certificate problem the transport chose to ignore.
    TlsWarning(String),
    /// The exchange is over; `failure` is set when it did not complete normally.
    Finished { failure: Option<String> },
}

/// Work the owner of a [`Dispatcher`] has to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Submit {
        exchange: ExchangeId,
        request: Request,
    },
    Cancel {
        exchange: ExchangeId,
    },
    Health(Health),
    CommandFinished {
        command: CommandId,
        kind: &'static str,
        outcome: CommandOutcome,
    },
}

/// When a finished exchange is handed to `Command::on_response_finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinishPolicy {
    /// Only when the status passes the health check.
    #[default]
    OnlyWhenHealthy,
    /// Whatever the status.
    Always,
}

/// The transport and the dispatcher disagree about which exchange is active.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("exchange {exchange} finished with no command in flight")]
    FinishedWithoutCommand { exchange: ExchangeId },
    #[error("status captured twice for exchange {exchange} ({first} then {second})")]
    DoubleStatusCapture {
        exchange: ExchangeId,
        first: u16,
        second: u16,
    },
    #[error("event for exchange {got} while exchange {expected} is in flight")]
    ForeignExchange {
        expected: ExchangeId,
        got: ExchangeId,
    },
}

struct InFlight {
    exchange: ExchangeId,
    entry: QueuedCommand,
    external: bool,
    status: Option<u16>,
    stopped_early: bool,
}

/// Single-flight scheduler over a [`CommandQueue`].
///
/// At most one command is in flight. Every method runs inside the owner's
/// scheduling turn and returns the effects to perform; nothing here blocks.
pub struct Dispatcher {
    queue: CommandQueue,
    gate: LevelGate,
    policy: FinishPolicy,
    current: Option<InFlight>,
    cancelled: Option<ExchangeId>,
    next_command: CommandId,
    next_exchange: ExchangeId,
    stopped: bool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(FinishPolicy::default())
    }
}

impl Dispatcher {
    pub fn new(policy: FinishPolicy) -> Self {
        Self {
            queue: CommandQueue::new(),
            gate: LevelGate::new(),
            policy,
            current: None,
            cancelled: None,
            next_command: 1,
            next_exchange: 1,
            stopped: false,
        }
    }

    pub fn policy(&self) -> FinishPolicy {
        self.policy
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn gate(&self) -> &LevelGate {
        &self.gate
    }

    pub fn advance_level(&mut self, level: LoadingLevel) {
        self.gate.advance(level);
    }

    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn current_exchange(&self) -> Option<ExchangeId> {
        self.current.as_ref().map(|current| current.exchange)
    }

    pub fn current_command(&self) -> Option<&dyn Command> {
        self.current.as_ref().map(|current| current.entry.command())
    }

    /// Queues a command without dispatching. Returns `None` for a rejected duplicate.
    pub fn push(&mut self, command: Box<dyn Command>, force: bool) -> Option<CommandId> {
        self.enqueue(command, force, None)
    }

    pub fn push_with_callback(
        &mut self,
        command: Box<dyn Command>,
        force: bool,
        callback: CompletionCallback,
    ) -> Option<CommandId> {
        self.enqueue(command, force, Some(callback))
    }

    /// Queues a command and, if the dispatcher is idle, runs a tick right away.
    pub fn submit(
        &mut self,
        command: Box<dyn Command>,
        force: bool,
    ) -> (Option<CommandId>, Vec<Effect>) {
        let id = self.push(command, force);
        (id, self.tick())
    }

    pub fn submit_with_callback(
        &mut self,
        command: Box<dyn Command>,
        force: bool,
        callback: CompletionCallback,
    ) -> (Option<CommandId>, Vec<Effect>) {
        let id = self.push_with_callback(command, force, callback);
        (id, self.tick())
    }

    fn enqueue(
        &mut self,
        command: Box<dyn Command>,
        force: bool,
        callback: Option<CompletionCallback>,
    ) -> Option<CommandId> {
        let id = self.next_command;
        let mut entry = QueuedCommand::new(id, command);
        if let Some(callback) = callback {
            entry = entry.with_callback(callback);
        }
        match self.queue.push(entry, force) {
            PushOutcome::Queued { position } => {
                self.next_command += 1;
                net_trace!("command {id} queued at {position}");
                Some(id)
            }
            PushOutcome::Duplicate => None,
        }
    }

    /// Starts the next eligible command if nothing is in flight.
    pub fn tick(&mut self) -> Vec<Effect> {
        if self.stopped || self.current.is_some() {
            return Vec::new();
        }

        let Some(head) = self.queue.peek_next() else {
            return Vec::new();
        };
        if !self.gate.permits(head.command()) {
            net_trace!(
                "{:?} waits for {:?}, loaded {:?}",
                head.command(),
                head.command().required_level(),
                self.gate.current()
            );
            return Vec::new();
        }
        let Some(entry) = self.queue.pop_next() else {
            return Vec::new();
        };

        let exchange = self.next_exchange;
        self.next_exchange += 1;
        let request = entry.command().request();
        net_debug!(
            "exchange {exchange}: {} {:?} for {:?}",
            request.method,
            request.action,
            entry.command()
        );
        self.current = Some(InFlight {
            exchange,
            entry,
            external: request.is_external(),
            status: None,
            stopped_early: false,
        });
        vec![Effect::Submit { exchange, request }]
    }

    /// Applies one transport event for `exchange`.
    pub fn handle(
        &mut self,
        exchange: ExchangeId,
        event: TransportEvent,
    ) -> Result<Vec<Effect>, ProtocolViolation> {
        if self.cancelled == Some(exchange) {
            net_trace!("exchange {exchange} was aborted, ignoring {event:?}");
            if matches!(event, TransportEvent::Finished { .. }) {
                self.cancelled = None;
            }
            return Ok(Vec::new());
        }

        if let TransportEvent::Finished { failure } = event {
            return self.finish(exchange, failure);
        }
        let Some(current) = self.current.as_mut() else {
            net_warn!("exchange {exchange}: {event:?} without a command in flight");
            return Ok(Vec::new());
        };
        if current.exchange != exchange {
            return Err(ProtocolViolation::ForeignExchange {
                expected: current.exchange,
                got: exchange,
            });
        }

        match event {
            TransportEvent::Status(status) => {
                if let Some(first) = current.status {
                    return Err(ProtocolViolation::DoubleStatusCapture {
                        exchange,
                        first,
                        second: status,
                    });
                }
                net_trace!("exchange {exchange}: status {status}");
                current.status = Some(status);
                Ok(Vec::new())
            }
            TransportEvent::Data(chunk) => {
                if current.stopped_early {
                    return Ok(Vec::new());
                }
                if current.entry.command_mut().on_response_data(&chunk) {
                    Ok(Vec::new())
                } else {
                    net_debug!("exchange {exchange}: command stopped the response early");
                    current.stopped_early = true;
                    Ok(vec![Effect::Cancel { exchange }])
                }
            }
            TransportEvent::TlsWarning(details) => {
                net_warn!("exchange {exchange}: TLS errors ignored: {details}");
                Ok(Vec::new())
            }
            TransportEvent::Finished { .. } => unreachable!("handled above"),
        }
    }

    fn finish(
        &mut self,
        exchange: ExchangeId,
        failure: Option<String>,
    ) -> Result<Vec<Effect>, ProtocolViolation> {
        let Some(current) = self.current.take() else {
            return Err(ProtocolViolation::FinishedWithoutCommand { exchange });
        };
        if current.exchange != exchange {
            let expected = current.exchange;
            self.current = Some(current);
            return Err(ProtocolViolation::ForeignExchange {
                expected,
                got: exchange,
            });
        }

        let InFlight {
            mut entry,
            external,
            status,
            stopped_early,
            ..
        } = current;
        let mut effects = Vec::new();

        let effective = status.unwrap_or(MISSING_STATUS);
        let message = failure
            .clone()
            .unwrap_or_else(|| format!("HTTP status {effective}"));
        let health = classify_status(effective, message);
        if let Health::Unhealthy { status, message } = &health {
            net_error!("exchange {exchange}: HTTP reply error: {message} CODE:{status}");
        }
        if !external {
            effects.push(Effect::Health(health.clone()));
        }

        let outcome = match (status, failure) {
            _ if stopped_early => CommandOutcome::Stopped,
            (None, failure) => {
                let error = CommandError::Transport(
                    failure.unwrap_or_else(|| "finished without a status".to_string()),
                );
                entry.command_mut().on_error(&error);
                CommandOutcome::Failed(error)
            }
            (Some(_), Some(failure)) => {
                let error = CommandError::Transport(failure);
                entry.command_mut().on_error(&error);
                CommandOutcome::Failed(error)
            }
            (Some(status), None) => {
                if health.is_healthy() || self.policy == FinishPolicy::Always {
                    match entry.command_mut().on_response_finished(status) {
                        Ok(follow_up) => {
                            if let Some(next) = follow_up {
                                net_debug!("queueing follow-up {next:?}");
                                self.push(next, false);
                            }
                            CommandOutcome::Completed
                        }
                        Err(error) => {
                            net_error!("{:?} failed: {error}", entry.command());
                            entry.command_mut().on_error(&error);
                            CommandOutcome::Failed(error)
                        }
                    }
                } else {
                    CommandOutcome::Unanswered { status }
                }
            }
        };

        let kind = entry.command().kind();
        let id = entry.id();
        entry.finish(&outcome);
        effects.push(Effect::CommandFinished {
            command: id,
            kind,
            outcome,
        });

        if !self.queue.is_empty() {
            effects.extend(self.tick());
        }
        Ok(effects)
    }

    /// Stops dispatching and cancels the outstanding exchange, if any.
    pub fn abort(&mut self) -> Vec<Effect> {
        self.stopped = true;
        let Some(current) = self.current.take() else {
            return Vec::new();
        };

        let InFlight {
            exchange,
            mut entry,
            ..
        } = current;
        net_debug!("aborting exchange {exchange}");
        self.cancelled = Some(exchange);

        let error = CommandError::Aborted;
        entry.command_mut().on_error(&error);
        let outcome = CommandOutcome::Failed(error);
        let kind = entry.command().kind();
        let id = entry.id();
        entry.finish(&outcome);
        vec![
            Effect::Cancel { exchange },
            Effect::CommandFinished {
                command: id,
                kind,
                outcome,
            },
        ]
    }
}
