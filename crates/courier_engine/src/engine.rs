use std::collections::HashMap;
use std::fmt;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use courier_core::{
    AdaptivePoll, Command, CompletionCallback, Dispatcher, Effect, ExchangeId, FixedInterval,
    LoadingLevel, TransportEvent, TriggerSchedule,
};
use courier_logging::{
    dispatch_turn, net_debug, net_error, net_info, net_trace, next_dispatch_turn,
};
use tokio::sync::mpsc as async_mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::transport::TransportFailure;
use crate::{
    ApiCommand, ChannelEventSink, EngineConfig, EngineEvent, RecommendedFee, ReqwestTransport,
    ResultSink, Transport, VersionCheck,
};

/// Work sent to the runner.
pub enum EngineRequest {
    Submit {
        command: Box<dyn Command>,
        force: bool,
    },
    SubmitWithCallback {
        command: Box<dyn Command>,
        force: bool,
        on_complete: CompletionCallback,
    },
    AdvanceLevel(LoadingLevel),
    Abort,
}

impl fmt::Debug for EngineRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineRequest::Submit { command, force }
            | EngineRequest::SubmitWithCallback { command, force, .. } => f
                .debug_struct("Submit")
                .field("command", command)
                .field("force", force)
                .finish(),
            EngineRequest::AdvanceLevel(level) => f.debug_tuple("AdvanceLevel").field(level).finish(),
            EngineRequest::Abort => f.write_str("Abort"),
        }
    }
}

/// Cloneable producer side of an engine, for code that only submits work.
#[derive(Debug, Clone)]
pub struct EngineSender {
    tx: async_mpsc::UnboundedSender<EngineRequest>,
}

impl EngineSender {
    pub fn send(&self, request: EngineRequest) {
        if self.tx.send(request).is_err() {
            net_debug!("engine runner is gone, request dropped");
        }
    }

    pub fn submit(&self, command: Box<dyn Command>) {
        self.send(EngineRequest::Submit {
            command,
            force: false,
        });
    }

    /// Queues `command` ahead of everything else.
    pub fn submit_forced(&self, command: Box<dyn Command>) {
        self.send(EngineRequest::Submit {
            command,
            force: true,
        });
    }

    pub fn submit_with_callback(
        &self,
        command: Box<dyn Command>,
        force: bool,
        on_complete: CompletionCallback,
    ) {
        self.send(EngineRequest::SubmitWithCallback {
            command,
            force,
            on_complete,
        });
    }

    pub fn advance_level(&self, level: LoadingLevel) {
        self.send(EngineRequest::AdvanceLevel(level));
    }

    pub fn abort(&self) {
        self.send(EngineRequest::Abort);
    }
}

/// Owns the runner thread: a tokio runtime driving the dispatcher, the
/// transport and the scheduler clocks.
pub struct EngineHandle {
    sender: EngineSender,
    event_rx: mpsc::Receiver<EngineEvent>,
}

impl EngineHandle {
    pub fn new(config: EngineConfig, results: Arc<dyn ResultSink>) -> Result<Self, TransportFailure> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Ok(Self::with_transport(config, transport, results))
    }

    pub fn with_transport(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        results: Arc<dyn ResultSink>,
    ) -> Self {
        let (request_tx, request_rx) = async_mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel();

        thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
            runtime.block_on(Runner::new(config, transport, results, event_tx).run(request_rx));
        });

        Self {
            sender: EngineSender { tx: request_tx },
            event_rx,
        }
    }

    pub fn sender(&self) -> EngineSender {
        self.sender.clone()
    }

    pub fn submit(&self, command: Box<dyn Command>) {
        self.sender.submit(command);
    }

    pub fn submit_forced(&self, command: Box<dyn Command>) {
        self.sender.submit_forced(command);
    }

    pub fn submit_with_callback(
        &self,
        command: Box<dyn Command>,
        force: bool,
        on_complete: CompletionCallback,
    ) {
        self.sender.submit_with_callback(command, force, on_complete);
    }

    pub fn advance_level(&self, level: LoadingLevel) {
        self.sender.advance_level(level);
    }

    /// Stops the clocks and cancels the exchange in flight.
    pub fn abort(&self) {
        self.sender.abort();
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }
}

struct Runner {
    config: EngineConfig,
    dispatcher: Dispatcher,
    transport: Arc<dyn Transport>,
    results: Arc<dyn ResultSink>,
    events: mpsc::Sender<EngineEvent>,
    transport_tx: async_mpsc::UnboundedSender<(ExchangeId, TransportEvent)>,
    transport_rx: async_mpsc::UnboundedReceiver<(ExchangeId, TransportEvent)>,
    cancels: HashMap<ExchangeId, CancellationToken>,
}

impl Runner {
    fn new(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        results: Arc<dyn ResultSink>,
        events: mpsc::Sender<EngineEvent>,
    ) -> Self {
        let (transport_tx, transport_rx) = async_mpsc::unbounded_channel();
        Self {
            dispatcher: Dispatcher::new(config.finish_policy),
            config,
            transport,
            results,
            events,
            transport_tx,
            transport_rx,
            cancels: HashMap::new(),
        }
    }

    async fn run(mut self, mut requests: async_mpsc::UnboundedReceiver<EngineRequest>) {
        net_info!(
            "engine started against {} (API v{})",
            self.config.api_base,
            self.config.api_version
        );
        let mut dispatch_clock = time::interval(self.config.dispatch_interval);
        dispatch_clock.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut poll = AdaptivePoll::new(
            self.config.poll_short_interval,
            self.config.poll_long_interval,
        );
        let poll_timer = time::sleep(poll.initial());
        tokio::pin!(poll_timer);

        let mut fee = FixedInterval::new(self.config.fee_interval);
        let fee_timer = time::sleep(fee.initial());
        tokio::pin!(fee_timer);

        loop {
            let clocks_running = !self.dispatcher.is_stopped();
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => {
                        next_dispatch_turn();
                        self.on_request(request);
                    }
                    None => break,
                },
                Some((exchange, event)) = self.transport_rx.recv() => {
                    next_dispatch_turn();
                    self.on_transport_event(exchange, event);
                }
                _ = dispatch_clock.tick(), if clocks_running => {
                    next_dispatch_turn();
                    let effects = self.dispatcher.tick();
                    self.apply(effects);
                }
                _ = &mut poll_timer, if clocks_running => {
                    next_dispatch_turn();
                    let command = ApiCommand::new(VersionCheck::new(Arc::clone(&self.results)))
                        .with_body_limit(self.config.max_body_bytes);
                    self.dispatcher.push(Box::new(command), false);
                    poll_timer.as_mut().reset(Instant::now() + poll.fire());
                }
                _ = &mut fee_timer, if clocks_running => {
                    next_dispatch_turn();
                    let command = ApiCommand::new(RecommendedFee::new(
                        self.config.fee_host.as_str(),
                        Arc::clone(&self.results),
                    ))
                    .with_body_limit(self.config.max_body_bytes);
                    self.dispatcher.push(Box::new(command), false);
                    fee_timer.as_mut().reset(Instant::now() + fee.fire());
                }
            }
        }
        net_debug!("all engine handles dropped, runner exits");
    }

    fn on_request(&mut self, request: EngineRequest) {
        net_trace!("turn {}: {request:?}", dispatch_turn());
        let effects = match request {
            EngineRequest::Submit { command, force } => self.dispatcher.submit(command, force).1,
            EngineRequest::SubmitWithCallback {
                command,
                force,
                on_complete,
            } => {
                self.dispatcher
                    .submit_with_callback(command, force, on_complete)
                    .1
            }
            EngineRequest::AdvanceLevel(level) => {
                net_debug!("data level advanced to {level:?}");
                self.dispatcher.advance_level(level);
                self.dispatcher.tick()
            }
            EngineRequest::Abort => {
                let effects = self.dispatcher.abort();
                self.apply(effects);
                net_info!("engine aborted");
                self.notify(EngineEvent::Stopped);
                return;
            }
        };
        self.apply(effects);
    }

    fn on_transport_event(&mut self, exchange: ExchangeId, event: TransportEvent) {
        if matches!(event, TransportEvent::Finished { .. }) {
            self.cancels.remove(&exchange);
        }
        match self.dispatcher.handle(exchange, event) {
            Ok(effects) => self.apply(effects),
            Err(violation) => {
                net_error!(
                    "turn {}: dispatch protocol violated: {violation}",
                    dispatch_turn()
                );
                std::process::abort();
            }
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Submit { exchange, request } => {
                    let cancel = CancellationToken::new();
                    self.cancels.insert(exchange, cancel.clone());
                    let transport = Arc::clone(&self.transport);
                    let sink = ChannelEventSink::new(self.transport_tx.clone());
                    tokio::spawn(async move {
                        transport.exchange(exchange, request, &sink, cancel).await;
                    });
                }
                Effect::Cancel { exchange } => {
                    if let Some(cancel) = self.cancels.get(&exchange) {
                        net_trace!("cancelling exchange {exchange}");
                        cancel.cancel();
                    }
                }
                Effect::Health(health) => self.notify(EngineEvent::Health(health)),
                Effect::CommandFinished {
                    command,
                    kind,
                    outcome,
                } => self.notify(EngineEvent::CommandFinished {
                    command,
                    kind,
                    outcome,
                }),
            }
        }
    }

    fn notify(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}
