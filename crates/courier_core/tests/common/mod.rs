#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Once};

use courier_core::{
    Command, CommandError, Dispatcher, Effect, FollowUp, LoadingLevel, Priority, Request,
    TransportEvent,
};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(courier_logging::initialize_for_tests);
}

/// Shared record of the callbacks scripted commands received.
#[derive(Debug, Default, Clone)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, line: String) {
        self.0.lock().unwrap().push(line);
    }

    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Scriptable command used to observe dispatcher behaviour.
#[derive(Debug)]
pub struct Scripted {
    name: &'static str,
    kind: &'static str,
    priority: Priority,
    unique: bool,
    level: LoadingLevel,
    skip: bool,
    external: bool,
    stop_after_chunks: Option<usize>,
    follow_up: Option<Box<Scripted>>,
    fail_with: Option<CommandError>,
    chunks: usize,
    journal: Journal,
}

impl Scripted {
    pub fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            kind: name,
            priority: Priority::Normal,
            unique: false,
            level: LoadingLevel::None,
            skip: false,
            external: false,
            stop_after_chunks: None,
            follow_up: None,
            fail_with: None,
            chunks: 0,
            journal: journal.clone(),
        }
    }

    pub fn of_kind(mut self, kind: &'static str) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn as_unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn needs(mut self, level: LoadingLevel) -> Self {
        self.level = level;
        self
    }

    pub fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }

    pub fn external(mut self) -> Self {
        self.external = true;
        self
    }

    pub fn stop_after_chunks(mut self, chunks: usize) -> Self {
        self.stop_after_chunks = Some(chunks);
        self
    }

    pub fn then(mut self, next: Scripted) -> Self {
        self.follow_up = Some(Box::new(next));
        self
    }

    pub fn failing(mut self, error: CommandError) -> Self {
        self.fail_with = Some(error);
        self
    }

    pub fn boxed(self) -> Box<dyn Command> {
        Box::new(self)
    }
}

impl Command for Scripted {
    fn request(&self) -> Request {
        let request = Request::get(self.name);
        if self.external {
            request.on_host("https://fees.example.org/")
        } else {
            request
        }
    }

    fn required_level(&self) -> LoadingLevel {
        self.level
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn unique(&self) -> bool {
        self.unique
    }

    fn skip(&self) -> bool {
        self.skip
    }

    fn kind(&self) -> &'static str {
        self.kind
    }

    fn on_response_data(&mut self, chunk: &[u8]) -> bool {
        self.chunks += 1;
        self.journal
            .record(format!("{}:data:{}", self.name, chunk.len()));
        self.stop_after_chunks
            .map_or(true, |limit| self.chunks < limit)
    }

    fn on_response_finished(&mut self, status: u16) -> Result<FollowUp, CommandError> {
        self.journal
            .record(format!("{}:finished:{status}", self.name));
        if let Some(error) = self.fail_with.take() {
            return Err(error);
        }
        Ok(self
            .follow_up
            .take()
            .map(|next| next as Box<dyn Command>))
    }

    fn on_error(&mut self, error: &CommandError) {
        self.journal.record(format!("{}:error:{error}", self.name));
    }
}

/// Answers every submitted exchange with `200` and an empty body until the
/// dispatcher goes idle. Returns the dispatched actions in order.
pub fn complete_all(dispatcher: &mut Dispatcher) -> Vec<String> {
    let mut order = Vec::new();
    let mut pending: VecDeque<Effect> = dispatcher.tick().into();
    while let Some(effect) = pending.pop_front() {
        if let Effect::Submit { exchange, request } = effect {
            assert!(dispatcher.is_busy());
            assert!(dispatcher.tick().is_empty(), "second exchange started");
            order.push(request.action);
            dispatcher
                .handle(exchange, TransportEvent::Status(200))
                .unwrap();
            let effects = dispatcher
                .handle(exchange, TransportEvent::Finished { failure: None })
                .unwrap();
            pending.extend(effects);
        }
    }
    order
}

pub fn submitted_exchange(effects: &[Effect]) -> Option<(u64, String)> {
    effects.iter().find_map(|effect| match effect {
        Effect::Submit { exchange, request } => Some((*exchange, request.action.clone())),
        _ => None,
    })
}
