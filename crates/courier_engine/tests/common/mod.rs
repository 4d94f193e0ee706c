#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use courier_core::{Command, CommandError, FollowUp};
use courier_engine::{ApiEvent, EngineConfig, ResultSink};
use serde_json::{json, Value};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(courier_logging::initialize_for_tests);
}

/// Result sink that keeps everything it receives.
#[derive(Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<ApiEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<ApiEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl ResultSink for RecordingSink {
    fn emit(&self, event: ApiEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// A JSON:API document carrying `attributes`.
pub fn document(data_type: &str, attributes: Value) -> Value {
    json!({
        "data": { "type": data_type, "attributes": attributes },
        "meta": { "timeframe": 1_500_000 },
    })
}

/// Feeds `body` to `command` in small chunks and finishes with `status`.
pub fn answer(command: &mut dyn Command, status: u16, body: &[u8]) -> Result<FollowUp, CommandError> {
    for chunk in body.chunks(7) {
        assert!(command.on_response_data(chunk), "command stopped early");
    }
    command.on_response_finished(status)
}

pub fn answer_json(command: &mut dyn Command, body: &Value) -> Result<FollowUp, CommandError> {
    answer(command, 200, body.to_string().as_bytes())
}

/// Engine settings for tests: quick dispatch, triggers out of the way.
pub fn test_config(api_base: impl Into<String>) -> EngineConfig {
    EngineConfig {
        dispatch_interval: Duration::from_millis(20),
        poll_short_interval: Duration::from_secs(3600),
        poll_long_interval: Duration::from_secs(3600),
        fee_interval: Duration::from_secs(3600),
        reply_timeout: Duration::from_secs(2),
        ..EngineConfig::with_api_base(api_base)
    }
}
