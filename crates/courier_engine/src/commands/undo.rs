use std::fmt;
use std::sync::Arc;

use courier_core::{is_ok_status, FollowUp, Request};
use courier_logging::net_warn;
use serde_json::{json, Value};

use crate::api::{post_body, ApiQuery};
use crate::{ApiError, ApiEvent, ResultSink};

/// Debug helper: asks a test server to roll back its latest transactions.
pub struct UndoTransaction {
    coin: String,
    count: u32,
    results: Arc<dyn ResultSink>,
}

impl UndoTransaction {
    pub fn new(coin: impl Into<String>, count: u32, results: Arc<dyn ResultSink>) -> Self {
        Self {
            coin: coin.into(),
            count,
            results,
        }
    }
}

impl fmt::Debug for UndoTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UndoTransaction[{} x{}]", self.coin, self.count)
    }
}

impl ApiQuery for UndoTransaction {
    fn request(&self) -> Request {
        Request::post("coins", post_body("undo", json!({ "count": self.count })))
            .path_arg(self.coin.as_str())
            .path_arg("undo")
    }

    // The reply body carries nothing of interest.
    fn on_status(&mut self, status: u16) -> Option<Result<FollowUp, ApiError>> {
        if is_ok_status(status) {
            self.results.emit(ApiEvent::UndoApplied {
                coin: self.coin.clone(),
                count: self.count,
            });
        } else {
            net_warn!("{self:?}: server answered {status}");
        }
        Some(Ok(None))
    }

    fn on_data(&mut self, _data: Value) -> Result<FollowUp, ApiError> {
        Ok(None)
    }
}
