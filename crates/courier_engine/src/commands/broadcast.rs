use std::fmt;
use std::sync::Arc;

use courier_core::{FollowUp, Priority, Request};
use courier_logging::{net_debug, net_error};
use serde_json::{json, Value};

use crate::api::{post_body, str_field, ApiQuery};
use crate::{ApiError, ApiEvent, ResultSink};

/// Server error code for a transaction the node refused to relay.
pub const BROADCAST_REJECTED_CODE: i64 = 2003;

/// Sends a signed raw transaction to the network.
pub struct Broadcast {
    coin: String,
    raw_tx: String,
    tx_id: String,
    resend: bool,
    results: Arc<dyn ResultSink>,
}

impl Broadcast {
    pub fn new(
        coin: impl Into<String>,
        raw_tx: impl Into<String>,
        tx_id: impl Into<String>,
        results: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            coin: coin.into(),
            raw_tx: raw_tx.into(),
            tx_id: tx_id.into(),
            resend: false,
            results,
        }
    }

    /// A retry requested by the user goes ahead of queued work.
    pub fn resend(mut self) -> Self {
        self.resend = true;
        self
    }
}

impl fmt::Debug for Broadcast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Broadcast[{} {}]", self.coin, self.tx_id)
    }
}

impl ApiQuery for Broadcast {
    fn request(&self) -> Request {
        Request::post("coins", post_body("tx_broadcast", json!({ "data": self.raw_tx })))
            .path_arg(self.coin.as_str())
            .path_arg("tx")
            .path_arg("broadcast")
    }

    fn priority(&self) -> Priority {
        if self.resend {
            Priority::High
        } else {
            Priority::Normal
        }
    }

    fn on_data(&mut self, data: Value) -> Result<FollowUp, ApiError> {
        let tx_id = str_field(&data, "tx")?;
        if tx_id != self.tx_id {
            net_error!("server gives TXID:{tx_id} but sent TXID:{}", self.tx_id);
        } else {
            net_debug!("broadcast transaction hash is fine");
        }
        self.results.emit(ApiEvent::BroadcastAccepted {
            coin: self.coin.clone(),
            tx_id,
        });
        Ok(None)
    }

    fn on_server_error(&mut self, code: i64, detail: &str) -> Result<(), ApiError> {
        if code != BROADCAST_REJECTED_CODE {
            return Err(ApiError::UnknownErrorCode(code));
        }
        self.results.emit(ApiEvent::BroadcastRejected {
            coin: self.coin.clone(),
            tx_id: self.tx_id.clone(),
            detail: detail.to_string(),
        });
        Ok(())
    }
}
