use std::fmt;
use std::sync::Arc;

use courier_core::{FollowUp, LoadingLevel, Priority, Request};
use courier_logging::{net_debug, net_info};
use serde_json::{json, Value};

use crate::api::{field, post_body, ApiCommand, ApiQuery};
use crate::{ApiError, ApiEvent, ResultSink, TxRecord};

/// How many times a mempool query asks again after its first answer.
pub const MEMPOOL_MAX_ROUNDS: u32 = 6;

const NOT_MODIFIED: u16 = 304;

/// Unconfirmed transactions touching a set of addresses of one coin.
///
/// The server answers `304` when nothing changed since `last_hash`. Either
/// way the query re-polls until it used up its rounds.
pub struct Mempool {
    coin: String,
    addresses: Vec<String>,
    last_hash: Option<String>,
    round: u32,
    max_rounds: u32,
    results: Arc<dyn ResultSink>,
}

impl Mempool {
    pub fn new(coin: impl Into<String>, addresses: Vec<String>, results: Arc<dyn ResultSink>) -> Self {
        Self {
            coin: coin.into(),
            addresses,
            last_hash: None,
            round: 0,
            max_rounds: MEMPOOL_MAX_ROUNDS,
            results,
        }
    }

    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds;
        self
    }

    fn again(&self) -> FollowUp {
        if self.round >= self.max_rounds {
            net_debug!("{self:?}: no rounds left");
            return None;
        }
        net_debug!("{self:?}: checking mempool again");
        Some(ApiCommand::boxed(Self {
            coin: self.coin.clone(),
            addresses: self.addresses.clone(),
            last_hash: self.last_hash.clone(),
            round: self.round + 1,
            max_rounds: self.max_rounds,
            results: Arc::clone(&self.results),
        }))
    }
}

impl fmt::Debug for Mempool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Mempool[{} addresses={} round={}]",
            self.coin,
            self.addresses.len(),
            self.round
        )
    }
}

impl ApiQuery for Mempool {
    fn request(&self) -> Request {
        let mut attributes = json!({ "address_list": self.addresses });
        if let Some(hash) = &self.last_hash {
            attributes["last_hash"] = json!(hash);
        }
        Request::post("coins", post_body("unconfirmed", attributes))
            .path_arg(self.coin.as_str())
            .path_arg("unconfirmed")
    }

    fn required_level(&self) -> LoadingLevel {
        LoadingLevel::Addresses
    }

    fn priority(&self) -> Priority {
        Priority::High
    }

    fn skip(&self) -> bool {
        self.addresses.is_empty()
    }

    fn data_type(&self) -> Option<&'static str> {
        Some("unconfirmed")
    }

    fn on_status(&mut self, status: u16) -> Option<Result<FollowUp, ApiError>> {
        (status == NOT_MODIFIED).then(|| Ok(self.again()))
    }

    fn on_data(&mut self, data: Value) -> Result<FollowUp, ApiError> {
        if let Some(hash) = data.get("hash").and_then(Value::as_str) {
            self.last_hash = Some(hash.to_string());
        }
        let transactions: Vec<TxRecord> = TxRecord::from_list(field(&data, "tx_list")?)?
            .into_iter()
            .filter(|tx| self.addresses.iter().any(|address| tx.touches(address)))
            .collect();

        if !transactions.is_empty() {
            net_info!(
                "{} unconfirmed transactions for {}",
                transactions.len(),
                self.coin
            );
            self.results.emit(ApiEvent::Mempool {
                coin: self.coin.clone(),
                hash: self.last_hash.clone(),
                transactions,
            });
        }
        Ok(self.again())
    }
}
