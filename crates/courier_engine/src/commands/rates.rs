use std::fmt;
use std::sync::Arc;

use courier_core::{FollowUp, Priority, Request};
use courier_logging::net_warn;
use serde_json::Value;

use crate::api::{ApiQuery, Envelope};
use crate::{ApiError, ApiEvent, CoinRate, ResultSink};

/// Fiat exchange rates from a price service such as CoinGecko's
/// `simple/price`.
pub struct CoinRates {
    host: String,
    /// Coin ids as the price service names them.
    coins: Vec<String>,
    currency: String,
    results: Arc<dyn ResultSink>,
}

impl CoinRates {
    pub fn new(
        host: impl Into<String>,
        coins: Vec<String>,
        currency: impl Into<String>,
        results: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            host: host.into(),
            coins,
            currency: currency.into(),
            results,
        }
    }
}

impl fmt::Debug for CoinRates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoinRates[{}]", self.currency)
    }
}

impl ApiQuery for CoinRates {
    fn request(&self) -> Request {
        Request::get("price")
            .on_host(self.host.as_str())
            .query_arg("ids", self.coins.join(","))
            .query_arg("vs_currencies", self.currency.as_str())
    }

    fn priority(&self) -> Priority {
        Priority::Low
    }

    fn unique(&self) -> bool {
        true
    }

    fn envelope(&self) -> Envelope {
        Envelope::Raw
    }

    fn on_data(&mut self, data: Value) -> Result<FollowUp, ApiError> {
        if !data.is_object() {
            return Err(ApiError::Content("rate table is not an object".to_string()));
        }
        let mut rates = Vec::with_capacity(self.coins.len());
        for coin in &self.coins {
            match data.get(coin).and_then(|entry| entry.get(&self.currency)).and_then(Value::as_f64) {
                Some(rate) => rates.push(CoinRate {
                    coin: coin.clone(),
                    currency: self.currency.clone(),
                    rate,
                }),
                None => net_warn!("no {} rate for {coin}", self.currency),
            }
        }
        self.results.emit(ApiEvent::CoinRates(rates));
        Ok(None)
    }
}
