use std::fmt;
use std::sync::Arc;

use courier_core::{FollowUp, Priority, Request};
use serde_json::Value;

use crate::api::{ApiQuery, Envelope};
use crate::{ApiError, ApiEvent, FeeEstimate, ResultSink};

const FEE_TABLE: [(&str, u32); 3] = [("fastestFee", 10), ("halfHourFee", 30), ("hourFee", 60)];

/// Recommended fee rates from a third-party estimator.
pub struct RecommendedFee {
    host: String,
    results: Arc<dyn ResultSink>,
}

impl RecommendedFee {
    pub fn new(host: impl Into<String>, results: Arc<dyn ResultSink>) -> Self {
        Self {
            host: host.into(),
            results,
        }
    }
}

impl fmt::Debug for RecommendedFee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecommendedFee")
    }
}

impl ApiQuery for RecommendedFee {
    fn request(&self) -> Request {
        Request::get("recommended").on_host(self.host.as_str())
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
        let estimates = FEE_TABLE
            .iter()
            .map(|&(key, minutes)| {
                Ok(FeeEstimate {
                    minutes,
                    satoshi_per_byte: fee_rate(&data, key)?,
                })
            })
            .collect::<Result<Vec<_>, ApiError>>()?;
        self.results.emit(ApiEvent::RecommendedFees(estimates));
        Ok(None)
    }
}

/// Rates may be fractional; they are rounded to whole satoshis per byte.
fn fee_rate(table: &Value, key: &str) -> Result<u64, ApiError> {
    let rate = table
        .get(key)
        .ok_or_else(|| ApiError::missing(key))?
        .as_f64()
        .filter(|rate| rate.is_finite() && *rate >= 0.0)
        .ok_or_else(|| ApiError::Content(format!("{key:?} is not a fee rate")))?;
    Ok(rate.round() as u64)
}
