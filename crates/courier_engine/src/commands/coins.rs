use std::fmt;
use std::sync::Arc;

use courier_core::{FollowUp, Request};
use serde_json::Value;

use crate::api::{int_field, offset_field, ApiQuery};
use crate::{ApiError, ApiEvent, CoinStatus, ResultSink};

/// Current height, offset and status of every coin the server indexes.
pub struct CoinsInfo {
    results: Arc<dyn ResultSink>,
}

impl CoinsInfo {
    pub fn new(results: Arc<dyn ResultSink>) -> Self {
        Self { results }
    }
}

impl fmt::Debug for CoinsInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CoinsInfo")
    }
}

impl ApiQuery for CoinsInfo {
    fn request(&self) -> Request {
        Request::get("coins")
    }

    fn unique(&self) -> bool {
        true
    }

    fn data_type(&self) -> Option<&'static str> {
        Some("coins")
    }

    fn on_data(&mut self, data: Value) -> Result<FollowUp, ApiError> {
        self.results.emit(ApiEvent::CoinsInfo(coin_statuses(&data)?));
        Ok(None)
    }
}

/// Parses a `{coin: {height, status, offset?, version?}}` table, sorted by
/// coin name.
pub(crate) fn coin_statuses(table: &Value) -> Result<Vec<CoinStatus>, ApiError> {
    let coins = table
        .as_object()
        .ok_or_else(|| ApiError::Content("coin table is not an object".to_string()))?;
    let mut statuses = coins
        .iter()
        .map(|(coin, entry)| {
            let height = int_field(entry, "height")?;
            Ok(CoinStatus {
                coin: coin.clone(),
                height: u64::try_from(height)
                    .map_err(|_| ApiError::Content(format!("{coin}: negative height")))?,
                status: int_field(entry, "status")?,
                offset: offset_field(entry, "offset"),
                daemon_version: entry
                    .pointer("/version/0")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;
    statuses.sort_by(|a, b| a.coin.cmp(&b.coin));
    Ok(statuses)
}
