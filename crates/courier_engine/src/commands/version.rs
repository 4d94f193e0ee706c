use std::fmt;
use std::sync::Arc;

use courier_core::{FollowUp, Request};
use courier_logging::net_debug;
use serde_json::Value;

use super::coins::coin_statuses;
use crate::api::{field, str_field, ApiQuery};
use crate::{ApiError, ApiEvent, ResultSink, ServerInfo};

/// Server description; the connectivity poll sends it periodically.
pub struct VersionCheck {
    results: Arc<dyn ResultSink>,
}

impl VersionCheck {
    pub fn new(results: Arc<dyn ResultSink>) -> Self {
        Self { results }
    }
}

impl fmt::Debug for VersionCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VersionCheck")
    }
}

impl ApiQuery for VersionCheck {
    fn request(&self) -> Request {
        Request::get("sysinfo")
    }

    fn unique(&self) -> bool {
        true
    }

    fn data_type(&self) -> Option<&'static str> {
        Some("sysinfo")
    }

    fn on_data(&mut self, data: Value) -> Result<FollowUp, ApiError> {
        // "version": [human readable, number]
        let version = field(&data, "version")?;
        let version_human = version
            .get(0)
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::Content("version has no readable form".to_string()))?;
        let version_number = version
            .get(1)
            .and_then(Value::as_i64)
            .ok_or_else(|| ApiError::Content("version has no number".to_string()))?;

        let info = ServerInfo {
            name: str_field(&data, "name")?,
            version: version_number,
            version_human: version_human.to_string(),
            coins: coin_statuses(field(&data, "coins")?)?,
        };
        net_debug!(
            "server {} version {} ({})",
            info.name,
            info.version_human,
            info.version
        );
        self.results.emit(ApiEvent::ServerInfo(info));
        Ok(None)
    }
}
