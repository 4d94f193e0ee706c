use std::time::Duration;

use courier_core::FinishPolicy;

pub const DEFAULT_API_BASE: &str = "https://d1.bitmarket.network:30110/";
pub const DEFAULT_FEE_HOST: &str = "https://bitcoinfees.earn.com/api/v1/fees/";
pub const DEFAULT_RATES_HOST: &str = "https://api.coingecko.com/api/v3/simple/";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_base: String,
    pub api_version: u32,
    pub fee_host: String,
    pub rates_host: String,
    /// Period of the dispatch clock.
    pub dispatch_interval: Duration,
    pub poll_short_interval: Duration,
    pub poll_long_interval: Duration,
    pub fee_interval: Duration,
    pub connect_timeout: Duration,
    /// Deadline for a whole exchange, body included.
    pub reply_timeout: Duration,
    pub max_body_bytes: usize,
    pub finish_policy: FinishPolicy,
    /// Certificate problems are reported and ignored.
    pub accept_invalid_certs: bool,
    pub user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_version: 1,
            fee_host: DEFAULT_FEE_HOST.to_string(),
            rates_host: DEFAULT_RATES_HOST.to_string(),
            dispatch_interval: Duration::from_secs(1),
            poll_short_interval: Duration::from_secs(3),
            poll_long_interval: Duration::from_secs(10),
            fee_interval: Duration::from_secs(30 * 60),
            connect_timeout: Duration::from_secs(10),
            reply_timeout: Duration::from_secs(5),
            max_body_bytes: 8 * 1024 * 1024,
            finish_policy: FinishPolicy::OnlyWhenHealthy,
            accept_invalid_certs: true,
            user_agent: concat!("courier/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl EngineConfig {
    /// Defaults pointed at another API server, e.g. a local mock.
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            ..Self::default()
        }
    }
}
