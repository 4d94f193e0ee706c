//! Settings file for the courier binary.
//!
//! A RON document whose fields are all optional; anything left out keeps the
//! engine default. Durations are given in milliseconds.
//!
//! ```ron
//! (
//!     api_base: Some("https://indexer.example.net:30110/"),
//!     poll_long_ms: Some(20000),
//!     finish_policy: Some(Always),
//!     log: Some(Both),
//!     log_file: Some("/var/log/courier.log"),
//!     watch: [(coin: "btc", address: "bc1q...")],
//!     rate_ids: ["bitcoin", "litecoin"],
//! )
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, ensure, Context};
use courier_core::{FinishPolicy, Request};
use courier_engine::{compose_url, AddressRef, EngineConfig};
use courier_logging::net_info;
use log::LevelFilter;
use serde::Deserialize;

use crate::logging::{LogDestination, LogSettings};

pub const DEFAULT_CONFIG_PATH: &str = "./courier.ron";
pub const DEFAULT_RATE_CURRENCY: &str = "usd";

#[derive(Debug, Clone, Copy, Deserialize)]
enum FinishPolicySetting {
    OnlyWhenHealthy,
    Always,
}

impl From<FinishPolicySetting> for FinishPolicy {
    fn from(setting: FinishPolicySetting) -> Self {
        match setting {
            FinishPolicySetting::OnlyWhenHealthy => FinishPolicy::OnlyWhenHealthy,
            FinishPolicySetting::Always => FinishPolicy::Always,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct WatchedAddress {
    coin: String,
    address: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    api_base: Option<String>,
    api_version: Option<u32>,
    fee_host: Option<String>,
    rates_host: Option<String>,
    dispatch_interval_ms: Option<u64>,
    poll_short_ms: Option<u64>,
    poll_long_ms: Option<u64>,
    fee_interval_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    reply_timeout_ms: Option<u64>,
    max_body_bytes: Option<usize>,
    finish_policy: Option<FinishPolicySetting>,
    accept_invalid_certs: Option<bool>,
    log: Option<LogDestination>,
    log_level: Option<String>,
    log_file: Option<String>,
    watch: Vec<WatchedAddress>,
    rate_ids: Vec<String>,
    rate_currency: Option<String>,
    run_for_secs: Option<u64>,
}

/// Everything the binary needs to start.
#[derive(Debug, Clone)]
pub struct Settings {
    pub engine: EngineConfig,
    pub log: LogSettings,
    pub watch: Vec<AddressRef>,
    /// Price service ids of the coins whose fiat rate is fetched at startup.
    pub rate_ids: Vec<String>,
    pub rate_currency: String,
    /// Stop after this long; run until interrupted when `None`.
    pub run_for: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            log: LogSettings::default(),
            watch: Vec::new(),
            rate_ids: Vec::new(),
            rate_currency: DEFAULT_RATE_CURRENCY.to_string(),
            run_for: None,
        }
    }
}

/// Reads the settings file at `path`. A missing file yields the defaults.
pub fn load(path: &Path) -> anyhow::Result<Settings> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            net_info!("no settings at {:?}, using defaults", path);
            return Ok(Settings::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("reading settings from {}", path.display()))
        }
    };
    parse(&content).with_context(|| format!("invalid settings in {}", path.display()))
}

pub fn parse(content: &str) -> anyhow::Result<Settings> {
    let file: SettingsFile = ron::from_str(content).context("malformed RON")?;
    apply(file)
}

fn millis(name: &str, value: Option<u64>, default: Duration) -> anyhow::Result<Duration> {
    match value {
        None => Ok(default),
        Some(ms) => {
            ensure!(ms > 0, "{name} must be positive");
            Ok(Duration::from_millis(ms))
        }
    }
}

fn apply(file: SettingsFile) -> anyhow::Result<Settings> {
    let defaults = EngineConfig::default();
    let engine = EngineConfig {
        api_base: file.api_base.unwrap_or(defaults.api_base),
        api_version: file.api_version.unwrap_or(defaults.api_version),
        fee_host: file.fee_host.unwrap_or(defaults.fee_host),
        rates_host: file.rates_host.unwrap_or(defaults.rates_host),
        dispatch_interval: millis(
            "dispatch_interval_ms",
            file.dispatch_interval_ms,
            defaults.dispatch_interval,
        )?,
        poll_short_interval: millis("poll_short_ms", file.poll_short_ms, defaults.poll_short_interval)?,
        poll_long_interval: millis("poll_long_ms", file.poll_long_ms, defaults.poll_long_interval)?,
        fee_interval: millis("fee_interval_ms", file.fee_interval_ms, defaults.fee_interval)?,
        connect_timeout: millis(
            "connect_timeout_ms",
            file.connect_timeout_ms,
            defaults.connect_timeout,
        )?,
        reply_timeout: millis("reply_timeout_ms", file.reply_timeout_ms, defaults.reply_timeout)?,
        max_body_bytes: file.max_body_bytes.unwrap_or(defaults.max_body_bytes),
        finish_policy: file
            .finish_policy
            .map(FinishPolicy::from)
            .unwrap_or(defaults.finish_policy),
        accept_invalid_certs: file
            .accept_invalid_certs
            .unwrap_or(defaults.accept_invalid_certs),
        user_agent: defaults.user_agent,
    };

    compose_url(&engine.api_base, engine.api_version, &Request::get("sysinfo"))
        .with_context(|| format!("api_base {:?}", engine.api_base))?;
    compose_url(
        &engine.api_base,
        engine.api_version,
        &Request::get("recommended").on_host(engine.fee_host.as_str()),
    )
    .with_context(|| format!("fee_host {:?}", engine.fee_host))?;
    compose_url(
        &engine.api_base,
        engine.api_version,
        &Request::get("price").on_host(engine.rates_host.as_str()),
    )
    .with_context(|| format!("rates_host {:?}", engine.rates_host))?;
    ensure!(engine.max_body_bytes > 0, "max_body_bytes must be positive");

    let defaults = LogSettings::default();
    let log = LogSettings {
        destination: file.log.unwrap_or(defaults.destination),
        level: match file.log_level.as_deref() {
            None => defaults.level,
            Some(level) => LevelFilter::from_str(level)
                .map_err(|_| anyhow!("unknown log level {level:?}"))?,
        },
        file: file.log_file.map(PathBuf::from).unwrap_or(defaults.file),
    };

    Ok(Settings {
        engine,
        log,
        watch: file
            .watch
            .into_iter()
            .map(|watched| AddressRef::new(watched.coin, watched.address))
            .collect(),
        rate_ids: file.rate_ids,
        rate_currency: file
            .rate_currency
            .unwrap_or_else(|| DEFAULT_RATE_CURRENCY.to_string()),
        run_for: file.run_for_secs.map(Duration::from_secs),
    })
}
