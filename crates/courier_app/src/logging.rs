//! Logger setup for the courier binary.
//!
//! Results are printed on stdout, so terminal logging goes to stderr.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use log::LevelFilter;
use serde::Deserialize;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

pub const DEFAULT_LOG_FILE: &str = "./courier.log";

/// HTTP and TLS internals that only matter when they fail.
const QUIET_TARGETS: [&str; 3] = ["hyper", "rustls", "reqwest"];

/// Destination for log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum LogDestination {
    File,
    #[default]
    Terminal,
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub destination: LogDestination,
    pub level: LevelFilter,
    /// Appended to, never truncated.
    pub file: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            destination: LogDestination::default(),
            level: LevelFilter::Info,
            file: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

pub fn initialize(settings: &LogSettings) {
    let _ = CombinedLogger::init(loggers(settings));
}

fn loggers(settings: &LogSettings) -> Vec<Box<dyn SharedLogger>> {
    let config = build_config(settings.level);
    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    if matches!(
        settings.destination,
        LogDestination::Terminal | LogDestination::Both
    ) {
        loggers.push(TermLogger::new(
            settings.level,
            config.clone(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ));
    }
    if matches!(
        settings.destination,
        LogDestination::File | LogDestination::Both
    ) {
        if let Some(file_logger) = file_logger(&settings.file, settings.level, config) {
            loggers.push(file_logger);
        }
    }
    loggers
}

fn build_config(level: LevelFilter) -> Config {
    let mut builder = ConfigBuilder::new();
    builder
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error);
    if level < LevelFilter::Trace {
        for target in QUIET_TARGETS {
            builder.add_filter_ignore_str(target);
        }
    }
    builder.build()
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn file_logger(path: &Path, level: LevelFilter, config: Config) -> Option<Box<WriteLogger<File>>> {
    match open_log_file(path) {
        Ok(file) => Some(WriteLogger::new(level, config, file)),
        Err(err) => {
            eprintln!("Warning: Could not open log file {}: {err}", path.display());
            None
        }
    }
}
