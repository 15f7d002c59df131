//! Logging setup for the `tswin` binaries.
//!
//! Settings come from `TSWIN_LOG_LEVEL` (an `EnvFilter` directive),
//! `TSWIN_LOG_FORMAT` (`json` or `pretty`) and `TSWIN_LOG_TARGET` (whether to
//! print the module target). Unrecognized values keep the default.

use std::env;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else if raw.eq_ignore_ascii_case("pretty") {
            Ok(Self::Pretty)
        } else {
            Err(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL.to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Overlays the `TSWIN_LOG_*` keys resolved through `lookup` on the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(level) = lookup("TSWIN_LOG_LEVEL").filter(|raw| !raw.trim().is_empty()) {
            config.level = level.trim().to_string();
        }
        if let Some(format) = lookup("TSWIN_LOG_FORMAT").and_then(|raw| raw.parse().ok()) {
            config.format = format;
        }
        if let Some(include_target) = lookup("TSWIN_LOG_TARGET").and_then(|raw| switch(&raw)) {
            config.include_target = include_target;
        }
        config
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn logging_config_from_env() -> LoggingConfig {
    LoggingConfig::from_lookup(|key| env::var(key).ok())
}

/// Installs the global subscriber. Logs go to stderr so stdout stays free for
/// the JSON summary.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let filter =
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.include_target)
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(fmt.with_ansi(false).json().finish())?
        }
        LogFormat::Pretty => tracing::subscriber::set_global_default(fmt.pretty().finish())?,
    }
    Ok(())
}

pub fn log_app_start(config: &LoggingConfig) {
    info!(
        component = "cli",
        event = "app.start",
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target
    );
}

pub fn log_input_selected(path: &Path, interval: i64, window_size: usize) {
    info!(
        component = "cli",
        event = "input.selected",
        path = %path.display(),
        interval,
        window_size
    );
}

fn switch(raw: &str) -> Option<bool> {
    const ON: [&str; 4] = ["1", "true", "yes", "on"];
    const OFF: [&str; 4] = ["0", "false", "no", "off"];
    let raw = raw.trim();
    if ON.iter().any(|word| raw.eq_ignore_ascii_case(word)) {
        Some(true)
    } else if OFF.iter().any(|word| raw.eq_ignore_ascii_case(word)) {
        Some(false)
    } else {
        None
    }
}
