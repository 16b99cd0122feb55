// Logger configuration read from the environment

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use logpipe_core::application::redirector::constants::DEFAULT_DRAIN_TIMEOUT;
use logpipe_core::{RedirectConfig, RedirectError, Result};

/// Output format: `pretty`, `compact` or `json`
pub const ENV_LOG_FORMAT: &str = "LOGPIPE_LOG_FORMAT";
/// Filter directives, falls back to `RUST_LOG`
pub const ENV_LOG_FILTER: &str = "LOGPIPE_LOG";
pub const ENV_RUST_LOG: &str = "RUST_LOG";
/// Directory for daily-rolling log files (`~` is expanded)
pub const ENV_LOG_DIR: &str = "LOGPIPE_LOG_DIR";
pub const ENV_DRAIN_TIMEOUT_MS: &str = "LOGPIPE_DRAIN_TIMEOUT_MS";
pub const ENV_CAPTURE_LEGACY_LOG: &str = "LOGPIPE_CAPTURE_LEGACY_LOG";
/// Disables ANSI colors when set to anything
pub const ENV_NO_COLOR: &str = "NO_COLOR";

const DEFAULT_FILTER: &str = "info";

/// Console encoding used by the tracing sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!(
                "unknown log format '{}' (expected pretty, compact or json)",
                other
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
        })
    }
}

/// Everything needed to build a logger handle
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives
    pub filter: String,
    pub ansi: bool,
    pub log_dir: Option<PathBuf>,
    pub drain_timeout: Duration,
    pub capture_legacy_log: bool,
    /// Also install the sink as the global tracing subscriber
    pub set_global_default: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: DEFAULT_FILTER.to_string(),
            ansi: true,
            log_dir: None,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            capture_legacy_log: true,
            set_global_default: false,
        }
    }
}

impl LoggerConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup` (environment-shaped key/value source)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            config.format = format
                .parse()
                .map_err(|e| RedirectError::Config(format!("{}: {}", ENV_LOG_FORMAT, e)))?;
        }

        if let Some(filter) = lookup(ENV_LOG_FILTER).or_else(|| lookup(ENV_RUST_LOG)) {
            if !filter.trim().is_empty() {
                config.filter = filter;
            }
        }

        config.log_dir = lookup(ENV_LOG_DIR)
            .filter(|dir| !dir.trim().is_empty())
            .map(|dir| PathBuf::from(shellexpand::tilde(&dir).into_owned()));

        if let Some(ms) = lookup(ENV_DRAIN_TIMEOUT_MS) {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                RedirectError::Config(format!(
                    "{} must be a number of milliseconds, got '{}'",
                    ENV_DRAIN_TIMEOUT_MS, ms
                ))
            })?;
            config.drain_timeout = Duration::from_millis(ms);
        }

        if let Some(flag) = lookup(ENV_CAPTURE_LEGACY_LOG) {
            config.capture_legacy_log = parse_bool(ENV_CAPTURE_LEGACY_LOG, &flag)?;
        }

        config.ansi = config.format != LogFormat::Json && lookup(ENV_NO_COLOR).is_none();

        Ok(config)
    }

    /// Settings the core redirector cares about
    pub fn redirect_config(&self) -> RedirectConfig {
        RedirectConfig {
            drain_timeout: self.drain_timeout,
            capture_legacy_log: self.capture_legacy_log,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(RedirectError::Config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}
