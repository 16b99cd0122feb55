// Tracing-backed LogSink
// reason: tracing-subscriber fmt layers give console/json encoders, tracing-appender the rolling file
use tracing::Dispatch;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use logpipe_core::domain::{LogRecord, Severity};
use logpipe_core::port::LogSink;
use logpipe_core::{RedirectError, Result};

use crate::config::{LogFormat, LoggerConfig};

/// Target attached to every forwarded record
pub const EVENT_TARGET: &str = "logpipe";

/// File name prefix for rolling log files
const LOG_FILE_PREFIX: &str = "logpipe.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Sink that renders records through its own tracing dispatcher
///
/// The dispatcher is private to the sink, so several sinks can coexist in
/// one process without touching the global default subscriber.
pub struct TracingSink {
    dispatch: Dispatch,
}

impl TracingSink {
    /// Build a sink writing to `writer` (normally a duplicate of the original stderr)
    ///
    /// # Errors
    /// - RedirectError::Config if the filter is invalid or the log directory
    ///   cannot be used
    pub fn new<W>(writer: W, config: &LoggerConfig) -> Result<Self>
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let filter = EnvFilter::try_new(&config.filter).map_err(|e| {
            RedirectError::Config(format!("invalid log filter '{}': {}", config.filter, e))
        })?;

        let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);

        let console = fmt::layer::<Registry>()
            .with_writer(writer)
            .with_ansi(config.ansi);
        layers.push(match config.format {
            LogFormat::Pretty => console.pretty().boxed(),
            LogFormat::Compact => console.compact().boxed(),
            LogFormat::Json => console.json().boxed(),
        });

        if let Some(dir) = &config.log_dir {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .build(dir)
                .map_err(|e| {
                    RedirectError::Config(format!(
                        "cannot write logs to {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
            layers.push(
                fmt::layer::<Registry>()
                    .with_writer(appender)
                    .with_ansi(false)
                    .boxed(),
            );
        }

        let subscriber = Registry::default().with(layers).with(filter);
        Ok(Self {
            dispatch: Dispatch::new(subscriber),
        })
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }
}

impl LogSink for TracingSink {
    fn emit(&self, record: &LogRecord) {
        tracing::dispatcher::with_default(&self.dispatch, || emit_event(record));
    }
}

fn emit_event(record: &LogRecord) {
    let origin = record.origin.to_string();
    let caller = record.caller.as_ref().map(ToString::to_string);
    let caller = caller.as_deref();
    let error = record.error.as_deref();
    let message = record.message.as_str();

    match record.severity {
        Severity::Debug => {
            tracing::debug!(target: EVENT_TARGET, origin = %origin, caller, error, "{}", message)
        }
        Severity::Info => {
            tracing::info!(target: EVENT_TARGET, origin = %origin, caller, error, "{}", message)
        }
        Severity::Warn => {
            tracing::warn!(target: EVENT_TARGET, origin = %origin, caller, error, "{}", message)
        }
        Severity::Error => {
            tracing::error!(target: EVENT_TARGET, origin = %origin, caller, error, "{}", message)
        }
        // tracing has no level above ERROR
        Severity::Fatal => tracing::error!(
            target: EVENT_TARGET,
            fatal = true,
            origin = %origin,
            caller,
            error,
            "{}",
            message
        ),
    }
}
