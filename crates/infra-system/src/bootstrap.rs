// Wiring - builds a LoggerHandle from the system adapters

use std::sync::{Arc, Mutex};

use tracing::debug;

use logpipe_core::domain::StreamKind;
use logpipe_core::port::time_provider::SystemTimeProvider;
use logpipe_core::{LoggerHandle, Redirector, Result};

use crate::config::LoggerConfig;
use crate::fd_binder::{FdStreamBinder, StreamTargets};
use crate::legacy_log;
use crate::tracing_sink::TracingSink;

/// Redirect the process stdout/stderr into a tracing logger
///
/// Records are written to a duplicate of the original stderr, so the
/// output ends up where stderr pointed before the call.
///
/// # Errors
/// - RedirectError::AlreadyActive if a handle already holds the streams
/// - RedirectError::Config for an unusable filter or log directory
/// - RedirectError::NoRuntime outside a tokio runtime
pub fn init_logger(config: &LoggerConfig) -> Result<LoggerHandle> {
    init_logger_with_targets(config, StreamTargets::process())
}

/// Same as [`init_logger`] but rebinds the descriptors in `targets`
pub fn init_logger_with_targets(
    config: &LoggerConfig,
    targets: StreamTargets,
) -> Result<LoggerHandle> {
    let console = targets.duplicate(StreamKind::Stderr)?;
    let sink = TracingSink::new(Mutex::new(console), config)?;

    if config.set_global_default {
        if let Err(e) = tracing::dispatcher::set_global_default(sink.dispatch().clone()) {
            debug!(error = %e, "Global tracing subscriber already set, keeping it");
        }
    }

    let legacy = if config.capture_legacy_log {
        legacy_log::install()
    } else {
        None
    };

    Redirector::new(
        Arc::new(FdStreamBinder::new(targets)),
        Arc::new(sink),
        Arc::new(SystemTimeProvider),
    )
    .with_legacy_log(legacy)
    .with_config(config.redirect_config())
    .initialize()
}
