// Logpipe Infrastructure - System Adapters
// Implements: StreamBinder (file descriptors), LogSink (tracing), LegacyLogTarget (log crate)

pub mod config;
pub mod legacy_log;
pub mod tracing_sink;

#[cfg(unix)]
pub mod bootstrap;
#[cfg(unix)]
pub mod fd_binder;
#[cfg(unix)]
pub mod global;

pub use config::{LogFormat, LoggerConfig};
pub use tracing_sink::TracingSink;

#[cfg(unix)]
pub use bootstrap::{init_logger, init_logger_with_targets};
#[cfg(unix)]
pub use fd_binder::{FdStreamBinder, StreamTargets};
