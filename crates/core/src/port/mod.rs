// Port Layer - Interfaces for external dependencies

pub mod legacy_log;
pub mod log_sink;
pub mod stream_binder;
pub mod time_provider;

// Re-exports
pub use legacy_log::LegacyLogTarget;
pub use log_sink::LogSink;
pub use stream_binder::{BindError, CapturedStream, PipeReader, StreamBinder, StreamBinding};
pub use time_provider::TimeProvider;
