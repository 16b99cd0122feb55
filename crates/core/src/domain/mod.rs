// Domain Layer - Streams, severities and log records

pub mod record;
pub mod stream;

// Re-exports
pub use record::{CallerLocation, LogRecord, RecordOrigin};
pub use stream::{Severity, StreamKind};
