// Log Record - the unit handed to a LogSink

use super::stream::{Severity, StreamKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::Location;

/// Number of trailing path components kept in a caller location
const CALLER_PATH_COMPONENTS: usize = 3;

/// Where a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordOrigin {
    /// A leveled call on the logger handle
    Direct,
    /// A line read back from a captured stream
    Stream(StreamKind),
}

impl fmt::Display for RecordOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordOrigin::Direct => f.write_str("direct"),
            RecordOrigin::Stream(kind) => kind.fmt(f),
        }
    }
}

/// Source position of a direct logging call, shortened to `a/b/file.rs:LINE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerLocation {
    pub file: String,
    pub line: u32,
}

impl CallerLocation {
    pub fn from_location(location: &Location<'_>) -> Self {
        Self {
            file: shorten_path(location.file()),
            line: location.line(),
        }
    }
}

impl fmt::Display for CallerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

fn shorten_path(path: &str) -> String {
    let parts: Vec<&str> = path.split(['/', '\\']).collect();
    let start = parts.len().saturating_sub(CALLER_PATH_COMPONENTS);
    parts[start..].join("/")
}

/// A structured log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub severity: Severity,
    pub message: String,
    /// Rendered error attached to the record, if any
    pub error: Option<String>,
    pub origin: RecordOrigin,
    pub caller: Option<CallerLocation>,
    pub timestamp_ms: i64,
}

impl LogRecord {
    /// Record for a line captured from `stream`
    pub fn captured(stream: StreamKind, message: String, timestamp_ms: i64) -> Self {
        Self {
            severity: stream.severity(),
            message,
            error: None,
            origin: RecordOrigin::Stream(stream),
            caller: None,
            timestamp_ms,
        }
    }

    /// Record for a direct leveled call
    pub fn direct(
        severity: Severity,
        message: String,
        error: Option<String>,
        caller: &Location<'_>,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            severity,
            message,
            error,
            origin: RecordOrigin::Direct,
            caller: Some(CallerLocation::from_location(caller)),
            timestamp_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorten_path_keeps_last_three_components() {
        assert_eq!(shorten_path("/home/dev/repo/crates/core/src/lib.rs"), "core/src/lib.rs");
        assert_eq!(shorten_path("src/main.rs"), "src/main.rs");
        assert_eq!(shorten_path("main.rs"), "main.rs");
        assert_eq!(shorten_path(r"C:\work\app\src\bin.rs"), "app/src/bin.rs");
    }

    #[test]
    fn test_captured_record_uses_stream_severity() {
        let record = LogRecord::captured(StreamKind::Stderr, "boom".to_string(), 42);
        assert_eq!(record.severity, Severity::Error);
        assert_eq!(record.origin, RecordOrigin::Stream(StreamKind::Stderr));
        assert!(record.caller.is_none());
        assert_eq!(record.origin.to_string(), "stderr");
    }

    #[test]
    fn test_direct_record_carries_caller() {
        let record = LogRecord::direct(
            Severity::Warn,
            "careful".to_string(),
            None,
            Location::caller(),
            7,
        );
        let caller = record.caller.unwrap();
        assert!(caller.file.ends_with("domain/record.rs"), "got {}", caller.file);
        assert!(caller.line > 0);
        assert_eq!(record.origin.to_string(), "direct");
    }
}
