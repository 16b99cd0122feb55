// Log Sink Port - the structured logging backend

use crate::domain::LogRecord;

/// Structured logging backend that renders records somewhere human-readable
///
/// Implementations must not write to the captured streams themselves,
/// otherwise every record would be read back as a new line.
pub trait LogSink: Send + Sync {
    /// Emit a single record
    fn emit(&self, record: &LogRecord);

    /// Flush buffered output (called before the process terminates)
    fn flush(&self) {}
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::{RecordOrigin, StreamKind};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Poll interval used while waiting for records
    const POLL_INTERVAL: Duration = Duration::from_millis(5);

    /// In-memory sink that keeps every record
    #[derive(Clone, Default)]
    pub struct MemorySink {
        records: Arc<Mutex<Vec<LogRecord>>>,
    }

    impl MemorySink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn records(&self) -> Vec<LogRecord> {
            self.records.lock().unwrap().clone()
        }

        /// Records captured from one stream, in arrival order
        pub fn from_stream(&self, stream: StreamKind) -> Vec<LogRecord> {
            self.records()
                .into_iter()
                .filter(|r| r.origin == RecordOrigin::Stream(stream))
                .collect()
        }

        /// Wait until at least `count` records arrived or `timeout` elapsed
        pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<LogRecord> {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                let records = self.records();
                if records.len() >= count || tokio::time::Instant::now() >= deadline {
                    return records;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }

    impl LogSink for MemorySink {
        fn emit(&self, record: &LogRecord) {
            self.records.lock().unwrap().push(record.clone());
        }
    }
}
