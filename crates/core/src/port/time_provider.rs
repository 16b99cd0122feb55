// Record Clock Port - timestamps stamped on every LogRecord

/// Source of record timestamps
///
/// Listeners stamp a line when they read it, not when it was written, so
/// a fixed clock is enough for tests to assert exact values.
pub trait TimeProvider: Send + Sync {
    /// Record timestamp: milliseconds since the Unix epoch, UTC
    fn now_millis(&self) -> i64;
}

/// Wall clock used outside tests
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

pub mod mocks {
    use super::*;

    /// Clock frozen at a given instant
    pub struct FixedTimeProvider(pub i64);

    impl TimeProvider for FixedTimeProvider {
        fn now_millis(&self) -> i64 {
            self.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_reports_epoch_millis() {
        let first = SystemTimeProvider.now_millis();
        let second = SystemTimeProvider.now_millis();
        // 2020-09-13T12:26:40Z
        assert!(first > 1_600_000_000_000);
        assert!(second >= first);
    }
}
