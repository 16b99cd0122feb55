//! Legacy Log Capture Tests
//!
//! Output of the `log` crate follows the stderr pipe while a handle is active

use logpipe_core::domain::{Severity, StreamKind};
use logpipe_core::port::log_sink::mocks::MemorySink;
use logpipe_core::port::time_provider::SystemTimeProvider;
use logpipe_core::Redirector;
use logpipe_infra_system::legacy_log;
use logpipe_infra_system::{FdStreamBinder, StreamTargets};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_legacy_log_lines_become_error_records() {
    let out = tempfile::tempfile().unwrap();
    let err = tempfile::tempfile().unwrap();
    let targets = StreamTargets::new(out.as_raw_fd(), err.as_raw_fd());
    let sink = MemorySink::new();

    let legacy = legacy_log::install();
    assert!(legacy.is_some());

    let handle = Redirector::new(
        Arc::new(FdStreamBinder::new(targets)),
        Arc::new(sink.clone()),
        Arc::new(SystemTimeProvider),
    )
    .with_legacy_log(legacy)
    .initialize()
    .unwrap();

    log::warn!("cache is cold");
    log::trace!("filtered out");
    let records = sink.wait_for(1, Duration::from_secs(2)).await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message, "[WARN] legacy_log_capture: cache is cold");
    assert_eq!(records[0].severity, Severity::Error);

    // A second handle on other descriptors leaves the route alone
    let other_out = tempfile::tempfile().unwrap();
    let other_err = tempfile::tempfile().unwrap();
    let other_sink = MemorySink::new();
    let other = Redirector::new(
        Arc::new(FdStreamBinder::new(StreamTargets::new(
            other_out.as_raw_fd(),
            other_err.as_raw_fd(),
        ))),
        Arc::new(other_sink.clone()),
        Arc::new(SystemTimeProvider),
    )
    .with_legacy_log(legacy_log::install())
    .initialize()
    .unwrap();
    other.shutdown().await.unwrap();

    log::warn!("still with the first handle");
    let records = sink.wait_for(2, Duration::from_secs(2)).await;
    assert_eq!(records.len(), 2);
    assert!(records[1].message.ends_with("still with the first handle"));
    assert!(other_sink.records().is_empty());

    handle.shutdown().await.unwrap();

    // Back on the process stderr, not the captured pipe
    log::warn!("after shutdown");
    assert_eq!(sink.from_stream(StreamKind::Stderr).len(), 2);
}
