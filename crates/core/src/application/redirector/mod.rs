// Redirector - captures stdout/stderr into a structured logger

pub mod constants;
mod listener;
mod stop;

use constants::*;
pub use listener::{ListenerEnd, ListenerSummary};
pub use stop::{stop_channel, StopSender, StopToken};

use crate::domain::{LogRecord, Severity, StreamKind};
use crate::error::{RedirectError, Result};
use crate::port::{LegacyLogTarget, LogSink, StreamBinder, StreamBinding, TimeProvider};
use listener::LineListener;
use std::fmt::Display;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Redirection settings
#[derive(Debug, Clone)]
pub struct RedirectConfig {
    /// Time listeners get to drain after the write ends are closed
    pub drain_timeout: Duration,
    /// Route the legacy logging facility into the stderr pipe
    pub capture_legacy_log: bool,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            capture_legacy_log: true,
        }
    }
}

/// Builds logger handles from its ports
pub struct Redirector {
    binder: Arc<dyn StreamBinder>,
    sink: Arc<dyn LogSink>,
    time_provider: Arc<dyn TimeProvider>,
    legacy: Option<Arc<dyn LegacyLogTarget>>,
    config: RedirectConfig,
}

impl Redirector {
    pub fn new(
        binder: Arc<dyn StreamBinder>,
        sink: Arc<dyn LogSink>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            binder,
            sink,
            time_provider,
            legacy: None,
            config: RedirectConfig::default(),
        }
    }

    pub fn with_legacy_log(mut self, legacy: Option<Arc<dyn LegacyLogTarget>>) -> Self {
        self.legacy = legacy;
        self
    }

    pub fn with_config(mut self, config: RedirectConfig) -> Self {
        self.config = config;
        self
    }

    /// Capture both streams and start their listeners
    ///
    /// Must be called from within a tokio runtime (any flavor). Listeners
    /// run on its blocking pool, so writers on a `current_thread` runtime
    /// never starve them. Any stream captured
    /// before a failure is restored before the error is returned.
    ///
    /// # Errors
    /// - RedirectError::NoRuntime outside a tokio runtime
    /// - RedirectError::AlreadyActive if a stream is already captured
    /// - RedirectError::Bind if a pipe cannot be created or bound
    pub fn initialize(&self) -> Result<LoggerHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| RedirectError::NoRuntime(e.to_string()))?;

        let (stop, token) = stop_channel();
        let mut handle = LoggerHandle {
            id: Uuid::new_v4(),
            sink: Arc::clone(&self.sink),
            time_provider: Arc::clone(&self.time_provider),
            legacy: None,
            bindings: Vec::with_capacity(StreamKind::ALL.len()),
            listeners: Vec::with_capacity(StreamKind::ALL.len()),
            stop,
            drain_timeout: self.config.drain_timeout,
            released: false,
        };

        for stream in StreamKind::ALL {
            let captured = match self.binder.capture(stream) {
                Ok(captured) => captured,
                Err(e) => return Err(handle.abort(RedirectError::from_capture(stream, e))),
            };
            let listener = LineListener::new(
                stream,
                Arc::clone(&self.sink),
                Arc::clone(&self.time_provider),
            );
            let reader = captured.reader;
            let stop = token.clone();
            let task = runtime.spawn_blocking(move || listener.run(reader, stop));
            handle.bindings.push(captured.binding);
            handle.listeners.push((stream, task));
        }

        if self.config.capture_legacy_log {
            if let Some(legacy) = &self.legacy {
                let pipe_writer = handle.binding(StreamKind::Stderr).map(|b| b.pipe_writer());
                let writer = match pipe_writer {
                    Some(Ok(writer)) => writer,
                    Some(Err(source)) => {
                        let err = RedirectError::Bind {
                            stream: StreamKind::Stderr,
                            source,
                        };
                        return Err(handle.abort(err));
                    }
                    None => return Err(handle.abort(RedirectError::NotInitialized)),
                };
                if legacy.redirect(handle.id, writer) {
                    handle.legacy = Some(Arc::clone(legacy));
                } else {
                    debug!(handle_id = %handle.id, "Legacy log already routed to another handle");
                }
            }
        }

        debug!(handle_id = %handle.id, "Process output redirected");
        Ok(handle)
    }
}

/// Per-stream listener outcomes collected at shutdown
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    listeners: Vec<(StreamKind, ListenerSummary)>,
}

impl ShutdownReport {
    pub fn summary(&self, stream: StreamKind) -> Option<&ListenerSummary> {
        self.listeners
            .iter()
            .find(|(kind, _)| *kind == stream)
            .map(|(_, summary)| summary)
    }

    /// Lines forwarded across both streams
    pub fn total_lines(&self) -> u64 {
        self.listeners.iter().map(|(_, s)| s.lines_forwarded).sum()
    }
}

/// Active redirection of stdout/stderr into a structured logger
///
/// Owned by the caller; pass it to wherever logging happens and call
/// [`LoggerHandle::shutdown`] before the process exits. Dropping the handle
/// without shutdown restores the streams on a best-effort basis.
pub struct LoggerHandle {
    id: Uuid,
    sink: Arc<dyn LogSink>,
    time_provider: Arc<dyn TimeProvider>,
    legacy: Option<Arc<dyn LegacyLogTarget>>,
    bindings: Vec<Box<dyn StreamBinding>>,
    listeners: Vec<(StreamKind, JoinHandle<ListenerSummary>)>,
    stop: StopSender,
    drain_timeout: Duration,
    released: bool,
}

impl LoggerHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[track_caller]
    pub fn debug(&self, message: impl Display) {
        self.log(Severity::Debug, &message, None, Location::caller());
    }

    #[track_caller]
    pub fn info(&self, message: impl Display) {
        self.log(Severity::Info, &message, None, Location::caller());
    }

    #[track_caller]
    pub fn warn(&self, message: impl Display) {
        self.log(Severity::Warn, &message, None, Location::caller());
    }

    /// Log `message` at error level with `err` attached as a field
    #[track_caller]
    pub fn error(&self, err: &dyn Display, message: impl Display) {
        self.log(Severity::Error, &message, Some(err), Location::caller());
    }

    /// Log at fatal level, flush the sink and terminate the process
    #[track_caller]
    pub fn fatal(&self, message: impl Display) -> ! {
        self.log(Severity::Fatal, &message, None, Location::caller());
        self.flush();
        std::process::exit(FATAL_EXIT_CODE)
    }

    /// Flush buffered sink output
    pub fn flush(&self) {
        self.sink.flush();
    }

    /// Emit a direct record attributed to `caller`
    pub fn log(
        &self,
        severity: Severity,
        message: &dyn Display,
        error: Option<&dyn Display>,
        caller: &Location<'_>,
    ) {
        let record = LogRecord::direct(
            severity,
            message.to_string(),
            error.map(|e| e.to_string()),
            caller,
            self.time_provider.now_millis(),
        );
        self.sink.emit(&record);
    }

    /// Restore both streams, close the pipe write ends and wait for listeners
    ///
    /// Listeners get `drain_timeout` to reach end-of-stream; after that the
    /// stop signal ends them even if something else still holds a write end.
    ///
    /// # Errors
    /// - RedirectError::Restore if a stream could not be put back (the other
    ///   stream is still restored)
    pub async fn shutdown(mut self) -> Result<ShutdownReport> {
        let restored = self.release_streams();

        let deadline = tokio::time::Instant::now() + self.drain_timeout;
        let mut report = ShutdownReport::default();
        for (stream, mut task) in std::mem::take(&mut self.listeners) {
            let joined = match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    debug!(stream = %stream, "Listener still draining, sending stop signal");
                    self.stop.stop();
                    task.await
                }
            };
            let summary = joined.unwrap_or_else(|e| {
                warn!(stream = %stream, error = %e, "Stream listener panicked");
                ListenerSummary::panicked()
            });
            report.listeners.push((stream, summary));
        }
        self.stop.stop();

        debug!(
            handle_id = %self.id,
            lines = report.total_lines(),
            "Process output restored"
        );
        restored.map(|()| report)
    }

    fn binding(&self, stream: StreamKind) -> Option<&dyn StreamBinding> {
        self.bindings
            .iter()
            .find(|b| b.stream() == stream)
            .map(|b| b.as_ref())
    }

    /// Put back the legacy destination and both streams, reporting the first failure
    fn release_streams(&mut self) -> Result<()> {
        self.released = true;
        // The legacy writer holds a write end open; drop it before the pipes close
        if let Some(legacy) = self.legacy.take() {
            legacy.restore(self.id);
        }

        let mut first_err = None;
        for binding in self.bindings.iter_mut() {
            let stream = binding.stream();
            if let Err(source) = binding.restore() {
                warn!(stream = %stream, error = %source, "Failed to restore stream");
                first_err.get_or_insert(RedirectError::Restore { stream, source });
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Undo a partial initialization and hand back `err`
    fn abort(mut self, err: RedirectError) -> RedirectError {
        let _ = self.release_streams();
        self.stop.stop();
        err
    }
}

impl Drop for LoggerHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let restored = self.release_streams();
        self.stop.stop();
        warn!(
            handle_id = %self.id,
            restored = restored.is_ok(),
            "Logger handle dropped without shutdown"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RecordOrigin;
    use crate::port::legacy_log::mocks::MockLegacyLog;
    use crate::port::log_sink::mocks::MemorySink;
    use crate::port::stream_binder::mocks::MockStreamBinder;
    use crate::port::time_provider::SystemTimeProvider;
    use std::io::Write;

    const WAIT: Duration = Duration::from_secs(2);

    fn redirector(binder: &MockStreamBinder, sink: &MemorySink) -> Redirector {
        Redirector::new(
            Arc::new(binder.clone()),
            Arc::new(sink.clone()),
            Arc::new(SystemTimeProvider),
        )
    }

    #[tokio::test]
    async fn test_hello_world_round_trip() {
        let binder = MockStreamBinder::new();
        let sink = MemorySink::new();
        let handle = redirector(&binder, &sink).initialize().unwrap();

        binder.write(StreamKind::Stdout, b"hello world\n").unwrap();
        let records = sink.wait_for(1, WAIT).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "hello world");
        assert_eq!(records[0].severity, Severity::Info);

        let report = handle.shutdown().await.unwrap();
        assert_eq!(report.total_lines(), 1);
        assert!(!binder.is_bound(StreamKind::Stdout));
        assert!(binder.write(StreamKind::Stdout, b"late\n").is_err());
    }

    #[tokio::test]
    async fn test_stderr_lines_logged_as_errors() {
        let binder = MockStreamBinder::new();
        let sink = MemorySink::new();
        let handle = redirector(&binder, &sink).initialize().unwrap();

        binder.write(StreamKind::Stderr, b"oops\n\n").unwrap();
        sink.wait_for(1, WAIT).await;
        handle.shutdown().await.unwrap();

        let records = sink.from_stream(StreamKind::Stderr);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::Error);
        assert_eq!(records[0].message, "oops");
    }

    #[tokio::test]
    async fn test_shutdown_restores_both_streams() {
        let binder = MockStreamBinder::new();
        let sink = MemorySink::new();
        let handle = redirector(&binder, &sink).initialize().unwrap();
        assert!(binder.is_bound(StreamKind::Stdout));
        assert!(binder.is_bound(StreamKind::Stderr));

        let report = handle.shutdown().await.unwrap();

        for stream in StreamKind::ALL {
            assert_eq!(binder.restore_count(stream), 1);
            assert_eq!(report.summary(stream).unwrap().end, ListenerEnd::EndOfStream);
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_pending_lines() {
        let binder = MockStreamBinder::new();
        let sink = MemorySink::new();
        let handle = redirector(&binder, &sink).initialize().unwrap();

        for i in 0..50 {
            binder
                .write(StreamKind::Stdout, format!("line {}\n", i).as_bytes())
                .unwrap();
        }
        let report = handle.shutdown().await.unwrap();

        assert_eq!(report.summary(StreamKind::Stdout).unwrap().lines_forwarded, 50);
        let messages: Vec<String> = sink.records().into_iter().map(|r| r.message).collect();
        assert_eq!(messages.first().map(String::as_str), Some("line 0"));
        assert_eq!(messages.last().map(String::as_str), Some("line 49"));
    }

    #[tokio::test]
    async fn test_second_initialize_is_rejected() {
        let binder = MockStreamBinder::new();
        let sink = MemorySink::new();
        let first = redirector(&binder, &sink).initialize().unwrap();

        let second = redirector(&binder, &sink).initialize();
        assert!(matches!(
            second,
            Err(RedirectError::AlreadyActive(StreamKind::Stdout))
        ));

        // The first handle is untouched
        binder.write(StreamKind::Stdout, b"still here\n").unwrap();
        let records = sink.wait_for(1, WAIT).await;
        assert_eq!(records[0].message, "still here");
        first.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_capture_failure_rolls_back() {
        let binder = MockStreamBinder::failing_on(StreamKind::Stderr);
        let sink = MemorySink::new();

        let result = redirector(&binder, &sink).initialize();

        match result {
            Err(RedirectError::Bind { stream, .. }) => assert_eq!(stream, StreamKind::Stderr),
            other => panic!("expected bind error, got {:?}", other.map(|h| h.id())),
        }
        assert!(!binder.is_bound(StreamKind::Stdout));
        assert_eq!(binder.restore_count(StreamKind::Stdout), 1);
    }

    #[test]
    fn test_initialize_outside_runtime_fails() {
        let binder = MockStreamBinder::new();
        let sink = MemorySink::new();

        let result = redirector(&binder, &sink).initialize();

        assert!(matches!(result, Err(RedirectError::NoRuntime(_))));
        assert!(!binder.is_bound(StreamKind::Stdout));
    }

    #[tokio::test]
    async fn test_stop_signal_bounds_shutdown() {
        let binder = MockStreamBinder::new();
        let sink = MemorySink::new();
        let config = RedirectConfig {
            drain_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let handle = redirector(&binder, &sink)
            .with_config(config)
            .initialize()
            .unwrap();
        // Something else keeps the stdout write end open past restore
        let held = binder.detach_writer(StreamKind::Stdout).unwrap();

        let report = tokio::time::timeout(WAIT, handle.shutdown())
            .await
            .expect("shutdown must not hang on a held pipe")
            .unwrap();

        assert_eq!(report.summary(StreamKind::Stdout).unwrap().end, ListenerEnd::Stopped);
        assert_eq!(
            report.summary(StreamKind::Stderr).unwrap().end,
            ListenerEnd::EndOfStream
        );
        drop(held);
    }

    #[tokio::test]
    async fn test_legacy_log_follows_stderr_pipe() {
        let binder = MockStreamBinder::new();
        let sink = MemorySink::new();
        let legacy = Arc::new(MockLegacyLog::new());
        let handle = redirector(&binder, &sink)
            .with_legacy_log(Some(legacy.clone() as Arc<dyn LegacyLogTarget>))
            .initialize()
            .unwrap();

        assert_eq!(legacy.owner(), Some(handle.id()));
        assert_eq!(legacy.redirect_count(), 1);

        handle.shutdown().await.unwrap();
        assert_eq!(legacy.owner(), None);
        assert_eq!(legacy.restore_count(), 1);
    }

    #[tokio::test]
    async fn test_legacy_log_stays_with_first_handle() {
        let sink = MemorySink::new();
        let legacy = Arc::new(MockLegacyLog::new());
        let with_legacy = |binder: &MockStreamBinder| {
            redirector(binder, &sink)
                .with_legacy_log(Some(legacy.clone() as Arc<dyn LegacyLogTarget>))
                .initialize()
                .unwrap()
        };
        // Independent targets, so both handles may be active
        let first = with_legacy(&MockStreamBinder::new());
        let second = with_legacy(&MockStreamBinder::new());

        assert_eq!(legacy.owner(), Some(first.id()));
        second.shutdown().await.unwrap();
        assert_eq!(legacy.owner(), Some(first.id()));
        assert_eq!(legacy.restore_count(), 0);

        first.shutdown().await.unwrap();
        assert_eq!(legacy.owner(), None);
    }

    #[tokio::test]
    async fn test_legacy_log_capture_can_be_disabled() {
        let binder = MockStreamBinder::new();
        let sink = MemorySink::new();
        let legacy = Arc::new(MockLegacyLog::new());
        let config = RedirectConfig {
            capture_legacy_log: false,
            ..Default::default()
        };
        let handle = redirector(&binder, &sink)
            .with_legacy_log(Some(legacy.clone() as Arc<dyn LegacyLogTarget>))
            .with_config(config)
            .initialize()
            .unwrap();

        handle.shutdown().await.unwrap();
        assert_eq!(legacy.redirect_count(), 0);
        assert_eq!(legacy.restore_count(), 0);
    }

    #[tokio::test]
    async fn test_pipe_writer_reaches_binding() {
        let binder = MockStreamBinder::new();
        let sink = MemorySink::new();
        let handle = redirector(&binder, &sink).initialize().unwrap();

        let mut writer = handle
            .binding(StreamKind::Stderr)
            .unwrap()
            .pipe_writer()
            .unwrap();
        writer.write_all(b"via writer").unwrap();

        assert_eq!(binder.pipe_writer_output(), "via writer");
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_leveled_calls_record_caller() {
        let binder = MockStreamBinder::new();
        let sink = MemorySink::new();
        let handle = redirector(&binder, &sink).initialize().unwrap();

        handle.debug("d");
        handle.info(format_args!("answer={}", 42));
        handle.warn("w");
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        handle.error(&err, "load failed");

        let records = sink.records();
        let severities: Vec<Severity> = records.iter().map(|r| r.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::Debug, Severity::Info, Severity::Warn, Severity::Error]
        );
        assert_eq!(records[1].message, "answer=42");
        assert_eq!(records[3].error.as_deref(), Some("missing file"));
        for record in &records {
            assert_eq!(record.origin, RecordOrigin::Direct);
            let caller = record.caller.as_ref().unwrap();
            assert!(caller.file.ends_with("redirector/mod.rs"), "got {}", caller);
        }
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_without_shutdown_restores_streams() {
        let binder = MockStreamBinder::new();
        let sink = MemorySink::new();
        let handle = redirector(&binder, &sink).initialize().unwrap();

        drop(handle);

        assert!(!binder.is_bound(StreamKind::Stdout));
        assert!(!binder.is_bound(StreamKind::Stderr));
        // A fresh handle can now claim the streams
        let again = redirector(&binder, &sink).initialize().unwrap();
        again.shutdown().await.unwrap();
    }
}
