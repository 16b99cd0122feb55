// Stream listener - reads a capture pipe line by line and forwards to the sink

use super::constants::LINE_BUFFER_CAPACITY;
use super::stop::StopToken;
use crate::domain::{LogRecord, StreamKind};
use crate::port::{LogSink, TimeProvider};
use std::io::{self, BufRead, BufReader, Read};
use std::sync::Arc;
use tracing::debug;

/// Why a listener loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerEnd {
    /// Every write end was closed and the pipe drained
    EndOfStream,
    /// The stop signal fired before end-of-stream
    Stopped,
    /// The read failed (expected when the pipe is torn down)
    ReadFailed,
    /// The listener task panicked
    Panicked,
}

/// Outcome of one listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSummary {
    pub lines_forwarded: u64,
    pub end: ListenerEnd,
}

impl ListenerSummary {
    pub(crate) fn panicked() -> Self {
        Self {
            lines_forwarded: 0,
            end: ListenerEnd::Panicked,
        }
    }
}

/// Forwards lines from one captured stream
///
/// Runs on a blocking thread, never on a runtime worker: a process that
/// writes more than the pipe buffer blocks in `write` until this loop reads.
pub(crate) struct LineListener {
    stream: StreamKind,
    sink: Arc<dyn LogSink>,
    time_provider: Arc<dyn TimeProvider>,
}

impl LineListener {
    pub(crate) fn new(
        stream: StreamKind,
        sink: Arc<dyn LogSink>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            stream,
            sink,
            time_provider,
        }
    }

    /// Run until end-of-stream, a read error, or the stop signal
    ///
    /// The stop signal is checked whenever a read times out, so `reader`
    /// must not block indefinitely.
    pub(crate) fn run<R: Read>(self, reader: R, stop: StopToken) -> ListenerSummary {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(LINE_BUFFER_CAPACITY);
        let mut lines_forwarded = 0;

        let end = loop {
            if stop.is_stopped() {
                break ListenerEnd::Stopped;
            }
            // A timed out read keeps the partial line in `buf`
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => {
                    if self.forward(&buf) {
                        lines_forwarded += 1;
                    }
                    break ListenerEnd::EndOfStream;
                }
                Ok(_) if buf.ends_with(b"\n") => {
                    if self.forward(&buf) {
                        lines_forwarded += 1;
                    }
                    buf.clear();
                }
                // Fragment before end-of-stream; the next read returns 0
                Ok(_) => {}
                Err(e) if is_retryable(&e) => {}
                Err(e) => {
                    debug!(stream = %self.stream, error = %e, "Capture pipe read failed");
                    break ListenerEnd::ReadFailed;
                }
            }
        };

        debug!(
            stream = %self.stream,
            lines_forwarded = lines_forwarded,
            end = ?end,
            "Stream listener stopped"
        );
        ListenerSummary {
            lines_forwarded,
            end,
        }
    }

    /// Emit one raw line; returns false for empty lines
    fn forward(&self, raw: &[u8]) -> bool {
        let line = trim_line_ending(raw);
        if line.is_empty() {
            return false;
        }
        let message = String::from_utf8_lossy(line).into_owned();
        let record = LogRecord::captured(self.stream, message, self.time_provider.now_millis());
        self.sink.emit(&record);
        true
    }
}

fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

fn trim_line_ending(raw: &[u8]) -> &[u8] {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    line.strip_suffix(b"\r").unwrap_or(line)
}
