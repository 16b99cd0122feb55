// Stream Binder Port - pipes and rebinding of the process output streams

use crate::domain::StreamKind;
use std::io::{Read, Write};
use thiserror::Error;

/// Read end of a capture pipe
///
/// Reads block, but only for a bounded time: when no data arrives a read
/// fails with `ErrorKind::TimedOut` so the listener can look at its stop
/// signal. `Ok(0)` means every write end is closed.
pub type PipeReader = Box<dyn Read + Send>;

/// Binder errors
#[derive(Error, Debug)]
pub enum BindError {
    #[error("stream is already redirected")]
    AlreadyBound,

    #[error("pipe creation failed: {0}")]
    Pipe(String),

    #[error("rebinding failed: {0}")]
    Rebind(String),

    #[error("restoring original stream failed: {0}")]
    Restore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A stream currently routed into a pipe
pub struct CapturedStream {
    /// Read end consumed by the listener
    pub reader: PipeReader,
    /// Keeps the original stream so it can be put back
    pub binding: Box<dyn StreamBinding>,
}

/// Rebinds a process output stream onto a fresh pipe
pub trait StreamBinder: Send + Sync {
    /// Create a pipe and point `stream` at its write end
    ///
    /// # Errors
    /// - BindError::AlreadyBound if the stream is already captured
    /// - BindError::Pipe if the pipe cannot be created
    /// - BindError::Rebind if the stream cannot be pointed at the pipe
    fn capture(&self, stream: StreamKind) -> Result<CapturedStream, BindError>;
}

/// Active redirection of one stream
pub trait StreamBinding: Send {
    fn stream(&self) -> StreamKind;

    /// Independent writer onto the pipe write end
    ///
    /// The writer keeps the pipe open, so it must be dropped before the
    /// listener can observe end-of-stream.
    fn pipe_writer(&self) -> Result<Box<dyn Write + Send>, BindError>;

    /// Point the stream back at the original and close our write end.
    /// Calling it again after success is a no-op.
    fn restore(&mut self) -> Result<(), BindError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::io;
    use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// How long a mock pipe read waits before timing out
    const READ_TIMEOUT: Duration = Duration::from_millis(10);

    /// Byte buffer usable as a `Write` from several owners
    #[derive(Clone, Default)]
    pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Read end of an in-memory pipe; end-of-stream once every sender is gone
    pub struct ChannelReader {
        rx: Receiver<Vec<u8>>,
        chunk: Vec<u8>,
        pos: usize,
    }

    impl ChannelReader {
        pub fn new(rx: Receiver<Vec<u8>>) -> Self {
            Self {
                rx,
                chunk: Vec::new(),
                pos: 0,
            }
        }
    }

    impl Read for ChannelReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos == self.chunk.len() {
                match self.rx.recv_timeout(READ_TIMEOUT) {
                    Ok(chunk) => {
                        self.chunk = chunk;
                        self.pos = 0;
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        return Err(io::Error::new(io::ErrorKind::TimedOut, "no data yet"))
                    }
                    Err(RecvTimeoutError::Disconnected) => return Ok(0),
                }
            }
            let n = buf.len().min(self.chunk.len() - self.pos);
            buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[derive(Default)]
    struct MockState {
        bound: HashSet<StreamKind>,
        writers: HashMap<StreamKind, Sender<Vec<u8>>>,
        restores: HashMap<StreamKind, usize>,
        fail_on: Option<StreamKind>,
    }

    /// Binder backed by in-memory channel pipes
    #[derive(Clone, Default)]
    pub struct MockStreamBinder {
        state: Arc<Mutex<MockState>>,
        pipe_output: SharedBuffer,
    }

    impl MockStreamBinder {
        pub fn new() -> Self {
            Self::default()
        }

        /// Binder whose capture of `stream` fails with a pipe error
        pub fn failing_on(stream: StreamKind) -> Self {
            let binder = Self::default();
            binder.state.lock().unwrap().fail_on = Some(stream);
            binder
        }

        pub fn is_bound(&self, stream: StreamKind) -> bool {
            self.state.lock().unwrap().bound.contains(&stream)
        }

        pub fn restore_count(&self, stream: StreamKind) -> usize {
            self.state
                .lock()
                .unwrap()
                .restores
                .get(&stream)
                .copied()
                .unwrap_or(0)
        }

        /// Bytes written through `pipe_writer` handles
        pub fn pipe_writer_output(&self) -> String {
            self.pipe_output.contents()
        }

        /// Write into the pipe of a captured stream
        pub fn write(&self, stream: StreamKind, bytes: &[u8]) -> io::Result<()> {
            let broken = || io::Error::new(io::ErrorKind::BrokenPipe, "stream not captured");
            let state = self.state.lock().unwrap();
            let writer = state.writers.get(&stream).ok_or_else(broken)?;
            writer.send(bytes.to_vec()).map_err(|_| broken())
        }

        /// Take the write end away from the binder, as a child process
        /// inheriting the stream would keep it open past restore
        pub fn detach_writer(&self, stream: StreamKind) -> Option<Sender<Vec<u8>>> {
            self.state.lock().unwrap().writers.remove(&stream)
        }
    }

    impl StreamBinder for MockStreamBinder {
        fn capture(&self, stream: StreamKind) -> Result<CapturedStream, BindError> {
            let mut state = self.state.lock().unwrap();
            if state.fail_on == Some(stream) {
                return Err(BindError::Pipe("injected failure".to_string()));
            }
            if !state.bound.insert(stream) {
                return Err(BindError::AlreadyBound);
            }
            let (tx, rx) = mpsc::channel();
            state.writers.insert(stream, tx);

            Ok(CapturedStream {
                reader: Box::new(ChannelReader::new(rx)),
                binding: Box::new(MockBinding {
                    stream,
                    state: Arc::clone(&self.state),
                    pipe_output: self.pipe_output.clone(),
                    restored: false,
                }),
            })
        }
    }

    struct MockBinding {
        stream: StreamKind,
        state: Arc<Mutex<MockState>>,
        pipe_output: SharedBuffer,
        restored: bool,
    }

    impl StreamBinding for MockBinding {
        fn stream(&self) -> StreamKind {
            self.stream
        }

        fn pipe_writer(&self) -> Result<Box<dyn Write + Send>, BindError> {
            Ok(Box::new(self.pipe_output.clone()))
        }

        fn restore(&mut self) -> Result<(), BindError> {
            if self.restored {
                return Ok(());
            }
            let mut state = self.state.lock().unwrap();
            state.bound.remove(&self.stream);
            state.writers.remove(&self.stream);
            *state.restores.entry(self.stream).or_insert(0) += 1;
            self.restored = true;
            Ok(())
        }
    }
}
