// File descriptor stream binder (unix)
// reason: nix for pipe/dup/dup2 and poll-bounded reads of the pipe
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::{Mutex, OnceLock, PoisonError};

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::unistd::{dup2, pipe};
use tracing::{debug, warn};

use logpipe_core::domain::StreamKind;
use logpipe_core::port::{BindError, CapturedStream, StreamBinder, StreamBinding};

/// Longest a pipe read waits before handing control back to the listener
const READ_POLL_TIMEOUT_MS: u16 = 50;

/// Descriptors the binder rebinds for each stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTargets {
    pub stdout: RawFd,
    pub stderr: RawFd,
}

impl StreamTargets {
    /// The process's own standard output and error
    pub fn process() -> Self {
        Self {
            stdout: io::stdout().as_raw_fd(),
            stderr: io::stderr().as_raw_fd(),
        }
    }

    /// Arbitrary descriptors (e.g. files opened by a test)
    pub fn new(stdout: RawFd, stderr: RawFd) -> Self {
        Self { stdout, stderr }
    }

    pub fn fd(&self, stream: StreamKind) -> RawFd {
        match stream {
            StreamKind::Stdout => self.stdout,
            StreamKind::Stderr => self.stderr,
        }
    }

    /// Independent handle on whatever `stream` currently points at
    pub fn duplicate(&self, stream: StreamKind) -> io::Result<File> {
        Ok(File::from(dup_cloexec(self.fd(stream))?))
    }
}

impl Default for StreamTargets {
    fn default() -> Self {
        Self::process()
    }
}

/// Binder that points target descriptors at fresh pipes with `dup2`
///
/// Every descriptor can be claimed by one binding at a time across the
/// whole process, so a second capture of the same target is rejected.
pub struct FdStreamBinder {
    targets: StreamTargets,
}

impl FdStreamBinder {
    pub fn new(targets: StreamTargets) -> Self {
        Self { targets }
    }

    pub fn targets(&self) -> StreamTargets {
        self.targets
    }
}

impl StreamBinder for FdStreamBinder {
    fn capture(&self, stream: StreamKind) -> Result<CapturedStream, BindError> {
        let target = self.targets.fd(stream);
        let claim = TargetClaim::acquire(target).ok_or(BindError::AlreadyBound)?;

        flush_std(stream);
        let saved = dup_cloexec(target)
            .map_err(|e| BindError::Rebind(format!("cannot save fd {}: {}", target, e)))?;

        let (read_end, write_end) = pipe().map_err(|e| BindError::Pipe(e.to_string()))?;
        set_cloexec(read_end.as_raw_fd()).map_err(|e| BindError::Pipe(e.to_string()))?;
        let reader = FdPipeReader {
            file: File::from(read_end),
        };

        dup2(write_end.as_raw_fd(), target)
            .map_err(|e| BindError::Rebind(format!("dup2 onto fd {}: {}", target, e)))?;
        // The target descriptor is now the only write end we hold
        drop(write_end);

        debug!(stream = %stream, fd = target, "Stream rebound onto capture pipe");
        Ok(CapturedStream {
            reader: Box::new(reader),
            binding: Box::new(FdBinding {
                stream,
                target,
                saved: Some(saved),
                claim: Some(claim),
            }),
        })
    }
}

/// Blocking read end of a capture pipe
///
/// Waits at most `READ_POLL_TIMEOUT_MS` for data, then fails with
/// `TimedOut` so the listener can check its stop signal.
struct FdPipeReader {
    file: File,
}

impl Read for FdPipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
        let ready = poll(&mut fds, PollTimeout::from(READ_POLL_TIMEOUT_MS))?;
        if ready == 0 {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "no data on capture pipe",
            ));
        }
        // Readable or hung up; a hang-up reads as end-of-stream
        self.file.read(buf)
    }
}

/// Active rebinding of one descriptor; restores it on drop
struct FdBinding {
    stream: StreamKind,
    target: RawFd,
    /// Duplicate of the original descriptor, `None` once restored
    saved: Option<OwnedFd>,
    claim: Option<TargetClaim>,
}

impl StreamBinding for FdBinding {
    fn stream(&self) -> StreamKind {
        self.stream
    }

    fn pipe_writer(&self) -> Result<Box<dyn Write + Send>, BindError> {
        if self.saved.is_none() {
            return Err(BindError::Rebind(format!(
                "fd {} is no longer captured",
                self.target
            )));
        }
        let fd = dup_cloexec(self.target)?;
        Ok(Box::new(File::from(fd)))
    }

    fn restore(&mut self) -> Result<(), BindError> {
        let Some(saved) = self.saved.take() else {
            return Ok(());
        };

        flush_std(self.stream);
        if let Err(e) = dup2(saved.as_raw_fd(), self.target) {
            self.saved = Some(saved);
            return Err(BindError::Restore(format!(
                "dup2 onto fd {}: {}",
                self.target, e
            )));
        }
        self.claim.take();

        debug!(stream = %self.stream, fd = self.target, "Stream restored");
        Ok(())
    }
}

impl Drop for FdBinding {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!(stream = %self.stream, fd = self.target, error = %e, "Failed to restore stream on drop");
        }
    }
}

/// Process-wide claim on a target descriptor
struct TargetClaim(RawFd);

fn claims() -> &'static Mutex<HashSet<RawFd>> {
    static CLAIMS: OnceLock<Mutex<HashSet<RawFd>>> = OnceLock::new();
    CLAIMS.get_or_init(Default::default)
}

impl TargetClaim {
    fn acquire(fd: RawFd) -> Option<Self> {
        let mut claimed = claims().lock().unwrap_or_else(PoisonError::into_inner);
        claimed.insert(fd).then_some(TargetClaim(fd))
    }
}

impl Drop for TargetClaim {
    fn drop(&mut self) {
        claims()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.0);
    }
}

/// Buffered Rust stdout must reach the old destination before rebinding
fn flush_std(stream: StreamKind) {
    if stream == StreamKind::Stdout {
        let _ = io::stdout().flush();
    }
}

fn dup_cloexec(fd: RawFd) -> io::Result<OwnedFd> {
    let raw = fcntl(fd, FcntlArg::F_DUPFD_CLOEXEC(0))?;
    // SAFETY: F_DUPFD_CLOEXEC returned a fresh descriptor that nothing else owns
    Ok(unsafe { OwnedFd::from_raw_fd(raw) })
}

fn set_cloexec(fd: RawFd) -> nix::Result<()> {
    fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map(|_| ())
}
