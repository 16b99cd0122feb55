// Process-wide logger facade
//
// Holds at most one LoggerHandle so code without access to a handle can
// still log. Callers that can pass a handle around should prefer that.

use std::fmt::Display;
use std::panic::Location;
use std::sync::{Mutex, MutexGuard, PoisonError};

use logpipe_core::application::redirector::constants::FATAL_EXIT_CODE;
use logpipe_core::domain::Severity;
use logpipe_core::{LoggerHandle, RedirectError, Result, ShutdownReport};

use crate::bootstrap;
use crate::config::LoggerConfig;
use crate::fd_binder::StreamTargets;

static ACTIVE: Mutex<Option<LoggerHandle>> = Mutex::new(None);

fn active() -> MutexGuard<'static, Option<LoggerHandle>> {
    ACTIVE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Redirect the process streams and install the handle globally
///
/// # Errors
/// - RedirectError::AlreadyInitialized if a global handle is active
/// - anything [`bootstrap::init_logger`] returns
pub fn init(config: &LoggerConfig) -> Result<()> {
    init_with_targets(config, StreamTargets::process())
}

pub fn init_with_targets(config: &LoggerConfig, targets: StreamTargets) -> Result<()> {
    let mut active = active();
    if active.is_some() {
        return Err(RedirectError::AlreadyInitialized);
    }
    *active = Some(bootstrap::init_logger_with_targets(config, targets)?);
    Ok(())
}

pub fn is_initialized() -> bool {
    active().is_some()
}

/// Shut down the global handle, after which `init` may be called again
///
/// # Errors
/// - RedirectError::NotInitialized if no handle is active
pub async fn shutdown() -> Result<ShutdownReport> {
    // Release the lock before awaiting
    let handle = active().take().ok_or(RedirectError::NotInitialized)?;
    handle.shutdown().await
}

fn log(
    severity: Severity,
    message: &dyn Display,
    error: Option<&dyn Display>,
    caller: &Location<'_>,
) -> Result<()> {
    let active = active();
    let handle = active.as_ref().ok_or(RedirectError::NotInitialized)?;
    handle.log(severity, message, error, caller);
    Ok(())
}

#[track_caller]
pub fn debug(message: impl Display) -> Result<()> {
    log(Severity::Debug, &message, None, Location::caller())
}

#[track_caller]
pub fn info(message: impl Display) -> Result<()> {
    log(Severity::Info, &message, None, Location::caller())
}

#[track_caller]
pub fn warn(message: impl Display) -> Result<()> {
    log(Severity::Warn, &message, None, Location::caller())
}

#[track_caller]
pub fn error(err: &dyn Display, message: impl Display) -> Result<()> {
    log(Severity::Error, &message, Some(err), Location::caller())
}

/// Log at fatal level and terminate the process
///
/// Without an active handle the message goes straight to stderr.
#[track_caller]
pub fn fatal(message: impl Display) -> ! {
    let caller = Location::caller();
    {
        let active = active();
        if let Some(handle) = active.as_ref() {
            handle.log(Severity::Fatal, &message, None, caller);
            handle.flush();
        } else {
            eprintln!("FATAL {} ({}; logger not initialized)", message, caller);
        }
    }
    std::process::exit(FATAL_EXIT_CODE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};
    use std::os::fd::AsRawFd;

    fn read_all(file: &mut File) -> String {
        let mut contents = String::new();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_to_string(&mut contents).unwrap();
        contents
    }

    // Single test: the facade is process-wide state
    #[tokio::test]
    async fn test_global_lifecycle() {
        assert!(!is_initialized());
        assert!(matches!(info("too early"), Err(RedirectError::NotInitialized)));
        assert!(matches!(shutdown().await, Err(RedirectError::NotInitialized)));

        let out = tempfile::tempfile().unwrap();
        let mut err = tempfile::tempfile().unwrap();
        let targets = StreamTargets::new(out.as_raw_fd(), err.as_raw_fd());
        let config = LoggerConfig {
            format: LogFormat::Compact,
            ansi: false,
            capture_legacy_log: false,
            ..Default::default()
        };

        init_with_targets(&config, targets).unwrap();
        assert!(is_initialized());
        assert!(matches!(
            init_with_targets(&config, targets),
            Err(RedirectError::AlreadyInitialized)
        ));

        info("through the facade").unwrap();
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        error(&cause, "it broke").unwrap();
        shutdown().await.unwrap();
        assert!(!is_initialized());

        let logged = read_all(&mut err);
        assert!(logged.contains("through the facade"), "got {}", logged);
        assert!(logged.contains("it broke"), "got {}", logged);
        assert!(logged.contains("src/global.rs"), "got {}", logged);

        // A fresh init works after shutdown
        init_with_targets(&config, targets).unwrap();
        shutdown().await.unwrap();
    }
}
