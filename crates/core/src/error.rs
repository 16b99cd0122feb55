// Central Error Type for the Redirector

use crate::domain::StreamKind;
use crate::port::BindError;
use thiserror::Error;

/// Redirector error type
#[derive(Error, Debug)]
pub enum RedirectError {
    #[error("Logger not initialized: no active logger handle")]
    NotInitialized,

    #[error("Logger already initialized: shut down the active handle first")]
    AlreadyInitialized,

    #[error("{0} is already redirected by another logger handle")]
    AlreadyActive(StreamKind),

    #[error("Failed to redirect {stream}: {source}")]
    Bind {
        stream: StreamKind,
        #[source]
        source: BindError,
    },

    #[error("Failed to restore {stream}: {source}")]
    Restore {
        stream: StreamKind,
        #[source]
        source: BindError,
    },

    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RedirectError {
    /// Map a binder failure during capture, surfacing double capture as `AlreadyActive`
    pub fn from_capture(stream: StreamKind, err: BindError) -> Self {
        match err {
            BindError::AlreadyBound => RedirectError::AlreadyActive(stream),
            source => RedirectError::Bind { stream, source },
        }
    }
}

/// Result type alias using RedirectError
pub type Result<T> = std::result::Result<T, RedirectError>;
