// Logpipe Core - Domain, Ports & Redirector
// NO OS dependencies: descriptors and subscribers live behind ports

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use application::redirector::{LoggerHandle, RedirectConfig, Redirector, ShutdownReport};
pub use error::{RedirectError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
