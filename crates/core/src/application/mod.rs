// Application Layer - Use Cases

pub mod redirector;

// Re-exports
pub use redirector::{
    stop_channel, ListenerEnd, ListenerSummary, LoggerHandle, RedirectConfig, Redirector,
    ShutdownReport, StopSender, StopToken,
};
