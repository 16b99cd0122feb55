// Redirector constants (no magic values)
use std::time::Duration;

/// How long shutdown lets listeners drain before sending the stop signal (500ms)
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Exit code used by `fatal`
pub const FATAL_EXIT_CODE: i32 = 1;

/// Initial capacity of a listener's line buffer
pub const LINE_BUFFER_CAPACITY: usize = 1024;
