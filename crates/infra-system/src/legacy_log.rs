// Legacy `log` crate facility routed into the stderr capture pipe

use std::io::{self, Write};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use log::{LevelFilter, Log, Metadata, Record};
use tracing::warn;
use uuid::Uuid;

use logpipe_core::port::LegacyLogTarget;

/// Most verbose `log` level forwarded while the bridge is installed
pub const LEGACY_MAX_LEVEL: LevelFilter = LevelFilter::Info;

static BRIDGE: LegacyLogBridge = LegacyLogBridge {
    route: Mutex::new(None),
};

struct Route {
    owner: Uuid,
    writer: Box<dyn Write + Send>,
}

/// `log` backend writing plain lines to a swappable destination
///
/// Without an active route lines go to the process stderr, which is the
/// restored stream once a handle shuts down.
pub struct LegacyLogBridge {
    route: Mutex<Option<Route>>,
}

impl LegacyLogBridge {
    fn write_line(&self, line: &[u8]) -> io::Result<()> {
        let mut route = self.route.lock().unwrap_or_else(PoisonError::into_inner);
        match route.as_mut() {
            Some(route) => route.writer.write_all(line),
            None => io::stderr().write_all(line),
        }
    }
}

impl Log for LegacyLogBridge {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= LEGACY_MAX_LEVEL
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{}] {}: {}\n", record.level(), record.target(), record.args());
        let _ = self.write_line(line.as_bytes());
    }

    fn flush(&self) {
        let mut route = self.route.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = match route.as_mut() {
            Some(route) => route.writer.flush(),
            None => io::stderr().flush(),
        };
    }
}

/// Handle onto the process-wide bridge
pub struct LegacyLogRoute;

impl LegacyLogTarget for LegacyLogRoute {
    fn redirect(&self, owner: Uuid, writer: Box<dyn Write + Send>) -> bool {
        let mut route = BRIDGE.route.lock().unwrap_or_else(PoisonError::into_inner);
        if route.is_some() {
            return false;
        }
        *route = Some(Route { owner, writer });
        true
    }

    fn restore(&self, owner: Uuid) {
        let mut route = BRIDGE.route.lock().unwrap_or_else(PoisonError::into_inner);
        if route.as_ref().map(|r| r.owner) == Some(owner) {
            // Dropping the writer closes its pipe write end
            *route = None;
        }
    }
}

/// Install the bridge as the `log` backend
///
/// Returns `None` when another backend was installed first; legacy output
/// then simply stays wherever that backend sends it.
pub fn install() -> Option<Arc<dyn LegacyLogTarget>> {
    static INSTALLED: OnceLock<bool> = OnceLock::new();

    let installed = *INSTALLED.get_or_init(|| match log::set_logger(&BRIDGE) {
        Ok(()) => {
            log::set_max_level(LEGACY_MAX_LEVEL);
            true
        }
        Err(e) => {
            warn!(error = %e, "Another log backend is installed, legacy log output is not captured");
            false
        }
    });

    installed.then(|| Arc::new(LegacyLogRoute) as Arc<dyn LegacyLogTarget>)
}
