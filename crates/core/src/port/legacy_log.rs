// Legacy Log Port - unstructured logging facility funneled into the stderr pipe

use std::io::Write;
use uuid::Uuid;

/// Process-wide unstructured logging facility whose destination can be swapped
pub trait LegacyLogTarget: Send + Sync {
    /// Send all legacy output to `writer` on behalf of the handle `owner`
    ///
    /// Returns false, dropping `writer`, while another owner holds the
    /// redirection.
    fn redirect(&self, owner: Uuid, writer: Box<dyn Write + Send>) -> bool;

    /// Return to the default destination (the process stderr) if `owner`
    /// still holds the redirection
    fn restore(&self, owner: Uuid);
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Records redirect/restore calls
    #[derive(Default)]
    pub struct MockLegacyLog {
        owner: Mutex<Option<Uuid>>,
        redirects: Mutex<usize>,
        restores: Mutex<usize>,
    }

    impl MockLegacyLog {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn owner(&self) -> Option<Uuid> {
            *self.owner.lock().unwrap()
        }

        pub fn redirect_count(&self) -> usize {
            *self.redirects.lock().unwrap()
        }

        pub fn restore_count(&self) -> usize {
            *self.restores.lock().unwrap()
        }
    }

    impl LegacyLogTarget for MockLegacyLog {
        fn redirect(&self, owner: Uuid, _writer: Box<dyn Write + Send>) -> bool {
            let mut current = self.owner.lock().unwrap();
            if current.is_some() {
                return false;
            }
            *current = Some(owner);
            *self.redirects.lock().unwrap() += 1;
            true
        }

        fn restore(&self, owner: Uuid) {
            let mut current = self.owner.lock().unwrap();
            if *current == Some(owner) {
                *current = None;
            }
            *self.restores.lock().unwrap() += 1;
        }
    }
}
