// Listener Stop Signal

use tokio::sync::watch;

/// Stop signal observed by the stream listeners alongside end-of-stream
#[derive(Clone)]
pub struct StopToken {
    rx: watch::Receiver<bool>,
}

impl StopToken {
    /// Check if stop was requested; a dropped sender counts as stop
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }
}

/// Stop sender, owned by the logger handle
pub struct StopSender {
    tx: watch::Sender<bool>,
}

impl StopSender {
    /// Signal stop to all listeners
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

/// Create a stop channel
pub fn stop_channel() -> (StopSender, StopToken) {
    let (tx, rx) = watch::channel(false);
    (StopSender { tx }, StopToken { rx })
}
