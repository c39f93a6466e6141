//! One-shot change notification.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Fires once when the snapshot it was handed out for is replaced.
///
/// Consumers re-acquire a fresh token from the store after it fires.
#[derive(Debug, Default)]
pub struct ChangeToken {
    changed: AtomicBool,
    notify: Notify,
}

impl ChangeToken {
    /// Creates an unfired token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the snapshot has been replaced since this token was issued.
    pub fn has_changed(&self) -> bool {
        self.changed.load(Ordering::Acquire)
    }

    /// Waits until the token fires. Returns immediately if it already has.
    pub async fn changed(&self) {
        loop {
            let notified = self.notify.notified();
            if self.has_changed() {
                return;
            }
            notified.await;
        }
    }

    /// Fires the token. Later calls are no-ops.
    pub(crate) fn signal(&self) {
        if !self.changed.swap(true, Ordering::AcqRel) {
            self.notify.notify_waiters();
        }
    }
}
