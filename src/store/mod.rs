//! Concurrently readable configuration store.
//!
//! Readers load the current [`Snapshot`] through an `ArcSwap` and never block.
//! Writers build a complete snapshot off to the side and publish it in one
//! pointer swap, so a reader sees either the old key set or the new one.

pub mod change_token;
pub mod snapshot;

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tracing::debug;

pub use change_token::ChangeToken;
pub use snapshot::{normalize_key, Snapshot, SnapshotBuilder, SnapshotDiff};

/// The published snapshot plus its change token.
pub struct ConfigurationStore {
    current: ArcSwap<Snapshot>,
    token: ArcSwap<ChangeToken>,
    writer: Mutex<()>,
}

impl ConfigurationStore {
    /// Creates a store holding `initial`.
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            token: ArcSwap::from_pointee(ChangeToken::new()),
            writer: Mutex::new(()),
        }
    }

    /// The current snapshot. Holding it pins that version.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Reads one key from the current snapshot.
    pub fn try_get(&self, key: &str) -> Option<String> {
        self.current.load().get(key).map(str::to_string)
    }

    /// Immediate children of `parent` in the current snapshot.
    pub fn child_keys(&self, parent: Option<&str>) -> Vec<String> {
        self.current.load().child_keys(parent)
    }

    /// The token that fires when the current snapshot is replaced.
    pub fn reload_token(&self) -> Arc<ChangeToken> {
        self.token.load_full()
    }

    /// Publishes `next` if its content differs from the current snapshot.
    ///
    /// Fires the outstanding change token exactly once when it does.
    pub fn replace(&self, next: Snapshot) -> SnapshotDiff {
        self.update(|_| next)
    }

    /// Builds the next snapshot from the current one and publishes it.
    ///
    /// Writers are serialized; readers are never blocked.
    pub fn update(&self, build: impl FnOnce(&Snapshot) -> Snapshot) -> SnapshotDiff {
        let _writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let current = self.current.load_full();
        let next = build(&current);
        let diff = current.diff(&next);
        if diff.is_empty() {
            return diff;
        }

        debug!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            changed = diff.changed.len(),
            "Publishing configuration snapshot"
        );

        self.current.store(Arc::new(next));
        let fired = self.token.swap(Arc::new(ChangeToken::new()));
        fired.signal();

        diff
    }
}

impl Default for ConfigurationStore {
    fn default() -> Self {
        Self::new(Snapshot::default())
    }
}
