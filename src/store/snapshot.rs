//! Immutable key/value snapshots and the merge that builds them.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::client::environment::RemoteEnvironment;

/// Hierarchical key separator.
pub const KEY_DELIMITER: char = ':';

/// Store key carrying the environment version.
pub const VERSION_KEY: &str = "spring:cloud:config:client:version";

/// Store key carrying the environment state.
pub const STATE_KEY: &str = "spring:cloud:config:client:state";

/// Translates `a.b[0].c` into `a:b:0:c`.
pub fn normalize_key(key: &str) -> String {
    let mut normalized = String::with_capacity(key.len());
    for c in key.chars() {
        match c {
            '.' | '[' => normalized.push(KEY_DELIMITER),
            ']' => {}
            other => normalized.push(other),
        }
    }
    normalized
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    key: String,
    value: String,
}

/// A complete, immutable key space. Keys compare case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: BTreeMap<String, Entry>,
    loaded_at: Option<DateTime<Utc>>,
}

/// Key-level difference between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl SnapshotDiff {
    /// True when both snapshots hold the same content.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

impl Snapshot {
    /// Looks up a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&fold(key))
            .map(|entry| entry.value.as_str())
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the snapshot has no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// When the remote part of this snapshot was fetched, if it ever was.
    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    /// Keys and values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|entry| (entry.key.as_str(), entry.value.as_str()))
    }

    /// Distinct immediate child segments below `parent` (`None` for the root).
    pub fn child_keys(&self, parent: Option<&str>) -> Vec<String> {
        let prefix = parent.map(|p| format!("{}{}", fold(p), KEY_DELIMITER));
        let mut seen = BTreeSet::new();
        let mut children = Vec::new();

        for (folded, entry) in &self.entries {
            let start = match &prefix {
                Some(prefix) if folded.starts_with(prefix.as_str()) => prefix.len(),
                Some(_) => continue,
                None => 0,
            };

            let rest = &entry.key[start..];
            let segment = rest.split(KEY_DELIMITER).next().unwrap_or(rest);
            if seen.insert(fold(segment)) {
                children.push(segment.to_string());
            }
        }

        children
    }

    /// Compares the content of two snapshots.
    pub fn diff(&self, newer: &Snapshot) -> SnapshotDiff {
        let mut diff = SnapshotDiff::default();

        for (folded, entry) in &newer.entries {
            match self.entries.get(folded) {
                None => diff.added.push(entry.key.clone()),
                Some(old) if old.value != entry.value => diff.changed.push(entry.key.clone()),
                Some(_) => {}
            }
        }

        for (folded, entry) in &self.entries {
            if !newer.entries.contains_key(folded) {
                diff.removed.push(entry.key.clone());
            }
        }

        diff
    }
}

/// Builds a snapshot off to the side before it is published.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    snapshot: Snapshot,
}

impl SnapshotBuilder {
    /// Starts an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges an environment: earlier property sources win on collisions.
    ///
    /// Also records the environment's version and state under
    /// [`VERSION_KEY`] and [`STATE_KEY`].
    pub fn merge_environment(mut self, environment: &RemoteEnvironment) -> Self {
        for source in &environment.property_sources {
            for (key, value) in &source.source {
                self.insert_if_absent(&normalize_key(key), value);
            }
        }

        if let Some(version) = environment.version.as_deref().filter(|v| !v.is_empty()) {
            self.set(VERSION_KEY, version);
        }
        if let Some(state) = environment.state.as_deref().filter(|s| !s.is_empty()) {
            self.set(STATE_KEY, state);
        }

        self.snapshot.loaded_at = Some(Utc::now());
        self
    }

    /// Sets every pair, overwriting existing keys.
    pub fn set_all<I>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in pairs {
            self.set(&key, &value);
        }
        self
    }

    /// Carries over the fetch time of an earlier snapshot.
    pub fn loaded_at(mut self, loaded_at: Option<DateTime<Utc>>) -> Self {
        self.snapshot.loaded_at = loaded_at;
        self
    }

    /// Finishes the snapshot.
    pub fn build(self) -> Snapshot {
        self.snapshot
    }

    fn insert_if_absent(&mut self, key: &str, value: &str) {
        self.snapshot
            .entries
            .entry(fold(key))
            .or_insert_with(|| Entry {
                key: key.to_string(),
                value: value.to_string(),
            });
    }

    fn set(&mut self, key: &str, value: &str) {
        self.snapshot.entries.insert(
            fold(key),
            Entry {
                key: key.to_string(),
                value: value.to_string(),
            },
        );
    }
}

fn fold(key: &str) -> String {
    key.to_ascii_lowercase()
}
