//! Local snapshot cache of a mirrored namespace.
//!
//! Written only by the feed consumer; read concurrently by any caller.
//! Entries live in a `DashMap`, so a reader always sees either the previous
//! or the new entry of a key, never a partial update.

use std::collections::BTreeMap;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;

use crate::utils::time::now_millis;
use crate::ConfigValue;

/// Cached state of one key
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub path: String,
    /// `None` once the key has been deleted
    pub value: Option<ConfigValue>,
    pub revision: u64,
    /// Local time the entry was applied, in milliseconds since the epoch
    pub observed_at: u64,
}

/// Notification of an accepted change
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub path: String,
    pub old_value: Option<ConfigValue>,
    pub new_value: Option<ConfigValue>,
    pub revision: u64,
    /// Store creation time of the accepted revision
    pub timestamp: u64,
}

#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: DashMap<String, SnapshotEntry>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a revision if it advances the key.
    ///
    /// Returns the resulting change, or `None` when `revision` is not
    /// greater than the cached revision. Deletes are kept as tombstones so
    /// an older, late-delivered put cannot resurrect the key.
    pub fn apply(
        &self,
        path: &str,
        value: Option<ConfigValue>,
        revision: u64,
        timestamp: u64,
    ) -> Option<ChangeEvent> {
        let observed_at = now_millis();

        let old_value = match self.entries.entry(path.to_string()) {
            Entry::Occupied(mut occupied) => {
                let cached = occupied.get_mut();
                if revision <= cached.revision {
                    trace!(
                        path,
                        revision,
                        cached_revision = cached.revision,
                        "Stale revision"
                    );
                    return None;
                }
                let old_value = cached.value.take();
                cached.value = value.clone();
                cached.revision = revision;
                cached.observed_at = observed_at;
                old_value
            }
            Entry::Vacant(vacant) => {
                vacant.insert(SnapshotEntry {
                    path: path.to_string(),
                    value: value.clone(),
                    revision,
                    observed_at,
                });
                None
            }
        };

        Some(ChangeEvent {
            path: path.to_string(),
            old_value,
            new_value: value,
            revision,
            timestamp,
        })
    }

    /// Current value, `None` if never set or deleted
    pub fn value(
        &self,
        path: &str,
    ) -> Option<ConfigValue> {
        self.entries.get(path).and_then(|e| e.value.clone())
    }

    pub fn entry(
        &self,
        path: &str,
    ) -> Option<SnapshotEntry> {
        self.entries.get(path).map(|e| e.value().clone())
    }

    pub fn revision(
        &self,
        path: &str,
    ) -> Option<u64> {
        self.entries.get(path).map(|e| e.revision)
    }

    /// Point-in-time copy of every live key
    pub fn values(&self) -> BTreeMap<String, ConfigValue> {
        self.entries
            .iter()
            .filter_map(|e| e.value.clone().map(|v| (e.key().clone(), v)))
            .collect()
    }

    /// Number of tracked keys, tombstones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
