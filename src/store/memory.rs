//! In-process implementation of the store collaborator contract.
//!
//! All namespaces live behind one `RwLock`. Publishing a revision and
//! fanning it out to watchers happen under the same write lock, and a new
//! watch takes its replay snapshot and registers its sender under that lock
//! too, so a subscriber never misses or double-receives an entry at the
//! replay/live boundary.
//!
//! Watch feeds are bounded. A watcher whose buffer is full when a revision
//! is published is dropped, which ends its feed; the consumer sees the feed
//! end rather than a silent gap.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::Feed;
use super::FeedEntry;
use super::FeedItem;
use super::FeedMessage;
use super::HistoryStream;
use super::KvStore;
use super::NamespaceOptions;
use super::Operation;
use crate::key_path;
use crate::utils::time::now_millis;
use crate::KeyPathCodec;
use crate::StoreError;
use crate::DEFAULT_WATCH_BUFFER;

/// Shared in-memory key-value store.
///
/// Clones share the same data. [`MemoryKvStore::read_only`] hands out a
/// handle without publish rights.
#[derive(Debug, Clone)]
pub struct MemoryKvStore {
    inner: Arc<MemoryInner>,
    can_publish: bool,
    watch_buffer: usize,
}

#[derive(Debug, Default)]
struct MemoryInner {
    namespaces: RwLock<HashMap<String, NamespaceState>>,
    /// Store-wide creation order
    sequence: AtomicU64,
    next_watcher_id: AtomicU64,
}

#[derive(Debug)]
struct NamespaceState {
    options: NamespaceOptions,
    keys: HashMap<String, KeyState>,
    watchers: Vec<Watcher>,
}

#[derive(Debug, Default)]
struct KeyState {
    revision: u64,
    revisions: VecDeque<StoredRevision>,
}

#[derive(Debug, Clone)]
struct StoredRevision {
    entry: FeedEntry,
    sequence: u64,
}

#[derive(Debug)]
struct Watcher {
    id: u64,
    pattern: String,
    sender: mpsc::Sender<FeedItem>,
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::with_watch_buffer(DEFAULT_WATCH_BUFFER)
    }

    /// Store whose live watch feeds buffer at most `watch_buffer` items.
    ///
    /// The replay of a new watch always fits, whatever its size.
    pub fn with_watch_buffer(watch_buffer: usize) -> Self {
        Self {
            inner: Arc::new(MemoryInner::default()),
            can_publish: true,
            watch_buffer: watch_buffer.max(1),
        }
    }

    /// Handle on the same data whose credential lacks publish rights
    pub fn read_only(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            can_publish: false,
            watch_buffer: self.watch_buffer,
        }
    }

    /// Number of live watch subscriptions on a namespace
    pub fn watcher_count(
        &self,
        namespace: &str,
    ) -> usize {
        self.inner
            .namespaces
            .read()
            .get(namespace)
            .map(|ns| ns.watchers.iter().filter(|w| !w.sender.is_closed()).count())
            .unwrap_or(0)
    }

    pub fn options(
        &self,
        namespace: &str,
    ) -> Option<NamespaceOptions> {
        self.inner.namespaces.read().get(namespace).map(|ns| ns.options)
    }

    fn require_publish(
        &self,
        namespace: &str,
        operation: &'static str,
    ) -> Result<(), StoreError> {
        if !self.can_publish {
            return Err(StoreError::Authorization {
                namespace: namespace.to_string(),
                operation,
            });
        }
        Ok(())
    }

    fn append(
        &self,
        key: &str,
        operation: Operation,
        payload: Bytes,
    ) -> Result<u64, StoreError> {
        let namespace = namespace_of_key(key)?;
        self.require_publish(namespace, operation_name(operation))?;

        let mut namespaces = self.inner.namespaces.write();
        let state = namespaces
            .get_mut(namespace)
            .ok_or_else(|| StoreError::NamespaceNotFound(namespace.to_string()))?;

        let key_state = state.keys.entry(key.to_string()).or_default();
        key_state.revision += 1;
        let entry = FeedEntry {
            key: key.to_string(),
            operation,
            payload,
            revision: key_state.revision,
            created_at: now_millis(),
        };
        key_state.revisions.push_back(StoredRevision {
            entry: entry.clone(),
            sequence: self.inner.sequence.fetch_add(1, Ordering::SeqCst),
        });
        retain_history(key_state, &state.options, entry.created_at);

        trace!(key, revision = entry.revision, ?operation, "Revision committed");

        state.watchers.retain(|watcher| {
            if watcher.sender.is_closed() {
                return false;
            }
            if !key_path::pattern_matches(&watcher.pattern, key) {
                return true;
            }
            match watcher.sender.try_send(Ok(FeedMessage::Entry(entry.clone()))) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        watcher_id = watcher.id,
                        pattern = %watcher.pattern,
                        "Watcher fell behind, closing its feed"
                    );
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            }
        });

        Ok(entry.revision)
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn provision(
        &self,
        namespace: &str,
        options: NamespaceOptions,
    ) -> Result<(), StoreError> {
        key_path::validate_namespace(namespace)
            .map_err(|_| StoreError::InvalidPattern(namespace.to_string()))?;
        self.require_publish(namespace, "provision")?;

        let mut namespaces = self.inner.namespaces.write();
        match namespaces.get_mut(namespace) {
            Some(state) => {
                debug!(namespace, ?options, "Resetting namespace options");
                state.options = options;
                let now = now_millis();
                for key_state in state.keys.values_mut() {
                    retain_history(key_state, &options, now);
                }
            }
            None => {
                debug!(namespace, ?options, "Provisioning namespace");
                namespaces.insert(
                    namespace.to_string(),
                    NamespaceState {
                        options,
                        keys: HashMap::new(),
                        watchers: Vec::new(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn namespace_exists(
        &self,
        namespace: &str,
    ) -> Result<bool, StoreError> {
        Ok(self.inner.namespaces.read().contains_key(namespace))
    }

    async fn put(
        &self,
        key: &str,
        payload: Bytes,
    ) -> Result<u64, StoreError> {
        self.append(key, Operation::Put, payload)
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<u64, StoreError> {
        self.append(key, Operation::Delete, Bytes::new())
    }

    async fn watch(
        &self,
        pattern: &str,
    ) -> Result<Feed, StoreError> {
        // Only namespace-wide patterns are served.
        let namespace = KeyPathCodec::namespace_of_pattern(pattern)
            .ok_or_else(|| StoreError::InvalidPattern(pattern.to_string()))?;

        let mut namespaces = self.inner.namespaces.write();
        let state = namespaces
            .get_mut(namespace)
            .ok_or_else(|| StoreError::NamespaceNotFound(namespace.to_string()))?;

        let mut replay: Vec<&StoredRevision> = state
            .keys
            .iter()
            .filter(|(key, _)| key_path::pattern_matches(pattern, key))
            .filter_map(|(_, key_state)| key_state.revisions.back())
            .collect();
        replay.sort_by_key(|r| r.sequence);

        let (sender, receiver) = mpsc::channel(self.watch_buffer.max(replay.len() + 1));
        for revision in &replay {
            // Capacity covers the replay and the receiver is held locally.
            let _ = sender.try_send(Ok(FeedMessage::Entry(revision.entry.clone())));
        }
        let _ = sender.try_send(Ok(FeedMessage::CaughtUp));

        let id = self.inner.next_watcher_id.fetch_add(1, Ordering::Relaxed);
        debug!(
            watcher_id = id,
            pattern,
            replayed = replay.len(),
            "Watch registered"
        );
        state.watchers.push(Watcher {
            id,
            pattern: pattern.to_string(),
            sender,
        });

        Ok(Box::pin(ReceiverStream::new(receiver)))
    }

    /// Delivers revisions newest first.
    async fn history(
        &self,
        key: &str,
    ) -> Result<HistoryStream, StoreError> {
        let namespace = namespace_of_key(key)?;
        let namespaces = self.inner.namespaces.read();
        let state = namespaces
            .get(namespace)
            .ok_or_else(|| StoreError::NamespaceNotFound(namespace.to_string()))?;

        let entries: Vec<Result<FeedEntry, StoreError>> = state
            .keys
            .get(key)
            .map(|key_state| {
                key_state
                    .revisions
                    .iter()
                    .rev()
                    .map(|r| Ok(r.entry.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Box::pin(futures::stream::iter(entries)))
    }

    async fn destroy(
        &self,
        namespace: &str,
    ) -> Result<(), StoreError> {
        self.require_publish(namespace, "destroy")?;

        let removed = self.inner.namespaces.write().remove(namespace);
        match removed {
            Some(state) => {
                debug!(
                    namespace,
                    keys = state.keys.len(),
                    watchers = state.watchers.len(),
                    "Namespace destroyed"
                );
                // Dropping the senders ends every feed on the namespace.
                for watcher in state.watchers {
                    trace!(watcher_id = watcher.id, "Closing watch feed");
                }
                Ok(())
            }
            None => Err(StoreError::NamespaceNotFound(namespace.to_string())),
        }
    }
}

fn namespace_of_key(key: &str) -> Result<&str, StoreError> {
    match key.split_once(key_path::PATH_SEPARATOR) {
        Some((namespace, rest)) if !namespace.is_empty() && !rest.is_empty() => Ok(namespace),
        _ => Err(StoreError::InvalidPattern(key.to_string())),
    }
}

fn operation_name(operation: Operation) -> &'static str {
    match operation {
        Operation::Put => "put",
        Operation::Delete => "delete",
    }
}

/// Drops revisions beyond the namespace's history depth or maximum age.
/// The latest revision is always kept.
fn retain_history(
    key_state: &mut KeyState,
    options: &NamespaceOptions,
    now: u64,
) {
    let depth = options.history.max(1) as usize;
    while key_state.revisions.len() > depth {
        key_state.revisions.pop_front();
    }

    if options.max_age_secs > 0 {
        let max_age_ms = options.max_age_secs.saturating_mul(1000);
        while key_state.revisions.len() > 1 {
            match key_state.revisions.front() {
                Some(oldest) if now.saturating_sub(oldest.entry.created_at) > max_age_ms => {
                    key_state.revisions.pop_front();
                }
                _ => break,
            }
        }
    }
}
