//! Change feed consumer.
//!
//! One reconciler task runs per open mirror and is the only writer of the
//! mirror's snapshot cache. It drains the feed strictly in delivery order
//! and applies an entry only if it advances that key's revision, which makes
//! re-delivered and reordered entries harmless.
//!
//! ```text
//! feed.next() -> decode (key -> path, payload -> value, schema check)
//!                  | failure: warn + skip
//!                  v
//!             cache.apply(revision gate)
//!                  | stale: discard
//!                  v
//!             listeners.dispatch(ChangeEvent)
//! ```

use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::ChangeEvent;
use super::ListenerRegistry;
use super::SnapshotCache;
use crate::codec;
use crate::metrics::FEED_DECODE_FAILURES;
use crate::metrics::FEED_ENTRIES_APPLIED;
use crate::metrics::FEED_ENTRIES_DISCARDED;
use crate::metrics::OPEN_MIRRORS;
use crate::ConfigSchema;
use crate::ConfigValue;
use crate::DecodeError;
use crate::Feed;
use crate::FeedEntry;
use crate::FeedMessage;
use crate::KeyPathCodec;
use crate::Result;
use crate::StoreError;

/// Lifecycle of a mirror: `Connecting -> Open -> Closed`. Closed is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    Connecting,
    Open,
    Closed,
}

impl MirrorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => MirrorState::Connecting,
            1 => MirrorState::Open,
            _ => MirrorState::Closed,
        }
    }
}

/// Atomic holder of a [`MirrorState`] shared by the mirror and its consumer
#[derive(Debug)]
pub(crate) struct StateCell {
    namespace: String,
    state: AtomicU8,
}

impl StateCell {
    pub(crate) fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            state: AtomicU8::new(MirrorState::Connecting as u8),
        }
    }

    pub(crate) fn load(&self) -> MirrorState {
        MirrorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Connecting -> Open`. Fails if the mirror was closed meanwhile.
    pub(crate) fn try_open(&self) -> bool {
        let opened = self
            .state
            .compare_exchange(
                MirrorState::Connecting as u8,
                MirrorState::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if opened {
            OPEN_MIRRORS.with_label_values(&[&self.namespace]).inc();
        }
        opened
    }

    /// Moves to `Closed` and returns the previous state.
    pub(crate) fn close(&self) -> MirrorState {
        let previous = MirrorState::from_u8(self.state.swap(MirrorState::Closed as u8, Ordering::AcqRel));
        if previous == MirrorState::Open {
            OPEN_MIRRORS.with_label_values(&[&self.namespace]).dec();
        }
        previous
    }
}

pub(crate) struct Reconciler {
    pub(crate) codec: KeyPathCodec,
    pub(crate) schema: Arc<ConfigSchema>,
    pub(crate) cache: Arc<SnapshotCache>,
    pub(crate) listeners: Arc<ListenerRegistry>,
    pub(crate) state: Arc<StateCell>,
    pub(crate) shutdown: CancellationToken,
}

impl Reconciler {
    /// Drains `feed` until it ends, fails or the mirror is closed.
    ///
    /// `ready_tx` resolves once: `Ok` on the caught-up marker, or with the
    /// error that ended the feed before replay completed.
    pub(crate) async fn run(
        self,
        mut feed: Feed,
        ready_tx: oneshot::Sender<Result<()>>,
    ) {
        let namespace = self.codec.namespace().to_string();
        let mut ready_tx = Some(ready_tx);
        debug!(namespace, "Feed consumer started");

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!(namespace, "Feed consumer received shutdown signal");
                    break;
                }
                next = feed.next() => next,
            };

            // Close may land while an item was being received; drop it.
            if self.shutdown.is_cancelled() {
                debug!(namespace, "Discarding in-flight feed item after close");
                break;
            }

            match next {
                Some(Ok(FeedMessage::Entry(entry))) => {
                    self.ingest(entry);
                }
                Some(Ok(FeedMessage::CaughtUp)) => match ready_tx.take() {
                    Some(tx) => {
                        if self.state.try_open() {
                            info!(namespace, keys = self.cache.len(), "Mirror caught up");
                        }
                        if tx.send(Ok(())).is_err() {
                            debug!(namespace, "Open caller went away before catch-up");
                            break;
                        }
                    }
                    None => {
                        warn!(namespace, "Duplicate caught-up signal ignored");
                    }
                },
                Some(Err(e)) => {
                    match ready_tx.take() {
                        Some(tx) => {
                            warn!(namespace, error = %e, "Feed failed during replay");
                            let _ = tx.send(Err(e.into()));
                        }
                        None => {
                            error!(namespace, error = %e, "Feed failed, closing mirror");
                        }
                    }
                    break;
                }
                None => {
                    match ready_tx.take() {
                        Some(tx) => {
                            let e = StoreError::FeedEnded {
                                namespace: namespace.clone(),
                            };
                            warn!(namespace, "Feed ended during replay");
                            let _ = tx.send(Err(e.into()));
                        }
                        None => {
                            warn!(namespace, "Feed ended, closing mirror");
                        }
                    }
                    break;
                }
            }
        }

        self.teardown();
        debug!(namespace, "Feed consumer stopped");
    }

    /// Applies one feed entry. Returns the change if it was accepted.
    pub(crate) fn ingest(
        &self,
        entry: FeedEntry,
    ) -> Option<ChangeEvent> {
        let namespace = self.codec.namespace();

        let (path, value) = match self.decode(&entry) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(
                    namespace,
                    key = %entry.key,
                    revision = entry.revision,
                    error = %e,
                    "Skipping undecodable feed entry"
                );
                FEED_DECODE_FAILURES.with_label_values(&[namespace]).inc();
                return None;
            }
        };

        match self.cache.apply(&path, value, entry.revision, entry.created_at) {
            Some(event) => {
                FEED_ENTRIES_APPLIED.with_label_values(&[namespace]).inc();
                let notified = self.listeners.dispatch(&event);
                trace!(
                    namespace,
                    path = %event.path,
                    revision = event.revision,
                    notified,
                    "Feed entry applied"
                );
                Some(event)
            }
            None => {
                debug!(
                    namespace,
                    path = %path,
                    revision = entry.revision,
                    "Discarding stale feed entry"
                );
                FEED_ENTRIES_DISCARDED.with_label_values(&[namespace]).inc();
                None
            }
        }
    }

    fn decode(
        &self,
        entry: &FeedEntry,
    ) -> std::result::Result<(String, Option<ConfigValue>), DecodeError> {
        let path = self
            .codec
            .to_path(&entry.key)
            .ok_or_else(|| DecodeError::ForeignKey {
                namespace: self.codec.namespace().to_string(),
                key: entry.key.clone(),
            })?;

        let value = codec::decode_payload(&entry.key, entry.operation, &entry.payload)?;

        self.schema
            .validate_value(path, value.as_ref())
            .map_err(|source| DecodeError::Schema {
                key: entry.key.clone(),
                source,
            })?;

        Ok((path.to_string(), value))
    }

    fn teardown(&self) {
        self.state.close();
        self.cache.clear();
        self.listeners.clear();
    }
}
