//! Live, read-mostly mirror of one configuration namespace.
//!
//! [`ConfigMirror::open`] subscribes to the namespace's change feed, waits
//! until the store has replayed the current state, and from then on keeps a
//! local [`SnapshotCache`] up to date from a background consumer task.
//! Reads never touch the store.
//!
//! ```text
//!   KvStore::watch("<ns>.>")
//!            |
//!            v
//!   Reconciler (tokio task) --apply--> SnapshotCache <--get-- callers
//!            |
//!            +--dispatch--> ListenerRegistry --> listeners
//! ```

mod listener;
mod reconciler;
mod snapshot;

pub use listener::*;
pub use reconciler::MirrorState;
pub use snapshot::*;

#[cfg(test)]
mod listener_test;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use self::reconciler::Reconciler;
use self::reconciler::StateCell;
use crate::ConfigSchema;
use crate::ConfigValue;
use crate::Error;
use crate::KeyPathCodec;
use crate::KvStore;
use crate::MirrorConfig;
use crate::Result;
use crate::SchemaError;
use crate::StoreError;

/// Handle on an open namespace mirror.
///
/// Dropping the handle stops the feed consumer; [`ConfigMirror::close`]
/// does the same and also waits for it to finish.
pub struct ConfigMirror {
    codec: KeyPathCodec,
    schema: Arc<ConfigSchema>,
    cache: Arc<SnapshotCache>,
    listeners: Arc<ListenerRegistry>,
    state: Arc<StateCell>,
    shutdown: CancellationToken,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ConfigMirror {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ConfigMirror")
            .field("namespace", &self.codec.namespace())
            .field("state", &self.state.load())
            .field("keys", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl ConfigMirror {
    /// Opens a mirror on `namespace` and resolves once the store's replay of
    /// the current state has been applied.
    ///
    /// # Errors
    /// - [`StoreError::NamespaceNotFound`] if the namespace is not provisioned
    /// - [`StoreError::FeedEnded`] or the store's error if the feed stops before catching up
    /// - [`Error::OpenTimeout`] if catch-up takes longer than `config.open_timeout_ms`
    pub async fn open(
        store: &dyn KvStore,
        namespace: &str,
        schema: Arc<ConfigSchema>,
        config: &MirrorConfig,
    ) -> Result<Self> {
        let codec = KeyPathCodec::new(namespace)?;

        if !store.namespace_exists(namespace).await? {
            return Err(StoreError::NamespaceNotFound(namespace.to_string()).into());
        }
        let feed = store.watch(&codec.watch_pattern()).await?;

        let cache = Arc::new(SnapshotCache::new());
        let listeners = Arc::new(ListenerRegistry::new(namespace));
        let state = Arc::new(StateCell::new(namespace));
        let shutdown = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();

        let reconciler = Reconciler {
            codec: codec.clone(),
            schema: schema.clone(),
            cache: cache.clone(),
            listeners: listeners.clone(),
            state: state.clone(),
            shutdown: shutdown.clone(),
        };
        let consumer = tokio::spawn(reconciler.run(feed, ready_tx));

        let mirror = Self {
            codec,
            schema,
            cache,
            listeners,
            state,
            shutdown,
            consumer: Mutex::new(Some(consumer)),
        };

        let ready = match config.open_timeout() {
            Some(limit) => match tokio::time::timeout(limit, ready_rx).await {
                Ok(ready) => ready,
                Err(_) => {
                    warn!(namespace, ?limit, "Mirror did not catch up in time");
                    return Err(Error::OpenTimeout {
                        namespace: namespace.to_string(),
                        duration: limit,
                    });
                }
            },
            None => ready_rx.await,
        };

        match ready {
            Ok(Ok(())) => {
                info!(namespace, keys = mirror.cache.len(), "Mirror open");
                Ok(mirror)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Fatal(format!(
                "feed consumer for namespace {namespace} stopped before catching up"
            ))),
        }
    }

    pub fn namespace(&self) -> &str {
        self.codec.namespace()
    }

    pub fn schema(&self) -> &ConfigSchema {
        &self.schema
    }

    pub fn state(&self) -> MirrorState {
        self.state.load()
    }

    /// Current value of a leaf. `None` if it was never set or was deleted.
    ///
    /// Fails with [`SchemaError::UnknownPath`] if `path` is not a leaf of the
    /// schema, and with [`Error::Closed`] once the mirror is closed.
    pub fn get(
        &self,
        path: &str,
    ) -> Result<Option<ConfigValue>> {
        self.ensure_readable(path)?;
        Ok(self.cache.value(path))
    }

    /// Typed variant of [`ConfigMirror::get`].
    pub fn get_as<T>(
        &self,
        path: &str,
    ) -> Result<Option<T>>
    where
        T: TryFrom<ConfigValue, Error = SchemaError>,
    {
        let value = self.get(path)?;
        let typed = value.map(T::try_from).transpose().map_err(|e| match e {
            SchemaError::TypeMismatch { expected, actual, .. } => SchemaError::TypeMismatch {
                path: path.to_string(),
                expected,
                actual,
            },
            other => other,
        })?;
        Ok(typed)
    }

    /// Cached entry with its revision, tombstones included
    pub fn entry(
        &self,
        path: &str,
    ) -> Result<Option<SnapshotEntry>> {
        self.ensure_readable(path)?;
        Ok(self.cache.entry(path))
    }

    /// Point-in-time copy of every set leaf
    pub fn snapshot(&self) -> Result<BTreeMap<String, ConfigValue>> {
        self.ensure_open()?;
        Ok(self.cache.values())
    }

    /// Registers `handle` on `path` and returns the value current at
    /// registration time. Every later accepted change of the path is
    /// delivered to the handle.
    pub fn add_listener(
        &self,
        path: &str,
        handle: &ListenerHandle,
    ) -> Result<Option<ConfigValue>> {
        self.ensure_readable(path)?;
        if !self.listeners.add(path, handle) {
            debug!(
                namespace = self.namespace(),
                path,
                listener_id = handle.id(),
                "Listener already registered"
            );
        }
        Ok(self.cache.value(path))
    }

    /// Unregisters `handle` from `path`. Returns false if it was not
    /// registered.
    pub fn remove_listener(
        &self,
        path: &str,
        handle: &ListenerHandle,
    ) -> Result<bool> {
        self.ensure_readable(path)?;
        Ok(self.listeners.remove(path, handle))
    }

    /// Stops the feed consumer and waits for it to exit. Idempotent.
    ///
    /// Entries received after this call are discarded and no listener is
    /// invoked.
    pub async fn close(&self) {
        let previous = self.state.close();
        self.shutdown.cancel();

        let consumer = self.consumer.lock().take();
        if let Some(handle) = consumer {
            if let Err(e) = handle.await {
                warn!(namespace = self.namespace(), "Feed consumer aborted: {}", e);
            }
        }

        self.cache.clear();
        self.listeners.clear();

        if previous != MirrorState::Closed {
            info!(namespace = self.namespace(), "Mirror closed");
        }
    }

    /// Open and `path` names a schema leaf
    fn ensure_readable(
        &self,
        path: &str,
    ) -> Result<()> {
        self.ensure_open()?;
        self.schema.kind_of(path)?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state.load() {
            MirrorState::Open => Ok(()),
            MirrorState::Connecting | MirrorState::Closed => Err(Error::Closed {
                namespace: self.namespace().to_string(),
            }),
        }
    }
}

impl Drop for ConfigMirror {
    fn drop(&mut self) {
        self.state.close();
        self.shutdown.cancel();
    }
}
