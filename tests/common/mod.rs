#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use live_config::codec;
use live_config::ChangeEvent;
use live_config::ConfigSchema;
use live_config::ConfigValue;
use live_config::Feed;
use live_config::FeedEntry;
use live_config::FeedItem;
use live_config::FeedMessage;
use live_config::HistoryStream;
use live_config::KvStore;
use live_config::ListenerHandle;
use live_config::MemoryKvStore;
use live_config::NamespaceOptions;
use live_config::Operation;
use live_config::StoreError;
use live_config::ValueKind;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(2);

/// `service.name`, `service.port`, `service.enabled`, `service.hosts`,
/// `tuning.weights`
pub fn service_schema() -> Arc<ConfigSchema> {
    Arc::new(
        ConfigSchema::builder()
            .group("service", |g| {
                g.leaf("name", ValueKind::String)
                    .leaf("port", ValueKind::Number)
                    .leaf("enabled", ValueKind::Boolean)
                    .leaf("hosts", ValueKind::StringArray)
            })
            .group("tuning", |g| g.leaf("weights", ValueKind::NumberArray))
            .build()
            .expect("schema should build"),
    )
}

pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Listener forwarding every event to the returned receiver
pub fn recording_listener() -> (ListenerHandle, mpsc::UnboundedReceiver<ChangeEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ListenerHandle::from_fn(move |event| {
        let _ = tx.send(event.clone());
        Ok(())
    });
    (handle, rx)
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChangeEvent>) -> ChangeEvent {
    tokio::time::timeout(WAIT_TIMEOUT, rx.recv())
        .await
        .expect("timeout waiting for change event")
        .expect("listener channel closed")
}

pub fn put_entry(
    namespace: &str,
    path: &str,
    revision: u64,
    value: impl Into<ConfigValue>,
) -> FeedItem {
    let payload = codec::encode_value(&value.into()).expect("value should encode");
    Ok(FeedMessage::Entry(FeedEntry {
        key: format!("{namespace}.{path}"),
        operation: Operation::Put,
        payload,
        revision,
        created_at: revision,
    }))
}

pub fn delete_entry(
    namespace: &str,
    path: &str,
    revision: u64,
) -> FeedItem {
    Ok(FeedMessage::Entry(FeedEntry {
        key: format!("{namespace}.{path}"),
        operation: Operation::Delete,
        payload: Bytes::new(),
        revision,
        created_at: revision,
    }))
}

/// Store whose watch feed is scripted by the test, for delivery orders a
/// well-behaved store never produces. Every other call goes to an inner
/// [`MemoryKvStore`].
pub struct ScriptedStore {
    inner: MemoryKvStore,
    feed: Mutex<Option<Feed>>,
}

impl ScriptedStore {
    /// Returns the store and the sender driving its single watch feed.
    pub async fn new(namespace: &str) -> (Self, mpsc::UnboundedSender<FeedItem>) {
        let inner = MemoryKvStore::new();
        inner
            .provision(namespace, NamespaceOptions::default())
            .await
            .expect("provision should succeed");
        let (tx, rx) = mpsc::unbounded_channel();
        let feed: Feed = Box::pin(UnboundedReceiverStream::new(rx));
        (
            Self {
                inner,
                feed: Mutex::new(Some(feed)),
            },
            tx,
        )
    }
}

#[async_trait]
impl KvStore for ScriptedStore {
    async fn provision(
        &self,
        namespace: &str,
        options: NamespaceOptions,
    ) -> Result<(), StoreError> {
        self.inner.provision(namespace, options).await
    }

    async fn namespace_exists(
        &self,
        namespace: &str,
    ) -> Result<bool, StoreError> {
        self.inner.namespace_exists(namespace).await
    }

    async fn put(
        &self,
        key: &str,
        payload: Bytes,
    ) -> Result<u64, StoreError> {
        self.inner.put(key, payload).await
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<u64, StoreError> {
        self.inner.delete(key).await
    }

    async fn watch(
        &self,
        pattern: &str,
    ) -> Result<Feed, StoreError> {
        self.feed
            .lock()
            .take()
            .ok_or_else(|| StoreError::Backend(format!("feed for {pattern} already taken")))
    }

    async fn history(
        &self,
        key: &str,
    ) -> Result<HistoryStream, StoreError> {
        self.inner.history(key).await
    }

    async fn destroy(
        &self,
        namespace: &str,
    ) -> Result<(), StoreError> {
        self.inner.destroy(namespace).await
    }
}
