//! Store collaborator contract
//!
//! The replicated key-value store is an external collaborator. This module
//! describes what the mirror and the writer require of it:
//! - per-key monotonic revisions assigned on every put and delete
//! - a replaying watch feed with a one-shot "caught up" marker
//! - per-key revision history
//! - namespace provisioning and destruction
//!
//! [`MemoryKvStore`] is an in-process implementation of the contract.

pub mod codec;
mod memory;

pub use memory::*;


use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;

use crate::StoreError;

/// Operation carried by a feed or history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Put,
    Delete,
}

/// One revision of one key, as published by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    /// Physical key (`<namespace>.<path>`)
    pub key: String,
    pub operation: Operation,
    /// Encoded value; empty for deletes
    pub payload: Bytes,
    /// Per-key revision, strictly increasing per key
    pub revision: u64,
    /// Creation time in milliseconds since the Unix epoch
    pub created_at: u64,
}

/// Item of a watch feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    Entry(FeedEntry),
    /// End of historical replay. Sent once per feed.
    CaughtUp,
}

pub type FeedItem = std::result::Result<FeedMessage, StoreError>;

/// Ordered change feed of a watch subscription
pub type Feed = Pin<Box<dyn Stream<Item = FeedItem> + Send>>;

/// Per-key revision history, in whatever order the store delivers it
pub type HistoryStream = Pin<Box<dyn Stream<Item = std::result::Result<FeedEntry, StoreError>> + Send>>;

/// Store-level namespace options. Opaque to the reconciliation core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceOptions {
    /// Revisions retained per key
    pub history: u32,
    /// Replication factor
    pub replicas: u32,
    /// Maximum age of a revision in seconds, 0 keeps revisions forever
    pub max_age_secs: u64,
}

impl Default for NamespaceOptions {
    fn default() -> Self {
        Self {
            history: crate::DEFAULT_HISTORY_DEPTH,
            replicas: 1,
            max_age_secs: 0,
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Creates the namespace, or resets its options if it already exists.
    /// Existing keys are kept.
    async fn provision(
        &self,
        namespace: &str,
        options: NamespaceOptions,
    ) -> std::result::Result<(), StoreError>;

    async fn namespace_exists(
        &self,
        namespace: &str,
    ) -> std::result::Result<bool, StoreError>;

    /// Commits a value and returns the key's new revision.
    async fn put(
        &self,
        key: &str,
        payload: Bytes,
    ) -> std::result::Result<u64, StoreError>;

    /// Tombstones a key and returns the key's new revision.
    async fn delete(
        &self,
        key: &str,
    ) -> std::result::Result<u64, StoreError>;

    /// Subscribes to every key matched by `pattern`.
    ///
    /// The feed first replays the current entry of each matched key, then
    /// yields [`FeedMessage::CaughtUp`] exactly once, then live entries.
    /// Implementations may end the feed of a consumer that falls too far
    /// behind instead of buffering without limit.
    async fn watch(
        &self,
        pattern: &str,
    ) -> std::result::Result<Feed, StoreError>;

    /// Streams every retained revision of `key`, deletions included.
    async fn history(
        &self,
        key: &str,
    ) -> std::result::Result<HistoryStream, StoreError>;

    /// Irreversibly removes the namespace and all of its keys.
    async fn destroy(
        &self,
        namespace: &str,
    ) -> std::result::Result<(), StoreError>;
}
