//! Write side of a configuration namespace.
//!
//! [`ConfigWriter`] holds no cache. Every call goes straight to the store,
//! and store failures propagate without retry.

mod patch;

pub use patch::*;

#[cfg(test)]
mod patch_test;

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::codec;
use crate::ConfigSchema;
use crate::ConfigValue;
use crate::DecodeError;
use crate::KeyPathCodec;
use crate::KvStore;
use crate::NamespaceOptions;
use crate::Result;
use crate::StoreError;

/// One retained revision of a key
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// `None` for a deletion
    pub value: Option<ConfigValue>,
    pub revision: u64,
    /// Store creation time in milliseconds since the epoch
    pub timestamp: u64,
}

#[derive(Clone)]
pub struct ConfigWriter {
    store: Arc<dyn KvStore>,
    codec: KeyPathCodec,
    schema: Arc<ConfigSchema>,
}

impl fmt::Debug for ConfigWriter {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ConfigWriter")
            .field("namespace", &self.codec.namespace())
            .field("leaves", &self.schema.len())
            .finish_non_exhaustive()
    }
}

impl ConfigWriter {
    /// Binds a writer to an existing namespace.
    pub async fn connect(
        store: Arc<dyn KvStore>,
        namespace: &str,
        schema: Arc<ConfigSchema>,
    ) -> Result<Self> {
        let codec = KeyPathCodec::new(namespace)?;
        if !store.namespace_exists(namespace).await? {
            return Err(StoreError::NamespaceNotFound(namespace.to_string()).into());
        }
        Ok(Self {
            store,
            codec,
            schema,
        })
    }

    /// Provisions `namespace` (resetting its options if it exists) and
    /// writes `defaults`.
    ///
    /// Only the leaves present in `defaults` are written; other existing
    /// keys are kept.
    pub async fn create(
        store: Arc<dyn KvStore>,
        namespace: &str,
        schema: Arc<ConfigSchema>,
        options: NamespaceOptions,
        defaults: &ConfigPatch,
    ) -> Result<Self> {
        let codec = KeyPathCodec::new(namespace)?;
        let leaves = validate_patch(&schema, defaults)?;

        store.provision(namespace, options).await?;
        info!(namespace, ?options, defaults = leaves.len(), "Namespace provisioned");

        let writer = Self {
            store,
            codec,
            schema,
        };
        writer.write_leaves(leaves).await?;
        Ok(writer)
    }

    /// Connects to an existing namespace and applies `patch`.
    pub async fn patch(
        store: Arc<dyn KvStore>,
        namespace: &str,
        schema: Arc<ConfigSchema>,
        patch: &ConfigPatch,
    ) -> Result<Self> {
        let writer = Self::connect(store, namespace, schema).await?;
        writer.apply_patch(patch).await?;
        Ok(writer)
    }

    pub fn namespace(&self) -> &str {
        self.codec.namespace()
    }

    pub fn schema(&self) -> &ConfigSchema {
        &self.schema
    }

    /// Writes the leaves of `patch` in flattened order and returns how many
    /// were written.
    ///
    /// Every leaf is validated before the first write, so an invalid patch
    /// writes nothing. A failed write stops the patch; earlier leaves stay
    /// written.
    pub async fn apply_patch(
        &self,
        patch: &ConfigPatch,
    ) -> Result<usize> {
        let leaves = validate_patch(&self.schema, patch)?;
        self.write_leaves(leaves).await
    }

    /// Writes one leaf. `None` deletes it. Returns the revision assigned by
    /// the store.
    pub async fn set(
        &self,
        path: &str,
        value: Option<ConfigValue>,
    ) -> Result<u64> {
        self.schema.validate_value(path, value.as_ref())?;
        self.write(path, value).await
    }

    /// Retained revisions of a leaf, oldest first. Deletions appear as
    /// `None`.
    pub async fn history(
        &self,
        path: &str,
    ) -> Result<Vec<HistoryEntry>> {
        self.schema.kind_of(path)?;
        let key = self.codec.to_key(path);

        let mut stream = self.store.history(&key).await?;
        let mut entries = Vec::new();
        while let Some(item) = stream.next().await {
            let entry = item?;
            let value = codec::decode_payload(&entry.key, entry.operation, &entry.payload)?;
            self.schema
                .validate_value(path, value.as_ref())
                .map_err(|source| DecodeError::Schema {
                    key: entry.key.clone(),
                    source,
                })?;
            entries.push(HistoryEntry {
                value,
                revision: entry.revision,
                timestamp: entry.created_at,
            });
        }

        // Delivery order is not trusted; revisions are the creation order.
        entries.sort_by_key(|e| e.revision);
        trace!(namespace = self.namespace(), path, revisions = entries.len(), "History read");
        Ok(entries)
    }

    /// Irreversibly removes the namespace and every key in it.
    pub async fn destroy(self) -> Result<()> {
        self.store.destroy(self.codec.namespace()).await?;
        info!(namespace = self.namespace(), "Namespace destroyed");
        Ok(())
    }

    async fn write_leaves(
        &self,
        leaves: Vec<(String, Option<ConfigValue>)>,
    ) -> Result<usize> {
        let mut written = 0;
        for (path, value) in leaves {
            self.write(&path, value).await?;
            written += 1;
        }
        debug!(namespace = self.namespace(), written, "Patch applied");
        Ok(written)
    }

    async fn write(
        &self,
        path: &str,
        value: Option<ConfigValue>,
    ) -> Result<u64> {
        let key = self.codec.to_key(path);
        let revision = match value {
            Some(value) => {
                let payload = codec::encode_value(&value)?;
                self.store.put(&key, payload).await?
            }
            None => self.store.delete(&key).await?,
        };
        trace!(namespace = self.namespace(), path, revision, "Leaf written");
        Ok(revision)
    }
}

fn validate_patch(
    schema: &ConfigSchema,
    patch: &ConfigPatch,
) -> Result<Vec<(String, Option<ConfigValue>)>> {
    let leaves = patch.flatten()?;
    for (path, value) in &leaves {
        schema.validate_value(path, value.as_ref())?;
    }
    Ok(leaves)
}
