use bytes::Bytes;

use crate::codec;
use crate::ConfigValue;
use crate::FeedEntry;
use crate::FeedMessage;
use crate::Operation;

/// Builds feed entries for one namespace with explicit revisions
pub struct EntryBuilder {
    namespace: String,
    created_at: u64,
}

impl EntryBuilder {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            created_at: 1_000,
        }
    }

    pub fn put(
        &mut self,
        path: &str,
        revision: u64,
        value: impl Into<ConfigValue>,
    ) -> FeedEntry {
        let payload = codec::encode_value(&value.into()).unwrap();
        self.entry(path, Operation::Put, payload, revision)
    }

    pub fn delete(
        &mut self,
        path: &str,
        revision: u64,
    ) -> FeedEntry {
        self.entry(path, Operation::Delete, Bytes::new(), revision)
    }

    /// Put whose payload cannot be decoded
    pub fn garbage(
        &mut self,
        path: &str,
        revision: u64,
    ) -> FeedEntry {
        self.entry(path, Operation::Put, Bytes::from_static(&[0xff, 0xff, 0xff]), revision)
    }

    fn entry(
        &mut self,
        path: &str,
        operation: Operation,
        payload: Bytes,
        revision: u64,
    ) -> FeedEntry {
        self.created_at += 1;
        FeedEntry {
            key: format!("{}.{}", self.namespace, path),
            operation,
            payload,
            revision,
            created_at: self.created_at,
        }
    }
}

pub fn msg(entry: FeedEntry) -> FeedMessage {
    FeedMessage::Entry(entry)
}
