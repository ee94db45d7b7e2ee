//! Live Configuration Error Hierarchy
//!
//! Errors are grouped by the layer that produces them: the store
//! collaborator, the runtime schema, the value codec and the mirror
//! lifecycle. Decode and listener failures raised inside the feed consumer
//! are contained there and only ever logged; the same types surface to
//! callers from direct requests such as `history`.

use std::time::Duration;

use config::ConfigError;

use crate::ValueKind;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operation on a mirror that is closed or never finished opening
    #[error("Mirror for namespace `{namespace}` is closed")]
    Closed { namespace: String },

    /// Failures reported by the key-value store collaborator
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Path or value rejected by the runtime schema descriptor
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Malformed encoded value or feed entry
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Store never signalled the end of historical replay
    #[error("Opening namespace `{namespace}` timed out after {duration:?}")]
    OpenTimeout { namespace: String, duration: Duration },

    /// Unrecoverable failures, e.g. the feed consumer task vanished
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Error {
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed { .. })
    }

    pub fn is_namespace_not_found(&self) -> bool {
        matches!(self, Error::Store(StoreError::NamespaceNotFound(_)))
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, Error::Store(StoreError::Authorization { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Namespace was never provisioned or has been destroyed
    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    /// Credential lacks publish rights for the requested operation
    #[error("Not authorized to {operation} in namespace `{namespace}`")]
    Authorization {
        namespace: String,
        operation: &'static str,
    },

    /// Key or watch pattern the store cannot address
    #[error("Invalid key pattern: {0}")]
    InvalidPattern(String),

    /// Change feed terminated by the store
    #[error("Change feed for namespace `{namespace}` ended")]
    FeedEnded { namespace: String },

    /// Any other substrate failure, passed through verbatim
    #[error("Store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Unknown configuration path: {0}")]
    UnknownPath(String),

    #[error("Path `{0}` names a group, not a value")]
    NotALeaf(String),

    #[error("Path `{path}` expects {expected} but got {actual}")]
    TypeMismatch {
        path: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("Invalid path segment `{segment}` in `{path}`")]
    InvalidSegment { path: String, segment: String },

    #[error("Configuration path must not be empty")]
    EmptyPath,

    #[error("Invalid namespace name: {0}")]
    InvalidNamespace(String),

    #[error("Segment `{0}` declared twice")]
    DuplicateSegment(String),
}

/// Error type for wire value and feed entry decoding
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Payload is not a valid encoded value
    #[error("Malformed value payload for `{key}`: {source}")]
    Payload {
        key: String,
        #[source]
        source: bincode::Error,
    },

    /// Value could not be encoded for the wire
    #[error("Failed to encode value: {0}")]
    Encode(#[source] bincode::Error),

    /// Entry key does not belong to the watched namespace
    #[error("Key `{key}` is outside namespace `{namespace}`")]
    ForeignKey { namespace: String, key: String },

    /// Entry decoded but does not fit the schema
    #[error("Entry for `{key}` rejected by schema: {source}")]
    Schema {
        key: String,
        #[source]
        source: SchemaError,
    },
}

/// Failure raised by a change listener
///
/// Listener failures are caught and logged by the dispatcher; they never
/// reach the feed consumer or other listeners.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    #[error("Listener failed: {0}")]
    Failed(String),

    #[error("Listener panicked: {0}")]
    Panicked(String),
}

impl ListenerError {
    pub fn msg(message: impl std::fmt::Display) -> Self {
        ListenerError::Failed(message.to_string())
    }
}
