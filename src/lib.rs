//! # live-config
//!
//! Strongly-typed, live configuration namespaces backed by a replicated
//! key-value store.
//!
//! - [`ConfigMirror`] keeps a local snapshot of a namespace current from the
//!   store's change feed and notifies listeners of accepted changes.
//! - [`ConfigWriter`] writes leaves and patches and reads per-key history.
//! - [`KvStore`] is the store contract; [`MemoryKvStore`] implements it in
//!   process.
//!
//! ```rust,ignore
//! let store = Arc::new(MemoryKvStore::new());
//! let schema = Arc::new(
//!     ConfigSchema::builder()
//!         .group("http", |g| g.leaf("port", ValueKind::Number))
//!         .build()?,
//! );
//!
//! let defaults = ConfigPatch::new().group("http", |g| g.set("port", 8080));
//! let writer = ConfigWriter::create(
//!     store.clone(),
//!     "frontend",
//!     schema.clone(),
//!     NamespaceOptions::default(),
//!     &defaults,
//! )
//! .await?;
//!
//! let mirror = ConfigMirror::open(&*store, "frontend", schema, &MirrorConfig::default()).await?;
//! let port: Option<f64> = mirror.get_as("http.port")?;
//! ```

mod config;
mod constants;
mod errors;
mod metrics;
mod mirror;
mod schema;
mod store;
mod utils;
mod writer;

pub use config::*;
pub(crate) use constants::*;
pub use errors::*;
pub use metrics::*;
pub use mirror::*;
pub use schema::*;
pub use store::*;
pub use writer::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
