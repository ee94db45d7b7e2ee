//! Prometheus metrics for mirrored namespaces.
//!
//! Collectors are process-wide and labelled by namespace. They are not
//! registered anywhere by default; call [`register_custom_metrics`] with the
//! registry the embedding process exports.

use lazy_static::lazy_static;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;

lazy_static! {
    pub static ref FEED_ENTRIES_APPLIED: IntCounterVec = IntCounterVec::new(
        Opts::new("feed_entries_applied", "Feed entries that advanced a key's revision"),
        &["namespace"]
    )
    .expect("metric can not be created");

    pub static ref FEED_ENTRIES_DISCARDED: IntCounterVec = IntCounterVec::new(
        Opts::new("feed_entries_discarded", "Stale or duplicate feed entries discarded"),
        &["namespace"]
    )
    .expect("metric can not be created");

    pub static ref FEED_DECODE_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("feed_decode_failures", "Feed entries skipped because they could not be decoded"),
        &["namespace"]
    )
    .expect("metric can not be created");

    pub static ref LISTENER_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("listener_failures", "Change listener invocations that failed or panicked"),
        &["namespace"]
    )
    .expect("metric can not be created");

    pub static ref OPEN_MIRRORS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("open_mirrors", "Mirrors currently in the open state"),
        &["namespace"]
    )
    .expect("metric can not be created");
}

/// Registers every live-config collector with `registry`.
pub fn register_custom_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(FEED_ENTRIES_APPLIED.clone()))?;
    registry.register(Box::new(FEED_ENTRIES_DISCARDED.clone()))?;
    registry.register(Box::new(FEED_DECODE_FAILURES.clone()))?;
    registry.register(Box::new(LISTENER_FAILURES.clone()))?;
    registry.register(Box::new(OPEN_MIRRORS.clone()))?;
    Ok(())
}
