// -
// Store defaults

/// Revisions retained per key when a namespace is provisioned without
/// explicit options
pub(crate) const DEFAULT_HISTORY_DEPTH: u32 = 64;

/// Upper bound accepted for `namespace.history`
pub(crate) const MAX_HISTORY_DEPTH: u32 = 64;

pub(crate) const MAX_REPLICAS: u32 = 5;

/// Live entries buffered per watch feed of the in-memory store
pub(crate) const DEFAULT_WATCH_BUFFER: usize = 1_024;

// -
// Mirror defaults

pub(crate) const DEFAULT_OPEN_TIMEOUT_MS: u64 = 5_000;

// -
// Configuration sources

pub(crate) const CONFIG_ENV_PREFIX: &str = "LIVE_CONFIG";
pub(crate) const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
