use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;
use crate::DEFAULT_OPEN_TIMEOUT_MS;

/// Upper bound for `open_timeout_ms` (10 minutes)
const MAX_OPEN_TIMEOUT_MS: u64 = 600_000;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MirrorConfig {
    /// How long `open` waits for the store to finish replaying current
    /// state. `0` waits indefinitely.
    ///
    /// Default: 5000
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
}

fn default_open_timeout_ms() -> u64 {
    DEFAULT_OPEN_TIMEOUT_MS
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            open_timeout_ms: default_open_timeout_ms(),
        }
    }
}

impl MirrorConfig {
    /// `None` when opening is unbounded
    pub fn open_timeout(&self) -> Option<Duration> {
        match self.open_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.open_timeout_ms > MAX_OPEN_TIMEOUT_MS {
            return Err(Error::Config(ConfigError::Message(format!(
                "mirror.open_timeout_ms must be at most {}, got {}",
                MAX_OPEN_TIMEOUT_MS, self.open_timeout_ms
            ))));
        }
        Ok(())
    }
}
