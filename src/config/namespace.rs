use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::NamespaceOptions;
use crate::Result;
use crate::DEFAULT_HISTORY_DEPTH;
use crate::MAX_HISTORY_DEPTH;
use crate::MAX_REPLICAS;

/// Provisioning options for new namespaces
///
/// ```toml
/// [namespace]
/// history = 16
/// replicas = 3
/// max_age_secs = 86400
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Revisions retained per key
    ///
    /// Range: 1-64
    /// Default: 64
    #[serde(default = "default_history")]
    pub history: u32,

    /// Range: 1-5
    /// Default: 1
    #[serde(default = "default_replicas")]
    pub replicas: u32,

    /// Maximum age of a retained revision. `0` keeps revisions until the
    /// history depth is exceeded.
    #[serde(default)]
    pub max_age_secs: u64,
}

fn default_history() -> u32 {
    DEFAULT_HISTORY_DEPTH
}

fn default_replicas() -> u32 {
    1
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            history: default_history(),
            replicas: default_replicas(),
            max_age_secs: 0,
        }
    }
}

impl NamespaceConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_HISTORY_DEPTH).contains(&self.history) {
            return Err(Error::Config(ConfigError::Message(format!(
                "namespace.history must be between 1 and {}, got {}",
                MAX_HISTORY_DEPTH, self.history
            ))));
        }

        if !(1..=MAX_REPLICAS).contains(&self.replicas) {
            return Err(Error::Config(ConfigError::Message(format!(
                "namespace.replicas must be between 1 and {}, got {}",
                MAX_REPLICAS, self.replicas
            ))));
        }

        Ok(())
    }
}

impl From<&NamespaceConfig> for NamespaceOptions {
    fn from(config: &NamespaceConfig) -> Self {
        Self {
            history: config.history,
            replicas: config.replicas,
            max_age_secs: config.max_age_secs,
        }
    }
}
