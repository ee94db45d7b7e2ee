//! Runtime settings for mirrors and namespace provisioning.
//!
//! Loaded hierarchically, later sources overriding earlier ones:
//! - Default values as code base
//! - Configuration file named by `CONFIG_PATH`
//! - Environment variables prefixed with `LIVE_CONFIG__`
mod mirror;
mod namespace;
pub use mirror::*;
pub use namespace::*;

use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;
use crate::CONFIG_ENV_PREFIX;
use crate::CONFIG_PATH_ENV;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LiveConfigSettings {
    /// Mirror connection parameters
    #[serde(default)]
    pub mirror: MirrorConfig,
    /// Options applied when `create` provisions a namespace
    #[serde(default)]
    pub namespace: NamespaceConfig,
}

impl LiveConfigSettings {
    /// Loads settings from defaults, `CONFIG_PATH` and environment variables.
    ///
    /// Does not validate; call [`LiveConfigSettings::validate`] once all
    /// overrides are applied.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("LIVE_CONFIG__MIRROR__OPEN_TIMEOUT_MS", "250");
    /// let settings = LiveConfigSettings::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(environment());

        let settings: Self = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Layers a configuration file on top of the current values. Environment
    /// variables still take precedence.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let settings: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn validate(self) -> Result<Self> {
        self.mirror.validate()?;
        self.namespace.validate()?;
        Ok(self)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(CONFIG_ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
