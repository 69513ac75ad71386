//! Runtime configuration for embedding hosts.
//!
//! Configuration is plain serde data with sensible defaults. Hosts decide
//! where the JSON comes from; a handful of environment variables may
//! override the store settings.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding [`StoreConfig::path_prefix`].
pub const STORE_PREFIX_VAR: &str = "KILN_STORE_PREFIX";
/// Environment variable overriding [`StoreConfig::idle_grace_secs`].
pub const IDLE_GRACE_VAR: &str = "KILN_IDLE_GRACE_SECS";

/// Errors raised while loading configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The JSON document could not be parsed.
    #[error("invalid configuration: {0}")]
    Parse(Arc<serde_json::Error>),

    /// An override variable held an unusable value.
    #[error("invalid value {value:?} for {var}")]
    InvalidOverride {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Event store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Prefix prepended to every store file name.
    pub path_prefix: Utf8PathBuf,
    /// Seconds an unreferenced store stays open before the sweep closes it.
    pub idle_grace_secs: u64,
    /// Seconds between housekeeping passes.
    pub sweep_interval_secs: u64,
}

impl StoreConfig {
    /// Returns the idle grace window.
    #[must_use]
    pub const fn idle_grace(&self) -> Duration {
        Duration::from_secs(self.idle_grace_secs)
    }

    /// Returns the housekeeping period, never shorter than one second.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path_prefix: Utf8PathBuf::from("kiln"),
            idle_grace_secs: 60,
            sweep_interval_secs: 20,
        }
    }
}

/// Concurrent build limit for one host platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformLimit {
    /// Host platform name.
    pub name: String,
    /// Builds allowed to run at once.
    pub instances: u32,
}

/// Names of the environment variables carrying relay socket paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Variable naming the log proxy socket.
    pub logproxy_var: String,
    /// Variable naming the resource proxy socket.
    pub resource_proxy_var: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            logproxy_var: "KILN_LOGPROXY".to_owned(),
            resource_proxy_var: "KILN_RESOURCE_PROXY".to_owned(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KilnConfig {
    /// Event store settings.
    pub store: StoreConfig,
    /// Per-platform build limits for a builder.
    pub platforms: Vec<PlatformLimit>,
    /// Relay endpoint variable names.
    pub relay: RelayConfig,
}

impl KilnConfig {
    /// Parses configuration from JSON, filling omitted fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the document is malformed.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|err| ConfigError::Parse(Arc::new(err)))
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] when an override is not
    /// usable.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides obtained through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] when an override is not
    /// usable.
    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(prefix) = lookup(STORE_PREFIX_VAR) {
            if prefix.trim().is_empty() {
                return Err(ConfigError::InvalidOverride {
                    var: STORE_PREFIX_VAR,
                    value: prefix,
                });
            }
            self.store.path_prefix = Utf8PathBuf::from(prefix);
        }
        if let Some(raw) = lookup(IDLE_GRACE_VAR) {
            self.store.idle_grace_secs =
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidOverride {
                        var: IDLE_GRACE_VAR,
                        value: raw.clone(),
                    })?;
        }
        Ok(self)
    }
}
