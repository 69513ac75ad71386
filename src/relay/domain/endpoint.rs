//! Relay socket endpoints supplied through the environment.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

/// Local socket a relay connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoint {
    path: Utf8PathBuf,
}

impl RelayEndpoint {
    /// Creates an endpoint for a socket path.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads the socket path from the environment variable `var`.
    ///
    /// A missing or empty variable is logged and yields `None`.
    #[must_use]
    pub fn from_env(var: &str) -> Option<Self> {
        Self::from_lookup(var, |name| std::env::var(name).ok())
    }

    /// Reads the socket path for `var` through `lookup`.
    #[must_use]
    pub fn from_lookup(var: &str, lookup: impl FnOnce(&str) -> Option<String>) -> Option<Self> {
        let path = lookup(var).filter(|value| !value.trim().is_empty());
        if path.is_none() {
            info!(var, "relay endpoint variable not set");
        }
        path.map(Self::new)
    }

    /// Returns the socket path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}
