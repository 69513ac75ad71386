//! Error types for event store operations.

use crate::record::domain::EventUuid;
use camino::Utf8PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by event store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backing medium could not be opened or created.
    #[error("unable to open event store {path}: {source}")]
    Open {
        /// Store file that failed to open.
        path: Utf8PathBuf,
        /// Underlying failure.
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// Provisioning the store schema failed; partial provisioning is fatal.
    #[error("unable to provision {step} in event store {path}: {source}")]
    Schema {
        /// Store file being provisioned.
        path: Utf8PathBuf,
        /// Provisioning step that failed.
        step: &'static str,
        /// Underlying failure.
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// The store is still referenced and cannot be purged.
    #[error("event store {event} still has {refcount} live references")]
    InUse {
        /// Event whose store is busy.
        event: EventUuid,
        /// Outstanding references.
        refcount: usize,
    },
}

impl StoreError {
    /// Wraps an open failure for `path`.
    pub fn open(
        path: impl Into<Utf8PathBuf>,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Open {
            path: path.into(),
            source: Arc::new(err),
        }
    }

    /// Wraps a schema provisioning failure for `path`.
    pub fn schema(
        path: impl Into<Utf8PathBuf>,
        step: &'static str,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Schema {
            path: path.into(),
            step,
            source: Arc::new(err),
        }
    }
}
