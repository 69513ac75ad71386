//! Error types for coordination.

use crate::lifecycle::services::TaskLifecycleError;
use crate::record::domain::TaskUuid;
use crate::record::ports::RecordsError;
use crate::relay::domain::{QueueError, RelayError};
use crate::store::{adapters::blob::BlobError, domain::StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A coordination message could not be encoded or decoded.
#[derive(Debug, Clone, Error)]
#[error("malformed coordination message: {0}")]
pub struct EnvelopeError(Arc<serde_json::Error>);

impl From<serde_json::Error> for EnvelopeError {
    fn from(err: serde_json::Error) -> Self {
        Self(Arc::new(err))
    }
}

/// Errors raised while coordinating builds between builders and the server.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// A message could not be encoded or decoded.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// The task is already running on this builder.
    #[error("task {0} is already running on this builder")]
    AlreadyRunning(TaskUuid),

    /// The task is not running on this builder.
    #[error("task {0} is not running on this builder")]
    NotRunning(TaskUuid),

    /// The task lifecycle rejected an operation.
    #[error(transparent)]
    Lifecycle(#[from] TaskLifecycleError),

    /// The event store could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Reading or writing event records failed.
    #[error(transparent)]
    Records(#[from] RecordsError),

    /// An outbound message could not be queued.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The relay connection failed.
    #[error(transparent)]
    Transport(#[from] RelayError),

    /// Artifact content could not be stored.
    #[error(transparent)]
    Blob(#[from] BlobError),

    /// The build process could not be signalled.
    #[error("failed to signal build process {pid}: {source}")]
    Process {
        /// Process identifier.
        pid: u32,
        /// Underlying failure.
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
}

impl CoordinationError {
    /// Wraps a process signalling failure.
    pub fn process(pid: u32, err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Process {
            pid,
            source: Arc::new(err),
        }
    }
}

/// Result type for coordination operations.
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Failures of a lease exchange other than a denial.
#[derive(Debug, Clone, Error)]
pub enum LeaseError {
    /// The relay transport failed.
    #[error(transparent)]
    Transport(#[from] RelayError),

    /// A message could not be encoded or decoded.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// The authority went away before answering.
    #[error("lease authority closed the connection before replying")]
    NoReply,

    /// No answer arrived in time.
    #[error("no lease reply within {0:?}")]
    TimedOut(Duration),
}
