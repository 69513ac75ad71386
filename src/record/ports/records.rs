//! Record access contract implemented by every event store adapter.

use crate::lifecycle::domain::TaskStateCounts;
use crate::record::domain::{
    Artifact, DownloadNonce, LogChannel, LogChunk, TaskRecord, TaskUuid, UploadNonce,
};
use std::sync::Arc;
use thiserror::Error;

/// Result type for record operations.
pub type RecordsResult<T> = Result<T, RecordsError>;

/// Task, log and artifact access within one event store.
///
/// Implementations are used from a single event loop; methods take `&self`
/// so a shared store handle can serve every task of the event.
pub trait EventRecords: Send + Sync {
    /// Inserts a new task row.
    ///
    /// # Errors
    ///
    /// Returns [`RecordsError::DuplicateTask`] when the task already exists.
    fn put_task(&self, task: &TaskRecord) -> RecordsResult<()>;

    /// Replaces an existing task row.
    ///
    /// # Errors
    ///
    /// Returns [`RecordsError::TaskNotFound`] when the task does not exist.
    fn update_task(&self, task: &TaskRecord) -> RecordsResult<()>;

    /// Looks up a task by identifier.
    fn task(&self, uuid: &TaskUuid) -> RecordsResult<Option<TaskRecord>>;

    /// Returns every task of the event in insertion order.
    fn tasks(&self) -> RecordsResult<Vec<TaskRecord>>;

    /// Deletes the log chunks and artifacts of a task, keeping the task row.
    fn clear_task_output(&self, uuid: &TaskUuid) -> RecordsResult<()>;

    /// Appends a log chunk and returns it with its assigned sequence.
    ///
    /// # Errors
    ///
    /// Returns [`RecordsError::ChannelFinished`] when the task's channel
    /// already received its finishing chunk.
    fn append_log(&self, chunk: LogChunk) -> RecordsResult<LogChunk>;

    /// Returns every chunk of a task in append order.
    fn logs_for_task(&self, uuid: &TaskUuid) -> RecordsResult<Vec<LogChunk>>;

    /// Inserts a newly registered artifact.
    fn put_artifact(&self, artifact: &Artifact) -> RecordsResult<()>;

    /// Finds the artifact an upload nonce authorizes.
    fn artifact_by_upload_nonce(&self, nonce: &UploadNonce) -> RecordsResult<Option<Artifact>>;

    /// Finds the artifact a download nonce authorizes.
    fn artifact_by_download_nonce(
        &self,
        nonce: &DownloadNonce,
    ) -> RecordsResult<Option<Artifact>>;

    /// Persists the transfer offset of an artifact.
    ///
    /// # Errors
    ///
    /// Returns [`RecordsError::ArtifactNotFound`] when no artifact matches.
    fn update_artifact_offset(&self, nonce: &UploadNonce, offset: u64) -> RecordsResult<()>;

    /// Counts tasks by outcome for event state derivation.
    fn task_state_counts(&self) -> RecordsResult<TaskStateCounts>;
}

/// Errors returned by record adapters.
#[derive(Debug, Clone, Error)]
pub enum RecordsError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskUuid),

    /// The task was not found.
    #[error("task not found: {0}")]
    TaskNotFound(TaskUuid),

    /// The log channel already carried its finishing chunk.
    #[error("log channel {channel} of task {task} is already finished")]
    ChannelFinished {
        /// Task owning the channel.
        task: TaskUuid,
        /// Channel that was closed off.
        channel: LogChannel,
    },

    /// No artifact matches the supplied nonce.
    #[error("artifact not found for nonce")]
    ArtifactNotFound,

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl RecordsError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
