//! Repository port for task persistence and lookup.

use crate::lifecycle::domain::{Task, TaskStateCounts};
use crate::record::domain::{EventUuid, TaskUuid};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task repository operations.
pub type TaskRepositoryResult<T> = Result<T, TaskRepositoryError>;

/// Task persistence contract.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Stores a new task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::DuplicateTask`] when the task already
    /// exists.
    async fn store(&self, task: &Task) -> TaskRepositoryResult<()>;

    /// Persists changes to an existing task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not exist.
    async fn update(&self, task: &Task) -> TaskRepositoryResult<()>;

    /// Finds a task by identifier.
    ///
    /// Returns `None` when the task does not exist.
    async fn find_by_uuid(&self, uuid: &TaskUuid) -> TaskRepositoryResult<Option<Task>>;

    /// Returns the tasks of an event in creation order.
    async fn find_by_event(&self, event: &EventUuid) -> TaskRepositoryResult<Vec<Task>>;

    /// Counts task outcomes for an event.
    async fn state_counts(&self, event: &EventUuid) -> TaskRepositoryResult<TaskStateCounts>;

    /// Discards the logs and artifacts a task produced.
    async fn clear_output(&self, uuid: &TaskUuid) -> TaskRepositoryResult<()>;
}

/// Errors returned by task repository implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskRepositoryError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskUuid),

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskUuid),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
