//! Task lifecycle service applying transitions and persisting them.

use crate::lifecycle::{
    domain::{BuildState, Event, LifecycleDomainError, ProcessExit, Task},
    ports::{TaskRepository, TaskRepositoryError, TaskTransitionObserver},
};
use crate::record::domain::{EventUuid, NewTaskRecord, TaskRecord, TaskUuid};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Service-level errors for task lifecycle operations.
#[derive(Debug, Error)]
pub enum TaskLifecycleError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] LifecycleDomainError),
    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] TaskRepositoryError),
}

/// Result type for task lifecycle service operations.
pub type TaskLifecycleResult<T> = Result<T, TaskLifecycleError>;

/// Task lifecycle orchestration service.
///
/// Every persisted transition is reported to the attached observer, if any.
#[derive(Clone)]
pub struct TaskLifecycleService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    clock: Arc<C>,
    observer: Option<Arc<dyn TaskTransitionObserver>>,
}

impl<R, C> TaskLifecycleService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Creates a new task lifecycle service.
    #[must_use]
    pub const fn new(repository: Arc<R>, clock: Arc<C>) -> Self {
        Self {
            repository,
            clock,
            observer: None,
        }
    }

    /// Reports every task transition to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn TaskTransitionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Attaches a new waiting task to `event`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] when persistence fails.
    pub async fn create(
        &self,
        event: &EventUuid,
        params: NewTaskRecord,
    ) -> TaskLifecycleResult<Task> {
        let task = Task::new(event, params, &*self.clock);
        self.repository.store(&task).await?;
        info!(task = %task.uuid(), platform = task.platform(), "created task");
        Ok(task)
    }

    /// Stores a task received from another node unless it is already known.
    ///
    /// The locally held copy wins when both exist.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] when persistence fails.
    pub async fn adopt(&self, record: TaskRecord) -> TaskLifecycleResult<Task> {
        if let Some(known) = self.repository.find_by_uuid(&record.uuid).await? {
            debug!(task = %known.uuid(), state = %known.state(), "offered task already known");
            return Ok(known);
        }
        let task = Task::from_record(record);
        self.repository.store(&task).await?;
        debug!(task = %task.uuid(), platform = task.platform(), "adopted offered task");
        Ok(task)
    }

    /// Records that `builder` accepted a waiting task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError`] when the task is missing, not waiting,
    /// or cannot be persisted.
    pub async fn accept(&self, uuid: &TaskUuid, builder: &str) -> TaskLifecycleResult<Task> {
        let mut task = self.load(uuid).await?;
        task.assign(builder, &*self.clock)?;
        self.persist(&task, BuildState::Waiting).await?;
        Ok(task)
    }

    /// Records that an accepted task started executing.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError`] when the task is missing, not accepted,
    /// or cannot be persisted.
    pub async fn start(&self, uuid: &TaskUuid) -> TaskLifecycleResult<Task> {
        let mut task = self.load(uuid).await?;
        task.start(&*self.clock)?;
        self.persist(&task, BuildState::PassedToBuilder).await?;
        Ok(task)
    }

    /// Records the outcome of a running task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError`] when the task is missing, not running,
    /// `outcome` is not a completion, or persistence fails.
    pub async fn complete(
        &self,
        uuid: &TaskUuid,
        outcome: BuildState,
    ) -> TaskLifecycleResult<Task> {
        let mut task = self.load(uuid).await?;
        task.complete(outcome, &*self.clock)?;
        self.persist(&task, BuildState::BeingBuilt).await?;
        Ok(task)
    }

    /// Maps a build process exit to the task's terminal state.
    ///
    /// A signal delivered after a cancel request ends as cancelled. A task
    /// that already reached a terminal state, for example by an earlier
    /// cancel, is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError`] when the task is missing, not running,
    /// or cannot be persisted.
    pub async fn finish_with_exit(
        &self,
        uuid: &TaskUuid,
        exit: ProcessExit,
        cancel_requested: bool,
    ) -> TaskLifecycleResult<Task> {
        let mut task = self.load(uuid).await?;
        let previous = task.state();
        if previous.is_terminal() {
            debug!(task = %uuid, ?exit, state = %previous, "exit after task already finished");
            return Ok(task);
        }

        match exit.terminal_state(cancel_requested) {
            BuildState::Cancelled => {
                task.cancel(&*self.clock);
            }
            outcome => task.complete(outcome, &*self.clock)?,
        }
        self.persist(&task, previous).await?;
        Ok(task)
    }

    /// Cancels a task.
    ///
    /// Cancelling an unknown task is ignored and yields `None`; cancelling a
    /// finished task leaves it unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] when persistence fails.
    pub async fn cancel(&self, uuid: &TaskUuid) -> TaskLifecycleResult<Option<Task>> {
        let Some(mut task) = self.repository.find_by_uuid(uuid).await? else {
            warn!(task = %uuid, "ignoring cancel for unknown task");
            return Ok(None);
        };
        let previous = task.state();
        if task.cancel(&*self.clock) {
            self.persist(&task, previous).await?;
        } else {
            debug!(task = %uuid, state = %previous, "cancel ignored for finished task");
        }
        Ok(Some(task))
    }

    /// Marks a task deleted.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError`] when the task is missing or cannot be
    /// persisted.
    pub async fn delete(&self, uuid: &TaskUuid) -> TaskLifecycleResult<Task> {
        let mut task = self.load(uuid).await?;
        let previous = task.state();
        task.delete(&*self.clock);
        self.persist(&task, previous).await?;
        Ok(task)
    }

    /// Returns a finished task to waiting and discards its previous output.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError`] when the task is missing, not finished,
    /// deleted, or cannot be persisted.
    pub async fn reset(&self, uuid: &TaskUuid) -> TaskLifecycleResult<Task> {
        let mut task = self.load(uuid).await?;
        let previous = task.state();
        task.reset(&*self.clock)?;
        self.repository.clear_output(uuid).await?;
        self.persist(&task, previous).await?;
        Ok(task)
    }

    /// Writes `task` back as it was held before a transition that could not
    /// be carried through, such as an acceptance the server never heard of.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] when the task is missing or
    /// cannot be persisted.
    pub async fn restore(&self, task: &Task) -> TaskLifecycleResult<()> {
        let current = self.load(task.uuid()).await?;
        warn!(
            task = %task.uuid(),
            from = %current.state(),
            to = %task.state(),
            "rolling back task transition"
        );
        self.persist(task, current.state()).await
    }

    /// Retrieves a task by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] when lookup fails.
    pub async fn find(&self, uuid: &TaskUuid) -> TaskLifecycleResult<Option<Task>> {
        Ok(self.repository.find_by_uuid(uuid).await?)
    }

    /// Derives the aggregate state of an event from its tasks.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] when counting fails.
    pub async fn event_state(&self, event: &EventUuid) -> TaskLifecycleResult<BuildState> {
        let counts = self.repository.state_counts(event).await?;
        Ok(Event::derive_state(counts))
    }

    async fn load(&self, uuid: &TaskUuid) -> TaskLifecycleResult<Task> {
        self.repository
            .find_by_uuid(uuid)
            .await?
            .ok_or_else(|| TaskRepositoryError::NotFound(uuid.clone()).into())
    }

    async fn persist(&self, task: &Task, from: BuildState) -> TaskLifecycleResult<()> {
        self.repository.update(task).await?;
        info!(
            task = %task.uuid(),
            from = %from,
            to = %task.state(),
            builder = task.builder().unwrap_or("-"),
            "task transition"
        );
        if let Some(observer) = self.observer.as_ref().filter(|_| from != task.state()) {
            observer.task_transitioned(task, from).await;
        }
        Ok(())
    }
}
