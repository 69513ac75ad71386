//! Task repository backed by an open event store.

use crate::lifecycle::{
    domain::{Task, TaskStateCounts},
    ports::{TaskRepository, TaskRepositoryError, TaskRepositoryResult},
};
use crate::record::{
    domain::{EventUuid, TaskUuid},
    ports::{EventRecords, RecordsError},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Task repository over one event's store.
///
/// Record access is synchronous, so every call runs on the blocking pool.
pub struct RecordsTaskRepository<D> {
    event: EventUuid,
    records: Arc<D>,
}

impl<D> RecordsTaskRepository<D>
where
    D: EventRecords + 'static,
{
    /// Creates a repository for `event` over its open store.
    #[must_use]
    pub const fn new(event: EventUuid, records: Arc<D>) -> Self {
        Self { event, records }
    }

    /// Returns the event this repository serves.
    #[must_use]
    pub const fn event(&self) -> &EventUuid {
        &self.event
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskRepositoryResult<T>
    where
        F: FnOnce(&D) -> TaskRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let records = Arc::clone(&self.records);
        tokio::task::spawn_blocking(move || f(&records))
            .await
            .map_err(TaskRepositoryError::persistence)?
    }
}

fn map_records_error(err: RecordsError) -> TaskRepositoryError {
    match err {
        RecordsError::DuplicateTask(uuid) => TaskRepositoryError::DuplicateTask(uuid),
        RecordsError::TaskNotFound(uuid) => TaskRepositoryError::NotFound(uuid),
        other => TaskRepositoryError::persistence(other),
    }
}

#[async_trait]
impl<D> TaskRepository for RecordsTaskRepository<D>
where
    D: EventRecords + 'static,
{
    async fn store(&self, task: &Task) -> TaskRepositoryResult<()> {
        let record = task.record().clone();
        self.run_blocking(move |records| records.put_task(&record).map_err(map_records_error))
            .await
    }

    async fn update(&self, task: &Task) -> TaskRepositoryResult<()> {
        let record = task.record().clone();
        self.run_blocking(move |records| records.update_task(&record).map_err(map_records_error))
            .await
    }

    async fn find_by_uuid(&self, uuid: &TaskUuid) -> TaskRepositoryResult<Option<Task>> {
        let lookup = uuid.clone();
        self.run_blocking(move |records| {
            let row = records.task(&lookup).map_err(map_records_error)?;
            Ok(row.map(Task::from_record))
        })
        .await
    }

    async fn find_by_event(&self, event: &EventUuid) -> TaskRepositoryResult<Vec<Task>> {
        if event != &self.event {
            return Ok(Vec::new());
        }
        self.run_blocking(|records| {
            let rows = records.tasks().map_err(map_records_error)?;
            Ok(rows.into_iter().map(Task::from_record).collect())
        })
        .await
    }

    async fn state_counts(&self, event: &EventUuid) -> TaskRepositoryResult<TaskStateCounts> {
        if event != &self.event {
            return Ok(TaskStateCounts::default());
        }
        self.run_blocking(|records| records.task_state_counts().map_err(map_records_error))
            .await
    }

    async fn clear_output(&self, uuid: &TaskUuid) -> TaskRepositoryResult<()> {
        let target = uuid.clone();
        self.run_blocking(move |records| {
            records
                .clear_task_output(&target)
                .map_err(map_records_error)
        })
        .await
    }
}
