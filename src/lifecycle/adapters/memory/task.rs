//! In-memory repository for lifecycle tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::lifecycle::{
    domain::{Task, TaskStateCounts},
    ports::{TaskRepository, TaskRepositoryError, TaskRepositoryResult},
};
use crate::record::domain::{EventUuid, TaskUuid};

/// Thread-safe in-memory task repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    state: Arc<RwLock<InMemoryTaskState>>,
}

#[derive(Debug, Default)]
struct InMemoryTaskState {
    tasks: HashMap<TaskUuid, Task>,
    event_index: HashMap<EventUuid, Vec<TaskUuid>>,
    cleared_outputs: Vec<TaskUuid>,
}

impl InMemoryTaskRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many times task output was cleared, for assertions.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when lock acquisition fails.
    pub fn cleared_output_count(&self, uuid: &TaskUuid) -> TaskRepositoryResult<usize> {
        let state = self.state.read().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(state.cleared_outputs.iter().filter(|id| *id == uuid).count())
    }
}

fn tasks_of_event(state: &InMemoryTaskState, event: &EventUuid) -> Vec<Task> {
    state
        .event_index
        .get(event)
        .map(|ids| {
            ids.iter()
                .filter_map(|id| state.tasks.get(id).cloned())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn store(&self, task: &Task) -> TaskRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        if state.tasks.contains_key(task.uuid()) {
            return Err(TaskRepositoryError::DuplicateTask(task.uuid().clone()));
        }
        state
            .event_index
            .entry(task.uuid().event_uuid())
            .or_default()
            .push(task.uuid().clone());
        state.tasks.insert(task.uuid().clone(), task.clone());
        Ok(())
    }

    async fn update(&self, task: &Task) -> TaskRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let slot = state
            .tasks
            .get_mut(task.uuid())
            .ok_or_else(|| TaskRepositoryError::NotFound(task.uuid().clone()))?;
        *slot = task.clone();
        Ok(())
    }

    async fn find_by_uuid(&self, uuid: &TaskUuid) -> TaskRepositoryResult<Option<Task>> {
        let state = self.state.read().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(state.tasks.get(uuid).cloned())
    }

    async fn find_by_event(&self, event: &EventUuid) -> TaskRepositoryResult<Vec<Task>> {
        let state = self.state.read().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(tasks_of_event(&state, event))
    }

    async fn state_counts(&self, event: &EventUuid) -> TaskRepositoryResult<TaskStateCounts> {
        let state = self.state.read().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(TaskStateCounts::tally(
            tasks_of_event(&state, event).iter().map(Task::state),
        ))
    }

    async fn clear_output(&self, uuid: &TaskUuid) -> TaskRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        state.cleared_outputs.push(uuid.clone());
        Ok(())
    }
}
