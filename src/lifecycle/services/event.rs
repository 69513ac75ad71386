//! Event aggregate service keeping event state in step with its tasks.

use crate::lifecycle::{
    domain::{BuildState, Event, EventSource, LifecycleDomainError, Task},
    ports::{
        EventRepository, EventRepositoryError, TaskRepository, TaskRepositoryError,
        TaskTransitionObserver,
    },
};
use crate::record::domain::EventUuid;
use crate::store::{
    domain::{PurgeReport, StoreError},
    ports::StoreBackend,
    services::EventStoreCache,
};
use async_trait::async_trait;
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Service-level errors for event operations.
#[derive(Debug, Error)]
pub enum EventLifecycleError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] LifecycleDomainError),
    /// Event persistence failed.
    #[error(transparent)]
    Events(#[from] EventRepositoryError),
    /// Task persistence failed.
    #[error(transparent)]
    Tasks(#[from] TaskRepositoryError),
    /// The event store could not be removed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for event service operations.
pub type EventLifecycleResult<T> = Result<T, EventLifecycleError>;

/// Event orchestration service.
///
/// Registered as a [`TaskTransitionObserver`], it recomputes the owning
/// event's state after every task transition.
pub struct EventLifecycleService<E, R, C>
where
    E: EventRepository,
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    events: Arc<E>,
    tasks: Arc<R>,
    clock: Arc<C>,
}

impl<E, R, C> EventLifecycleService<E, R, C>
where
    E: EventRepository,
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Creates a service over the event and task repositories.
    #[must_use]
    pub const fn new(events: Arc<E>, tasks: Arc<R>, clock: Arc<C>) -> Self {
        Self {
            events,
            tasks,
            clock,
        }
    }

    /// Records a new waiting event for a trigger.
    ///
    /// # Errors
    ///
    /// Returns [`EventLifecycleError::Events`] when persistence fails.
    pub async fn create(&self, source: EventSource) -> EventLifecycleResult<Event> {
        let event = Event::new(source, &*self.clock);
        self.events.store(&event).await?;
        info!(
            event = %event.uuid(),
            repo = %event.source().repo_name,
            git_ref = %event.source().git_ref,
            "created event"
        );
        Ok(event)
    }

    /// Retrieves an event by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`EventLifecycleError::Events`] when lookup fails.
    pub async fn find(&self, uuid: &EventUuid) -> EventLifecycleResult<Option<Event>> {
        Ok(self.events.find_by_uuid(uuid).await?)
    }

    /// Recomputes an event's state from its tasks and stores any change.
    ///
    /// Events in a terminal state keep it.
    ///
    /// # Errors
    ///
    /// Returns [`EventLifecycleError`] when the event is unknown or either
    /// repository fails.
    pub async fn refresh(&self, uuid: &EventUuid) -> EventLifecycleResult<Event> {
        let mut event = self.load(uuid).await?;
        let counts = self.tasks.state_counts(uuid).await?;
        let from = event.state();
        if event.refresh_from_counts(counts, &*self.clock) {
            self.events.update(&event).await?;
            info!(
                event = %uuid,
                from = %from,
                to = %event.state(),
                total = counts.total,
                succeeded = counts.succeeded,
                failed = counts.failed,
                "event state changed"
            );
        }
        Ok(event)
    }

    /// Deletes an event: its tasks and the event are marked deleted and the
    /// event's store files removed.
    ///
    /// Nothing is marked while the store is still referenced.
    ///
    /// # Errors
    ///
    /// Returns [`EventLifecycleError::Store`] with [`StoreError::InUse`]
    /// while builds hold the store, or any repository failure.
    pub async fn delete<B, K>(
        &self,
        uuid: &EventUuid,
        stores: &mut EventStoreCache<B, K>,
    ) -> EventLifecycleResult<PurgeReport>
    where
        B: StoreBackend,
        K: Clock + Send + Sync,
    {
        if let Some(refcount) = stores.refcount(uuid).filter(|count| *count > 0) {
            return Err(StoreError::InUse {
                event: uuid.clone(),
                refcount,
            }
            .into());
        }
        let mut event = self.load(uuid).await?;

        let mut deleted = 0_usize;
        for mut task in self.tasks.find_by_event(uuid).await? {
            if task.state() == BuildState::Deleted {
                continue;
            }
            task.delete(&*self.clock);
            self.tasks.update(&task).await?;
            deleted += 1;
        }

        let from = event.state();
        event.transition_to(BuildState::Deleted, &*self.clock)?;
        self.events.update(&event).await?;
        info!(event = %uuid, from = %from, tasks = deleted, "deleted event");

        Ok(stores.purge(uuid)?)
    }

    async fn load(&self, uuid: &EventUuid) -> EventLifecycleResult<Event> {
        self.events
            .find_by_uuid(uuid)
            .await?
            .ok_or_else(|| EventRepositoryError::NotFound(uuid.clone()).into())
    }
}

#[async_trait]
impl<E, R, C> TaskTransitionObserver for EventLifecycleService<E, R, C>
where
    E: EventRepository,
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    async fn task_transitioned(&self, task: &Task, from: BuildState) {
        let event = task.uuid().event_uuid();
        match self.refresh(&event).await {
            Ok(refreshed) => debug!(
                task = %task.uuid(),
                from = %from,
                to = %task.state(),
                event_state = %refreshed.state(),
                "refreshed event after task transition"
            ),
            Err(err) => warn!(
                task = %task.uuid(),
                event = %event,
                error = %err,
                "unable to refresh event after task transition"
            ),
        }
    }
}
