//! In-memory event repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::lifecycle::{
    domain::Event,
    ports::{EventRepository, EventRepositoryError, EventRepositoryResult},
};
use crate::record::domain::EventUuid;

/// Thread-safe in-memory event repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventRepository {
    events: Arc<RwLock<HashMap<EventUuid, Event>>>,
}

impl InMemoryEventRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(err: impl std::fmt::Display) -> EventRepositoryError {
    EventRepositoryError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn store(&self, event: &Event) -> EventRepositoryResult<()> {
        let mut events = self.events.write().map_err(lock_error)?;
        if events.contains_key(event.uuid()) {
            return Err(EventRepositoryError::DuplicateEvent(event.uuid().clone()));
        }
        events.insert(event.uuid().clone(), event.clone());
        Ok(())
    }

    async fn update(&self, event: &Event) -> EventRepositoryResult<()> {
        let mut events = self.events.write().map_err(lock_error)?;
        let slot = events
            .get_mut(event.uuid())
            .ok_or_else(|| EventRepositoryError::NotFound(event.uuid().clone()))?;
        *slot = event.clone();
        Ok(())
    }

    async fn find_by_uuid(&self, uuid: &EventUuid) -> EventRepositoryResult<Option<Event>> {
        let events = self.events.read().map_err(lock_error)?;
        Ok(events.get(uuid).cloned())
    }
}
