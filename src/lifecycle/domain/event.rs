//! Event aggregate: one source-control trigger owning a set of tasks.

use super::{BuildState, LifecycleDomainError, TaskStateCounts};
use crate::record::domain::EventUuid;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Source-control coordinates of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSource {
    /// Repository name.
    pub repo_name: String,
    /// Git ref that changed.
    pub git_ref: String,
    /// Commit hash the ref points at.
    pub hash: String,
    /// Address the trigger came from.
    pub source_ip: String,
}

/// One source-control trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    uuid: EventUuid,
    source: EventSource,
    state: BuildState,
    created: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl Event {
    /// Creates a waiting event for a trigger.
    #[must_use]
    pub fn new(source: EventSource, clock: &impl Clock) -> Self {
        let now = clock.utc();
        Self {
            uuid: EventUuid::new(),
            source,
            state: BuildState::Waiting,
            created: now,
            last_updated: now,
        }
    }

    /// Returns the event identifier.
    #[must_use]
    pub const fn uuid(&self) -> &EventUuid {
        &self.uuid
    }

    /// Returns the source-control coordinates.
    #[must_use]
    pub const fn source(&self) -> &EventSource {
        &self.source
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> BuildState {
        self.state
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Applies a validated state transition.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleDomainError::InvalidEventTransition`] when the
    /// transition is not permitted.
    pub fn transition_to(
        &mut self,
        to: BuildState,
        clock: &impl Clock,
    ) -> Result<(), LifecycleDomainError> {
        if !self.state.can_transition_to(to) {
            return Err(LifecycleDomainError::InvalidEventTransition {
                event_uuid: self.uuid.clone(),
                from: self.state,
                to,
            });
        }
        self.state = to;
        self.last_updated = clock.utc();
        Ok(())
    }

    /// Derives an event state from per-state task counts.
    ///
    /// All tasks succeeded gives success, all failed gives failure, some
    /// failed gives being-built-has-failures, anything else is being built.
    #[must_use]
    pub const fn derive_state(counts: TaskStateCounts) -> BuildState {
        counts.event_state()
    }

    /// Recomputes the event state from its tasks' outcomes.
    ///
    /// Terminal events are left untouched. Returns `true` when the state
    /// changed.
    pub fn refresh_from_counts(&mut self, counts: TaskStateCounts, clock: &impl Clock) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        let derived = Self::derive_state(counts);
        if derived == self.state {
            return false;
        }
        self.state = derived;
        self.last_updated = clock.utc();
        true
    }
}
