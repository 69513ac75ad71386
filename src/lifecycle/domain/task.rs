//! Task aggregate root.

use super::{BuildState, LifecycleDomainError};
use crate::record::domain::{EventUuid, NewTaskRecord, TaskRecord, TaskUuid};
use chrono::{DateTime, Utc};
use mockable::Clock;

/// One platform-specific build attempt belonging to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    record: TaskRecord,
}

impl Task {
    /// Creates a waiting task attached to `event`.
    #[must_use]
    pub fn new(event: &EventUuid, params: NewTaskRecord, clock: &impl Clock) -> Self {
        Self {
            record: TaskRecord {
                uuid: TaskUuid::new_for_event(event),
                platform: params.platform,
                taskname: params.taskname,
                build_script: params.build_script,
                packages: params.packages,
                artifact_names: params.artifact_names,
                builder: None,
                state: BuildState::Waiting,
                started: None,
                duration_ms: None,
                last_updated: clock.utc(),
            },
        }
    }

    /// Reconstructs a task from its stored row.
    #[must_use]
    pub const fn from_record(record: TaskRecord) -> Self {
        Self { record }
    }

    /// Returns the stored row.
    #[must_use]
    pub const fn record(&self) -> &TaskRecord {
        &self.record
    }

    /// Consumes the aggregate, returning its stored row.
    #[must_use]
    pub fn into_record(self) -> TaskRecord {
        self.record
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn uuid(&self) -> &TaskUuid {
        &self.record.uuid
    }

    /// Returns the host platform.
    #[must_use]
    pub fn platform(&self) -> &str {
        &self.record.platform
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> BuildState {
        self.record.state
    }

    /// Returns the assigned builder, if any.
    #[must_use]
    pub fn builder(&self) -> Option<&str> {
        self.record.builder.as_deref()
    }

    /// Returns when execution started.
    #[must_use]
    pub const fn started(&self) -> Option<DateTime<Utc>> {
        self.record.started
    }

    /// Returns the build duration in milliseconds once finished.
    #[must_use]
    pub const fn duration_ms(&self) -> Option<u64> {
        self.record.duration_ms
    }

    /// Returns the latest state-change timestamp.
    #[must_use]
    pub const fn last_updated(&self) -> DateTime<Utc> {
        self.record.last_updated
    }

    /// Applies a validated state transition.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleDomainError::InvalidStateTransition`] when the
    /// transition is not permitted; the task is left unchanged.
    pub fn transition_to(
        &mut self,
        to: BuildState,
        clock: &impl Clock,
    ) -> Result<(), LifecycleDomainError> {
        let from = self.record.state;
        if !from.can_transition_to(to) {
            return Err(LifecycleDomainError::InvalidStateTransition {
                task_uuid: self.record.uuid.clone(),
                from,
                to,
            });
        }
        self.record.state = to;
        self.record.last_updated = clock.utc();
        Ok(())
    }

    /// Records that `builder` accepted the task.
    ///
    /// # Errors
    ///
    /// Returns a transition error unless the task is waiting.
    pub fn assign(
        &mut self,
        builder: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), LifecycleDomainError> {
        self.transition_to(BuildState::PassedToBuilder, clock)?;
        self.record.builder = Some(builder.into());
        Ok(())
    }

    /// Records that execution began.
    ///
    /// # Errors
    ///
    /// Returns a transition error unless the task was passed to a builder.
    pub fn start(&mut self, clock: &impl Clock) -> Result<(), LifecycleDomainError> {
        self.transition_to(BuildState::BeingBuilt, clock)?;
        self.record.started = Some(self.record.last_updated);
        Ok(())
    }

    /// Records the build outcome and its duration.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleDomainError::NotACompletion`] when `outcome` is not
    /// a completion state, or a transition error unless the task is being
    /// built.
    pub fn complete(
        &mut self,
        outcome: BuildState,
        clock: &impl Clock,
    ) -> Result<(), LifecycleDomainError> {
        if !matches!(
            outcome,
            BuildState::Success | BuildState::Fail | BuildState::BeingBuiltHasFailures
        ) {
            return Err(LifecycleDomainError::NotACompletion(outcome));
        }
        self.transition_to(outcome, clock)?;
        self.record_duration();
        Ok(())
    }

    /// Applies a cancellation.
    ///
    /// Cancelling a task that is already terminal is a no-op. Returns `true`
    /// when the task state changed.
    pub fn cancel(&mut self, clock: &impl Clock) -> bool {
        if self.record.state.is_terminal() {
            return false;
        }
        self.record.state = BuildState::Cancelled;
        self.record.last_updated = clock.utc();
        self.record_duration();
        true
    }

    /// Marks the task deleted.
    pub fn delete(&mut self, clock: &impl Clock) {
        self.record.state = BuildState::Deleted;
        self.record.last_updated = clock.utc();
    }

    /// Returns a finished task to waiting so it can be rebuilt, discarding
    /// builder assignment and timing.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleDomainError::NotResettable`] unless the task has
    /// finished and was not deleted.
    pub fn reset(&mut self, clock: &impl Clock) -> Result<(), LifecycleDomainError> {
        let state = self.record.state;
        if !state.is_terminal() || state == BuildState::Deleted {
            return Err(LifecycleDomainError::NotResettable {
                task_uuid: self.record.uuid.clone(),
                state,
            });
        }
        self.record.builder = None;
        self.record.state = BuildState::Waiting;
        self.record.started = None;
        self.record.duration_ms = None;
        self.record.last_updated = clock.utc();
        Ok(())
    }

    fn record_duration(&mut self) {
        if let Some(started) = self.record.started {
            let elapsed = self.record.last_updated.signed_duration_since(started);
            self.record.duration_ms = u64::try_from(elapsed.num_milliseconds()).ok();
        }
    }
}
