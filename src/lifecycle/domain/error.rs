//! Error types for lifecycle transitions and state parsing.

use super::BuildState;
use crate::record::domain::{EventUuid, TaskUuid};
use thiserror::Error;

/// Errors returned by lifecycle aggregates.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleDomainError {
    /// The requested task state transition is not permitted.
    #[error("invalid state transition for task {task_uuid}: {from} -> {to}")]
    InvalidStateTransition {
        /// Task being transitioned.
        task_uuid: TaskUuid,
        /// Current state.
        from: BuildState,
        /// Requested state.
        to: BuildState,
    },

    /// The requested event state transition is not permitted.
    #[error("invalid state transition for event {event_uuid}: {from} -> {to}")]
    InvalidEventTransition {
        /// Event being transitioned.
        event_uuid: EventUuid,
        /// Current state.
        from: BuildState,
        /// Requested state.
        to: BuildState,
    },

    /// A finished task cannot be reset from this state.
    #[error("task {task_uuid} cannot be reset from {state}")]
    NotResettable {
        /// Task being reset.
        task_uuid: TaskUuid,
        /// Current state.
        state: BuildState,
    },

    /// A completion was reported with a non-terminal state.
    #[error("{0} is not a completion state")]
    NotACompletion(BuildState),
}

/// Error returned while parsing build states from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown build state: {0}")]
pub struct ParseBuildStateError(pub String);
