//! Build state machine shared by events and tasks.

use super::ParseBuildStateError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an event or task.
///
/// Numeric codes are the values stored in `state` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    /// Waiting for a builder.
    Waiting,
    /// Offered to a builder that accepted it.
    PassedToBuilder,
    /// Executing on a builder.
    BeingBuilt,
    /// Finished successfully.
    Success,
    /// Finished with a failure.
    Fail,
    /// Aborted by a cancellation.
    Cancelled,
    /// Still building, and at least one sibling task has failed.
    BeingBuiltHasFailures,
    /// Purged along with its store.
    Deleted,
}

impl BuildState {
    /// Every state, in storage-code order.
    pub const ALL: [Self; 8] = [
        Self::Waiting,
        Self::PassedToBuilder,
        Self::BeingBuilt,
        Self::Success,
        Self::Fail,
        Self::Cancelled,
        Self::BeingBuiltHasFailures,
        Self::Deleted,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::PassedToBuilder => "passed_to_builder",
            Self::BeingBuilt => "being_built",
            Self::Success => "success",
            Self::Fail => "fail",
            Self::Cancelled => "cancelled",
            Self::BeingBuiltHasFailures => "being_built_has_failures",
            Self::Deleted => "deleted",
        }
    }

    /// Returns the numeric storage code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Waiting => 0,
            Self::PassedToBuilder => 1,
            Self::BeingBuilt => 2,
            Self::Success => 3,
            Self::Fail => 4,
            Self::Cancelled => 5,
            Self::BeingBuiltHasFailures => 6,
            Self::Deleted => 7,
        }
    }

    /// Parses a numeric storage code.
    ///
    /// # Errors
    ///
    /// Returns [`ParseBuildStateError`] for codes outside `0..=7`.
    pub fn from_code(code: i32) -> Result<Self, ParseBuildStateError> {
        Self::ALL
            .into_iter()
            .find(|state| state.code() == code)
            .ok_or_else(|| ParseBuildStateError(code.to_string()))
    }

    /// Returns `true` for states no further work can leave.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Fail | Self::Cancelled | Self::Deleted
        )
    }

    /// Returns `true` when `self -> to` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        match (self, to) {
            (_, Self::Deleted) => true,
            (Self::Waiting, Self::PassedToBuilder)
            | (Self::PassedToBuilder, Self::BeingBuilt)
            | (
                Self::BeingBuilt,
                Self::Success | Self::Fail | Self::BeingBuiltHasFailures,
            ) => true,
            (from, Self::Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for BuildState {
    type Error = ParseBuildStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| ParseBuildStateError(value.to_owned()))
    }
}

/// Task outcome counts for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskStateCounts {
    /// Number of tasks attached to the event.
    pub total: u64,
    /// Tasks that finished successfully.
    pub succeeded: u64,
    /// Tasks that finished with a failure.
    pub failed: u64,
}

impl TaskStateCounts {
    /// Tallies the states of an event's tasks.
    #[must_use]
    pub fn tally(states: impl IntoIterator<Item = BuildState>) -> Self {
        states
            .into_iter()
            .fold(Self::default(), |mut counts, state| {
                counts.total += 1;
                match state {
                    BuildState::Success => counts.succeeded += 1,
                    BuildState::Fail => counts.failed += 1,
                    _ => {}
                }
                counts
            })
    }

    /// Derives the aggregate event state from task outcomes.
    ///
    /// All succeeded gives `Success`, all failed gives `Fail`, any failure
    /// gives `BeingBuiltHasFailures`, and anything else is `BeingBuilt`.
    #[must_use]
    pub const fn event_state(self) -> BuildState {
        if self.total == 0 {
            return BuildState::BeingBuilt;
        }
        if self.succeeded == self.total {
            return BuildState::Success;
        }
        if self.failed == self.total {
            return BuildState::Fail;
        }
        if self.failed > 0 {
            return BuildState::BeingBuiltHasFailures;
        }
        BuildState::BeingBuilt
    }
}
