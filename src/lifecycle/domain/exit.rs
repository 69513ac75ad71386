//! Mapping of build process exit notifications to task outcomes.

use super::BuildState;
use crate::record::domain::FinishStatus;
use serde::{Deserialize, Serialize};

/// How a spawned build process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessExit {
    /// The process exited with a status code.
    Exited {
        /// Exit status.
        code: i32,
    },
    /// The process was terminated by a signal.
    Signalled {
        /// Signal number.
        signal: i32,
    },
    /// The process exceeded its time budget and was reaped.
    TimedOut,
}

impl ProcessExit {
    /// Terminal task state for this exit.
    ///
    /// A clean exit is `Success`; anything else is `Fail`, except a process
    /// killed because its task was cancelled, which is `Cancelled`.
    #[must_use]
    pub const fn terminal_state(self, cancel_requested: bool) -> BuildState {
        match self {
            Self::Exited { code: 0 } => BuildState::Success,
            Self::Signalled { .. } if cancel_requested => BuildState::Cancelled,
            Self::Exited { .. } | Self::Signalled { .. } | Self::TimedOut => BuildState::Fail,
        }
    }

    /// Status word for the final log chunk of the task.
    #[must_use]
    pub fn finish_status(self, cancel_requested: bool) -> FinishStatus {
        match self {
            Self::Signalled { .. } if cancel_requested => FinishStatus::cancelled(),
            Self::Exited { code } => FinishStatus::exited(u8::try_from(code & 0xff).unwrap_or(u8::MAX)),
            Self::Signalled { .. } | Self::TimedOut => FinishStatus::closed(),
        }
    }
}
