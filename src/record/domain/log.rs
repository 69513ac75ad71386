//! Append-only task log chunks.

use super::TaskUuid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical output channel of a task (for example stdout or stderr).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogChannel(u32);

impl LogChannel {
    /// Creates a channel number.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the channel number.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for LogChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status word carried by the last chunk of a channel.
///
/// Zero means the chunk is not the last. Any other value marks the end of
/// the channel and describes how the build ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FinishStatus(u32);

impl FinishStatus {
    /// Set when the build process exited; the low byte holds its status.
    pub const EXIT: u32 = 0x4000;
    /// Set when the build ended because of a cancellation.
    pub const CANCELLED: u32 = 0x2000;
    /// Set when the channel ended without an exit status.
    pub const CLOSED: u32 = 0x1000;

    /// Status for a chunk that is not the last one of its channel.
    #[must_use]
    pub const fn ongoing() -> Self {
        Self(0)
    }

    /// Status for the final chunk of a process that exited with `code`.
    #[must_use]
    pub fn exited(code: u8) -> Self {
        Self(Self::EXIT | u32::from(code))
    }

    /// Status for the final chunk of a cancelled build.
    #[must_use]
    pub const fn cancelled() -> Self {
        Self(Self::CANCELLED)
    }

    /// Status for the final chunk of a channel closed without exit status.
    #[must_use]
    pub const fn closed() -> Self {
        Self(Self::CLOSED)
    }

    /// Reconstructs a status word from storage.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw status word.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns `true` when this chunk is the last of its channel.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        self.0 != 0
    }

    /// Returns the process exit code when the status records one.
    #[must_use]
    pub fn exit_code(self) -> Option<u8> {
        if self.0 & Self::EXIT == 0 {
            return None;
        }
        u8::try_from(self.0 & 0xff).ok()
    }

    /// Returns `true` when the status records a cancellation.
    #[must_use]
    pub const fn is_cancelled(self) -> bool {
        self.0 & Self::CANCELLED != 0
    }
}

/// Immutable unit of task output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogChunk {
    /// Task that produced the output.
    pub task_uuid: TaskUuid,
    /// Store-assigned append sequence, unique per task.
    pub sequence: u64,
    /// Output channel.
    pub channel: LogChannel,
    /// Monotonic producer timestamp in microseconds.
    pub timestamp_us: u64,
    /// Raw output bytes.
    pub payload: Vec<u8>,
    /// End-of-channel marker and exit status.
    pub finished: FinishStatus,
}

impl LogChunk {
    /// Creates a chunk awaiting a store-assigned sequence.
    #[must_use]
    pub fn new(
        task_uuid: TaskUuid,
        channel: LogChannel,
        timestamp_us: u64,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            task_uuid,
            sequence: 0,
            channel,
            timestamp_us,
            payload: payload.into(),
            finished: FinishStatus::ongoing(),
        }
    }

    /// Marks this chunk as the last of its channel.
    #[must_use]
    pub const fn finishing(mut self, status: FinishStatus) -> Self {
        self.finished = status;
        self
    }
}
