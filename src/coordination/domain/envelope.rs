//! Schema-tagged messages carried over relay channels.

use super::{EnvelopeError, LeaseRequest, LeaseResponse};
use crate::record::domain::{FinishStatus, LogChannel, LogChunk, TaskRecord, TaskUuid, UploadNonce};
use serde::{Deserialize, Serialize};

/// One coordination message, serialized as `{"schema": "<tag>", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "schema")]
pub enum Envelope {
    /// Server offers a waiting task to a builder.
    #[serde(rename = "kiln.task.offer")]
    TaskOffer(TaskOffer),
    /// Builder took an offered task.
    #[serde(rename = "kiln.task.accept")]
    TaskAccept(TaskAccept),
    /// Builder appends task output.
    #[serde(rename = "kiln.log")]
    Log(LogAppend),
    /// Builder uploads part of an artifact.
    #[serde(rename = "kiln.artifact")]
    Artifact(ArtifactChunk),
    /// Builder declined an offered task.
    #[serde(rename = "kiln.task.reject")]
    Rejection(Rejection),
    /// Server cancels a task wherever it runs.
    #[serde(rename = "kiln.task.cancel")]
    Cancel(CancelTask),
    /// Requester asks for a lease on a shared resource.
    #[serde(rename = "kiln.resource.request")]
    LeaseRequest(LeaseRequest),
    /// Authority answers a lease request.
    #[serde(rename = "kiln.resource.response")]
    LeaseResponse(LeaseResponse),
}

impl Envelope {
    /// Returns the schema tag of this message.
    #[must_use]
    pub const fn schema(&self) -> &'static str {
        match self {
            Self::TaskOffer(_) => "kiln.task.offer",
            Self::TaskAccept(_) => "kiln.task.accept",
            Self::Log(_) => "kiln.log",
            Self::Artifact(_) => "kiln.artifact",
            Self::Rejection(_) => "kiln.task.reject",
            Self::Cancel(_) => "kiln.task.cancel",
            Self::LeaseRequest(_) => "kiln.resource.request",
            Self::LeaseResponse(_) => "kiln.resource.response",
        }
    }

    /// Serializes the message to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] when serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(EnvelopeError::from)
    }

    /// Parses a message from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] for malformed JSON or an unknown schema tag.
    pub fn from_json(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(EnvelopeError::from)
    }
}

/// Offer of a waiting task to a builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOffer {
    /// The task as stored by the server.
    pub task: TaskRecord,
}

/// Acknowledgement that a builder took a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAccept {
    /// Accepted task.
    pub task_uuid: TaskUuid,
    /// Name of the accepting builder.
    pub builder: String,
}

/// Chunk of task output sent by a builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogAppend {
    /// Producing task.
    pub task_uuid: TaskUuid,
    /// Output channel.
    pub channel: LogChannel,
    /// Producer timestamp in microseconds.
    pub timestamp_us: u64,
    /// End-of-channel status word.
    pub finished: FinishStatus,
    /// Output bytes, hex-encoded on the wire.
    #[serde(with = "hex::serde")]
    pub payload: Vec<u8>,
}

impl From<&LogChunk> for LogAppend {
    fn from(chunk: &LogChunk) -> Self {
        Self {
            task_uuid: chunk.task_uuid.clone(),
            channel: chunk.channel,
            timestamp_us: chunk.timestamp_us,
            finished: chunk.finished,
            payload: chunk.payload.clone(),
        }
    }
}

impl From<LogAppend> for LogChunk {
    fn from(append: LogAppend) -> Self {
        Self::new(
            append.task_uuid,
            append.channel,
            append.timestamp_us,
            append.payload,
        )
        .finishing(append.finished)
    }
}

/// Part of an artifact upload.
///
/// Every chunk repeats the artifact's name and declared length so the
/// receiver can register the upload from whichever chunk it sees first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactChunk {
    /// Producing task.
    pub task_uuid: TaskUuid,
    /// Artifact file name.
    pub name: String,
    /// Declared total length in bytes.
    pub len: u64,
    /// Capability authorizing the upload.
    pub upload_nonce: UploadNonce,
    /// Byte offset the chunk starts at.
    pub offset: u64,
    /// Chunk bytes, hex-encoded on the wire.
    #[serde(with = "hex::serde")]
    pub data: Vec<u8>,
}

/// Refusal of an offered task by a saturated builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Platform whose slots are exhausted.
    pub platform: String,
    /// Rejected task.
    pub task_uuid: TaskUuid,
    /// Builds running on the platform when the offer arrived.
    pub ongoing: u32,
    /// Configured concurrency limit of the platform.
    pub limit: u32,
}

/// Broadcast asking every builder to abort a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTask {
    /// Task to abort.
    pub task_uuid: TaskUuid,
}
