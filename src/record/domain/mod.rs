//! Domain model for persisted event records.

mod artifact;
mod error;
mod ids;
mod log;
mod task;

pub use artifact::{
    Artifact, DownloadNonce, NewArtifact, PersistedArtifactData, UploadNonce, content_digest,
};
pub use error::{IdentifierError, RecordError};
pub use ids::{EventUuid, TaskUuid};
pub use log::{FinishStatus, LogChannel, LogChunk};
pub use task::{NewTaskRecord, TaskRecord};
