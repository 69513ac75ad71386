//! Domain model for coordination messages and builder capacity.

mod envelope;
mod error;
mod lease;
mod slots;

pub use envelope::{ArtifactChunk, CancelTask, Envelope, LogAppend, Rejection, TaskAccept, TaskOffer};
pub use error::{CoordinationError, CoordinationResult, EnvelopeError, LeaseError};
pub use lease::{LeaseOutcome, LeaseRequest, LeaseResponse, RequesterId};
pub use slots::{PlatformSlots, SlotClaim, SlotUsage};
