//! Domain model for the build lifecycle.

mod error;
mod event;
mod exit;
mod state;
mod task;

pub use error::{LifecycleDomainError, ParseBuildStateError};
pub use event::{Event, EventSource};
pub use exit::ProcessExit;
pub use state::{BuildState, TaskStateCounts};
pub use task::Task;
