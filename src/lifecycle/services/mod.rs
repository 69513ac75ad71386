//! Service layer for event and task lifecycle orchestration.

mod event;
mod lifecycle;

pub use event::{EventLifecycleError, EventLifecycleResult, EventLifecycleService};
pub use lifecycle::{TaskLifecycleError, TaskLifecycleResult, TaskLifecycleService};
