//! Port contracts for lifecycle persistence.
//!
//! Ports define infrastructure-agnostic interfaces used by lifecycle
//! services.

pub mod event_repository;
pub mod observer;
pub mod repository;

pub use event_repository::{EventRepository, EventRepositoryError, EventRepositoryResult};
pub use observer::TaskTransitionObserver;
#[cfg(test)]
pub use observer::MockTaskTransitionObserver;
pub use repository::{TaskRepository, TaskRepositoryError, TaskRepositoryResult};
