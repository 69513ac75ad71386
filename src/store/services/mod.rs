//! Orchestration services for event stores.

mod cache;

pub use cache::{EventStoreCache, EventStoreHandle};
