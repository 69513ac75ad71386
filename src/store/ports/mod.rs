//! Port contracts for event store backends.

pub mod backend;

pub use backend::StoreBackend;
