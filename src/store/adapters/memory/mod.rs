//! In-memory store backend for tests and ephemeral deployments.

mod backend;
mod database;

pub use backend::MemoryStoreBackend;
pub use database::MemoryEventDatabase;
