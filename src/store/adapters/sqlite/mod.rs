//! `SQLite` adapters for per-event stores.

mod backend;
mod database;
mod models;
mod schema;

pub use backend::SqliteStoreBackend;
pub use database::SqliteEventDatabase;
