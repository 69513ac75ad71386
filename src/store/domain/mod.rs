//! Domain model for event store caching.

mod error;
mod location;

pub use error::StoreError;
pub use location::{PurgeReport, StoreLocation, sanitize_event_id};

/// Snapshot of the store cache population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Cached stores, open whether or not in use.
    pub total: usize,
    /// Cached stores with a positive reference count.
    pub in_use: usize,
}
