//! Backend port that opens, provisions, closes and deletes store files.

use crate::record::ports::EventRecords;
use crate::store::domain::{PurgeReport, StoreError, StoreLocation};
use std::sync::Arc;

/// Storage medium behind the event store cache.
pub trait StoreBackend {
    /// Open database type yielded for each event.
    type Database: EventRecords + 'static;

    /// Opens the store at `location`, creating it when `create` is set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Open`] when the medium is unavailable or the
    /// store is missing and `create` is unset.
    fn open(&self, location: &StoreLocation, create: bool) -> Result<Self::Database, StoreError>;

    /// Creates the task, log and artifact tables if absent and switches the
    /// store to write-ahead journaling.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Schema`] naming the step that failed.
    fn provision(&self, location: &StoreLocation, db: &Self::Database) -> Result<(), StoreError>;

    /// Closes an open database.
    fn close(&self, db: Arc<Self::Database>);

    /// Deletes every file variant of the store, best effort.
    fn remove(&self, location: &StoreLocation) -> PurgeReport;
}
