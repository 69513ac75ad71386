//! Port contracts for reading and writing event records.

pub mod records;

pub use records::{EventRecords, RecordsError, RecordsResult};
