//! Records persisted inside each event store.
//!
//! Every event owns one relational store holding three tables: tasks keyed by
//! task UUID, log chunks keyed by task UUID and sequence, and artifacts keyed
//! by task UUID and upload nonce. This module defines those record shapes and
//! the [`ports::EventRecords`] contract that store adapters implement.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]

pub mod domain;
pub mod ports;

#[cfg(test)]
mod tests;
