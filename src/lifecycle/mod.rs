//! Event and task build lifecycle.
//!
//! Events advance from `Waiting` through builder assignment and execution to
//! a terminal outcome. Completed tasks are immutable except for deletion; an
//! illegal transition is rejected and reported rather than applied. The
//! module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
