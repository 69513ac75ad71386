//! Reference-counted, lazily opened per-event stores.
//!
//! Every build event owns one relational store file. Stores are opened on
//! first use, shared by every task of the event through a reference count,
//! and closed only after they have sat idle for a grace window so that bursts
//! of tasks do not thrash open and close. The module follows hexagonal
//! architecture:
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
