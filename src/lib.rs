//! Kiln: event-scoped persistence and delivery core for a distributed build
//! farm.
//!
//! A server coordinates builder agents. Each builder runs tasks for a
//! source-control event, writes task, log and artifact records into a
//! per-event store, relays log and artifact bytes back over reconnecting
//! links, and negotiates capacity and exclusive resources with its peers.
//!
//! # Architecture
//!
//! Kiln follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (SQLite, sockets, etc.)
//!
//! # Modules
//!
//! - [`record`]: Persisted record shapes (tasks, log chunks, artifacts)
//! - [`store`]: Reference-counted per-event store cache with idle eviction
//! - [`relay`]: Multi-channel store-and-forward framed write queue
//! - [`lifecycle`]: Event and task build state machine
//! - [`coordination`]: Rejection, cancellation and resource leasing
//! - [`config`]: Runtime configuration
//! - [`telemetry`]: Tracing subscriber installation

pub mod config;
pub mod coordination;
pub mod lifecycle;
pub mod record;
pub mod relay;
pub mod store;
pub mod telemetry;

#[cfg(test)]
mod test_support;
