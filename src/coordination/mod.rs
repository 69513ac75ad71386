//! Coordination between the server, builders and resource requesters.
//!
//! Every message exchanged over a relay channel is a schema-tagged JSON
//! [`domain::Envelope`]. Builders admit or reject task offers against their
//! per-platform limits and act on cancel broadcasts; the server tracks
//! rejections and hands leases on shared resources to requesters.
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
