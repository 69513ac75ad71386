//! Multi-channel store-and-forward framed write queue.
//!
//! Each logical channel owns an ordered queue of opaque messages. The
//! transport pulls chunks of whatever size it can take whenever a channel is
//! writable, and every chunk carries start and end markers so the receiver
//! can rebuild whole messages. Channels drain independently; a stalled
//! channel never holds up another one.
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
