//! Error types for relay queueing and transport.

use super::ChannelId;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned when queueing onto a channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The channel's connection was destroyed.
    #[error("relay channel {0} is closed")]
    ChannelClosed(ChannelId),
}

/// Errors returned by relay transports.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// Queueing failed.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The connection dropped; undelivered payloads were discarded.
    #[error("relay transport lost: {0}")]
    TransportLost(Arc<std::io::Error>),

    /// The peer sent a frame that does not fit the framing rules.
    #[error("relay framing violation: {0}")]
    Framing(&'static str),

    /// The peer announced a frame larger than the receiver accepts.
    #[error("relay frame of {len} bytes exceeds limit of {limit}")]
    Oversized {
        /// Announced length.
        len: u32,
        /// Accepted maximum.
        limit: u32,
    },
}

impl RelayError {
    /// Wraps an I/O failure as a lost transport.
    #[must_use]
    pub fn transport_lost(err: std::io::Error) -> Self {
        Self::TransportLost(Arc::new(err))
    }
}
