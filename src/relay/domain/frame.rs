//! Channel identifiers and transport frames.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one logical relay channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(u32);

impl ChannelId {
    /// Creates a channel identifier.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the numeric identifier.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One transport write: a slice of a message with its framing markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Bytes carried by this write.
    pub bytes: Vec<u8>,
    /// Set on the first write of a message.
    pub first: bool,
    /// Set on the write that completes a message.
    pub last: bool,
}

impl Frame {
    /// Flag bit marking the start of a message.
    pub const FIRST: u8 = 0x01;
    /// Flag bit marking the end of a message.
    pub const LAST: u8 = 0x02;

    /// Wraps a whole message in a single frame.
    #[must_use]
    pub fn whole(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            first: true,
            last: true,
        }
    }

    /// Returns the wire flag byte.
    #[must_use]
    pub const fn flags(&self) -> u8 {
        let first = if self.first { Self::FIRST } else { 0 };
        let last = if self.last { Self::LAST } else { 0 };
        first | last
    }

    /// Rebuilds a frame from its wire flag byte and payload.
    #[must_use]
    pub const fn from_wire(flags: u8, bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            first: flags & Self::FIRST != 0,
            last: flags & Self::LAST != 0,
        }
    }
}
