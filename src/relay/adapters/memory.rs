//! In-memory scheduler recording writable requests.

use crate::relay::{domain::ChannelId, ports::TxScheduler};
use std::collections::VecDeque;

/// Scheduler that queues writable requests for a caller-driven pump.
#[derive(Debug, Clone, Default)]
pub struct QueuedScheduler {
    requests: VecDeque<ChannelId>,
}

impl QueuedScheduler {
    /// Creates a scheduler with no outstanding requests.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the oldest outstanding request.
    pub fn next_request(&mut self) -> Option<ChannelId> {
        self.requests.pop_front()
    }

    /// Returns how many requests are outstanding.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.requests.len()
    }
}

impl TxScheduler for QueuedScheduler {
    fn request_writable(&mut self, channel: ChannelId) {
        self.requests.push_back(channel);
    }
}
