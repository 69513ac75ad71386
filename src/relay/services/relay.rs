//! Per-channel chunked write queue with drain notification.

use crate::relay::{
    domain::{ChannelId, Frame, QueueError},
    ports::TxScheduler,
};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, warn};

/// Callback fired once every channel has drained.
pub type DrainCallback = Box<dyn FnOnce() + Send>;

#[derive(Debug)]
struct QueueEntry {
    bytes: Vec<u8>,
    pos: usize,
}

#[derive(Debug, Default)]
struct ChannelQueue {
    entries: VecDeque<QueueEntry>,
    scheduled: bool,
    closed: bool,
}

/// Outbound relay queues for one connection.
pub struct StreamRelay<S>
where
    S: TxScheduler,
{
    scheduler: S,
    channels: BTreeMap<ChannelId, ChannelQueue>,
    drain_callbacks: Vec<DrainCallback>,
}

impl<S> StreamRelay<S>
where
    S: TxScheduler,
{
    /// Creates a relay with no channels.
    #[must_use]
    pub const fn new(scheduler: S) -> Self {
        Self {
            scheduler,
            channels: BTreeMap::new(),
            drain_callbacks: Vec::new(),
        }
    }

    /// Returns the transport scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Returns the transport scheduler mutably.
    pub const fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Copies `bytes` onto the tail of `channel`'s queue.
    ///
    /// A writable callback is requested unless one is already pending.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ChannelClosed`] when the channel was closed; the
    /// payload is dropped.
    pub fn enqueue(&mut self, channel: ChannelId, bytes: &[u8]) -> Result<(), QueueError> {
        let queue = self.channels.entry(channel).or_default();
        if queue.closed {
            warn!(channel = %channel, len = bytes.len(), "dropping payload for closed channel");
            return Err(QueueError::ChannelClosed(channel));
        }
        queue.entries.push_back(QueueEntry {
            bytes: bytes.to_vec(),
            pos: 0,
        });
        if !queue.scheduled {
            queue.scheduled = true;
            self.scheduler.request_writable(channel);
        }
        Ok(())
    }

    /// Produces the next chunk of `channel` for a transport able to take
    /// `buf_size` bytes.
    ///
    /// The first chunk of a message carries the start marker and the chunk
    /// that reaches its end carries the end marker; an empty message yields
    /// one frame with both. A buffer size of zero is treated as one. Another
    /// writable callback is requested while data remains, and the drain
    /// callbacks fire once every channel is empty.
    pub fn on_writable(&mut self, channel: ChannelId, buf_size: usize) -> Option<Frame> {
        let queue = self.channels.get_mut(&channel)?;
        queue.scheduled = false;
        let entry = queue.entries.front_mut()?;

        let first = entry.pos == 0;
        let remaining = entry.bytes.get(entry.pos..).unwrap_or_default();
        let take = remaining.len().min(buf_size.max(1));
        let bytes = remaining.get(..take).unwrap_or_default().to_vec();
        entry.pos += take;
        let last = entry.pos >= entry.bytes.len();
        if last {
            queue.entries.pop_front();
        }

        if !queue.entries.is_empty() {
            queue.scheduled = true;
            self.scheduler.request_writable(channel);
        }
        if self.is_drained() {
            self.fire_drained();
        }
        Some(Frame { bytes, first, last })
    }

    /// Registers a callback fired the first time every channel is empty.
    ///
    /// When every channel is already empty the callback runs before this
    /// method returns.
    pub fn on_drained_all(&mut self, callback: impl FnOnce() + Send + 'static) {
        if self.is_drained() {
            callback();
            return;
        }
        self.drain_callbacks.push(Box::new(callback));
    }

    /// Destroys `channel`'s queue, discarding undelivered entries.
    ///
    /// Later enqueues on the channel fail. Returns the number of entries
    /// discarded.
    pub fn close_channel(&mut self, channel: ChannelId) -> usize {
        let queue = self.channels.entry(channel).or_default();
        let discarded = queue.entries.len();
        queue.entries.clear();
        queue.scheduled = false;
        queue.closed = true;
        if discarded > 0 {
            warn!(channel = %channel, discarded, "discarded undelivered relay entries");
        } else {
            debug!(channel = %channel, "closed relay channel");
        }
        if self.is_drained() {
            self.fire_drained();
        }
        discarded
    }

    /// Makes `channel` usable on a fresh transport.
    ///
    /// A closed channel accepts enqueues again. Entries still queued are kept
    /// and one that was partly written restarts from its first byte, since
    /// the new transport never saw its start. Returns `true` when the channel
    /// had been closed.
    pub fn reopen_channel(&mut self, channel: ChannelId) -> bool {
        let queue = self.channels.entry(channel).or_default();
        let was_closed = queue.closed;
        queue.closed = false;
        if let Some(entry) = queue.entries.front_mut() {
            entry.pos = 0;
        }
        if !queue.entries.is_empty() && !queue.scheduled {
            queue.scheduled = true;
            self.scheduler.request_writable(channel);
        }
        debug!(channel = %channel, was_closed, pending = queue.entries.len(), "reopened relay channel");
        was_closed
    }

    /// Returns how many messages are queued on `channel`, including one
    /// partially sent.
    #[must_use]
    pub fn pending(&self, channel: ChannelId) -> usize {
        self.channels
            .get(&channel)
            .map_or(0, |queue| queue.entries.len())
    }

    /// Returns `true` when `channel` was closed.
    #[must_use]
    pub fn is_closed(&self, channel: ChannelId) -> bool {
        self.channels.get(&channel).is_some_and(|queue| queue.closed)
    }

    /// Returns `true` when every channel's queue is empty.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.channels.values().all(|queue| queue.entries.is_empty())
    }

    fn fire_drained(&mut self) {
        let callbacks = std::mem::take(&mut self.drain_callbacks);
        if !callbacks.is_empty() {
            debug!(count = callbacks.len(), "relay drained, notifying");
        }
        for callback in callbacks {
            callback();
        }
    }
}
