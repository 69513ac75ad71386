//! Outbound coordination channel of a builder.

use crate::coordination::domain::{CoordinationResult, Envelope};
use crate::relay::{
    adapters::unix::{FrameWriter, pump},
    domain::{ChannelId, RelayError},
    ports::TxScheduler,
    services::StreamRelay,
};
use tokio::io::AsyncWrite;
use tracing::{debug, info};

/// Queues envelopes on a relay channel and writes them out in frames.
pub struct Uplink<S, W>
where
    S: TxScheduler,
{
    relay: StreamRelay<S>,
    writer: FrameWriter<W>,
    channel: ChannelId,
    frame_size: usize,
}

impl<S, W> Uplink<S, W>
where
    S: TxScheduler,
    W: AsyncWrite + Unpin,
{
    /// Creates an uplink writing `channel` through `writer` in frames of at
    /// most `frame_size` bytes.
    #[must_use]
    pub const fn new(
        relay: StreamRelay<S>,
        writer: FrameWriter<W>,
        channel: ChannelId,
        frame_size: usize,
    ) -> Self {
        Self {
            relay,
            writer,
            channel,
            frame_size,
        }
    }

    /// Queues one envelope.
    ///
    /// # Errors
    ///
    /// Returns [`crate::coordination::domain::CoordinationError`] when the
    /// envelope cannot be encoded or the channel was closed.
    pub fn send(&mut self, envelope: &Envelope) -> CoordinationResult<()> {
        let payload = envelope.to_json()?;
        debug!(schema = envelope.schema(), len = payload.len(), "queued envelope");
        self.relay.enqueue(self.channel, &payload)?;
        Ok(())
    }

    /// Writes every queued envelope out. Returns the number of frames written.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::TransportLost`] when the writer fails; the
    /// channel is closed and its queue discarded.
    pub async fn flush(&mut self) -> Result<usize, RelayError> {
        pump(&mut self.writer, &mut self.relay, self.channel, self.frame_size).await
    }

    /// Switches the uplink onto a new connection after the previous one was
    /// lost.
    ///
    /// The channel is reopened, so envelopes can be queued again; anything
    /// still pending is written to the new connection on the next flush.
    /// Returns the number of envelopes carried over.
    pub fn reconnect(&mut self, writer: FrameWriter<W>) -> usize {
        self.writer = writer;
        let was_closed = self.relay.reopen_channel(self.channel);
        let pending = self.relay.pending(self.channel);
        info!(channel = %self.channel, was_closed, pending, "uplink reconnected");
        pending
    }

    /// Returns the relay queue.
    #[must_use]
    pub const fn relay(&self) -> &StreamRelay<S> {
        &self.relay
    }

    /// Returns the relay queue for callback registration.
    pub const fn relay_mut(&mut self) -> &mut StreamRelay<S> {
        &mut self.relay
    }

    /// Returns the channel envelopes travel on.
    #[must_use]
    pub const fn channel(&self) -> ChannelId {
        self.channel
    }
}
