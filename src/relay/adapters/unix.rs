//! Framed relay transport over Unix domain sockets.
//!
//! Every frame goes on the wire as a flag byte, a big-endian `u32` length
//! and the payload bytes.

use crate::relay::{
    domain::{ChannelId, Frame, RelayEndpoint, RelayError},
    ports::{MessageLink, TxScheduler},
    services::StreamRelay,
};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, warn};

/// Largest frame payload a reader accepts.
pub const MAX_FRAME_LEN: u32 = 1024 * 1024;

/// Writes frames to an async byte sink.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Wraps a byte sink.
    #[must_use]
    pub const fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Writes one frame and flushes it.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::TransportLost`] when the sink fails, or
    /// [`RelayError::Oversized`] when the frame exceeds [`MAX_FRAME_LEN`].
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), RelayError> {
        let len = u32::try_from(frame.bytes.len())
            .ok()
            .filter(|len| *len <= MAX_FRAME_LEN)
            .ok_or_else(|| RelayError::Oversized {
                len: u32::try_from(frame.bytes.len()).unwrap_or(u32::MAX),
                limit: MAX_FRAME_LEN,
            })?;
        self.inner
            .write_u8(frame.flags())
            .await
            .map_err(RelayError::transport_lost)?;
        self.inner
            .write_u32(len)
            .await
            .map_err(RelayError::transport_lost)?;
        self.inner
            .write_all(&frame.bytes)
            .await
            .map_err(RelayError::transport_lost)?;
        self.inner.flush().await.map_err(RelayError::transport_lost)
    }
}

/// Reads frames from an async byte source and rebuilds whole messages.
///
/// A message is delivered only once its end marker arrives; a connection
/// that drops mid-message loses the partial message.
#[derive(Debug)]
pub struct FrameReassembler<R> {
    inner: R,
    partial: Vec<u8>,
    in_message: bool,
}

impl<R> FrameReassembler<R>
where
    R: AsyncRead + Unpin,
{
    /// Wraps a byte source.
    #[must_use]
    pub const fn new(inner: R) -> Self {
        Self {
            inner,
            partial: Vec::new(),
            in_message: false,
        }
    }

    /// Reads one raw frame.
    ///
    /// Returns `None` on a clean end of stream at a frame boundary.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::TransportLost`] when the stream ends inside a
    /// frame, or [`RelayError::Oversized`] for frames above
    /// [`MAX_FRAME_LEN`].
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, RelayError> {
        let flags = match self.inner.read_u8().await {
            Ok(flags) => flags,
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(RelayError::transport_lost(err)),
        };
        let len = self
            .inner
            .read_u32()
            .await
            .map_err(RelayError::transport_lost)?;
        if len > MAX_FRAME_LEN {
            return Err(RelayError::Oversized {
                len,
                limit: MAX_FRAME_LEN,
            });
        }
        let mut bytes = vec![0_u8; usize::try_from(len).unwrap_or_default()];
        self.inner
            .read_exact(&mut bytes)
            .await
            .map_err(RelayError::transport_lost)?;
        Ok(Some(Frame::from_wire(flags, bytes)))
    }

    /// Reads frames until a whole message is available.
    ///
    /// Returns `None` when the stream ends cleanly between messages.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::TransportLost`] when the stream ends inside a
    /// message, or [`RelayError::Framing`] for a continuation that has no
    /// start.
    pub async fn next_message(&mut self) -> Result<Option<Vec<u8>>, RelayError> {
        loop {
            let Some(frame) = self.read_frame().await? else {
                if self.in_message {
                    let lost = self.partial.len();
                    self.reset();
                    warn!(lost, "relay stream ended inside a message");
                    return Err(RelayError::transport_lost(std::io::Error::from(
                        std::io::ErrorKind::UnexpectedEof,
                    )));
                }
                return Ok(None);
            };

            if frame.first {
                if self.in_message {
                    warn!(
                        dropped = self.partial.len(),
                        "relay message restarted before its end"
                    );
                }
                self.partial.clear();
                self.in_message = true;
            } else if !self.in_message {
                return Err(RelayError::Framing("continuation frame without a start"));
            }

            self.partial.extend_from_slice(&frame.bytes);
            if frame.last {
                self.in_message = false;
                return Ok(Some(std::mem::take(&mut self.partial)));
            }
        }
    }

    fn reset(&mut self) {
        self.partial.clear();
        self.in_message = false;
    }
}

/// Bidirectional framed link over a Unix domain socket.
#[derive(Debug)]
pub struct UnixRelayLink {
    reader: FrameReassembler<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
}

impl UnixRelayLink {
    /// Connects to the socket behind `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::TransportLost`] when the connection fails.
    pub async fn connect(endpoint: &RelayEndpoint) -> Result<Self, RelayError> {
        let stream = UnixStream::connect(endpoint.path())
            .await
            .map_err(RelayError::transport_lost)?;
        debug!(path = %endpoint.path(), "connected relay link");
        Ok(Self::from_stream(stream))
    }

    /// Wraps an already connected stream.
    #[must_use]
    pub fn from_stream(stream: UnixStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            reader: FrameReassembler::new(read),
            writer: FrameWriter::new(write),
        }
    }

    /// Sends one whole message as a single frame.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] when the write fails.
    pub async fn send_message(&mut self, payload: &[u8]) -> Result<(), RelayError> {
        self.writer.write_frame(&Frame::whole(payload)).await
    }

    /// Receives the next whole message.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] when the stream fails or ends mid-message.
    pub async fn next_message(&mut self) -> Result<Option<Vec<u8>>, RelayError> {
        self.reader.next_message().await
    }

    /// Writes every queued chunk of `channel` in frames of at most
    /// `buf_size` bytes.
    ///
    /// On a write failure the channel is closed and its undelivered entries
    /// discarded. Returns the number of frames written.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::TransportLost`] when the socket fails.
    pub async fn pump_channel<S>(
        &mut self,
        relay: &mut StreamRelay<S>,
        channel: ChannelId,
        buf_size: usize,
    ) -> Result<usize, RelayError>
    where
        S: TxScheduler,
    {
        pump(&mut self.writer, relay, channel, buf_size).await
    }
}

#[async_trait]
impl MessageLink for UnixRelayLink {
    async fn send(&mut self, payload: &[u8]) -> Result<(), RelayError> {
        self.send_message(payload).await
    }

    async fn receive(&mut self) -> Result<Option<Vec<u8>>, RelayError> {
        self.next_message().await
    }
}

/// Drains `channel` through `writer`, closing the channel if the writer
/// fails.
///
/// Frames never exceed [`MAX_FRAME_LEN`], whatever `buf_size` offers.
///
/// # Errors
///
/// Returns [`RelayError::TransportLost`] when the writer fails.
pub async fn pump<W, S>(
    writer: &mut FrameWriter<W>,
    relay: &mut StreamRelay<S>,
    channel: ChannelId,
    buf_size: usize,
) -> Result<usize, RelayError>
where
    W: AsyncWrite + Unpin,
    S: TxScheduler,
{
    let frame_budget = buf_size.min(usize::try_from(MAX_FRAME_LEN).unwrap_or(usize::MAX));
    let mut written = 0;
    while let Some(frame) = relay.on_writable(channel, frame_budget) {
        if let Err(err) = writer.write_frame(&frame).await {
            let discarded = relay.close_channel(channel);
            warn!(channel = %channel, discarded, error = %err, "relay transport lost");
            return Err(err);
        }
        written += 1;
    }
    Ok(written)
}
