//! Transport hook asked to schedule writable callbacks.

use crate::relay::domain::ChannelId;

/// Transport side of a relay.
///
/// The relay calls [`TxScheduler::request_writable`] whenever a channel has
/// data and no send is already pending; the transport later answers with
/// [`crate::relay::services::StreamRelay::on_writable`].
pub trait TxScheduler {
    /// Asks for a writable callback on `channel`.
    fn request_writable(&mut self, channel: ChannelId);
}
