//! Whole-message link between two relay endpoints.

use crate::relay::domain::RelayError;
use async_trait::async_trait;

/// Bidirectional link delivering messages whole.
#[async_trait]
pub trait MessageLink: Send {
    /// Sends one message.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] when the transport fails.
    async fn send(&mut self, payload: &[u8]) -> Result<(), RelayError>;

    /// Receives the next message, or `None` once the peer has gone away.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] when the transport fails mid-message.
    async fn receive(&mut self) -> Result<Option<Vec<u8>>, RelayError>;
}
