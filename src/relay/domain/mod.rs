//! Domain model for relay channels and frames.

mod endpoint;
mod error;
mod frame;

pub use endpoint::RelayEndpoint;
pub use error::{QueueError, RelayError};
pub use frame::{ChannelId, Frame};
