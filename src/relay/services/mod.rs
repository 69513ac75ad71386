//! Relay queue services.

mod relay;

pub use relay::{DrainCallback, StreamRelay};
