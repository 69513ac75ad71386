//! Adapter implementations of relay transports.

pub mod memory;
pub mod unix;
