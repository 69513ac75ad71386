//! Adapter implementations of coordination ports.

#[cfg(unix)]
pub mod signal;
