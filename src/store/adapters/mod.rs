//! Adapter implementations of the store backend port.

pub mod blob;
pub mod memory;
pub mod sqlite;
