//! Port contracts for relay transports.

mod link;
mod scheduler;

pub use link::MessageLink;
pub use scheduler::TxScheduler;
