//! In-memory lifecycle adapters.

mod event;
mod task;

pub use event::InMemoryEventRepository;
pub use task::InMemoryTaskRepository;
