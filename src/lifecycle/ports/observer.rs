//! Hook notified whenever a task changes state.

use crate::lifecycle::domain::{BuildState, Task};
use async_trait::async_trait;

/// Receives every persisted task transition.
///
/// Observers run after the task is stored and cannot veto it; they report
/// their own failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskTransitionObserver: Send + Sync {
    /// Called once `task` moved out of `from`.
    async fn task_transitioned(&self, task: &Task, from: BuildState);
}
