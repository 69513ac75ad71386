//! Server-side bookkeeping of builder rejections.

use crate::coordination::domain::Rejection;
use crate::record::domain::TaskUuid;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use tracing::{debug, info, warn};

/// What the server should do about a rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionVerdict {
    /// Offer the task to this builder next.
    Reassign(String),
    /// Every connected builder has rejected the task; it stays waiting.
    Exhausted,
    /// The rejection is stale or repeated and was ignored.
    Ignored,
}

#[derive(Debug, Default)]
struct Assignment {
    builder: String,
    rejected_by: BTreeSet<String>,
}

/// Tracks which builder each offered task was sent to and who declined it.
///
/// Reassignment is round-robin over builder names in sorted order, starting
/// after the builder that rejected and skipping every builder that already
/// rejected the same task.
#[derive(Debug, Default)]
pub struct RejectionLedger {
    builders: BTreeSet<String>,
    assignments: HashMap<TaskUuid, Assignment>,
}

impl RejectionLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connected builder.
    pub fn register_builder(&mut self, name: impl Into<String>) {
        self.builders.insert(name.into());
    }

    /// Removes a disconnected builder from future reassignment.
    pub fn unregister_builder(&mut self, name: &str) {
        self.builders.remove(name);
    }

    /// Records that `task` was offered to `builder`.
    pub fn offered(&mut self, task: TaskUuid, builder: impl Into<String>) {
        let entry = self.assignments.entry(task).or_default();
        entry.builder = builder.into();
    }

    /// Returns the builder `task` is currently offered to.
    #[must_use]
    pub fn current_builder(&self, task: &TaskUuid) -> Option<&str> {
        self.assignments
            .get(task)
            .map(|assignment| assignment.builder.as_str())
    }

    /// Forgets a task that was accepted or ended.
    pub fn settle(&mut self, task: &TaskUuid) {
        self.assignments.remove(task);
    }

    /// Applies a rejection sent by `builder`.
    ///
    /// Rejections for unknown tasks, from a builder the task is no longer
    /// offered to, or repeated by the same builder are ignored.
    pub fn record(&mut self, builder: &str, rejection: &Rejection) -> RejectionVerdict {
        let task = &rejection.task_uuid;
        let Some(assignment) = self.assignments.get_mut(task) else {
            debug!(task = %task, builder, "ignoring rejection for unknown task");
            return RejectionVerdict::Ignored;
        };
        if assignment.builder != builder || !assignment.rejected_by.insert(builder.to_owned()) {
            debug!(task = %task, builder, "ignoring stale rejection");
            return RejectionVerdict::Ignored;
        }

        info!(
            task = %task,
            builder,
            platform = %rejection.platform,
            ongoing = rejection.ongoing,
            limit = rejection.limit,
            "builder saturated"
        );

        let after = self
            .builders
            .range::<str, _>((Bound::Excluded(builder), Bound::Unbounded));
        let wrapped = self
            .builders
            .range::<str, _>((Bound::Unbounded, Bound::Included(builder)));
        let next = after
            .chain(wrapped)
            .find(|candidate| !assignment.rejected_by.contains(*candidate))
            .cloned();

        match next {
            Some(name) => {
                assignment.builder.clone_from(&name);
                RejectionVerdict::Reassign(name)
            }
            None => {
                warn!(task = %task, "every builder rejected task, leaving it waiting");
                self.assignments.remove(task);
                RejectionVerdict::Exhausted
            }
        }
    }
}
