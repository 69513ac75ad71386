//! Persisted shape of a task row.

use super::TaskUuid;
use crate::lifecycle::domain::BuildState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parameter object describing a task when it is first attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTaskRecord {
    /// Host platform the task must build on.
    pub platform: String,
    /// Human-readable task name.
    pub taskname: String,
    /// Serialized build script.
    pub build_script: String,
    /// Packages the build environment needs.
    pub packages: Vec<String>,
    /// Names of artifacts the build is expected to produce.
    pub artifact_names: Vec<String>,
}

impl NewTaskRecord {
    /// Creates a task description with an empty package and artifact list.
    #[must_use]
    pub fn new(
        platform: impl Into<String>,
        taskname: impl Into<String>,
        build_script: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            taskname: taskname.into(),
            build_script: build_script.into(),
            packages: Vec::new(),
            artifact_names: Vec::new(),
        }
    }

    /// Sets the package list.
    #[must_use]
    pub fn with_packages(mut self, packages: impl IntoIterator<Item = String>) -> Self {
        self.packages = packages.into_iter().collect();
        self
    }

    /// Sets the expected artifact names.
    #[must_use]
    pub fn with_artifact_names(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.artifact_names = names.into_iter().collect();
        self
    }
}

/// One row of the per-event `tasks` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task identifier; the leading half is the owning event.
    pub uuid: TaskUuid,
    /// Host platform the task builds on.
    pub platform: String,
    /// Human-readable task name.
    pub taskname: String,
    /// Serialized build script.
    pub build_script: String,
    /// Packages the build environment needs.
    pub packages: Vec<String>,
    /// Names of artifacts the build is expected to produce.
    pub artifact_names: Vec<String>,
    /// Builder the task is assigned to, if any.
    pub builder: Option<String>,
    /// Current lifecycle state.
    pub state: BuildState,
    /// When execution started.
    pub started: Option<DateTime<Utc>>,
    /// Wall-clock build duration in milliseconds, once finished.
    pub duration_ms: Option<u64>,
    /// Timestamp of the latest state change.
    pub last_updated: DateTime<Utc>,
}
