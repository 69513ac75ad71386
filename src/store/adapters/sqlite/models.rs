//! Diesel row models for event store tables.

use super::schema::{artifacts, logs, tasks};
use diesel::prelude::*;

/// Query result row for tasks.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TaskRow {
    /// Task identifier.
    pub uuid: String,
    /// Host platform.
    pub platform: String,
    /// Task name.
    pub taskname: String,
    /// Serialized build script.
    pub build_script: String,
    /// JSON package list.
    pub packages: String,
    /// JSON artifact name list.
    pub artifact_names: String,
    /// Assigned builder.
    pub builder: Option<String>,
    /// Numeric build state.
    pub state: i32,
    /// Start time in microseconds.
    pub started: Option<i64>,
    /// Duration in milliseconds.
    pub duration_ms: Option<i64>,
    /// Last update in microseconds.
    pub last_updated: i64,
}

/// Insert and update model for tasks.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = tasks)]
#[diesel(treat_none_as_null = true)]
pub struct TaskValues {
    /// Task identifier.
    pub uuid: String,
    /// Host platform.
    pub platform: String,
    /// Task name.
    pub taskname: String,
    /// Serialized build script.
    pub build_script: String,
    /// JSON package list.
    pub packages: String,
    /// JSON artifact name list.
    pub artifact_names: String,
    /// Assigned builder.
    pub builder: Option<String>,
    /// Numeric build state.
    pub state: i32,
    /// Start time in microseconds.
    pub started: Option<i64>,
    /// Duration in milliseconds.
    pub duration_ms: Option<i64>,
    /// Last update in microseconds.
    pub last_updated: i64,
}

/// Query result row for log chunks.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = logs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LogRow {
    /// Owning task.
    pub task_uuid: String,
    /// Append sequence.
    pub seq: i64,
    /// Output channel.
    pub channel: i64,
    /// Capture time in microseconds.
    pub timestamp_us: i64,
    /// Finish status word.
    pub finished: i64,
    /// Chunk bytes.
    pub payload: Vec<u8>,
}

/// Insert model for log chunks.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = logs)]
pub struct NewLogRow {
    /// Owning task.
    pub task_uuid: String,
    /// Append sequence.
    pub seq: i64,
    /// Output channel.
    pub channel: i64,
    /// Capture time in microseconds.
    pub timestamp_us: i64,
    /// Finish status word.
    pub finished: i64,
    /// Chunk bytes.
    pub payload: Vec<u8>,
}

/// Query and insert model for artifacts.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = artifacts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ArtifactRow {
    /// Producing task.
    pub task_uuid: String,
    /// Artifact name.
    pub name: String,
    /// Upload capability.
    pub upload_nonce: String,
    /// Download capability.
    pub download_nonce: String,
    /// Declared length.
    pub len: i64,
    /// Bytes transferred.
    pub transferred: i64,
    /// Backing file path.
    pub path: String,
    /// Registration time in microseconds.
    pub created_at: i64,
}
