//! Diesel schema for the per-event `SQLite` tables.

diesel::table! {
    /// Tasks of one build event.
    tasks (uid) {
        /// Insertion-ordered row identifier.
        uid -> BigInt,
        /// Task identifier.
        uuid -> Text,
        /// Host platform.
        platform -> Text,
        /// Task name.
        taskname -> Text,
        /// Serialized build script.
        build_script -> Text,
        /// JSON array of package names.
        packages -> Text,
        /// JSON array of expected artifact names.
        artifact_names -> Text,
        /// Assigned builder.
        builder -> Nullable<Text>,
        /// Numeric build state.
        state -> Integer,
        /// Start time in microseconds since the epoch.
        started -> Nullable<BigInt>,
        /// Build duration in milliseconds.
        duration_ms -> Nullable<BigInt>,
        /// Last update in microseconds since the epoch.
        last_updated -> BigInt,
    }
}

diesel::table! {
    /// Log chunks of every task in the event.
    logs (uid) {
        /// Insertion-ordered row identifier.
        uid -> BigInt,
        /// Owning task.
        task_uuid -> Text,
        /// Per-task append sequence.
        seq -> BigInt,
        /// Output channel.
        channel -> BigInt,
        /// Capture time in microseconds.
        timestamp_us -> BigInt,
        /// Finish status word.
        finished -> BigInt,
        /// Raw chunk bytes.
        payload -> Binary,
    }
}

diesel::table! {
    /// Artifacts registered by tasks of the event.
    artifacts (uid) {
        /// Insertion-ordered row identifier.
        uid -> BigInt,
        /// Producing task.
        task_uuid -> Text,
        /// Artifact name.
        name -> Text,
        /// Upload capability.
        upload_nonce -> Text,
        /// Download capability.
        download_nonce -> Text,
        /// Declared length in bytes.
        len -> BigInt,
        /// Bytes transferred so far.
        transferred -> BigInt,
        /// Backing file path.
        path -> Text,
        /// Registration time in microseconds since the epoch.
        created_at -> BigInt,
    }
}

diesel::allow_tables_to_appear_in_same_query!(tasks, logs, artifacts);

/// DDL creating the `tasks` table.
pub const CREATE_TASKS: &str = concat!(
    "CREATE TABLE IF NOT EXISTS tasks (",
    "uid INTEGER PRIMARY KEY AUTOINCREMENT, ",
    "uuid TEXT NOT NULL UNIQUE, ",
    "platform TEXT NOT NULL, ",
    "taskname TEXT NOT NULL, ",
    "build_script TEXT NOT NULL, ",
    "packages TEXT NOT NULL, ",
    "artifact_names TEXT NOT NULL, ",
    "builder TEXT, ",
    "state INTEGER NOT NULL, ",
    "started BIGINT, ",
    "duration_ms BIGINT, ",
    "last_updated BIGINT NOT NULL);",
);

/// Pragma switching the store to write-ahead journaling.
pub const JOURNAL_MODE_WAL: &str = "PRAGMA journal_mode=WAL;";

/// DDL creating the `logs` table.
pub const CREATE_LOGS: &str = concat!(
    "CREATE TABLE IF NOT EXISTS logs (",
    "uid INTEGER PRIMARY KEY AUTOINCREMENT, ",
    "task_uuid TEXT NOT NULL, ",
    "seq BIGINT NOT NULL, ",
    "channel BIGINT NOT NULL, ",
    "timestamp_us BIGINT NOT NULL, ",
    "finished BIGINT NOT NULL, ",
    "payload BLOB NOT NULL, ",
    "UNIQUE (task_uuid, seq));",
);

/// DDL creating the `artifacts` table.
pub const CREATE_ARTIFACTS: &str = concat!(
    "CREATE TABLE IF NOT EXISTS artifacts (",
    "uid INTEGER PRIMARY KEY AUTOINCREMENT, ",
    "task_uuid TEXT NOT NULL, ",
    "name TEXT NOT NULL, ",
    "upload_nonce TEXT NOT NULL UNIQUE, ",
    "download_nonce TEXT NOT NULL UNIQUE, ",
    "len BIGINT NOT NULL, ",
    "transferred BIGINT NOT NULL, ",
    "path TEXT NOT NULL, ",
    "created_at BIGINT NOT NULL);",
);
