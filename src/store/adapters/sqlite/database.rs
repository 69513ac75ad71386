//! `SQLite` implementation of the event record contract.

use super::{
    models::{ArtifactRow, LogRow, NewLogRow, TaskRow, TaskValues},
    schema::{artifacts, logs, tasks},
};
use crate::lifecycle::domain::{BuildState, TaskStateCounts};
use crate::record::{
    domain::{
        Artifact, DownloadNonce, FinishStatus, LogChannel, LogChunk, PersistedArtifactData,
        TaskRecord, TaskUuid, UploadNonce,
    },
    ports::{EventRecords, RecordsError, RecordsResult},
};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::SqliteConnection;
use std::sync::{Mutex, MutexGuard};

/// One open per-event `SQLite` database.
pub struct SqliteEventDatabase {
    connection: Mutex<SqliteConnection>,
}

impl SqliteEventDatabase {
    pub(super) const fn new(connection: SqliteConnection) -> Self {
        Self {
            connection: Mutex::new(connection),
        }
    }

    pub(super) fn lock(&self) -> RecordsResult<MutexGuard<'_, SqliteConnection>> {
        self.connection
            .lock()
            .map_err(|err| RecordsError::persistence(std::io::Error::other(err.to_string())))
    }
}

impl std::fmt::Debug for SqliteEventDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEventDatabase").finish_non_exhaustive()
    }
}

impl EventRecords for SqliteEventDatabase {
    fn put_task(&self, task: &TaskRecord) -> RecordsResult<()> {
        let values = to_task_values(task)?;
        let mut connection = self.lock()?;
        diesel::insert_into(tasks::table)
            .values(&values)
            .execute(&mut *connection)
            .map_err(|err| match err {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    RecordsError::DuplicateTask(task.uuid.clone())
                }
                _ => RecordsError::persistence(err),
            })?;
        Ok(())
    }

    fn update_task(&self, task: &TaskRecord) -> RecordsResult<()> {
        let values = to_task_values(task)?;
        let mut connection = self.lock()?;
        let updated = diesel::update(tasks::table.filter(tasks::uuid.eq(task.uuid.as_str())))
            .set(&values)
            .execute(&mut *connection)
            .map_err(RecordsError::persistence)?;
        if updated == 0 {
            return Err(RecordsError::TaskNotFound(task.uuid.clone()));
        }
        Ok(())
    }

    fn task(&self, uuid: &TaskUuid) -> RecordsResult<Option<TaskRecord>> {
        let mut connection = self.lock()?;
        let row = tasks::table
            .filter(tasks::uuid.eq(uuid.as_str()))
            .select(TaskRow::as_select())
            .first::<TaskRow>(&mut *connection)
            .optional()
            .map_err(RecordsError::persistence)?;
        row.map(row_to_task).transpose()
    }

    fn tasks(&self) -> RecordsResult<Vec<TaskRecord>> {
        let mut connection = self.lock()?;
        tasks::table
            .order(tasks::uid.asc())
            .select(TaskRow::as_select())
            .load::<TaskRow>(&mut *connection)
            .map_err(RecordsError::persistence)?
            .into_iter()
            .map(row_to_task)
            .collect()
    }

    fn clear_task_output(&self, uuid: &TaskUuid) -> RecordsResult<()> {
        let mut connection = self.lock()?;
        connection
            .transaction::<_, DieselError, _>(|conn| {
                diesel::delete(logs::table.filter(logs::task_uuid.eq(uuid.as_str())))
                    .execute(conn)?;
                diesel::delete(artifacts::table.filter(artifacts::task_uuid.eq(uuid.as_str())))
                    .execute(conn)?;
                Ok(())
            })
            .map_err(RecordsError::persistence)
    }

    fn append_log(&self, chunk: LogChunk) -> RecordsResult<LogChunk> {
        let mut row = NewLogRow {
            task_uuid: chunk.task_uuid.as_str().to_owned(),
            seq: 0,
            channel: i64::from(chunk.channel.value()),
            timestamp_us: i64::try_from(chunk.timestamp_us).map_err(RecordsError::persistence)?,
            finished: i64::from(chunk.finished.raw()),
            payload: chunk.payload.clone(),
        };
        let mut connection = self.lock()?;
        let sequence = connection
            .transaction::<_, DieselError, _>(|conn| {
                let finishers = logs::table
                    .filter(logs::task_uuid.eq(&row.task_uuid))
                    .filter(logs::channel.eq(row.channel))
                    .filter(logs::finished.ne(0))
                    .count()
                    .get_result::<i64>(conn)?;
                if finishers > 0 {
                    return Ok(None);
                }
                let last = logs::table
                    .filter(logs::task_uuid.eq(&row.task_uuid))
                    .select(diesel::dsl::max(logs::seq))
                    .first::<Option<i64>>(conn)?;
                row.seq = last.unwrap_or(0) + 1;
                diesel::insert_into(logs::table).values(&row).execute(conn)?;
                Ok(Some(row.seq))
            })
            .map_err(RecordsError::persistence)?;
        let Some(sequence) = sequence else {
            return Err(RecordsError::ChannelFinished {
                task: chunk.task_uuid,
                channel: chunk.channel,
            });
        };
        Ok(LogChunk {
            sequence: u64::try_from(sequence).map_err(RecordsError::persistence)?,
            ..chunk
        })
    }

    fn logs_for_task(&self, uuid: &TaskUuid) -> RecordsResult<Vec<LogChunk>> {
        let mut connection = self.lock()?;
        logs::table
            .filter(logs::task_uuid.eq(uuid.as_str()))
            .order(logs::seq.asc())
            .select(LogRow::as_select())
            .load::<LogRow>(&mut *connection)
            .map_err(RecordsError::persistence)?
            .into_iter()
            .map(row_to_chunk)
            .collect()
    }

    fn put_artifact(&self, artifact: &Artifact) -> RecordsResult<()> {
        let row = to_artifact_row(artifact)?;
        let mut connection = self.lock()?;
        diesel::insert_into(artifacts::table)
            .values(&row)
            .execute(&mut *connection)
            .map_err(RecordsError::persistence)?;
        Ok(())
    }

    fn artifact_by_upload_nonce(&self, nonce: &UploadNonce) -> RecordsResult<Option<Artifact>> {
        let mut connection = self.lock()?;
        let row = artifacts::table
            .filter(artifacts::upload_nonce.eq(nonce.as_str()))
            .select(ArtifactRow::as_select())
            .first::<ArtifactRow>(&mut *connection)
            .optional()
            .map_err(RecordsError::persistence)?;
        row.map(row_to_artifact).transpose()
    }

    fn artifact_by_download_nonce(
        &self,
        nonce: &DownloadNonce,
    ) -> RecordsResult<Option<Artifact>> {
        let mut connection = self.lock()?;
        let row = artifacts::table
            .filter(artifacts::download_nonce.eq(nonce.as_str()))
            .select(ArtifactRow::as_select())
            .first::<ArtifactRow>(&mut *connection)
            .optional()
            .map_err(RecordsError::persistence)?;
        row.map(row_to_artifact).transpose()
    }

    fn update_artifact_offset(&self, nonce: &UploadNonce, offset: u64) -> RecordsResult<()> {
        let transferred = i64::try_from(offset).map_err(RecordsError::persistence)?;
        let mut connection = self.lock()?;
        let updated =
            diesel::update(artifacts::table.filter(artifacts::upload_nonce.eq(nonce.as_str())))
                .set(artifacts::transferred.eq(transferred))
                .execute(&mut *connection)
                .map_err(RecordsError::persistence)?;
        if updated == 0 {
            return Err(RecordsError::ArtifactNotFound);
        }
        Ok(())
    }

    fn task_state_counts(&self) -> RecordsResult<TaskStateCounts> {
        let mut connection = self.lock()?;
        let codes = tasks::table
            .select(tasks::state)
            .load::<i32>(&mut *connection)
            .map_err(RecordsError::persistence)?;
        let states = codes
            .into_iter()
            .map(|code| BuildState::from_code(code).map_err(RecordsError::persistence))
            .collect::<RecordsResult<Vec<_>>>()?;
        Ok(TaskStateCounts::tally(states))
    }
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(micros: i64) -> RecordsResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(|| {
        RecordsError::persistence(std::io::Error::other(format!(
            "timestamp out of range: {micros}"
        )))
    })
}

fn to_task_values(task: &TaskRecord) -> RecordsResult<TaskValues> {
    let packages = serde_json::to_string(&task.packages).map_err(RecordsError::persistence)?;
    let artifact_names =
        serde_json::to_string(&task.artifact_names).map_err(RecordsError::persistence)?;
    let duration_ms = task
        .duration_ms
        .map(i64::try_from)
        .transpose()
        .map_err(RecordsError::persistence)?;

    Ok(TaskValues {
        uuid: task.uuid.as_str().to_owned(),
        platform: task.platform.clone(),
        taskname: task.taskname.clone(),
        build_script: task.build_script.clone(),
        packages,
        artifact_names,
        builder: task.builder.clone(),
        state: task.state.code(),
        started: task.started.map(to_micros),
        duration_ms,
        last_updated: to_micros(task.last_updated),
    })
}

fn row_to_task(row: TaskRow) -> RecordsResult<TaskRecord> {
    let TaskRow {
        uuid,
        platform,
        taskname,
        build_script,
        packages,
        artifact_names,
        builder,
        state,
        started,
        duration_ms,
        last_updated,
    } = row;

    Ok(TaskRecord {
        uuid: TaskUuid::parse(&uuid).map_err(RecordsError::persistence)?,
        platform,
        taskname,
        build_script,
        packages: serde_json::from_str(&packages).map_err(RecordsError::persistence)?,
        artifact_names: serde_json::from_str(&artifact_names)
            .map_err(RecordsError::persistence)?,
        builder,
        state: BuildState::from_code(state).map_err(RecordsError::persistence)?,
        started: started.map(from_micros).transpose()?,
        duration_ms: duration_ms
            .map(u64::try_from)
            .transpose()
            .map_err(RecordsError::persistence)?,
        last_updated: from_micros(last_updated)?,
    })
}

fn row_to_chunk(row: LogRow) -> RecordsResult<LogChunk> {
    Ok(LogChunk {
        task_uuid: TaskUuid::parse(&row.task_uuid).map_err(RecordsError::persistence)?,
        sequence: u64::try_from(row.seq).map_err(RecordsError::persistence)?,
        channel: LogChannel::new(u32::try_from(row.channel).map_err(RecordsError::persistence)?),
        timestamp_us: u64::try_from(row.timestamp_us).map_err(RecordsError::persistence)?,
        payload: row.payload,
        finished: FinishStatus::from_raw(
            u32::try_from(row.finished).map_err(RecordsError::persistence)?,
        ),
    })
}

fn to_artifact_row(artifact: &Artifact) -> RecordsResult<ArtifactRow> {
    Ok(ArtifactRow {
        task_uuid: artifact.task_uuid().as_str().to_owned(),
        name: artifact.name().to_owned(),
        upload_nonce: artifact.upload_nonce().as_str().to_owned(),
        download_nonce: artifact.download_nonce().as_str().to_owned(),
        len: i64::try_from(artifact.len()).map_err(RecordsError::persistence)?,
        transferred: i64::try_from(artifact.offset()).map_err(RecordsError::persistence)?,
        path: artifact.path().to_string(),
        created_at: to_micros(artifact.created_at()),
    })
}

fn row_to_artifact(row: ArtifactRow) -> RecordsResult<Artifact> {
    Ok(Artifact::from_persisted(PersistedArtifactData {
        task_uuid: TaskUuid::parse(&row.task_uuid).map_err(RecordsError::persistence)?,
        name: row.name,
        upload_nonce: UploadNonce::parse(&row.upload_nonce).map_err(RecordsError::persistence)?,
        download_nonce: DownloadNonce::parse(&row.download_nonce)
            .map_err(RecordsError::persistence)?,
        len: u64::try_from(row.len).map_err(RecordsError::persistence)?,
        offset: u64::try_from(row.transferred).map_err(RecordsError::persistence)?,
        path: Utf8PathBuf::from(row.path),
        created_at: from_micros(row.created_at)?,
    }))
}
