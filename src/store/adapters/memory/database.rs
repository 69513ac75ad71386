//! In-memory implementation of the event record contract.

use crate::lifecycle::domain::TaskStateCounts;
use crate::record::{
    domain::{Artifact, DownloadNonce, LogChunk, TaskRecord, TaskUuid, UploadNonce},
    ports::{EventRecords, RecordsError, RecordsResult},
};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub(super) struct MemoryRecords {
    tasks: Vec<TaskRecord>,
    logs: Vec<LogChunk>,
    artifacts: Vec<Artifact>,
}

/// Thread-safe in-memory event database.
///
/// Databases opened on the same location share their records, so a store
/// closed and reopened keeps its contents until purged.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventDatabase {
    records: Arc<RwLock<MemoryRecords>>,
}

impl MemoryEventDatabase {
    pub(super) const fn shared(records: Arc<RwLock<MemoryRecords>>) -> Self {
        Self { records }
    }

    fn read(&self) -> RecordsResult<RwLockReadGuard<'_, MemoryRecords>> {
        self.records
            .read()
            .map_err(|err| RecordsError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> RecordsResult<RwLockWriteGuard<'_, MemoryRecords>> {
        self.records
            .write()
            .map_err(|err| RecordsError::persistence(std::io::Error::other(err.to_string())))
    }
}

impl EventRecords for MemoryEventDatabase {
    fn put_task(&self, task: &TaskRecord) -> RecordsResult<()> {
        let mut records = self.write()?;
        if records.tasks.iter().any(|row| row.uuid == task.uuid) {
            return Err(RecordsError::DuplicateTask(task.uuid.clone()));
        }
        records.tasks.push(task.clone());
        Ok(())
    }

    fn update_task(&self, task: &TaskRecord) -> RecordsResult<()> {
        let mut records = self.write()?;
        let row = records
            .tasks
            .iter_mut()
            .find(|row| row.uuid == task.uuid)
            .ok_or_else(|| RecordsError::TaskNotFound(task.uuid.clone()))?;
        *row = task.clone();
        Ok(())
    }

    fn task(&self, uuid: &TaskUuid) -> RecordsResult<Option<TaskRecord>> {
        let records = self.read()?;
        Ok(records.tasks.iter().find(|row| &row.uuid == uuid).cloned())
    }

    fn tasks(&self) -> RecordsResult<Vec<TaskRecord>> {
        Ok(self.read()?.tasks.clone())
    }

    fn clear_task_output(&self, uuid: &TaskUuid) -> RecordsResult<()> {
        let mut records = self.write()?;
        records.logs.retain(|chunk| &chunk.task_uuid != uuid);
        records.artifacts.retain(|artifact| artifact.task_uuid() != uuid);
        Ok(())
    }

    fn append_log(&self, chunk: LogChunk) -> RecordsResult<LogChunk> {
        let mut records = self.write()?;
        let task_logs: Vec<&LogChunk> = records
            .logs
            .iter()
            .filter(|row| row.task_uuid == chunk.task_uuid)
            .collect();
        if task_logs
            .iter()
            .any(|row| row.channel == chunk.channel && row.finished.is_finished())
        {
            return Err(RecordsError::ChannelFinished {
                task: chunk.task_uuid,
                channel: chunk.channel,
            });
        }
        let last = task_logs.iter().map(|row| row.sequence).max().unwrap_or(0);
        let stored = LogChunk {
            sequence: last + 1,
            ..chunk
        };
        records.logs.push(stored.clone());
        Ok(stored)
    }

    fn logs_for_task(&self, uuid: &TaskUuid) -> RecordsResult<Vec<LogChunk>> {
        let records = self.read()?;
        Ok(records
            .logs
            .iter()
            .filter(|chunk| &chunk.task_uuid == uuid)
            .cloned()
            .collect())
    }

    fn put_artifact(&self, artifact: &Artifact) -> RecordsResult<()> {
        self.write()?.artifacts.push(artifact.clone());
        Ok(())
    }

    fn artifact_by_upload_nonce(&self, nonce: &UploadNonce) -> RecordsResult<Option<Artifact>> {
        let records = self.read()?;
        Ok(records
            .artifacts
            .iter()
            .find(|artifact| artifact.upload_nonce() == nonce)
            .cloned())
    }

    fn artifact_by_download_nonce(
        &self,
        nonce: &DownloadNonce,
    ) -> RecordsResult<Option<Artifact>> {
        let records = self.read()?;
        Ok(records
            .artifacts
            .iter()
            .find(|artifact| artifact.download_nonce() == nonce)
            .cloned())
    }

    fn update_artifact_offset(&self, nonce: &UploadNonce, offset: u64) -> RecordsResult<()> {
        let mut records = self.write()?;
        let artifact = records
            .artifacts
            .iter_mut()
            .find(|artifact| artifact.upload_nonce() == nonce)
            .ok_or(RecordsError::ArtifactNotFound)?;
        artifact.set_offset(offset);
        Ok(())
    }

    fn task_state_counts(&self) -> RecordsResult<TaskStateCounts> {
        let records = self.read()?;
        Ok(TaskStateCounts::tally(
            records.tasks.iter().map(|task| task.state),
        ))
    }
}
