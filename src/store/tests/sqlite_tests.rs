//! Tests for the `SQLite` store backend against real files.

use std::sync::Arc;
use std::time::Duration;

use crate::lifecycle::domain::{BuildState, Task};
use crate::record::{
    domain::{
        Artifact, EventUuid, FinishStatus, LogChannel, LogChunk, NewArtifact, NewTaskRecord,
    },
    ports::{EventRecords, RecordsError},
};
use crate::store::{
    adapters::sqlite::SqliteStoreBackend, domain::StoreError, services::EventStoreCache,
};
use crate::test_support::ManualClock;
use camino::Utf8PathBuf;
use eyre::{bail, ensure, eyre};
use rstest::rstest;
use tempfile::TempDir;

struct Harness {
    cache: EventStoreCache<SqliteStoreBackend, ManualClock>,
    clock: Arc<ManualClock>,
    _dir: TempDir,
}

fn harness() -> eyre::Result<Harness> {
    let dir = tempfile::tempdir()?;
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .map_err(|path| eyre!("non UTF-8 temp path {}", path.display()))?;
    let clock = Arc::new(ManualClock::new());
    Ok(Harness {
        cache: EventStoreCache::new(
            SqliteStoreBackend::new(),
            Arc::clone(&clock),
            root.join("kiln"),
            Duration::from_secs(60),
        ),
        clock,
        _dir: dir,
    })
}

#[rstest]
fn tasks_logs_and_artifacts_persist_across_reopen() -> eyre::Result<()> {
    let mut harness = harness()?;
    let event = EventUuid::new();
    let task = Task::new(
        &event,
        NewTaskRecord::new("linux-x86_64", "build", "cmake --build .")
            .with_packages(vec!["cmake".to_owned()])
            .with_artifact_names(vec!["kiln.tar.xz".to_owned()]),
        &*harness.clock,
    );
    let artifact = Artifact::new(
        NewArtifact {
            task_uuid: task.uuid().clone(),
            name: "kiln.tar.xz".to_owned(),
            len: 42,
            path: Utf8PathBuf::from("kiln.tar.xz"),
        },
        &*harness.clock,
    );

    let handle = harness.cache.acquire(&event, true)?;
    let records = handle.records();
    records.put_task(task.record())?;
    let first = records.append_log(LogChunk::new(
        task.uuid().clone(),
        LogChannel::new(1),
        10,
        b"configure\n".to_vec(),
    ))?;
    let last = records.append_log(
        LogChunk::new(task.uuid().clone(), LogChannel::new(1), 20, b"done\n".to_vec())
            .finishing(FinishStatus::exited(0)),
    )?;
    ensure!(first.sequence == 1 && last.sequence == 2);
    records.put_artifact(&artifact)?;
    records.update_artifact_offset(artifact.upload_nonce(), 16)?;
    harness.cache.release(handle);

    harness.clock.advance_secs(61);
    ensure!(harness.cache.sweep() == 1);

    let reopened = harness.cache.acquire(&event, false)?;
    let records = reopened.records();
    ensure!(records.task(task.uuid())?.as_ref() == Some(task.record()));
    ensure!(records.tasks()?.len() == 1);
    let logs = records.logs_for_task(task.uuid())?;
    ensure!(logs == vec![first, last]);
    let stored = records
        .artifact_by_download_nonce(artifact.download_nonce())?
        .ok_or_else(|| eyre!("artifact missing"))?;
    ensure!(stored.offset() == 16 && stored.resume_offset() == 16);
    ensure!(stored.upload_nonce() == artifact.upload_nonce());
    harness.cache.release(reopened);
    Ok(())
}

#[rstest]
fn duplicate_and_missing_rows_are_reported() -> eyre::Result<()> {
    let mut harness = harness()?;
    let event = EventUuid::new();
    let mut task = Task::new(&event, NewTaskRecord::new("linux", "t", "s"), &*harness.clock);
    let handle = harness.cache.acquire(&event, true)?;
    let records = handle.records();

    records.put_task(task.record())?;
    ensure!(matches!(
        records.put_task(task.record()),
        Err(RecordsError::DuplicateTask(_))
    ));

    task.assign("builder-a", &*harness.clock)?;
    records.update_task(task.record())?;
    let counts = records.task_state_counts()?;
    ensure!(counts.total == 1 && counts.succeeded == 0);
    ensure!(
        records.task(task.uuid())?.map(|row| row.state) == Some(BuildState::PassedToBuilder)
    );

    let stranger = Task::new(&event, NewTaskRecord::new("linux", "t", "s"), &*harness.clock);
    ensure!(matches!(
        records.update_task(stranger.record()),
        Err(RecordsError::TaskNotFound(_))
    ));
    ensure!(matches!(
        records.update_artifact_offset(&crate::record::domain::UploadNonce::generate(), 1),
        Err(RecordsError::ArtifactNotFound)
    ));
    harness.cache.release(handle);
    Ok(())
}

#[rstest]
fn purge_deletes_every_store_file() -> eyre::Result<()> {
    let mut harness = harness()?;
    let event = EventUuid::new();
    let location = harness.cache.location_for(&event);
    let handle = harness.cache.acquire(&event, true)?;
    ensure!(location.primary().exists());
    harness.cache.release(handle);

    harness.cache.purge(&event)?;
    for path in location.variants() {
        ensure!(!path.exists(), "{path} survived purge");
    }
    Ok(())
}

#[rstest]
fn unavailable_medium_fails_to_open() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let root = Utf8PathBuf::from_path_buf(dir.path().join("missing").join("kiln"))
        .map_err(|path| eyre!("non UTF-8 temp path {}", path.display()))?;
    let mut cache = EventStoreCache::new(
        SqliteStoreBackend::new(),
        Arc::new(ManualClock::new()),
        root,
        Duration::from_secs(60),
    );
    match cache.acquire(&EventUuid::new(), true) {
        Err(StoreError::Open { .. }) => Ok(()),
        other => bail!("expected Open error, got {other:?}"),
    }
}
