//! One event's store from its first task through to purge.

use std::sync::Arc;
use std::time::Duration;

use crate::test_helpers::{StepClock, utf8_tempdir};
use eyre::{Result, bail, ensure};
use kiln::lifecycle::{
    adapters::store::RecordsTaskRepository, domain::BuildState, services::TaskLifecycleService,
};
use kiln::record::{
    domain::{EventUuid, FinishStatus, LogChannel, LogChunk, NewTaskRecord},
    ports::EventRecords,
};
use kiln::store::{adapters::sqlite::SqliteStoreBackend, services::EventStoreCache};
use rstest::rstest;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn task_runs_to_success_then_store_is_swept_and_purged() -> Result<()> {
    let (_dir, root) = utf8_tempdir()?;
    let clock = Arc::new(StepClock::new());
    let mut cache = EventStoreCache::new(
        SqliteStoreBackend::new(),
        Arc::clone(&clock),
        root.join("farm"),
        Duration::from_secs(60),
    );
    let event = EventUuid::new();
    let handle = cache.acquire(&event, true)?;
    let lifecycle = TaskLifecycleService::new(
        Arc::new(RecordsTaskRepository::new(event.clone(), handle.shared())),
        Arc::clone(&clock),
    );

    let task = lifecycle
        .create(&event, NewTaskRecord::new("linux-x86_64", "build", "make"))
        .await?;
    let uuid = task.uuid().clone();
    lifecycle.accept(&uuid, "builder-a").await?;
    lifecycle.start(&uuid).await?;

    let stdout = LogChannel::new(0);
    handle
        .records()
        .append_log(LogChunk::new(uuid.clone(), stdout, 1, "Building...\n"))?;
    handle.records().append_log(
        LogChunk::new(uuid.clone(), stdout, 2, "Done.\n").finishing(FinishStatus::exited(0)),
    )?;
    let finished = lifecycle.complete(&uuid, BuildState::Success).await?;
    ensure!(finished.state() == BuildState::Success);
    ensure!(lifecycle.event_state(&event).await? == BuildState::Success);

    let logs = handle.records().logs_for_task(&uuid)?;
    let payloads: Vec<&[u8]> = logs.iter().map(|chunk| chunk.payload.as_slice()).collect();
    ensure!(payloads == vec![b"Building...\n".as_slice(), b"Done.\n".as_slice()]);
    let finished_flags: Vec<bool> = logs
        .iter()
        .map(|chunk| chunk.finished.is_finished())
        .collect();
    ensure!(finished_flags == vec![false, true]);

    let location = cache.location_for(&event);
    drop(lifecycle);
    cache.release(handle);
    ensure!(cache.refcount(&event) == Some(0));

    clock.advance_secs(30);
    ensure!(cache.sweep() == 0, "store closed inside the grace window");
    clock.advance_secs(31);
    ensure!(cache.sweep() == 1);
    ensure!(!cache.is_cached(&event));

    let report = cache.purge(&event)?;
    ensure!(report.removed.iter().any(|path| path == location.primary()));
    for variant in location.variants() {
        if variant.exists() {
            bail!("{variant} survived the purge");
        }
    }
    Ok(())
}

#[rstest]
fn concurrent_acquires_balance_out() -> Result<()> {
    let (_dir, root) = utf8_tempdir()?;
    let clock = Arc::new(StepClock::new());
    let mut cache = EventStoreCache::new(
        SqliteStoreBackend::new(),
        Arc::clone(&clock),
        root.join("farm"),
        Duration::from_secs(60),
    );
    let event = EventUuid::new();

    let handles = (0..4)
        .map(|_| cache.acquire(&event, true))
        .collect::<Result<Vec<_>, _>>()?;
    ensure!(cache.refcount(&event) == Some(4));
    ensure!(cache.stats().total == 1);
    for handle in handles {
        cache.release(handle);
    }

    ensure!(cache.refcount(&event) == Some(0));
    ensure!(cache.is_cached(&event), "closed before the grace window elapsed");
    clock.advance_secs(61);
    ensure!(cache.sweep() == 1);
    ensure!(cache.stats().total == 0);
    Ok(())
}
