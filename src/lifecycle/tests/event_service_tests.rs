//! Event aggregate tests: state follows task transitions, deletion purges.

use std::sync::Arc;
use std::time::Duration;

use crate::lifecycle::{
    adapters::memory::{InMemoryEventRepository, InMemoryTaskRepository},
    domain::{BuildState, Event, EventSource},
    ports::{MockTaskTransitionObserver, TaskRepository, TaskTransitionObserver},
    services::{EventLifecycleError, EventLifecycleService, TaskLifecycleService},
};
use crate::record::domain::{EventUuid, NewTaskRecord, TaskUuid};
use crate::store::{
    adapters::memory::MemoryStoreBackend, domain::StoreError, services::EventStoreCache,
};
use crate::test_support::ManualClock;
use eyre::{Result, ensure, eyre};
use rstest::{fixture, rstest};

type Events = EventLifecycleService<InMemoryEventRepository, InMemoryTaskRepository, ManualClock>;

struct Harness {
    events: Arc<Events>,
    tasks: TaskLifecycleService<InMemoryTaskRepository, ManualClock>,
    task_repository: Arc<InMemoryTaskRepository>,
    stores: EventStoreCache<MemoryStoreBackend, ManualClock>,
    backend: MemoryStoreBackend,
}

#[fixture]
fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new());
    let task_repository = Arc::new(InMemoryTaskRepository::new());
    let events = Arc::new(EventLifecycleService::new(
        Arc::new(InMemoryEventRepository::new()),
        Arc::clone(&task_repository),
        Arc::clone(&clock),
    ));
    let observer: Arc<dyn TaskTransitionObserver> = Arc::clone(&events) as Arc<dyn TaskTransitionObserver>;
    let tasks = TaskLifecycleService::new(Arc::clone(&task_repository), Arc::clone(&clock))
        .with_observer(observer);
    let backend = MemoryStoreBackend::new();
    Harness {
        events,
        tasks,
        task_repository,
        stores: EventStoreCache::new(
            backend.clone(),
            clock,
            "/srv/kiln/db",
            Duration::from_secs(60),
        ),
        backend,
    }
}

fn push_to_main() -> EventSource {
    EventSource {
        repo_name: "kiln".to_owned(),
        git_ref: "refs/heads/main".to_owned(),
        hash: "0123456789abcdef".to_owned(),
        source_ip: "192.0.2.7".to_owned(),
    }
}

async fn event_with_tasks(
    harness: &Harness,
    platforms: &[&str],
) -> Result<(Event, Vec<TaskUuid>)> {
    let event = harness.events.create(push_to_main()).await?;
    let mut tasks = Vec::with_capacity(platforms.len());
    for platform in platforms {
        let task = harness
            .tasks
            .create(event.uuid(), NewTaskRecord::new(*platform, "build", "make"))
            .await?;
        tasks.push(task.uuid().clone());
    }
    Ok((event, tasks))
}

async fn run(harness: &Harness, uuid: &TaskUuid) -> Result<()> {
    harness.tasks.accept(uuid, "builder-a").await?;
    harness.tasks.start(uuid).await?;
    Ok(())
}

async fn event_state(harness: &Harness, uuid: &EventUuid) -> Result<BuildState> {
    let event = harness
        .events
        .find(uuid)
        .await?
        .ok_or_else(|| eyre!("event {uuid} is missing"))?;
    Ok(event.state())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn event_state_follows_task_transitions(harness: Harness) -> Result<()> {
    let (event, tasks) = event_with_tasks(&harness, &["linux-x86_64", "linux-aarch64"]).await?;
    let [first, second] = tasks.as_slice() else {
        return Err(eyre!("expected two tasks"));
    };
    ensure!(event_state(&harness, event.uuid()).await? == BuildState::Waiting);

    run(&harness, first).await?;
    ensure!(event_state(&harness, event.uuid()).await? == BuildState::BeingBuilt);

    harness.tasks.complete(first, BuildState::Success).await?;
    run(&harness, second).await?;
    ensure!(event_state(&harness, event.uuid()).await? == BuildState::BeingBuilt);

    harness.tasks.complete(second, BuildState::Success).await?;
    ensure!(event_state(&harness, event.uuid()).await? == BuildState::Success);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_sibling_marks_event_as_having_failures(harness: Harness) -> Result<()> {
    let (event, tasks) = event_with_tasks(&harness, &["linux-x86_64", "linux-aarch64"]).await?;
    let [first, second] = tasks.as_slice() else {
        return Err(eyre!("expected two tasks"));
    };
    run(&harness, first).await?;
    run(&harness, second).await?;

    harness.tasks.complete(first, BuildState::Fail).await?;
    ensure!(event_state(&harness, event.uuid()).await? == BuildState::BeingBuiltHasFailures);

    harness.tasks.complete(second, BuildState::Fail).await?;
    ensure!(event_state(&harness, event.uuid()).await? == BuildState::Fail);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn observer_hears_only_real_state_changes() -> Result<()> {
    let clock = Arc::new(ManualClock::new());
    let mut observer = MockTaskTransitionObserver::new();
    observer
        .expect_task_transitioned()
        .withf(|task, from| task.state() != *from)
        .times(3)
        .return_const(());
    let tasks = TaskLifecycleService::new(Arc::new(InMemoryTaskRepository::new()), clock)
        .with_observer(Arc::new(observer));

    let task = tasks
        .create(&EventUuid::new(), NewTaskRecord::new("linux-x86_64", "build", "make"))
        .await?;
    tasks.accept(task.uuid(), "builder-a").await?;
    tasks.start(task.uuid()).await?;
    tasks.complete(task.uuid(), BuildState::Success).await?;
    let cancelled = tasks.cancel(task.uuid()).await?;
    ensure!(cancelled.map(|task| task.state()) == Some(BuildState::Success));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn transitions_survive_an_unknown_event(harness: Harness) -> Result<()> {
    let task = harness
        .tasks
        .create(&EventUuid::new(), NewTaskRecord::new("linux-x86_64", "build", "make"))
        .await?;
    let accepted = harness.tasks.accept(task.uuid(), "builder-a").await?;
    ensure!(accepted.state() == BuildState::PassedToBuilder);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn delete_marks_tasks_and_event_and_purges_the_store(mut harness: Harness) -> Result<()> {
    let (event, tasks) = event_with_tasks(&harness, &["linux-x86_64", "linux-aarch64"]).await?;
    let [first, _] = tasks.as_slice() else {
        return Err(eyre!("expected two tasks"));
    };
    run(&harness, first).await?;
    harness.tasks.complete(first, BuildState::Success).await?;

    let handle = harness.stores.acquire(event.uuid(), true)?;
    harness.stores.release(handle);
    let primary = harness.stores.location_for(event.uuid()).primary().to_owned();
    ensure!(harness.backend.file_exists(&primary));

    let report = harness.events.delete(event.uuid(), &mut harness.stores).await?;
    ensure!(report.removed.contains(&primary));
    ensure!(!harness.stores.is_cached(event.uuid()));
    ensure!(!harness.backend.file_exists(&primary));

    ensure!(event_state(&harness, event.uuid()).await? == BuildState::Deleted);
    let states: Vec<BuildState> = harness
        .task_repository
        .find_by_event(event.uuid())
        .await?
        .iter()
        .map(|task| task.state())
        .collect();
    ensure!(states == vec![BuildState::Deleted; 2]);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn delete_waits_for_builds_to_release_the_store(mut harness: Harness) -> Result<()> {
    let (event, tasks) = event_with_tasks(&harness, &["linux-x86_64"]).await?;
    let [task] = tasks.as_slice() else {
        return Err(eyre!("expected one task"));
    };
    run(&harness, task).await?;
    let handle = harness.stores.acquire(event.uuid(), true)?;

    let refused = harness.events.delete(event.uuid(), &mut harness.stores).await;
    ensure!(matches!(
        refused,
        Err(EventLifecycleError::Store(StoreError::InUse { refcount: 1, .. }))
    ));
    ensure!(event_state(&harness, event.uuid()).await? == BuildState::BeingBuilt);
    let kept = harness.tasks.find(task).await?.map(|task| task.state());
    ensure!(kept == Some(BuildState::BeingBuilt));
    ensure!(harness.stores.refcount(event.uuid()) == Some(1));

    harness.stores.release(handle);
    harness.events.delete(event.uuid(), &mut harness.stores).await?;
    ensure!(event_state(&harness, event.uuid()).await? == BuildState::Deleted);
    Ok(())
}
