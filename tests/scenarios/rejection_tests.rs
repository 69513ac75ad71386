//! A saturated builder rejects an offer and the server moves it on.

use std::sync::Arc;
use std::time::Duration;

use crate::test_helpers::StepClock;
use eyre::{Result, bail, ensure};
use kiln::config::PlatformLimit;
use kiln::coordination::{
    domain::{CoordinationResult, Envelope, PlatformSlots, TaskOffer},
    ports::BuildProcess,
    services::{Admission, BuilderCoordinator, RejectionLedger, RejectionVerdict, Uplink},
};
use kiln::lifecycle::{
    adapters::memory::InMemoryTaskRepository,
    domain::{BuildState, ProcessExit, Task},
    services::TaskLifecycleService,
};
use kiln::record::domain::{EventUuid, NewTaskRecord, TaskRecord};
use kiln::relay::{
    adapters::{
        memory::QueuedScheduler,
        unix::{FrameReassembler, FrameWriter},
    },
    domain::ChannelId,
    services::StreamRelay,
};
use kiln::store::{adapters::memory::MemoryStoreBackend, services::EventStoreCache};
use rstest::rstest;
use tokio::io::DuplexStream;

const PLATFORM: &str = "linux-x86_64";

#[derive(Debug)]
struct ExitedProcess(u32);

impl BuildProcess for ExitedProcess {
    fn id(&self) -> u32 {
        self.0
    }

    fn kill(&mut self) -> CoordinationResult<()> {
        Ok(())
    }
}

type Builder = BuilderCoordinator<
    InMemoryTaskRepository,
    MemoryStoreBackend,
    StepClock,
    ExitedProcess,
    QueuedScheduler,
    DuplexStream,
>;

fn builder(name: &str, clock: &Arc<StepClock>) -> (Builder, FrameReassembler<DuplexStream>) {
    let (builder_end, server_end) = tokio::io::duplex(64 * 1024);
    let coordinator = BuilderCoordinator::new(
        name,
        TaskLifecycleService::new(Arc::new(InMemoryTaskRepository::new()), Arc::clone(clock)),
        EventStoreCache::new(
            MemoryStoreBackend::new(),
            Arc::clone(clock),
            format!("/srv/kiln/{name}"),
            Duration::from_secs(60),
        ),
        Uplink::new(
            StreamRelay::new(QueuedScheduler::new()),
            FrameWriter::new(builder_end),
            ChannelId::new(0),
            512,
        ),
        PlatformSlots::from_limits(&[PlatformLimit {
            name: PLATFORM.to_owned(),
            instances: 1,
        }]),
        Arc::clone(clock),
    );
    (coordinator, FrameReassembler::new(server_end))
}

fn offered_task(event: &EventUuid, clock: &StepClock) -> TaskRecord {
    Task::new(
        event,
        NewTaskRecord::new(PLATFORM, "build", "cargo build --release"),
        clock,
    )
    .record()
    .clone()
}

async fn next_envelope(server: &mut FrameReassembler<DuplexStream>) -> Result<Envelope> {
    let Some(message) = server.next_message().await? else {
        bail!("uplink closed");
    };
    Ok(Envelope::from_json(&message)?)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn saturated_builder_rejects_and_task_moves_to_next_builder() -> Result<()> {
    let clock = Arc::new(StepClock::new());
    let (mut alpha, mut alpha_server) = builder("builder-a", &clock);
    let (mut beta, mut beta_server) = builder("builder-b", &clock);
    let mut ledger = RejectionLedger::new();
    ledger.register_builder("builder-a");
    ledger.register_builder("builder-b");
    let event = EventUuid::new();

    let first = offered_task(&event, &clock);
    ledger.offered(first.uuid.clone(), "builder-a");
    let Admission::Accepted(_) = alpha.offer(TaskOffer { task: first.clone() }).await? else {
        bail!("first offer should fit the free slot");
    };
    ledger.settle(&first.uuid);
    alpha.start(&first.uuid, ExitedProcess(4242)).await?;

    let second = offered_task(&event, &clock);
    ledger.offered(second.uuid.clone(), "builder-a");
    let Admission::Rejected(rejection) = alpha.offer(TaskOffer { task: second.clone() }).await?
    else {
        bail!("second offer should hit the platform limit");
    };
    ensure!(rejection.ongoing == 1 && rejection.limit == 1);
    alpha.uplink_mut().flush().await?;

    let Envelope::TaskAccept(accept) = next_envelope(&mut alpha_server).await? else {
        bail!("expected the accept first");
    };
    ensure!(accept.task_uuid == first.uuid && accept.builder == "builder-a");
    let Envelope::Rejection(received) = next_envelope(&mut alpha_server).await? else {
        bail!("expected the rejection second");
    };
    ensure!(received == rejection);

    let verdict = ledger.record("builder-a", &received);
    ensure!(verdict == RejectionVerdict::Reassign("builder-b".to_owned()));
    ensure!(
        ledger.record("builder-a", &received) == RejectionVerdict::Ignored,
        "a repeated rejection changes nothing"
    );

    let Admission::Accepted(_) = beta.offer(TaskOffer { task: second.clone() }).await? else {
        bail!("the idle builder should take the task");
    };
    ledger.settle(&second.uuid);
    beta.uplink_mut().flush().await?;
    let Envelope::TaskAccept(moved) = next_envelope(&mut beta_server).await? else {
        bail!("expected an accept from the second builder");
    };
    ensure!(moved.task_uuid == second.uuid && moved.builder == "builder-b");

    let Some(done) = alpha
        .finish(&first.uuid, ProcessExit::Exited { code: 0 })
        .await?
    else {
        bail!("first task should still be running");
    };
    ensure!(done.state() == BuildState::Success);
    ensure!(alpha.running_count() == 0);

    let third = offered_task(&event, &clock);
    let Admission::Accepted(_) = alpha.offer(TaskOffer { task: third }).await? else {
        bail!("the freed slot should admit another task");
    };
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn task_stays_waiting_when_every_builder_rejects() -> Result<()> {
    let clock = Arc::new(StepClock::new());
    let (mut alpha, _alpha_server) = builder("builder-a", &clock);
    let mut ledger = RejectionLedger::new();
    ledger.register_builder("builder-a");
    let event = EventUuid::new();

    let busy = offered_task(&event, &clock);
    alpha.offer(TaskOffer { task: busy }).await?;
    let waiting = offered_task(&event, &clock);
    ledger.offered(waiting.uuid.clone(), "builder-a");
    let Admission::Rejected(rejection) = alpha.offer(TaskOffer { task: waiting.clone() }).await?
    else {
        bail!("offer should be rejected at the limit");
    };

    ensure!(ledger.record("builder-a", &rejection) == RejectionVerdict::Exhausted);
    ensure!(ledger.current_builder(&waiting.uuid).is_none());
    ensure!(!alpha.is_running(&waiting.uuid));
    ensure!(alpha.slots().usage(PLATFORM).is_some_and(|usage| usage.ongoing == 1));
    Ok(())
}
