//! Builder output crosses the uplink into the server's stores.

use std::sync::Arc;
use std::time::Duration;

use crate::test_helpers::{StepClock, utf8_tempdir};
use eyre::{Result, eyre, ensure};
use kiln::config::PlatformLimit;
use kiln::coordination::{
    domain::{CoordinationResult, Envelope, LogAppend, PlatformSlots, TaskOffer},
    ports::BuildProcess,
    services::{ARTIFACT_CHUNK_LEN, BuilderCoordinator, ServerIngest, Uplink},
};
use kiln::lifecycle::{
    adapters::memory::InMemoryTaskRepository,
    domain::{ProcessExit, Task},
    services::TaskLifecycleService,
};
use kiln::record::{
    domain::{EventUuid, FinishStatus, LogChannel, NewTaskRecord},
    ports::EventRecords,
};
use kiln::relay::{
    adapters::{
        memory::QueuedScheduler,
        unix::{FrameReassembler, FrameWriter},
    },
    domain::{ChannelId, Frame},
    services::StreamRelay,
};
use kiln::store::{
    adapters::{blob::ArtifactBlobStore, memory::MemoryStoreBackend},
    services::EventStoreCache,
};
use rstest::rstest;
use tokio::io::DuplexStream;

const PLATFORM: &str = "linux-x86_64";
const STDOUT: LogChannel = LogChannel::new(1);
const STDERR: LogChannel = LogChannel::new(2);

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

fn builder(clock: &Arc<StepClock>, uplink: DuplexStream) -> Builder {
    BuilderCoordinator::new(
        "builder-a",
        TaskLifecycleService::new(Arc::new(InMemoryTaskRepository::new()), Arc::clone(clock)),
        EventStoreCache::new(
            MemoryStoreBackend::new(),
            Arc::clone(clock),
            "/srv/kiln/builder-a",
            Duration::from_secs(60),
        ),
        Uplink::new(
            StreamRelay::new(QueuedScheduler::new()),
            FrameWriter::new(uplink),
            ChannelId::new(0),
            4096,
        ),
        PlatformSlots::from_limits(&[PlatformLimit {
            name: PLATFORM.to_owned(),
            instances: 1,
        }]),
        Arc::clone(clock),
    )
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn logs_and_artifacts_reach_the_server_stores() -> Result<()> {
    let clock = Arc::new(StepClock::new());
    let (_dir, root) = utf8_tempdir()?;
    let (builder_end, server_end) = tokio::io::duplex(16 * 1024);
    let mut alpha = builder(&clock, builder_end);
    let ingest = ServerIngest::new(
        EventStoreCache::new(
            MemoryStoreBackend::new(),
            Arc::clone(&clock),
            "/srv/kiln/server",
            Duration::from_secs(60),
        ),
        ArtifactBlobStore::open(&root)?,
        Arc::clone(&clock),
    );
    let server = tokio::spawn(async move {
        let mut ingest = ingest;
        let mut reader = FrameReassembler::new(server_end);
        let applied = ingest.serve(&mut reader).await;
        (ingest, applied)
    });

    let event = EventUuid::new();
    let task = Task::new(
        &event,
        NewTaskRecord::new(PLATFORM, "build", "make dist"),
        &*clock,
    );
    alpha
        .offer(TaskOffer {
            task: task.record().clone(),
        })
        .await?;
    alpha.start(task.uuid(), ExitedProcess(4242)).await?;
    alpha.log(task.uuid(), STDOUT, b"make dist\n").await?;
    let content: Vec<u8> = b"kiln-dist".iter().copied().cycle().take(80_000).collect();
    let artifact = alpha.artifact(task.uuid(), "kiln.tar.xz", &content).await?;
    alpha
        .finish(task.uuid(), ProcessExit::Exited { code: 0 })
        .await?;
    drop(alpha);

    let (mut ingest, applied) = server.await?;
    let chunks = content.len().div_ceil(ARTIFACT_CHUNK_LEN);
    ensure!(
        applied? == 3 + chunks,
        "expected the acceptance, two log chunks and {chunks} artifact chunks"
    );

    let handle = ingest.stores_mut().acquire(&event, false)?;
    let logs = handle.records().logs_for_task(task.uuid())?;
    let [first, last] = logs.as_slice() else {
        return Err(eyre!("expected two log chunks, got {}", logs.len()));
    };
    ensure!(first.payload == b"make dist\n" && first.sequence == 1);
    ensure!(last.finished.is_finished() && last.finished.exit_code() == Some(0));

    let stored = handle
        .records()
        .artifact_by_upload_nonce(artifact.upload_nonce())?
        .ok_or_else(|| eyre!("artifact was not registered on the server"))?;
    ensure!(stored.name() == "kiln.tar.xz" && !stored.is_in_flight());
    ensure!(stored.download_nonce() != artifact.download_nonce());
    ensure!(ingest.blobs().read(handle.records(), stored.download_nonce())? == content);
    ingest.stores_mut().release(handle);
    Ok(())
}

fn log_envelope(task: &Task, channel: LogChannel, finished: FinishStatus, text: &str) -> Envelope {
    Envelope::Log(LogAppend {
        task_uuid: task.uuid().clone(),
        channel,
        timestamp_us: 10,
        finished,
        payload: text.as_bytes().to_vec(),
    })
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn refused_output_does_not_end_the_connection() -> Result<()> {
    let clock = Arc::new(StepClock::new());
    let (_dir, root) = utf8_tempdir()?;
    let mut ingest = ServerIngest::new(
        EventStoreCache::new(
            MemoryStoreBackend::new(),
            Arc::clone(&clock),
            "/srv/kiln/server",
            Duration::from_secs(60),
        ),
        ArtifactBlobStore::open(&root)?,
        Arc::clone(&clock),
    );
    let event = EventUuid::new();
    let task = Task::new(&event, NewTaskRecord::new(PLATFORM, "build", "make"), &*clock);

    let (builder_end, server_end) = tokio::io::duplex(16 * 1024);
    let mut writer = FrameWriter::new(builder_end);
    let messages = [
        log_envelope(&task, STDOUT, FinishStatus::exited(2), "make: *** [all] Error 2\n").to_json()?,
        log_envelope(&task, STDOUT, FinishStatus::ongoing(), "late\n").to_json()?,
        b"{not json".to_vec(),
        log_envelope(&task, STDERR, FinishStatus::ongoing(), "warning\n").to_json()?,
    ];
    for bytes in messages {
        writer
            .write_frame(&Frame {
                bytes,
                first: true,
                last: true,
            })
            .await?;
    }
    drop(writer);

    let mut reader = FrameReassembler::new(server_end);
    ensure!(ingest.serve(&mut reader).await? == 2);
    ensure!(ingest.stores().refcount(&event) == Some(0));

    let handle = ingest.stores_mut().acquire(&event, false)?;
    let channels: Vec<LogChannel> = handle
        .records()
        .logs_for_task(task.uuid())?
        .iter()
        .map(|chunk| chunk.channel)
        .collect();
    ingest.stores_mut().release(handle);
    ensure!(channels == vec![STDOUT, STDERR]);
    Ok(())
}
