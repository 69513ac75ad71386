//! Builder-side handling of offers, cancellations and build exits.

use super::Uplink;
use crate::coordination::{
    domain::{
        ArtifactChunk, CancelTask, CoordinationError, CoordinationResult, Envelope, LogAppend,
        PlatformSlots, Rejection, SlotClaim, TaskAccept, TaskOffer,
    },
    ports::BuildProcess,
};
use crate::lifecycle::{
    domain::{ProcessExit, Task},
    ports::TaskRepository,
    services::TaskLifecycleService,
};
use crate::record::{
    domain::{
        Artifact, DownloadNonce, FinishStatus, LogChannel, LogChunk, PersistedArtifactData,
        TaskRecord, TaskUuid, UploadNonce,
    },
    ports::{EventRecords, RecordsError},
};
use crate::relay::ports::TxScheduler;
use crate::store::{
    ports::StoreBackend,
    services::{EventStoreCache, EventStoreHandle},
};
use mockable::Clock;
use camino::Utf8PathBuf;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tracing::{debug, info, warn};

/// Largest slice of artifact content carried by one envelope.
pub const ARTIFACT_CHUNK_LEN: usize = 32 * 1024;

/// Answer of a builder to a task offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The builder took the task.
    Accepted(TaskAccept),
    /// The builder's platform was saturated.
    Rejected(Rejection),
}

struct RunningBuild<P, D> {
    platform: String,
    process: Option<P>,
    store: EventStoreHandle<D>,
    channels: BTreeSet<LogChannel>,
}

/// Builder-side coordinator.
///
/// Owns the builder's platform slots, its open event stores and its uplink
/// to the server. Each accepted task holds one slot and one store reference
/// until it is cancelled or its process exits.
pub struct BuilderCoordinator<R, B, C, P, S, W>
where
    R: TaskRepository,
    B: StoreBackend,
    C: Clock + Send + Sync,
    P: BuildProcess,
    S: TxScheduler,
{
    name: String,
    lifecycle: TaskLifecycleService<R, C>,
    stores: EventStoreCache<B, C>,
    uplink: Uplink<S, W>,
    slots: PlatformSlots,
    running: HashMap<TaskUuid, RunningBuild<P, B::Database>>,
    clock: Arc<C>,
}

impl<R, B, C, P, S, W> BuilderCoordinator<R, B, C, P, S, W>
where
    R: TaskRepository,
    B: StoreBackend + Clone + Send + 'static,
    C: Clock + Send + Sync,
    P: BuildProcess,
    S: TxScheduler,
    W: AsyncWrite + Unpin,
{
    /// Creates a coordinator for the builder called `name`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        lifecycle: TaskLifecycleService<R, C>,
        stores: EventStoreCache<B, C>,
        uplink: Uplink<S, W>,
        slots: PlatformSlots,
        clock: Arc<C>,
    ) -> Self {
        Self {
            name: name.into(),
            lifecycle,
            stores,
            uplink,
            slots,
            running: HashMap::new(),
            clock,
        }
    }

    /// Returns the builder name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the platform slot counters.
    #[must_use]
    pub const fn slots(&self) -> &PlatformSlots {
        &self.slots
    }

    /// Returns the store cache.
    #[must_use]
    pub const fn stores(&self) -> &EventStoreCache<B, C> {
        &self.stores
    }

    /// Returns the store cache for sweeping.
    pub const fn stores_mut(&mut self) -> &mut EventStoreCache<B, C> {
        &mut self.stores
    }

    /// Returns the uplink to the server.
    #[must_use]
    pub const fn uplink(&self) -> &Uplink<S, W> {
        &self.uplink
    }

    /// Returns the uplink for flushing.
    pub const fn uplink_mut(&mut self) -> &mut Uplink<S, W> {
        &mut self.uplink
    }

    /// Returns how many accepted tasks have not ended yet.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Returns `true` when `uuid` was accepted here and has not ended.
    #[must_use]
    pub fn is_running(&self, uuid: &TaskUuid) -> bool {
        self.running.contains_key(uuid)
    }

    /// Admits or rejects an offered task.
    ///
    /// When the task's platform is at its limit a [`Rejection`] carrying the
    /// counters is queued for the server and the task is left untouched.
    /// Otherwise a slot is taken, the event store opened, the task recorded
    /// as passed to this builder and a [`TaskAccept`] queued.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError`] when the task is already running here,
    /// its store cannot be opened, the lifecycle refuses the assignment or
    /// the reply cannot be queued. A failed admission gives its slot and
    /// store reference back and leaves the task as it was offered.
    pub async fn offer(&mut self, offer: TaskOffer) -> CoordinationResult<Admission> {
        let uuid = offer.task.uuid.clone();
        if self.running.contains_key(&uuid) {
            return Err(CoordinationError::AlreadyRunning(uuid));
        }
        let platform = offer.task.platform.clone();

        if let SlotClaim::Saturated(usage) = self.slots.claim(&platform) {
            let rejection = Rejection {
                platform,
                task_uuid: uuid,
                ongoing: usage.ongoing,
                limit: usage.limit,
            };
            info!(
                builder = %self.name,
                task = %rejection.task_uuid,
                platform = %rejection.platform,
                ongoing = usage.ongoing,
                limit = usage.limit,
                "rejecting task offer, platform saturated"
            );
            self.uplink.send(&Envelope::Rejection(rejection.clone()))?;
            return Ok(Admission::Rejected(rejection));
        }

        let store = match self.stores.acquire_off_loop(&uuid.event_uuid(), true).await {
            Ok(store) => store,
            Err(err) => {
                self.slots.release(&platform);
                return Err(err.into());
            }
        };
        let offered = match self.take_task(offer.task).await {
            Ok(offered) => offered,
            Err(err) => {
                self.stores.release(store);
                self.slots.release(&platform);
                return Err(err);
            }
        };

        let accept = TaskAccept {
            task_uuid: uuid.clone(),
            builder: self.name.clone(),
        };
        if let Err(err) = self.uplink.send(&Envelope::TaskAccept(accept.clone())) {
            warn!(builder = %self.name, task = %uuid, error = %err, "unable to queue task acceptance");
            if let Err(restore) = self.lifecycle.restore(&offered).await {
                warn!(task = %uuid, error = %restore, "unable to roll back task acceptance");
            }
            self.stores.release(store);
            self.slots.release(&platform);
            return Err(err);
        }
        info!(builder = %self.name, task = %uuid, platform = %platform, "accepted task");
        self.running.insert(
            uuid,
            RunningBuild {
                platform,
                process: None,
                store,
                channels: BTreeSet::new(),
            },
        );
        Ok(Admission::Accepted(accept))
    }

    /// Records that the build process of an accepted task is running.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::NotRunning`] for a task not accepted
    /// here, or a lifecycle error when the start cannot be recorded.
    pub async fn start(&mut self, uuid: &TaskUuid, process: P) -> CoordinationResult<Task> {
        if !self.running.contains_key(uuid) {
            return Err(CoordinationError::NotRunning(uuid.clone()));
        }
        let task = self.lifecycle.start(uuid).await?;
        let pid = process.id();
        if let Some(build) = self.running.get_mut(uuid) {
            build.process = Some(process);
        }
        info!(task = %uuid, pid, "build process started");
        Ok(task)
    }

    /// Stores a chunk of build output and queues it for the server.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError`] when the task is not running here, the
    /// chunk cannot be stored, or it cannot be queued.
    pub async fn log(
        &mut self,
        uuid: &TaskUuid,
        channel: LogChannel,
        payload: &[u8],
    ) -> CoordinationResult<LogChunk> {
        let timestamp_us = self.timestamp_us();
        let Some(build) = self.running.get_mut(uuid) else {
            return Err(CoordinationError::NotRunning(uuid.clone()));
        };
        build.channels.insert(channel);
        let records = build.store.shared();
        let chunk = LogChunk::new(uuid.clone(), channel, timestamp_us, payload);
        let stored = append_local(records, chunk).await?;
        self.uplink.send(&Envelope::Log(LogAppend::from(&stored)))?;
        Ok(stored)
    }

    /// Registers an artifact produced by a running task and queues its
    /// content for the server.
    ///
    /// The content travels as [`ArtifactChunk`]s of at most
    /// [`ARTIFACT_CHUNK_LEN`] bytes in offset order; empty content still
    /// sends one chunk so the server learns of the artifact.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError`] when the task is not running here, the
    /// artifact cannot be recorded, or a chunk cannot be queued.
    pub async fn artifact(
        &mut self,
        uuid: &TaskUuid,
        name: &str,
        content: &[u8],
    ) -> CoordinationResult<Artifact> {
        let Some(build) = self.running.get(uuid) else {
            return Err(CoordinationError::NotRunning(uuid.clone()));
        };
        let len = content.len() as u64;
        let upload_nonce = UploadNonce::generate();
        let artifact = Artifact::from_persisted(PersistedArtifactData {
            task_uuid: uuid.clone(),
            name: name.to_owned(),
            path: artifact_path(&upload_nonce),
            upload_nonce,
            download_nonce: DownloadNonce::generate(),
            len,
            offset: 0,
            created_at: self.clock.utc(),
        });
        register_local(build.store.shared(), artifact.clone()).await?;

        let mut offset = 0_u64;
        let mut pieces = content.chunks(ARTIFACT_CHUNK_LEN).peekable();
        if pieces.peek().is_none() {
            self.uplink.send(&Envelope::Artifact(artifact_chunk(&artifact, 0, &[])))?;
        }
        for piece in pieces {
            self.uplink
                .send(&Envelope::Artifact(artifact_chunk(&artifact, offset, piece)))?;
            offset += piece.len() as u64;
        }
        info!(task = %uuid, artifact = name, len, "queued artifact upload");
        Ok(artifact)
    }

    /// Applies a cancel broadcast.
    ///
    /// A task not running here is ignored and yields `false`. Otherwise the
    /// build process is killed, the task marked cancelled, its channels
    /// closed off, the uplink flushed and the store reference released.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::Lifecycle`] when the cancellation cannot
    /// be recorded; the build is wound down regardless.
    pub async fn cancel(&mut self, cancel: &CancelTask) -> CoordinationResult<bool> {
        let uuid = &cancel.task_uuid;
        let Some(mut build) = self.running.remove(uuid) else {
            debug!(builder = %self.name, task = %uuid, "ignoring cancel for task not running here");
            return Ok(false);
        };

        if let Some(process) = build.process.as_mut() {
            let pid = process.id();
            match process.kill() {
                Ok(()) => info!(task = %uuid, pid, "killed build process"),
                Err(err) => warn!(task = %uuid, pid, error = %err, "failed to kill build process"),
            }
        }
        let recorded = self.lifecycle.cancel(uuid).await;
        self.wind_down(uuid, build, FinishStatus::cancelled()).await;
        recorded?;
        Ok(true)
    }

    /// Records how the build process of a task ended.
    ///
    /// An exit for a task no longer running here, typically one already
    /// cancelled, is ignored and yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::Lifecycle`] when the outcome cannot be
    /// recorded; the build is wound down regardless.
    pub async fn finish(
        &mut self,
        uuid: &TaskUuid,
        exit: ProcessExit,
    ) -> CoordinationResult<Option<Task>> {
        let Some(build) = self.running.remove(uuid) else {
            debug!(task = %uuid, ?exit, "ignoring exit for task not running here");
            return Ok(None);
        };
        let recorded = self.lifecycle.finish_with_exit(uuid, exit, false).await;
        self.wind_down(uuid, build, exit.finish_status(false)).await;
        Ok(Some(recorded?))
    }

    /// Adopts and accepts an offered task, returning it as it was before the
    /// acceptance.
    async fn take_task(&self, record: TaskRecord) -> CoordinationResult<Task> {
        let offered = self.lifecycle.adopt(record).await?;
        self.lifecycle.accept(offered.uuid(), &self.name).await?;
        Ok(offered)
    }

    async fn wind_down(
        &mut self,
        uuid: &TaskUuid,
        build: RunningBuild<P, B::Database>,
        status: FinishStatus,
    ) {
        let RunningBuild {
            platform,
            store,
            channels: used,
            ..
        } = build;
        let timestamp_us = self.timestamp_us();
        let channels = if used.is_empty() {
            BTreeSet::from([LogChannel::new(0)])
        } else {
            used
        };

        for channel in channels {
            let last =
                LogChunk::new(uuid.clone(), channel, timestamp_us, Vec::new()).finishing(status);
            let queued = append_local(store.shared(), last)
                .await
                .and_then(|stored| self.uplink.send(&Envelope::Log(LogAppend::from(&stored))));
            if let Err(err) = queued {
                warn!(task = %uuid, channel = %channel, error = %err, "failed to close log channel");
            }
        }

        match self.uplink.flush().await {
            Ok(frames) => debug!(task = %uuid, frames, "flushed uplink"),
            Err(err) => warn!(task = %uuid, error = %err, "uplink lost, queued output discarded"),
        }
        self.stores.release(store);
        let usage = self.slots.release(&platform);
        debug!(task = %uuid, platform = %platform, ?usage, "released build slot");
    }

    fn timestamp_us(&self) -> u64 {
        u64::try_from(self.clock.utc().timestamp_micros()).unwrap_or_default()
    }
}

/// Location of an artifact's content relative to the artifact root.
pub(super) fn artifact_path(nonce: &UploadNonce) -> Utf8PathBuf {
    Utf8PathBuf::from(nonce.as_str())
}

fn artifact_chunk(artifact: &Artifact, offset: u64, data: &[u8]) -> ArtifactChunk {
    ArtifactChunk {
        task_uuid: artifact.task_uuid().clone(),
        name: artifact.name().to_owned(),
        len: artifact.len(),
        upload_nonce: artifact.upload_nonce().clone(),
        offset,
        data: data.to_vec(),
    }
}

async fn register_local<D>(records: Arc<D>, artifact: Artifact) -> CoordinationResult<()>
where
    D: EventRecords + 'static,
{
    tokio::task::spawn_blocking(move || records.put_artifact(&artifact))
        .await
        .map_err(RecordsError::persistence)?
        .map_err(CoordinationError::from)
}

pub(super) async fn append_local<D>(
    records: Arc<D>,
    chunk: LogChunk,
) -> CoordinationResult<LogChunk>
where
    D: EventRecords + 'static,
{
    tokio::task::spawn_blocking(move || records.append_log(chunk))
        .await
        .map_err(RecordsError::persistence)?
        .map_err(CoordinationError::from)
}
