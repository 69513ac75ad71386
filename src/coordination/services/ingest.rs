//! Server-side intake of builder output: log chunks and artifact uploads.

use super::builder::{append_local, artifact_path};
use crate::coordination::domain::{
    ArtifactChunk, CoordinationError, CoordinationResult, Envelope, LogAppend,
};
use crate::record::{
    domain::{Artifact, DownloadNonce, LogChunk, PersistedArtifactData},
    ports::{EventRecords, RecordsError},
};
use crate::relay::adapters::unix::FrameReassembler;
use crate::store::{
    adapters::blob::{ArtifactBlobStore, UploadProgress},
    ports::StoreBackend,
    services::EventStoreCache,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

/// Effect of one envelope on the server's stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    /// A log chunk was stored with its server-side sequence.
    Log(LogChunk),
    /// An artifact chunk was written.
    Artifact(UploadProgress),
    /// The envelope carries no builder output; the tag is its schema.
    Skipped(&'static str),
}

/// Applies builder output to the server's event stores.
///
/// Each envelope takes a store reference for just as long as it is applied,
/// so the idle sweep closes stores of events that went quiet.
pub struct ServerIngest<B, C>
where
    B: StoreBackend,
    C: Clock + Send + Sync,
{
    stores: EventStoreCache<B, C>,
    blobs: Arc<ArtifactBlobStore>,
    clock: Arc<C>,
}

impl<B, C> ServerIngest<B, C>
where
    B: StoreBackend + Clone + Send + 'static,
    C: Clock + Send + Sync,
{
    /// Creates an intake writing into `stores` and `blobs`.
    #[must_use]
    pub fn new(stores: EventStoreCache<B, C>, blobs: ArtifactBlobStore, clock: Arc<C>) -> Self {
        Self {
            stores,
            blobs: Arc::new(blobs),
            clock,
        }
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

    /// Returns the artifact content store.
    #[must_use]
    pub fn blobs(&self) -> &ArtifactBlobStore {
        &self.blobs
    }

    /// Applies one envelope.
    ///
    /// Log chunks are appended to the task's event store. Artifact chunks
    /// register the artifact on first sight and are then written at their
    /// offset. Other envelopes are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError`] when the store cannot be opened or the
    /// output is refused, for example a chunk after its channel finished or
    /// an out-of-order upload.
    pub async fn apply(&mut self, envelope: Envelope) -> CoordinationResult<Ingested> {
        match envelope {
            Envelope::Log(append) => self.ingest_log(append).await.map(Ingested::Log),
            Envelope::Artifact(chunk) => self.ingest_artifact(chunk).await.map(Ingested::Artifact),
            other => {
                debug!(schema = other.schema(), "envelope carries no builder output");
                Ok(Ingested::Skipped(other.schema()))
            }
        }
    }

    /// Applies every message from `reader` until the connection closes
    /// cleanly. Returns the number of envelopes applied.
    ///
    /// A refused envelope is logged and skipped; it does not end the
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::Transport`] when the connection fails.
    pub async fn serve<R>(&mut self, reader: &mut FrameReassembler<R>) -> CoordinationResult<usize>
    where
        R: AsyncRead + Unpin,
    {
        let mut applied = 0;
        while let Some(message) = reader.next_message().await? {
            let envelope = match Envelope::from_json(&message) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(len = message.len(), error = %err, "dropping malformed builder message");
                    continue;
                }
            };
            let schema = envelope.schema();
            match self.apply(envelope).await {
                Ok(_) => applied += 1,
                Err(err) => warn!(schema, error = %err, "refused builder output"),
            }
        }
        info!(applied, "builder connection closed");
        Ok(applied)
    }

    async fn ingest_log(&mut self, append: LogAppend) -> CoordinationResult<LogChunk> {
        let event = append.task_uuid.event_uuid();
        let store = self.stores.acquire_off_loop(&event, true).await?;
        let stored = append_local(store.shared(), LogChunk::from(append)).await;
        self.stores.release(store);
        stored
    }

    async fn ingest_artifact(&mut self, chunk: ArtifactChunk) -> CoordinationResult<UploadProgress> {
        let event = chunk.task_uuid.event_uuid();
        let store = self.stores.acquire_off_loop(&event, true).await?;
        let records = store.shared();
        let blobs = Arc::clone(&self.blobs);
        let now = self.clock.utc();
        let written = tokio::task::spawn_blocking(move || {
            write_artifact_chunk(&*records, &blobs, chunk, now)
        })
        .await
        .map_err(RecordsError::persistence)
        .map_err(CoordinationError::from)
        .and_then(|written| written);
        self.stores.release(store);
        written
    }
}

fn write_artifact_chunk(
    records: &impl EventRecords,
    blobs: &ArtifactBlobStore,
    chunk: ArtifactChunk,
    now: DateTime<Utc>,
) -> CoordinationResult<UploadProgress> {
    if records
        .artifact_by_upload_nonce(&chunk.upload_nonce)?
        .is_none()
    {
        let artifact = Artifact::from_persisted(PersistedArtifactData {
            task_uuid: chunk.task_uuid.clone(),
            name: chunk.name.clone(),
            path: artifact_path(&chunk.upload_nonce),
            upload_nonce: chunk.upload_nonce.clone(),
            download_nonce: DownloadNonce::generate(),
            len: chunk.len,
            offset: 0,
            created_at: now,
        });
        records.put_artifact(&artifact)?;
        info!(
            task = %chunk.task_uuid,
            artifact = %chunk.name,
            len = chunk.len,
            "registered incoming artifact"
        );
    }
    Ok(blobs.write_chunk(records, &chunk.upload_nonce, chunk.offset, &chunk.data)?)
}
