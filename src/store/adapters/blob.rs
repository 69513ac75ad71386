//! Artifact content files kept under a directory capability.

use crate::record::{
    domain::{Artifact, DownloadNonce, RecordError, UploadNonce, content_digest},
    ports::{EventRecords, RecordsError},
};
use camino::Utf8Path;
use cap_std::{ambient_authority, fs::OpenOptions, fs_utf8::Dir};
use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while moving artifact content.
#[derive(Debug, Clone, Error)]
pub enum BlobError {
    /// The chunk does not continue the upload.
    #[error(transparent)]
    Chunk(#[from] RecordError),

    /// Record lookup or update failed.
    #[error(transparent)]
    Records(#[from] RecordsError),

    /// No artifact matches the presented nonce.
    #[error("no artifact matches the presented nonce")]
    UnknownNonce,

    /// The artifact has already been fully uploaded.
    #[error("artifact {0} is already complete")]
    AlreadyComplete(String),

    /// The artifact is still being uploaded.
    #[error("artifact {name} has {offset} of {len} bytes")]
    Incomplete {
        /// Artifact name.
        name: String,
        /// Bytes transferred.
        offset: u64,
        /// Declared length.
        len: u64,
    },

    /// Filesystem failure.
    #[error("artifact file error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for BlobError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

/// Progress of a resumable upload after a chunk was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    /// Bytes transferred so far.
    pub offset: u64,
    /// Whether the artifact reached its declared length.
    pub complete: bool,
}

/// Artifact files rooted at one directory.
///
/// Artifact paths are interpreted relative to the root and cannot escape it.
#[derive(Debug)]
pub struct ArtifactBlobStore {
    root: Dir,
}

impl ArtifactBlobStore {
    /// Opens the artifact directory.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Io`] when the directory cannot be opened.
    pub fn open(root: &Utf8Path) -> Result<Self, BlobError> {
        Ok(Self {
            root: Dir::open_ambient_dir(root, ambient_authority())?,
        })
    }

    /// Writes one upload chunk authorised by `nonce`.
    ///
    /// The chunk must start at the artifact's current offset. On success the
    /// bytes are in the backing file and the new offset is persisted.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError`] when the nonce is unknown, the upload already
    /// finished, the chunk is out of order or overruns, or I/O fails.
    pub fn write_chunk(
        &self,
        records: &impl EventRecords,
        nonce: &UploadNonce,
        at: u64,
        bytes: &[u8],
    ) -> Result<UploadProgress, BlobError> {
        let mut artifact = records
            .artifact_by_upload_nonce(nonce)?
            .ok_or(BlobError::UnknownNonce)?;
        if artifact.is_complete() && !artifact.is_empty() {
            return Err(BlobError::AlreadyComplete(artifact.name().to_owned()));
        }

        let complete = artifact.accept_chunk(at, bytes.len() as u64)?;
        let mut options = OpenOptions::new();
        options.write(true).create(true);
        let mut file = self.root.open_with(artifact.path(), &options)?;
        file.seek(SeekFrom::Start(at))?;
        file.write_all(bytes)?;
        file.flush()?;

        records.update_artifact_offset(nonce, artifact.offset())?;
        debug!(
            artifact = artifact.name(),
            offset = artifact.offset(),
            len = artifact.len(),
            "accepted artifact chunk"
        );
        if complete {
            info!(artifact = artifact.name(), len = artifact.len(), "artifact upload complete");
        }
        Ok(UploadProgress {
            offset: artifact.offset(),
            complete,
        })
    }

    /// Reads the full content of a completed artifact.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Incomplete`] while the upload is in flight, or
    /// another [`BlobError`] when the nonce is unknown or I/O fails.
    pub fn read(
        &self,
        records: &impl EventRecords,
        nonce: &DownloadNonce,
    ) -> Result<Vec<u8>, BlobError> {
        let artifact = completed_artifact(records, nonce)?;
        if artifact.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.root.read(artifact.path())?)
    }

    /// Returns the hex SHA-256 digest of a completed artifact.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::read`].
    pub fn digest(
        &self,
        records: &impl EventRecords,
        nonce: &DownloadNonce,
    ) -> Result<String, BlobError> {
        self.read(records, nonce).map(|bytes| content_digest(&bytes))
    }
}

fn completed_artifact(
    records: &impl EventRecords,
    nonce: &DownloadNonce,
) -> Result<Artifact, BlobError> {
    let artifact = records
        .artifact_by_download_nonce(nonce)?
        .ok_or(BlobError::UnknownNonce)?;
    if artifact.is_in_flight() {
        return Err(BlobError::Incomplete {
            name: artifact.name().to_owned(),
            offset: artifact.offset(),
            len: artifact.len(),
        });
    }
    Ok(artifact)
}
