//! Build artifacts and their upload/download capability nonces.

use super::{RecordError, TaskUuid};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of random bytes behind each nonce.
const NONCE_BYTES: usize = 16;

fn random_nonce() -> String {
    let mut bytes = [0_u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn parse_nonce(value: &str) -> Result<String, RecordError> {
    let normalized = value.trim().to_ascii_lowercase();
    let valid = normalized.len() == NONCE_BYTES * 2
        && normalized.chars().all(|ch| ch.is_ascii_hexdigit());
    if !valid {
        return Err(RecordError::MalformedNonce(value.to_owned()));
    }
    Ok(normalized)
}

macro_rules! nonce_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generates a fresh nonce from the operating system CSPRNG.
            #[must_use]
            pub fn generate() -> Self {
                Self(random_nonce())
            }

            /// Parses a 32-character hex nonce.
            ///
            /// # Errors
            ///
            /// Returns [`RecordError::MalformedNonce`] when the value is not
            /// 32 hex characters.
            pub fn parse(value: &str) -> Result<Self, RecordError> {
                parse_nonce(value).map(Self)
            }

            /// Returns the hex form.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "(..)"))
            }
        }
    };
}

nonce_type!(
    /// Capability authorizing exactly one upload of an artifact.
    UploadNonce
);

nonce_type!(
    /// Capability authorizing repeated downloads of an artifact.
    DownloadNonce
);

/// Parameter object for registering a new artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArtifact {
    /// Task that produced the artifact.
    pub task_uuid: TaskUuid,
    /// Artifact file name as produced by the build.
    pub name: String,
    /// Declared length in bytes.
    pub len: u64,
    /// Backing file that receives the uploaded bytes.
    pub path: Utf8PathBuf,
}

/// Parameter object for reconstructing a persisted artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedArtifactData {
    /// Producing task.
    pub task_uuid: TaskUuid,
    /// Artifact name.
    pub name: String,
    /// Upload capability.
    pub upload_nonce: UploadNonce,
    /// Download capability.
    pub download_nonce: DownloadNonce,
    /// Declared length in bytes.
    pub len: u64,
    /// Bytes transferred so far.
    pub offset: u64,
    /// Backing file path.
    pub path: Utf8PathBuf,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
}

/// A named binary produced by a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    task_uuid: TaskUuid,
    name: String,
    upload_nonce: UploadNonce,
    download_nonce: DownloadNonce,
    len: u64,
    offset: u64,
    path: Utf8PathBuf,
    created_at: DateTime<Utc>,
}

impl Artifact {
    /// Registers a new artifact with fresh, distinct nonces and no bytes
    /// transferred.
    #[must_use]
    pub fn new(params: NewArtifact, clock: &impl mockable::Clock) -> Self {
        Self {
            task_uuid: params.task_uuid,
            name: params.name,
            upload_nonce: UploadNonce::generate(),
            download_nonce: DownloadNonce::generate(),
            len: params.len,
            offset: 0,
            path: params.path,
            created_at: clock.utc(),
        }
    }

    /// Reconstructs an artifact from storage.
    #[must_use]
    pub fn from_persisted(data: PersistedArtifactData) -> Self {
        Self {
            task_uuid: data.task_uuid,
            name: data.name,
            upload_nonce: data.upload_nonce,
            download_nonce: data.download_nonce,
            len: data.len,
            offset: data.offset,
            path: data.path,
            created_at: data.created_at,
        }
    }

    /// Returns the producing task.
    #[must_use]
    pub const fn task_uuid(&self) -> &TaskUuid {
        &self.task_uuid
    }

    /// Returns the artifact name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the upload capability.
    #[must_use]
    pub const fn upload_nonce(&self) -> &UploadNonce {
        &self.upload_nonce
    }

    /// Returns the download capability.
    #[must_use]
    pub const fn download_nonce(&self) -> &DownloadNonce {
        &self.download_nonce
    }

    /// Returns the declared length in bytes.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` for a zero-length artifact.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns how many bytes have been transferred.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the backing file path.
    #[must_use]
    pub const fn path(&self) -> &Utf8PathBuf {
        &self.path
    }

    /// Returns when the artifact was registered.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns `true` while bytes remain to be transferred.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.offset < self.len
    }

    /// Returns `true` once every declared byte has arrived.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.offset == self.len
    }

    /// Offset an interrupted uploader must resume from.
    #[must_use]
    pub const fn resume_offset(&self) -> u64 {
        self.offset
    }

    /// Accounts for a chunk of `chunk_len` bytes starting at `at`.
    ///
    /// Chunks must arrive in order: `at` has to equal the current offset.
    /// Returns `true` when the chunk completes the artifact.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::OffsetMismatch`] for out-of-order chunks and
    /// [`RecordError::Overrun`] for chunks running past the declared length.
    pub fn accept_chunk(&mut self, at: u64, chunk_len: u64) -> Result<bool, RecordError> {
        if at != self.offset {
            return Err(RecordError::OffsetMismatch {
                expected: self.offset,
                got: at,
            });
        }
        let end = at.saturating_add(chunk_len);
        if end > self.len {
            return Err(RecordError::Overrun { len: self.len, end });
        }
        self.offset = end;
        Ok(self.is_complete())
    }

    /// Overwrites the offset with the value held in storage.
    pub(crate) const fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }
}

/// Hex SHA-256 digest of artifact content.
#[must_use]
pub fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
