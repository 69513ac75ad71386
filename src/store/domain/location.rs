//! Filesystem naming of event store files.

use camino::{Utf8Path, Utf8PathBuf};

/// Maximum number of characters kept from an event identifier.
const MAX_SANITIZED_LEN: usize = 32;

/// Strips path-hostile characters from an event identifier.
///
/// Only ASCII alphanumerics, `-` and `_` survive, and the result is capped
/// at 32 characters, so the value can never escape the store directory.
#[must_use]
pub fn sanitize_event_id(raw: &str) -> String {
    raw.chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
        .take(MAX_SANITIZED_LEN)
        .collect()
}

/// Paths of one event's store file and its journal side files.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreLocation {
    primary: Utf8PathBuf,
}

impl StoreLocation {
    /// Derives `<prefix>-event-<sanitized-id>.sqlite3`.
    #[must_use]
    pub fn derive(prefix: &Utf8Path, event_id: &str) -> Self {
        let primary = format!("{prefix}-event-{}.sqlite3", sanitize_event_id(event_id));
        Self {
            primary: Utf8PathBuf::from(primary),
        }
    }

    /// Returns the primary store file.
    #[must_use]
    pub fn primary(&self) -> &Utf8Path {
        &self.primary
    }

    /// Returns the write-ahead journal side file.
    #[must_use]
    pub fn wal(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}-wal", self.primary))
    }

    /// Returns the shared-memory side file.
    #[must_use]
    pub fn shm(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}-shm", self.primary))
    }

    /// Returns every file variant belonging to the store.
    #[must_use]
    pub fn variants(&self) -> [Utf8PathBuf; 3] {
        [self.primary.clone(), self.wal(), self.shm()]
    }
}

/// Outcome of deleting a store's files.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PurgeReport {
    /// Files that were removed.
    pub removed: Vec<Utf8PathBuf>,
    /// Files that could not be removed, with the reason.
    pub failed: Vec<(Utf8PathBuf, String)>,
}

impl PurgeReport {
    /// Returns `true` when every variant was removed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
