//! Store backend keeping every event database in process memory.

use super::{MemoryEventDatabase, database::MemoryRecords};
use crate::store::{
    domain::{PurgeReport, StoreError, StoreLocation},
    ports::StoreBackend,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

#[derive(Debug, Default)]
struct BackendState {
    stores: HashMap<Utf8PathBuf, Arc<RwLock<MemoryRecords>>>,
    files: HashSet<Utf8PathBuf>,
    opens: usize,
    closes: usize,
    fail_open: bool,
    fail_schema: bool,
}

/// In-memory store backend.
///
/// Clones share state, so a clone kept aside observes opens, closes and
/// file presence of the backend driving a cache.
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreBackend {
    state: Arc<Mutex<BackendState>>,
}

impl MemoryStoreBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent opens fail.
    #[must_use]
    pub fn failing_open(self) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fail_open = true;
        }
        self
    }

    /// Makes subsequent schema provisioning fail.
    #[must_use]
    pub fn failing_schema(self) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fail_schema = true;
        }
        self
    }

    /// Returns how many databases were opened.
    #[must_use]
    pub fn opens(&self) -> usize {
        self.lock().map_or(0, |state| state.opens)
    }

    /// Returns how many databases were closed.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.lock().map_or(0, |state| state.closes)
    }

    /// Returns `true` when the simulated file exists.
    #[must_use]
    pub fn file_exists(&self, path: &Utf8Path) -> bool {
        self.lock()
            .is_ok_and(|state| state.files.contains(path))
    }

    fn lock(&self) -> Result<MutexGuard<'_, BackendState>, std::io::Error> {
        self.state
            .lock()
            .map_err(|err| std::io::Error::other(err.to_string()))
    }
}

impl StoreBackend for MemoryStoreBackend {
    type Database = MemoryEventDatabase;

    fn open(&self, location: &StoreLocation, create: bool) -> Result<Self::Database, StoreError> {
        let path = location.primary();
        let mut state = self.lock().map_err(|err| StoreError::open(path, err))?;
        if state.fail_open {
            return Err(StoreError::open(
                path,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "medium unavailable"),
            ));
        }
        if !create && !state.files.contains(path) {
            return Err(StoreError::open(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "event store does not exist"),
            ));
        }
        state.files.insert(path.to_owned());
        state.opens += 1;
        let records = Arc::clone(state.stores.entry(path.to_owned()).or_default());
        Ok(MemoryEventDatabase::shared(records))
    }

    fn provision(&self, location: &StoreLocation, _db: &Self::Database) -> Result<(), StoreError> {
        let path = location.primary();
        let mut state = self
            .lock()
            .map_err(|err| StoreError::schema(path, "tasks table", err))?;
        if state.fail_schema {
            return Err(StoreError::schema(
                path,
                "tasks table",
                std::io::Error::other("schema rejected"),
            ));
        }
        state.files.insert(location.wal());
        state.files.insert(location.shm());
        Ok(())
    }

    fn close(&self, db: Arc<Self::Database>) {
        drop(db);
        if let Ok(mut state) = self.lock() {
            state.closes += 1;
        }
    }

    fn remove(&self, location: &StoreLocation) -> PurgeReport {
        let mut report = PurgeReport::default();
        let Ok(mut state) = self.lock() else {
            report.failed = location
                .variants()
                .into_iter()
                .map(|path| (path, "backend state poisoned".to_owned()))
                .collect();
            return report;
        };
        state.stores.remove(location.primary());
        for path in location.variants() {
            if state.files.remove(&path) {
                report.removed.push(path);
            } else {
                report.failed.push((path, "no such file".to_owned()));
            }
        }
        report
    }
}
