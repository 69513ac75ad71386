//! `SQLite` backend opening one database file per event.

use super::{SqliteEventDatabase, schema};
use crate::store::{
    domain::{PurgeReport, StoreError, StoreLocation},
    ports::StoreBackend,
};
use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;
use tracing::debug;

/// Store backend writing `SQLite` files in write-ahead journal mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteStoreBackend;

impl SqliteStoreBackend {
    /// Creates the backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl StoreBackend for SqliteStoreBackend {
    type Database = SqliteEventDatabase;

    fn open(&self, location: &StoreLocation, create: bool) -> Result<Self::Database, StoreError> {
        let path = location.primary();
        if !create && !path.exists() {
            return Err(StoreError::open(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "event store does not exist"),
            ));
        }
        let connection =
            SqliteConnection::establish(path.as_str()).map_err(|err| StoreError::open(path, err))?;
        Ok(SqliteEventDatabase::new(connection))
    }

    fn provision(&self, location: &StoreLocation, db: &Self::Database) -> Result<(), StoreError> {
        let path = location.primary();
        let mut connection = db
            .lock()
            .map_err(|err| StoreError::schema(path, "connection", err))?;
        let steps = [
            ("tasks table", schema::CREATE_TASKS),
            ("write-ahead journal", schema::JOURNAL_MODE_WAL),
            ("logs table", schema::CREATE_LOGS),
            ("artifacts table", schema::CREATE_ARTIFACTS),
        ];
        for (step, sql) in steps {
            connection
                .batch_execute(sql)
                .map_err(|err| StoreError::schema(path, step, err))?;
        }
        Ok(())
    }

    fn close(&self, db: Arc<Self::Database>) {
        if Arc::strong_count(&db) > 1 {
            debug!("event store closed while handles remain; last handle finishes the close");
        }
        drop(db);
    }

    fn remove(&self, location: &StoreLocation) -> PurgeReport {
        let mut report = PurgeReport::default();
        let parent = location
            .primary()
            .parent()
            .filter(|dir| !dir.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) => {
                report.failed = location
                    .variants()
                    .into_iter()
                    .map(|path| (path, err.to_string()))
                    .collect();
                return report;
            }
        };

        for path in location.variants() {
            let Some(name) = path.file_name() else {
                report.failed.push((path, "path has no file name".to_owned()));
                continue;
            };
            match dir.remove_file(name) {
                Ok(()) => report.removed.push(path),
                Err(err) => report.failed.push((path, err.to_string())),
            }
        }
        report
    }
}
