//! Shared helpers for integration tests.

use camino::Utf8PathBuf;
use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use eyre::eyre;
use mockable::Clock;
use std::sync::{Mutex, PoisonError};
use tempfile::TempDir;

/// Clock that only moves when a test advances it.
#[derive(Debug)]
pub struct StepClock {
    now: Mutex<DateTime<Utc>>,
}

impl StepClock {
    /// Starts the clock at a fixed instant.
    pub fn new() -> Self {
        let start = Utc
            .with_ymd_and_hms(2024, 9, 2, 8, 30, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward.
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += TimeDelta::seconds(secs);
    }
}

impl Clock for StepClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Creates a temporary directory with a UTF-8 path.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or its path is not
/// valid UTF-8.
pub fn utf8_tempdir() -> eyre::Result<(TempDir, Utf8PathBuf)> {
    let dir = tempfile::tempdir()?;
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .map_err(|path| eyre!("non UTF-8 temp path {}", path.display()))?;
    Ok((dir, root))
}
