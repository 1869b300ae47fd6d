//! File-backed ledger snapshot store.
//!
//! Implements [`pipeline::LedgerSnapshotStore`] over a single file on the
//! local disk (by default `processed_event_time.json` in the working
//! directory).
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** File paths and I/O errors live here; the
//! [`pipeline`] crate sees only snapshot bytes.
//!
//! ## Durability
//!
//! Every write goes to `<path>.tmp`, is flushed to disk, and is then renamed
//! over `<path>`; the directory entry is flushed after the rename. A crash at
//! any point leaves either the previous snapshot or the new one, never a
//! truncated file. A stale temp file is overwritten by the next write.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use pipeline::{LedgerSnapshotStore, SnapshotIoError};
use tracing::debug;

/// Ledger snapshot kept in one file.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Writes `bytes` to the temp file and flushes it to disk.
    fn write_temp(&self, bytes: &[u8]) -> Result<PathBuf, SnapshotIoError> {
        let temp = self.temp_path();
        let mut file = File::create(&temp).map_err(|err| io_error("write", &temp, err))?;
        file.write_all(bytes)
            .map_err(|err| io_error("write", &temp, err))?;
        file.sync_all().map_err(|err| io_error("sync", &temp, err))?;
        Ok(temp)
    }

    #[cfg(unix)]
    fn sync_parent(&self) -> Result<(), SnapshotIoError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        File::open(parent)
            .and_then(|dir| dir.sync_all())
            .map_err(|err| io_error("sync", parent, err))
    }

    // Directory handles cannot be opened for syncing on this platform.
    #[cfg(not(unix))]
    fn sync_parent(&self) -> Result<(), SnapshotIoError> {
        Ok(())
    }
}

fn io_error(operation: &'static str, path: &Path, err: std::io::Error) -> SnapshotIoError {
    SnapshotIoError {
        operation,
        message: format!("{}: {err}", path.display()),
    }
}

impl LedgerSnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<Vec<u8>>, SnapshotIoError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no ledger snapshot yet");
                Ok(None)
            }
            Err(err) => Err(io_error("load", &self.path, err)),
        }
    }

    fn store(&self, bytes: &[u8]) -> Result<(), SnapshotIoError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| io_error("create_dir", parent, err))?;
            }
        }
        let temp = self.write_temp(bytes)?;
        fs::rename(&temp, &self.path).map_err(|err| io_error("rename", &self.path, err))?;
        self.sync_parent()
    }
}
