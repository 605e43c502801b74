//! Single-run lock next to the progress file
//!
//! Implements advisory file locking using fd-lock so that two ingestion runs
//! never write the same progress file and entity files at once.

use super::state::ResumeError;
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Lock file handle for one progress file
pub struct RunLock {
    lock: RwLock<File>,
    path: PathBuf,
}

impl RunLock {
    /// Open (creating if needed) `<progress path>.lock`
    pub fn open(progress_path: &Path) -> Result<Self, ResumeError> {
        if let Some(parent) = progress_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ResumeError::IoError(e.to_string()))?;
            }
        }

        let path = progress_path.with_extension("lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ResumeError::LockError(format!("Failed to open lock file: {e}")))?;

        Ok(Self {
            lock: RwLock::new(file),
            path,
        })
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the exclusive lock without blocking. Held until the guard drops.
    pub fn try_hold(&mut self) -> Result<RwLockWriteGuard<'_, File>, ResumeError> {
        let path = self.path.display().to_string();
        self.lock.try_write().map_err(|e| {
            ResumeError::LockError(format!(
                "Another ingestion run holds {path}: {e}"
            ))
        })
    }
}
