//! Progress persistence
//!
//! Loading never fails: any problem reading or decoding the file gives a
//! fresh default state. Saving writes the whole document to a temp file and
//! renames it over the previous one.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Largest progress file read. Anything bigger is not ours.
pub const MAX_STATE_FILE_SIZE: u64 = 1024 * 1024;

/// A persisted progress document
pub trait ProgressShape: Serialize + DeserializeOwned + Default + Debug {
    /// Fix up a freshly decoded state. The default does nothing.
    fn repair(&mut self) {}
}

/// Global cursor progress: `{"last_offset": N}`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorProgress {
    /// Next offset to fetch
    pub last_offset: u64,
}

impl ProgressShape for CursorProgress {}

/// Per-commodity progress: `{"attempted": [...], "completed": [...]}`
///
/// Every completed commodity is also attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityProgress {
    attempted: BTreeSet<String>,
    completed: BTreeSet<String>,
}

impl EntityProgress {
    /// Commodities tried, successfully or not
    pub fn attempted(&self) -> &BTreeSet<String> {
        &self.attempted
    }

    /// Commodities written successfully
    pub fn completed(&self) -> &BTreeSet<String> {
        &self.completed
    }

    /// Whether a commodity has been tried before
    pub fn is_attempted(&self, entity: &str) -> bool {
        self.attempted.contains(entity)
    }

    /// Record a successful commodity
    pub fn mark_completed(&mut self, entity: &str) {
        self.attempted.insert(entity.to_string());
        self.completed.insert(entity.to_string());
    }

    /// Record a failed commodity
    pub fn mark_failed(&mut self, entity: &str) {
        self.attempted.insert(entity.to_string());
    }
}

impl ProgressShape for EntityProgress {
    fn repair(&mut self) {
        let missing: Vec<String> = self
            .completed
            .difference(&self.attempted)
            .cloned()
            .collect();
        if !missing.is_empty() {
            warn!(
                count = missing.len(),
                "Completed commodities missing from attempted set, adding them"
            );
            self.attempted.extend(missing);
        }
    }
}

/// Load/save a progress document at a fixed path
#[derive(Debug, Clone)]
pub struct ProgressStore<P> {
    path: PathBuf,
    _shape: PhantomData<P>,
}

impl<P: ProgressShape> ProgressStore<P> {
    /// Store at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _shape: PhantomData,
        }
    }

    /// File path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load progress, falling back to the default state on any problem
    pub fn load(&self) -> P {
        match self.try_load() {
            Ok(Some(mut state)) => {
                state.repair();
                info!(path = %self.path.display(), state = ?state, "Progress loaded");
                state
            }
            Ok(None) => {
                info!(path = %self.path.display(), "No progress recorded, starting fresh");
                P::default()
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Unreadable progress file, starting fresh"
                );
                P::default()
            }
        }
    }

    fn try_load(&self) -> Result<Option<P>, ResumeError> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ResumeError::IoError(e.to_string())),
        };

        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(ResumeError::StateTooLarge {
                size: metadata.len(),
                max: MAX_STATE_FILE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(&self.path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        if contents.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| ResumeError::DeserializationError(e.to_string()))
    }

    /// Overwrite the progress file with `state`
    pub fn save(&self, state: &P) -> Result<(), ResumeError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(|e| ResumeError::IoError(e.to_string()))?;

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| ResumeError::SerializationError(e.to_string()))?;

        let mut temp_file = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| ResumeError::IoError(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;
        temp_file
            .persist(&self.path)
            .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

        // Make the rename durable
        if let Ok(dir) = std::fs::File::open(parent) {
            let _ = dir.sync_all();
        }

        debug!(path = %self.path.display(), state = ?state, "Progress saved");
        Ok(())
    }
}

/// Errors related to progress persistence
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// State file too large
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}
