//! Per-commodity output files

use std::path::PathBuf;

pub mod csv;
pub mod path;

pub use self::csv::CsvEntitySink;
pub use path::{entity_path, normalize_entity_name};

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Atomic replace failed
    #[error("failed to persist {path}: {message}")]
    PersistError {
        /// Destination path
        path: PathBuf,
        /// Underlying error
        message: String,
    },
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// How an entity file is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create with header, or append rows without header if the file exists
    Append,
    /// Write the whole file and atomically replace any previous version
    Replace,
}

/// What a single entity write did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    /// File written
    pub path: PathBuf,
    /// Rows written
    pub rows: usize,
    /// Whether the file did not exist before this call
    pub created: bool,
}
