//! CLI error types and conversions

use crate::ingest::{ConfigError, IngestError};
use crate::resume::ResumeError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error (includes a missing API key)
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// Ingestion error
    #[error("ingestion error: {0}")]
    IngestError(#[from] IngestError),

    /// Resume error
    #[error("resume error: {0}")]
    ResumeError(#[from] ResumeError),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    HttpClientError(String),
}
