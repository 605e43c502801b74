//! Ingestion loop orchestration
//!
//! This module ties the fetcher, the transforms, the CSV sink and the progress
//! store together into one loop.
//!
//! # Overview
//!
//! 1. **Configuration**: everything is collected once in [`config::IngestConfig`]
//! 2. **Execution**: [`executor::IngestExecutor`] walks the remote dataset
//! 3. **Strategy**: a global cursor appending per page, or a full walk per
//!    commodity replacing its file ([`config::PaginationStrategy`])
//! 4. **Resume**: progress is persisted after every unit of work
//! 5. **Reporting**: a run returns an [`report::IngestReport`]
//!
//! # Error Handling
//!
//! Remote and data-quality problems never surface here; the fetcher and the
//! cleaning stage absorb them. What does surface is fatal:
//! - progress persistence errors (lock held, disk full, permissions)
//! - output file errors
//!
//! Configuration errors ([`ConfigError`]) are raised earlier, when the
//! [`IngestConfig`] is built.
//!
//! # Related Modules
//!
//! - [`crate::fetcher`] - Page fetching with retries
//! - [`crate::transform`] - Cleaning and derived features
//! - [`crate::output`] - Per-commodity CSV files
//! - [`crate::resume`] - Progress state

pub mod config;
pub mod executor;
pub mod report;

pub use config::{
    ApiKey, ConfigError, IngestConfig, IngestConfigBuilder, LongRecovery, OutputProfile,
    PaginationStrategy, RetryPolicy,
};
pub use executor::IngestExecutor;
pub use report::IngestReport;

use crate::output::OutputError;
use crate::resume::ResumeError;

/// Ingestion errors. Every variant ends the run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Progress state could not be locked or persisted
    #[error("progress error: {0}")]
    Resume(#[from] ResumeError),

    /// Entity file could not be written
    #[error("output error: {0}")]
    Output(#[from] OutputError),
}
