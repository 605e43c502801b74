//! CLI command implementations

pub mod error;
pub mod ingest;
pub mod progress;

pub use error::CliError;
pub use ingest::{Cli, Commands, OutputFormat, RunArgs, StrategyKind};
pub use progress::{ResetArgs, StatusArgs};
