//! Progress inspection commands

use crate::resume::{CursorProgress, EntityProgress, ProgressStore, ResumeError, RunLock};
use clap::Args;
use tracing::info;

use super::{Cli, CliError, OutputFormat, StrategyKind};

/// Show recorded progress
#[derive(Args, Debug)]
pub struct StatusArgs {}

impl StatusArgs {
    /// Print the progress the next run would resume from
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let path = &cli.progress_file;
        let exists = path.exists();

        match cli.strategy {
            StrategyKind::Global => {
                let progress = ProgressStore::<CursorProgress>::new(path).load();
                match cli.output_format {
                    OutputFormat::Json => {
                        let output = serde_json::json!({
                            "progress_file": path.display().to_string(),
                            "exists": exists,
                            "last_offset": progress.last_offset,
                        });
                        println!("{output}");
                    }
                    OutputFormat::Human => {
                        println!("Progress file: {}", path.display());
                        println!("  Next offset: {}", progress.last_offset);
                    }
                }
            }
            StrategyKind::PerCommodity => {
                let progress = ProgressStore::<EntityProgress>::new(path).load();
                let failed: Vec<&String> = progress
                    .attempted()
                    .difference(progress.completed())
                    .collect();
                match cli.output_format {
                    OutputFormat::Json => {
                        let output = serde_json::json!({
                            "progress_file": path.display().to_string(),
                            "exists": exists,
                            "attempted": progress.attempted(),
                            "completed": progress.completed(),
                            "failed": failed,
                        });
                        println!("{output}");
                    }
                    OutputFormat::Human => {
                        println!("Progress file: {}", path.display());
                        println!("  Attempted: {}", progress.attempted().len());
                        println!("  Completed: {}", progress.completed().len());
                        if !failed.is_empty() {
                            let names: Vec<&str> = failed.iter().map(|s| s.as_str()).collect();
                            println!("  Failed: {}", names.join(", "));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Delete recorded progress
#[derive(Args, Debug)]
pub struct ResetArgs {}

impl ResetArgs {
    /// Remove the progress file. Refuses while a run holds the lock.
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let path = &cli.progress_file;
        let mut lock = RunLock::open(path)?;
        let _guard = lock.try_hold()?;

        if path.exists() {
            std::fs::remove_file(path).map_err(|e| {
                ResumeError::IoError(format!(
                    "Failed to delete progress file {}: {e}",
                    path.display()
                ))
            })?;
            info!(path = %path.display(), "Progress file deleted");
        } else {
            info!(path = %path.display(), "No progress file, nothing to reset");
        }

        if cli.output_format == OutputFormat::Json {
            println!("{}", serde_json::json!({ "reset": path.display().to_string() }));
        } else {
            println!("Progress reset: {}", path.display());
        }
        Ok(())
    }
}
