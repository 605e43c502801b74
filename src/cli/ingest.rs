//! Run command implementation

use crate::fetcher::DataGovClient;
use crate::ingest::config::{
    DEFAULT_BASE_URL, DEFAULT_ENTITY_FILTER_FIELD, DEFAULT_MAX_OFFSET, DEFAULT_PAGE_SIZE,
    DEFAULT_PER_ENTITY_MAX_OFFSET, DEFAULT_RESOURCE_ID,
};
use crate::ingest::{
    IngestConfig, IngestExecutor, IngestReport, LongRecovery, OutputProfile, PaginationStrategy,
    RetryPolicy,
};
use crate::shutdown::SharedShutdown;
use crate::transform::{CleaningOptions, DateFormat, DEFAULT_WINDOW_YEARS};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use super::{CliError, ResetArgs, StatusArgs};

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Pagination strategy as named on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// One cursor over the whole resource, rows appended per commodity
    Global,
    /// Discover commodities, walk and rewrite each one
    PerCommodity,
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "global" | "global-cursor" => Ok(StrategyKind::Global),
            "per-commodity" | "per-entity" => Ok(StrategyKind::PerCommodity),
            _ => Err(format!(
                "Invalid strategy: {s}. Valid options: global, per-commodity"
            )),
        }
    }
}

fn parse_page_size(s: &str) -> Result<u64, String> {
    let value: u64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if value == 0 {
        return Err("page size must be at least 1".to_string());
    }
    Ok(value)
}

/// data.gov.in commodity price ingester
#[derive(Parser, Debug)]
#[command(name = "agmarknet-ingest")]
#[command(about = "Ingest data.gov.in mandi prices into per-commodity CSV files", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Progress marker file
    #[arg(long, global = true, default_value = "data/progress.json")]
    pub progress_file: PathBuf,

    /// Pagination strategy: global or per-commodity
    #[arg(long, global = true, default_value = "global")]
    pub strategy: StrategyKind,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch pages and write per-commodity files, resuming from the progress file
    Run(RunArgs),

    /// Show the recorded progress
    Status(StatusArgs),

    /// Delete the progress file so the next run starts over
    Reset(ResetArgs),
}

/// Arguments for an ingestion run
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// data.gov.in API key
    #[arg(long, env = "DATA_GOV_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// API host
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Resource (dataset) id
    #[arg(long, default_value = DEFAULT_RESOURCE_ID)]
    pub resource_id: String,

    /// Directory for per-commodity CSV files
    #[arg(long, default_value = "data/crops")]
    pub data_dir: PathBuf,

    /// Records per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, value_parser = parse_page_size)]
    pub page_size: u64,

    /// Last offset fetched (default: 3000000 global, 500000 per commodity)
    #[arg(long)]
    pub max_offset: Option<u64>,

    /// Attempts per retry round (range: 1-20)
    #[arg(long, default_value = "5", value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_retries: u32,

    /// After a failed retry round, cool down 5 minutes and try another round
    #[arg(long, default_value_t = false)]
    pub long_recovery: bool,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 20)]
    pub timeout_secs: u64,

    /// Trailing window in years relative to the newest date of a batch
    #[arg(long, default_value_t = DEFAULT_WINDOW_YEARS, conflicts_with = "full_history")]
    pub window_years: u32,

    /// Keep every date instead of a trailing window
    #[arg(long, default_value_t = false)]
    pub full_history: bool,

    /// Arrival date format: day-first, or a chrono format such as %d/%m/%Y
    #[arg(long, default_value = "day-first")]
    pub date_format: DateFormat,

    /// Add price_lag_1, rolling_mean_7 and market_id columns (per-commodity only)
    #[arg(long, default_value_t = false)]
    pub features: bool,

    /// Unfiltered pages sampled to discover commodities (per-commodity only)
    #[arg(long, default_value_t = 1)]
    pub discovery_pages: u64,

    /// Remote field used to filter a commodity walk
    #[arg(long, default_value = DEFAULT_ENTITY_FILTER_FIELD)]
    pub filter_field: String,

    /// Stop after this many pages (global) or commodities (per-commodity)
    #[arg(long)]
    pub max_units: Option<u64>,
}

impl RunArgs {
    /// Build the run configuration. Fails on a missing API key before any
    /// file or network access.
    pub fn to_config(&self, cli: &Cli) -> Result<IngestConfig, CliError> {
        let strategy = match cli.strategy {
            StrategyKind::Global => PaginationStrategy::GlobalCursor {
                max_offset: self.max_offset.unwrap_or(DEFAULT_MAX_OFFSET),
            },
            StrategyKind::PerCommodity => PaginationStrategy::PerEntity {
                discovery_pages: self.discovery_pages,
                per_entity_max_offset: self.max_offset.unwrap_or(DEFAULT_PER_ENTITY_MAX_OFFSET),
            },
        };

        let retry = RetryPolicy {
            max_attempts: self.max_retries,
            long_recovery: self.long_recovery.then(LongRecovery::default),
            ..RetryPolicy::default()
        };

        let cleaning = CleaningOptions {
            date_format: self.date_format.clone(),
            window_years: (!self.full_history).then_some(self.window_years),
        };

        let profile = if self.features {
            OutputProfile::WithFeatures
        } else {
            OutputProfile::Cleaned
        };

        let config = IngestConfig::builder(self.api_key.clone())
            .with_base_url(&self.base_url)
            .with_resource_id(&self.resource_id)
            .with_page_size(self.page_size)
            .with_request_timeout(Duration::from_secs(self.timeout_secs))
            .with_retry(retry)
            .with_data_dir(&self.data_dir)
            .with_progress_path(&cli.progress_file)
            .with_strategy(strategy)
            .with_entity_filter_field(&self.filter_field)
            .with_cleaning(cleaning)
            .with_profile(profile)
            .with_max_units(self.max_units)
            .build()?;
        Ok(config)
    }

    /// Execute an ingestion run
    pub async fn execute(
        &self,
        cli: &Cli,
        shutdown: SharedShutdown,
    ) -> Result<IngestReport, CliError> {
        let config = self.to_config(cli)?;
        let source = DataGovClient::new(&config)
            .map_err(|e| CliError::HttpClientError(e.to_string()))?;

        info!(
            url = source.url(),
            strategy = ?config.strategy,
            profile = ?config.profile,
            data_dir = %config.data_dir.display(),
            progress_file = %config.progress_path.display(),
            "Starting ingestion"
        );

        let report = IngestExecutor::new(config, source)
            .with_shutdown(shutdown)
            .run()
            .await?;

        print_report(&report, cli.output_format);
        Ok(report)
    }
}

fn print_report(report: &IngestReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "status": if report.stopped_early { "stopped" } else { "complete" },
                "report": report,
            });
            println!("{output}");
        }
        OutputFormat::Human => {
            if report.stopped_early {
                println!("Ingestion stopped early; rerun to resume.");
            } else {
                println!("Ingestion complete.");
            }
            println!("  Pages fetched: {} ({} empty)", report.pages_fetched, report.empty_pages);
            println!("  Rows written: {}", report.rows_written);
            println!("  Files created: {}", report.files_created);
            if report.entities_succeeded + report.entities_failed > 0 {
                println!(
                    "  Commodities: {} written, {} failed",
                    report.entities_succeeded, report.entities_failed
                );
            }
        }
    }
}
