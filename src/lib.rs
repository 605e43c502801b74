//! # Agmarknet Ingest Library
//!
//! Resumable ingestion of daily commodity mandi prices published on the
//! data.gov.in open-data API. Pages are fetched with bounded retries, cleaned
//! and windowed, partitioned per commodity and persisted as CSV files. A small
//! JSON progress marker lets an interrupted run pick up where it stopped.
//!
//! ## Quick Start
//!
//! ```no_run
//! use agmarknet_ingest::fetcher::data_gov_http::DataGovClient;
//! use agmarknet_ingest::ingest::{IngestConfig, IngestExecutor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = IngestConfig::builder(std::env::var("DATA_GOV_API_KEY").ok()).build()?;
//! let source = DataGovClient::new(&config)?;
//! let report = IngestExecutor::new(config, source).run().await?;
//! println!("wrote {} rows", report.rows_written);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`fetcher`] - Page requests, the HTTP source and the retrying fetcher
//! - [`transform`] - Date/price cleaning, time windowing and derived features
//! - [`output`] - Per-commodity CSV files
//! - [`resume`] - Progress persistence and the single-run lock
//! - [`ingest`] - Configuration and the ingestion loop itself
//! - [`cli`] - Command line arguments for the binary
//!
//! ## Data Types
//!
//! - [`Record`] - One raw row as returned by the API
//! - [`CleanedRow`] - A record with a valid date, positive price and commodity
//! - [`FeaturedRow`] - A cleaned row extended with lag/rolling features

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// CLI argument parsing
pub mod cli;

/// Ingestion configuration and loop
pub mod ingest;

/// Page fetching
pub mod fetcher;

/// Per-commodity output files
pub mod output;

/// Progress persistence
pub mod resume;

/// Graceful shutdown coordination
pub mod shutdown;

/// Cleaning and feature transforms
pub mod transform;

/// Field names used by the ingestion loop
pub mod fields {
    /// Commodity (crop) name, the partition key for output files
    pub const COMMODITY: &str = "Commodity";
    /// Arrival date, day-first in the source
    pub const ARRIVAL_DATE: &str = "Arrival_Date";
    /// Modal price per quintal
    pub const MODAL_PRICE: &str = "Modal_Price";
    /// Market (mandi) name
    pub const MARKET: &str = "Market";
    /// Previous modal price in the same market
    pub const PRICE_LAG_1: &str = "price_lag_1";
    /// Trailing 7-observation mean of the modal price in the same market
    pub const ROLLING_MEAN_7: &str = "rolling_mean_7";
    /// Dense integer id of the market within one commodity
    pub const MARKET_ID: &str = "market_id";
}

/// A raw record as returned by the remote source.
///
/// Field order is preserved from the JSON body so that CSV columns come out
/// in the same order the API lists them. Unknown fields pass through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Get a raw field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Get a field as trimmed text.
    ///
    /// Strings and numbers are readable; null, empty strings and nested
    /// values yield `None`.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Set a field, keeping its original position if it already exists
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    /// Field names in source order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A record that passed date, price and window validation
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRow {
    /// The original record, all fields untouched
    pub record: Record,
    /// Non-empty commodity name
    pub commodity: String,
    /// Parsed arrival date
    pub arrival_date: NaiveDate,
    /// Parsed modal price, finite and strictly positive
    pub modal_price: f64,
}

impl CleanedRow {
    /// Market name, if present
    pub fn market(&self) -> Option<String> {
        self.record.text(fields::MARKET)
    }

    /// Validate cleaned row invariants
    pub fn validate(&self) -> Result<(), String> {
        if self.commodity.trim().is_empty() {
            return Err("Commodity cannot be empty".to_string());
        }

        if !self.modal_price.is_finite() || self.modal_price <= 0.0 {
            return Err(format!(
                "Modal price must be finite and positive, got {}",
                self.modal_price
            ));
        }

        Ok(())
    }

    /// Record as it is written to disk: the normalized date and price replace
    /// the raw strings, every other field is kept as received.
    pub fn to_output_record(&self) -> Record {
        let mut record = self.record.clone();
        record.insert(
            fields::ARRIVAL_DATE,
            self.arrival_date.format("%Y-%m-%d").to_string(),
        );
        record.insert(fields::MODAL_PRICE, self.modal_price);
        record
    }
}

/// A cleaned row extended with per-market derived features
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturedRow {
    /// The underlying cleaned row
    pub row: CleanedRow,
    /// Modal price of the previous observation in the same market
    pub price_lag_1: f64,
    /// Mean modal price over the last 7 observations in the same market,
    /// current one included
    pub rolling_mean_7: f64,
    /// Dense id of the market within this commodity's batch
    pub market_id: u32,
}

impl FeaturedRow {
    /// Record as it is written to disk, with the feature columns appended
    pub fn to_output_record(&self) -> Record {
        let mut record = self.row.to_output_record();
        record.insert(fields::PRICE_LAG_1, self.price_lag_1);
        record.insert(fields::ROLLING_MEAN_7, self.rolling_mean_7);
        record.insert(fields::MARKET_ID, self.market_id);
        record
    }
}
