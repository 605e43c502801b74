//! Cleaning, windowing and derived-feature transforms
//!
//! Every stage only narrows the row set. An empty result is a normal outcome
//! meaning "nothing to persist for this batch".

use chrono::{NaiveDate, NaiveDateTime};
use std::str::FromStr;

pub mod clean;
pub mod features;

pub use clean::{clean, clean_with_report, CleaningReport};
pub use features::derive_features;

/// Default trailing window kept relative to the newest date in a batch
pub const DEFAULT_WINDOW_YEARS: u32 = 3;

/// Day-first date layouts tried in order by [`DateFormat::DayFirst`].
/// Two-digit years go first: `%y` reads exactly two digits and rejects a
/// four-digit year, while `%Y` would happily read "24" as year 24.
const DAY_FIRST_FORMATS: &[&str] = &[
    "%d/%m/%y", "%d-%m-%y", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d",
];

/// Date-time layouts accepted by [`DateFormat::DayFirst`]
const DAY_FIRST_DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// How `Arrival_Date` is parsed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DateFormat {
    /// Permissive, day before month
    #[default]
    DayFirst,
    /// Exactly one chrono format string, e.g. `%d/%m/%Y`
    Strict(String),
}

impl DateFormat {
    /// Parse a date, `None` if it does not match
    pub fn parse(&self, input: &str) -> Option<NaiveDate> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        match self {
            DateFormat::Strict(format) => NaiveDate::parse_from_str(input, format).ok(),
            DateFormat::DayFirst => DAY_FIRST_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(input, format).ok())
                .or_else(|| {
                    DAY_FIRST_DATETIME_FORMATS.iter().find_map(|format| {
                        NaiveDateTime::parse_from_str(input, format)
                            .ok()
                            .map(|dt| dt.date())
                    })
                }),
        }
    }
}

impl FromStr for DateFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err("date format cannot be empty".to_string()),
            "day-first" | "dayfirst" => Ok(DateFormat::DayFirst),
            format if format.contains('%') => Ok(DateFormat::Strict(format.to_string())),
            other => Err(format!(
                "Invalid date format: {other}. Use 'day-first' or a chrono format such as %d/%m/%Y"
            )),
        }
    }
}

/// Cleaning rules applied to every batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleaningOptions {
    /// How arrival dates are parsed
    pub date_format: DateFormat,
    /// Trailing window in years, `None` keeps full history
    pub window_years: Option<u32>,
}

impl Default for CleaningOptions {
    fn default() -> Self {
        Self {
            date_format: DateFormat::DayFirst,
            window_years: Some(DEFAULT_WINDOW_YEARS),
        }
    }
}
