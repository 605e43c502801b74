//! Date/price cleaning and trailing-window filter

use super::CleaningOptions;
use crate::fields::{ARRIVAL_DATE, COMMODITY, MODAL_PRICE};
use crate::{CleanedRow, Record};
use chrono::{Months, NaiveDate};
use serde_json::Value;
use tracing::debug;

/// Row counts dropped at each cleaning step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningReport {
    /// Records received
    pub input: usize,
    /// Dropped: missing or unparseable `Arrival_Date`
    pub invalid_date: usize,
    /// Dropped: missing or unparseable `Modal_Price`
    pub invalid_price: usize,
    /// Dropped: missing or empty `Commodity`
    pub missing_commodity: usize,
    /// Dropped: `Modal_Price` zero or negative
    pub non_positive_price: usize,
    /// Dropped: older than the trailing window
    pub outside_window: usize,
    /// Rows kept
    pub kept: usize,
}

impl CleaningReport {
    /// Total rows dropped
    pub fn dropped(&self) -> usize {
        self.input - self.kept
    }
}

/// Clean a batch of records
pub fn clean<I>(records: I, options: &CleaningOptions) -> Vec<CleanedRow>
where
    I: IntoIterator<Item = Record>,
{
    clean_with_report(records, options).0
}

/// Clean a batch of records and report what was dropped
///
/// Steps, in order: parse the date, parse the price, require a commodity and
/// a positive price, keep only rows within `window_years` of the newest date.
pub fn clean_with_report<I>(records: I, options: &CleaningOptions) -> (Vec<CleanedRow>, CleaningReport)
where
    I: IntoIterator<Item = Record>,
{
    let mut report = CleaningReport::default();
    let mut rows = Vec::new();

    for record in records {
        report.input += 1;

        let Some(arrival_date) = record
            .text(ARRIVAL_DATE)
            .and_then(|raw| options.date_format.parse(&raw))
        else {
            report.invalid_date += 1;
            continue;
        };

        let Some(modal_price) = record.get(MODAL_PRICE).and_then(parse_price) else {
            report.invalid_price += 1;
            continue;
        };

        let Some(commodity) = record.text(COMMODITY) else {
            report.missing_commodity += 1;
            continue;
        };

        if modal_price <= 0.0 {
            report.non_positive_price += 1;
            continue;
        }

        rows.push(CleanedRow {
            record,
            commodity,
            arrival_date,
            modal_price,
        });
    }

    if let Some(years) = options.window_years {
        if let Some(cutoff) = window_cutoff(&rows, years) {
            let before = rows.len();
            rows.retain(|row| row.arrival_date >= cutoff);
            report.outside_window = before - rows.len();
        }
    }

    report.kept = rows.len();
    debug!(
        input = report.input,
        kept = report.kept,
        invalid_date = report.invalid_date,
        invalid_price = report.invalid_price,
        missing_commodity = report.missing_commodity,
        non_positive_price = report.non_positive_price,
        outside_window = report.outside_window,
        "Batch cleaned"
    );

    (rows, report)
}

/// Oldest date kept: newest date in the batch minus `years` calendar years.
///
/// `None` for an empty batch, or when the subtraction leaves chrono's range
/// (then nothing is old enough to drop).
pub fn window_cutoff(rows: &[CleanedRow], years: u32) -> Option<NaiveDate> {
    let newest = rows.iter().map(|row| row.arrival_date).max()?;
    newest.checked_sub_months(Months::new(years.checked_mul(12)?))
}

/// Parse a price from a JSON number or numeric string. Non-finite is invalid.
pub fn parse_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    price.is_finite().then_some(price)
}
