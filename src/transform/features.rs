//! Per-market lag and rolling-mean features

use crate::{CleanedRow, FeaturedRow};
use std::collections::BTreeMap;
use tracing::debug;

/// Observations in the rolling mean, current row included
pub const ROLLING_WINDOW: usize = 7;

/// Derive `price_lag_1`, `rolling_mean_7` and `market_id` for one commodity.
///
/// Rows are grouped by market and ordered by date within each group. Rows
/// without a market, and the first rows of each market before a full rolling
/// window exists, are dropped. Market ids enumerate the sorted distinct
/// markets observed in the batch, so a market too short for features still
/// takes an id.
pub fn derive_features(rows: Vec<CleanedRow>) -> Vec<FeaturedRow> {
    let input = rows.len();
    let mut by_market: BTreeMap<String, Vec<CleanedRow>> = BTreeMap::new();
    let mut no_market = 0usize;

    for row in rows {
        match row.market() {
            Some(market) => by_market.entry(market).or_default().push(row),
            None => no_market += 1,
        }
    }

    let markets = by_market.len();
    let mut featured = Vec::new();

    for (market_id, mut group) in (0u32..).zip(by_market.into_values()) {
        if group.len() < ROLLING_WINDOW {
            continue;
        }
        group.sort_by_key(|row| row.arrival_date);

        let prices: Vec<f64> = group.iter().map(|row| row.modal_price).collect();

        for (i, row) in group.into_iter().enumerate().skip(ROLLING_WINDOW - 1) {
            let window = &prices[i + 1 - ROLLING_WINDOW..=i];
            featured.push(FeaturedRow {
                row,
                price_lag_1: prices[i - 1],
                rolling_mean_7: window.iter().sum::<f64>() / ROLLING_WINDOW as f64,
                market_id,
            });
        }
    }

    debug!(
        input,
        kept = featured.len(),
        no_market,
        markets,
        "Derived features"
    );

    featured
}
