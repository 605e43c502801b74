//! Run summary

use crate::output::WriteSummary;
use serde::Serialize;

/// What one ingestion run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Pages requested, including discovery pages and empty ones
    pub pages_fetched: u64,
    /// Pages that came back empty (including exhausted retries)
    pub empty_pages: u64,
    /// Rows written to entity files
    pub rows_written: u64,
    /// Entity files that did not exist before this run wrote them
    pub files_created: u64,
    /// Commodities written successfully (per-commodity strategy)
    pub entities_succeeded: u64,
    /// Commodities with nothing left after cleaning (per-commodity strategy)
    pub entities_failed: u64,
    /// The run stopped on shutdown or `max_units` before reaching its bound
    pub stopped_early: bool,
}

impl IngestReport {
    pub(crate) fn record_page(&mut self, empty: bool) {
        self.pages_fetched += 1;
        if empty {
            self.empty_pages += 1;
        }
    }

    pub(crate) fn record_write(&mut self, summary: &WriteSummary) {
        self.rows_written += summary.rows as u64;
        if summary.created {
            self.files_created += 1;
        }
    }
}
