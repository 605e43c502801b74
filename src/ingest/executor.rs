//! Ingestion executor with retry and resume capability
//!
//! One loop, parameterised by [`PaginationStrategy`] and [`OutputProfile`]:
//!
//! - **Global cursor**: a single offset walks the whole resource. Each page is
//!   cleaned, grouped by commodity and appended to the commodity files. An
//!   empty page does not end the walk; only the offset bound does.
//! - **Per commodity**: commodities are discovered from the first unfiltered
//!   page(s), then each one not yet attempted is walked with a server-side
//!   filter until an empty page, cleaned as a whole and written as one file.
//!   Names that normalize to the same file stem are walked together and
//!   written once.
//!
//! Progress is persisted after every unit of work (page or commodity).

use crate::fetcher::{EntityFilter, PageRequest, PageSource, ResilientFetcher};
use crate::fields::COMMODITY;
use crate::ingest::config::{IngestConfig, OutputProfile, PaginationStrategy};
use crate::ingest::{IngestError, IngestReport};
use crate::output::{normalize_entity_name, CsvEntitySink, WriteMode, WriteSummary};
use crate::resume::{CursorProgress, EntityProgress, ProgressStore, RunLock};
use crate::shutdown::SharedShutdown;
use crate::transform::{clean_with_report, derive_features, CleaningReport};
use crate::{CleanedRow, Record};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runs the ingestion loop against a [`PageSource`]
pub struct IngestExecutor<S> {
    config: IngestConfig,
    fetcher: ResilientFetcher<S>,
    shutdown: Option<SharedShutdown>,
}

impl<S: PageSource> IngestExecutor<S> {
    /// Create an executor. The source is wrapped with the configured retry policy.
    pub fn new(config: IngestConfig, source: S) -> Self {
        let fetcher = ResilientFetcher::new(source, config.retry);
        Self {
            config,
            fetcher,
            shutdown: None,
        }
    }

    /// Attach a shared shutdown handle for graceful cancellation.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.fetcher = self.fetcher.with_shutdown(shutdown.clone());
        self.shutdown = Some(shutdown);
        self
    }

    /// Configuration in force
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Run until the strategy's bound, `max_units` or shutdown.
    ///
    /// Only fatal conditions are returned as errors: the progress lock is held
    /// by another run, or progress/output files cannot be written.
    pub async fn run(&self) -> Result<IngestReport, IngestError> {
        let mut lock = RunLock::open(&self.config.progress_path)?;
        let _guard = lock.try_hold()?;

        let mut report = IngestReport::default();
        match self.config.strategy {
            PaginationStrategy::GlobalCursor { max_offset } => {
                self.run_global(max_offset, &mut report).await?
            }
            PaginationStrategy::PerEntity {
                discovery_pages,
                per_entity_max_offset,
            } => {
                self.run_per_entity(discovery_pages, per_entity_max_offset, &mut report)
                    .await?
            }
        }

        info!(
            pages_fetched = report.pages_fetched,
            empty_pages = report.empty_pages,
            rows_written = report.rows_written,
            files_created = report.files_created,
            entities_succeeded = report.entities_succeeded,
            entities_failed = report.entities_failed,
            stopped_early = report.stopped_early,
            "Ingestion finished"
        );
        Ok(report)
    }

    async fn run_global(
        &self,
        max_offset: u64,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        let store = ProgressStore::<CursorProgress>::new(&self.config.progress_path);
        let mut progress = store.load();
        let sink = CsvEntitySink::new(&self.config.data_dir, WriteMode::Append);
        let page_size = self.config.page_size;
        let ceiling = self.config.request_ceiling();
        let mut units = 0u64;

        info!(
            start_offset = progress.last_offset,
            max_offset,
            page_size,
            "Starting global cursor walk"
        );

        while progress.last_offset <= max_offset {
            if self.should_stop(units) {
                report.stopped_early = true;
                break;
            }

            let offset = progress.last_offset;
            let Some(request) = page_request(offset, page_size, None, ceiling) else {
                break;
            };
            let records = self.fetcher.fetch(&request).await;

            // An interrupted fetch looks like an empty page; keep the offset.
            if self.shutdown_requested() {
                report.stopped_early = true;
                break;
            }

            units += 1;
            let empty = records.is_empty();
            report.record_page(empty);

            if empty {
                info!(offset, "Empty page, advancing cursor");
            } else {
                let (rows, quality) = clean_with_report(records, &self.config.cleaning);
                log_quality(offset, &quality);
                for summary in sink.write_groups(&group_by_commodity(&rows))? {
                    report.record_write(&summary);
                }
            }

            progress.last_offset = offset.saturating_add(page_size);
            store.save(&progress)?;
            debug!(next_offset = progress.last_offset, "Cursor advanced");

            if !empty && !self.pause(self.config.page_delay).await {
                report.stopped_early = true;
                break;
            }
        }

        Ok(())
    }

    async fn run_per_entity(
        &self,
        discovery_pages: u64,
        per_entity_max_offset: u64,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        let store = ProgressStore::<EntityProgress>::new(&self.config.progress_path);
        let mut progress = store.load();
        let sink = CsvEntitySink::new(&self.config.data_dir, WriteMode::Replace);

        let Some(discovered) = self.discover(discovery_pages, report).await else {
            report.stopped_early = true;
            return Ok(());
        };

        let pending: Vec<Vec<String>> = group_by_stem(discovered)
            .into_values()
            .filter(|names| names.iter().any(|name| !progress.is_attempted(name)))
            .collect();
        info!(
            pending = pending.len(),
            attempted = progress.attempted().len(),
            completed = progress.completed().len(),
            "Commodities to walk"
        );

        let mut units = 0u64;
        'entities: for names in pending {
            if self.should_stop(units) {
                report.stopped_early = true;
                break;
            }

            // Spellings sharing a file stem are all walked before that file is replaced
            let mut records = Vec::new();
            for name in &names {
                let Some(walked) = self.walk_entity(name, per_entity_max_offset, report).await
                else {
                    report.stopped_early = true;
                    break 'entities;
                };
                records.extend(walked);
            }
            units += 1;

            let entity = &names[0];
            if names.len() > 1 {
                info!(entity, names = ?names, "Merging commodity names sharing one file");
            }
            match self.write_entity(&sink, entity, records)? {
                Some(summary) => {
                    report.record_write(&summary);
                    report.entities_succeeded += 1;
                    names.iter().for_each(|name| progress.mark_completed(name));
                }
                None => {
                    report.entities_failed += 1;
                    names.iter().for_each(|name| progress.mark_failed(name));
                }
            }
            store.save(&progress)?;
        }

        Ok(())
    }

    /// Distinct commodities seen in the first `pages` unfiltered pages.
    /// `None` on shutdown.
    async fn discover(
        &self,
        pages: u64,
        report: &mut IngestReport,
    ) -> Option<BTreeSet<String>> {
        let page_size = self.config.page_size;
        let ceiling = pages.saturating_mul(page_size);
        let mut entities = BTreeSet::new();

        for page in 0..pages {
            let offset = page.saturating_mul(page_size);
            let Some(request) = page_request(offset, page_size, None, ceiling) else {
                break;
            };
            let records = self.fetcher.fetch(&request).await;
            if self.shutdown_requested() {
                return None;
            }
            report.record_page(records.is_empty());
            if records.is_empty() {
                break;
            }

            entities.extend(records.iter().filter_map(|r| r.text(COMMODITY)));
            if page + 1 < pages && !self.pause(self.config.page_delay).await {
                return None;
            }
        }

        if entities.is_empty() {
            warn!(pages, "Discovery found no commodities");
        } else {
            info!(pages, commodities = entities.len(), "Discovered commodities");
        }
        Some(entities)
    }

    /// Every record of one commodity, up to the per-commodity offset bound.
    /// `None` on shutdown.
    async fn walk_entity(
        &self,
        entity: &str,
        max_offset: u64,
        report: &mut IngestReport,
    ) -> Option<Vec<Record>> {
        let page_size = self.config.page_size;
        let ceiling = self.config.request_ceiling();
        let filter = EntityFilter {
            field: self.config.entity_filter_field.clone(),
            value: entity.to_string(),
        };
        let mut records = Vec::new();
        let mut offset = 0u64;

        info!(entity, "Walking commodity");
        while offset <= max_offset {
            let Some(request) = page_request(offset, page_size, Some(filter.clone()), ceiling)
            else {
                break;
            };
            let page = self.fetcher.fetch(&request).await;
            if self.shutdown_requested() {
                return None;
            }
            report.record_page(page.is_empty());
            if page.is_empty() {
                break;
            }

            debug!(entity, offset, records = page.len(), "Commodity page");
            records.extend(page);
            offset = offset.saturating_add(page_size);
            if !self.pause(self.config.page_delay).await {
                return None;
            }
        }

        info!(entity, records = records.len(), "Commodity walk finished");
        Some(records)
    }

    /// Clean (and optionally featurize) a commodity's records and replace its
    /// file. `None` when nothing survives; no file is touched then.
    fn write_entity(
        &self,
        sink: &CsvEntitySink,
        entity: &str,
        records: Vec<Record>,
    ) -> Result<Option<WriteSummary>, IngestError> {
        let (rows, quality) = clean_with_report(records, &self.config.cleaning);
        debug!(
            entity,
            input = quality.input,
            kept = quality.kept,
            dropped = quality.dropped(),
            "Commodity cleaned"
        );
        if rows.is_empty() {
            warn!(entity, input = quality.input, "No rows left after cleaning");
            return Ok(None);
        }

        let output: Vec<Record> = match self.config.profile {
            OutputProfile::Cleaned => rows.iter().map(CleanedRow::to_output_record).collect(),
            OutputProfile::WithFeatures => derive_features(rows)
                .iter()
                .map(|row| row.to_output_record())
                .collect(),
        };
        if output.is_empty() {
            warn!(entity, "No rows left after deriving features");
            return Ok(None);
        }

        Ok(Some(sink.write_entity(entity, &output)?))
    }

    fn should_stop(&self, units: u64) -> bool {
        if self.shutdown_requested() {
            info!("Shutdown requested, stopping");
            return true;
        }
        if self.config.max_units.is_some_and(|max| units >= max) {
            info!(units, "Unit limit reached, stopping");
            return true;
        }
        false
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    /// Sleep between pages. Returns `false` if shutdown cut it short.
    async fn pause(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.shutdown_requested();
        }
        if let Some(shutdown) = &self.shutdown {
            if shutdown.is_shutdown_requested() {
                return false;
            }
            tokio::select! {
                _ = tokio::time::sleep(duration) => true,
                _ = shutdown.wait_for_shutdown() => false,
            }
        } else {
            tokio::time::sleep(duration).await;
            true
        }
    }
}

/// Build a page request, or warn and return `None` if it reads past `ceiling`.
/// Callers treat a refused request like an empty page.
fn page_request(
    offset: u64,
    limit: u64,
    filter: Option<EntityFilter>,
    ceiling: u64,
) -> Option<PageRequest> {
    match PageRequest::new(offset, limit, filter, ceiling) {
        Ok(request) => Some(request),
        Err(e) => {
            warn!(offset, limit, ceiling, error = %e, "Page request refused");
            None
        }
    }
}

/// Raw commodity names keyed by the file stem they normalize to
fn group_by_stem(names: BTreeSet<String>) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in names {
        groups.entry(normalize_entity_name(&name)).or_default().push(name);
    }
    groups
}

/// Cleaned rows keyed by raw commodity name, ready for the sink
fn group_by_commodity(rows: &[CleanedRow]) -> BTreeMap<String, Vec<Record>> {
    let mut groups: BTreeMap<String, Vec<Record>> = BTreeMap::new();
    for row in rows {
        groups
            .entry(row.commodity.clone())
            .or_default()
            .push(row.to_output_record());
    }
    groups
}

fn log_quality(offset: u64, quality: &CleaningReport) {
    if quality.dropped() > 0 {
        info!(
            offset,
            input = quality.input,
            kept = quality.kept,
            invalid_date = quality.invalid_date,
            invalid_price = quality.invalid_price,
            missing_commodity = quality.missing_commodity,
            non_positive_price = quality.non_positive_price,
            outside_window = quality.outside_window,
            "Rows dropped during cleaning"
        );
    }
}
