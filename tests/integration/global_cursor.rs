//! Integration tests for the global cursor walk

use crate::support::fake_source::{global_config, read, row, FakeSource};
use agmarknet_ingest::ingest::{IngestError, IngestExecutor};
use agmarknet_ingest::resume::{CursorProgress, ProgressStore, ResumeError, RunLock};
use tempfile::TempDir;

fn cursor(dir: &TempDir) -> CursorProgress {
    ProgressStore::<CursorProgress>::new(dir.path().join("progress.json")).load()
}

#[tokio::test(start_paused = true)]
async fn test_non_positive_price_dropped_across_pages() {
    let dir = TempDir::new().unwrap();
    let source = FakeSource::new()
        .page(0, vec![row("Wheat", "Azadpur", "01-01-2024", "2000")])
        .page(1000, vec![row("Wheat", "Azadpur", "02-01-2024", "-5")]);

    let report = IngestExecutor::new(global_config(dir.path(), 1000), source)
        .run()
        .await
        .unwrap();

    let contents = read(&dir.path().join("crops/wheat.csv")).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2, "header plus one row: {contents}");
    assert_eq!(lines[0], "State,Market,Commodity,Arrival_Date,Modal_Price");
    assert_eq!(lines[1], "Delhi,Azadpur,Wheat,2024-01-01,2000.0");

    assert_eq!(report.rows_written, 1);
    assert_eq!(report.files_created, 1);
    assert_eq!(cursor(&dir).last_offset, 2000);
}

#[tokio::test(start_paused = true)]
async fn test_resumes_from_persisted_offset() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("progress.json"), r#"{"last_offset": 5000}"#).unwrap();

    let source = FakeSource::new();
    let handle = source.clone();
    IngestExecutor::new(global_config(dir.path(), 6000), source)
        .run()
        .await
        .unwrap();

    assert_eq!(handle.unfiltered_offsets(), vec![5000, 6000]);
    assert_eq!(cursor(&dir).last_offset, 7000);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_timeout_advances_cursor() {
    let dir = TempDir::new().unwrap();
    let source = FakeSource::new()
        .timeout(None, 0)
        .page(1000, vec![row("Onion", "Lasalgaon", "03/02/2024", "1500")]);
    let handle = source.clone();

    let report = IngestExecutor::new(global_config(dir.path(), 1000), source)
        .run()
        .await
        .unwrap();

    let offsets = handle.unfiltered_offsets();
    assert_eq!(offsets.iter().filter(|o| **o == 0).count(), 5);
    assert_eq!(offsets.last(), Some(&1000));
    assert_eq!(report.empty_pages, 1);
    assert_eq!(report.rows_written, 1);
    assert_eq!(cursor(&dir).last_offset, 2000);
}

#[tokio::test(start_paused = true)]
async fn test_empty_page_does_not_end_walk() {
    let dir = TempDir::new().unwrap();
    let source = FakeSource::new()
        .page(0, vec![row("Wheat", "Azadpur", "01/01/2024", "2000")])
        .page(2000, vec![row("Wheat", "Azadpur", "03/01/2024", "2050")]);

    let report = IngestExecutor::new(global_config(dir.path(), 2000), source)
        .run()
        .await
        .unwrap();

    assert_eq!(report.pages_fetched, 3);
    assert_eq!(report.empty_pages, 1);
    let contents = read(&dir.path().join("crops/wheat.csv")).unwrap();
    assert_eq!(contents.lines().count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_page_split_into_commodity_files() {
    let dir = TempDir::new().unwrap();
    let source = FakeSource::new().page(
        0,
        vec![
            row("Wheat", "Azadpur", "01/01/2024", "2000"),
            row("Green Chilli", "Azadpur", "01/01/2024", "3000"),
            row("", "Azadpur", "01/01/2024", "100"),
            row("Onion", "Azadpur", "not a date", "900"),
        ],
    );

    let report = IngestExecutor::new(global_config(dir.path(), 0), source)
        .run()
        .await
        .unwrap();

    assert_eq!(report.files_created, 2);
    assert!(dir.path().join("crops/wheat.csv").exists());
    assert!(dir.path().join("crops/green_chilli.csv").exists());
    assert!(!dir.path().join("crops/onion.csv").exists());
    assert!(!dir.path().join("crops/unnamed.csv").exists());
}

#[tokio::test(start_paused = true)]
async fn test_second_run_appends_without_header() {
    let dir = TempDir::new().unwrap();
    IngestExecutor::new(
        global_config(dir.path(), 0),
        FakeSource::new().page(0, vec![row("Wheat", "Azadpur", "01/01/2024", "2000")]),
    )
    .run()
    .await
    .unwrap();

    // Walk further from where the first run stopped
    let report = IngestExecutor::new(
        global_config(dir.path(), 1000),
        FakeSource::new().page(1000, vec![row("Wheat", "Azadpur", "02/01/2024", "2100")]),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.files_created, 0);
    let contents = read(&dir.path().join("crops/wheat.csv")).unwrap();
    assert_eq!(contents.matches("Commodity").count(), 1);
    assert_eq!(contents.lines().count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_run_rejected() {
    let dir = TempDir::new().unwrap();
    let mut lock = RunLock::open(&dir.path().join("progress.json")).unwrap();
    let _guard = lock.try_hold().unwrap();

    let source = FakeSource::new();
    let handle = source.clone();
    let result = IngestExecutor::new(global_config(dir.path(), 1000), source)
        .run()
        .await;

    assert!(matches!(
        result,
        Err(IngestError::Resume(ResumeError::LockError(_)))
    ));
    assert!(handle.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unwritable_output_is_fatal() {
    let dir = TempDir::new().unwrap();
    // A regular file where the data directory should be
    std::fs::write(dir.path().join("crops"), "not a directory").unwrap();

    let source = FakeSource::new().page(0, vec![row("Wheat", "Azadpur", "01/01/2024", "2000")]);
    let result = IngestExecutor::new(global_config(dir.path(), 1000), source)
        .run()
        .await;

    assert!(matches!(result, Err(IngestError::Output(_))));
    assert_eq!(cursor(&dir).last_offset, 0);
}
