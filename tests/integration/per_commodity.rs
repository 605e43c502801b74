//! Integration tests for the per-commodity walk

use crate::support::fake_source::{per_entity_builder, read, row, FakeSource};
use agmarknet_ingest::ingest::{IngestExecutor, OutputProfile, PaginationStrategy};
use agmarknet_ingest::resume::{EntityProgress, ProgressStore};
use tempfile::TempDir;

fn entity_progress(dir: &TempDir) -> EntityProgress {
    ProgressStore::<EntityProgress>::new(dir.path().join("progress.json")).load()
}

fn discovery_page() -> Vec<agmarknet_ingest::Record> {
    vec![
        row("Wheat", "Azadpur", "01/01/2024", "2000"),
        row("Onion", "Lasalgaon", "01/01/2024", "900"),
        row("Potato", "Agra", "01/01/2024", "700"),
        row("Wheat", "Khanna", "01/01/2024", "2050"),
    ]
}

fn scripted_source() -> FakeSource {
    FakeSource::new()
        .page(0, discovery_page())
        .entity_page(
            "Wheat",
            0,
            vec![
                row("Wheat", "Azadpur", "01/01/2024", "2000"),
                row("Wheat", "Khanna", "01/01/2024", "2050"),
            ],
        )
        .entity_page("Wheat", 2, vec![row("Wheat", "Azadpur", "02/01/2024", "2100")])
        .entity_page(
            "Onion",
            0,
            vec![
                row("Onion", "Lasalgaon", "01/01/2024", "0"),
                row("Onion", "Lasalgaon", "02/01/2024", "n/a"),
            ],
        )
        .timeout(Some("Potato"), 0)
}

#[tokio::test(start_paused = true)]
async fn test_walks_each_commodity_and_records_outcomes() {
    let dir = TempDir::new().unwrap();
    let source = scripted_source();
    let handle = source.clone();

    let config = per_entity_builder(dir.path(), 2).build().unwrap();
    let report = IngestExecutor::new(config, source).run().await.unwrap();

    assert_eq!(report.entities_succeeded, 1);
    assert_eq!(report.entities_failed, 2);
    assert_eq!(report.rows_written, 3);
    assert!(!report.stopped_early);

    let wheat = read(&dir.path().join("crops/wheat.csv")).unwrap();
    assert_eq!(wheat.lines().count(), 4);
    assert!(read(&dir.path().join("crops/onion.csv")).is_none());
    assert!(read(&dir.path().join("crops/potato.csv")).is_none());

    let progress = entity_progress(&dir);
    let attempted: Vec<&str> = progress.attempted().iter().map(String::as_str).collect();
    let completed: Vec<&str> = progress.completed().iter().map(String::as_str).collect();
    assert_eq!(attempted, vec!["Onion", "Potato", "Wheat"]);
    assert_eq!(completed, vec!["Wheat"]);

    // Walked in sorted order, each until its first empty page
    let walked: Vec<(String, u64)> = handle
        .requests()
        .into_iter()
        .filter_map(|(filter, offset)| filter.map(|f| (f, offset)))
        .collect();
    let order: Vec<&str> = walked.iter().map(|(f, _)| f.as_str()).collect();
    assert_eq!(order.first(), Some(&"Onion"));
    assert_eq!(order.last(), Some(&"Wheat"));
    assert!(walked.contains(&("Wheat".to_string(), 4)));
    assert_eq!(walked.iter().filter(|(f, _)| f == "Potato").count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_attempted_commodities_never_retried() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("progress.json"),
        r#"{"attempted": ["Onion", "Potato"], "completed": []}"#,
    )
    .unwrap();

    let source = scripted_source();
    let handle = source.clone();
    let config = per_entity_builder(dir.path(), 2).build().unwrap();
    let report = IngestExecutor::new(config, source).run().await.unwrap();

    assert_eq!(report.entities_succeeded, 1);
    assert_eq!(report.entities_failed, 0);
    assert!(handle
        .requests()
        .iter()
        .all(|(filter, _)| filter.as_deref() != Some("Onion") && filter.as_deref() != Some("Potato")));

    // A second run has nothing left to walk
    let source = scripted_source();
    let handle = source.clone();
    let config = per_entity_builder(dir.path(), 2).build().unwrap();
    let report = IngestExecutor::new(config, source).run().await.unwrap();
    assert_eq!(report.entities_succeeded + report.entities_failed, 0);
    assert_eq!(handle.requests(), vec![(None, 0)]);
}

#[tokio::test(start_paused = true)]
async fn test_commodity_file_replaced_wholesale() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("crops")).unwrap();
    std::fs::write(
        dir.path().join("crops/wheat.csv"),
        "Commodity,Modal_Price\nWheat,1\nWheat,2\nWheat,3\nWheat,4\nWheat,5\n",
    )
    .unwrap();

    let config = per_entity_builder(dir.path(), 2).build().unwrap();
    let report = IngestExecutor::new(config, scripted_source())
        .run()
        .await
        .unwrap();

    assert_eq!(report.files_created, 0);
    let wheat = read(&dir.path().join("crops/wheat.csv")).unwrap();
    assert!(wheat.starts_with("State,Market,Commodity,Arrival_Date,Modal_Price\n"));
    assert_eq!(wheat.lines().count(), 4);
    assert!(!wheat.contains("Wheat,1\n"));
}

#[tokio::test(start_paused = true)]
async fn test_discovery_depth_widens_commodity_set() {
    let dir = TempDir::new().unwrap();
    let source = FakeSource::new()
        .page(0, vec![row("Wheat", "Azadpur", "01/01/2024", "2000")])
        .page(1, vec![row("Maize", "Gulabbagh", "01/01/2024", "1900")])
        .entity_page("Maize", 0, vec![row("Maize", "Gulabbagh", "01/01/2024", "1900")])
        .entity_page("Wheat", 0, vec![row("Wheat", "Azadpur", "01/01/2024", "2000")]);

    let shallow = per_entity_builder(dir.path(), 1).build().unwrap();
    let report = IngestExecutor::new(shallow, source.clone())
        .run()
        .await
        .unwrap();
    assert_eq!(report.entities_succeeded, 1);
    assert!(!dir.path().join("crops/maize.csv").exists());

    let deep = per_entity_builder(dir.path(), 1)
        .with_strategy(PaginationStrategy::PerEntity {
            discovery_pages: 2,
            per_entity_max_offset: 100_000,
        })
        .build()
        .unwrap();
    let report = IngestExecutor::new(deep, source).run().await.unwrap();
    assert_eq!(report.entities_succeeded, 1);
    assert!(dir.path().join("crops/maize.csv").exists());
}

#[tokio::test(start_paused = true)]
async fn test_feature_columns_per_market() {
    let dir = TempDir::new().unwrap();
    let mut walk = Vec::new();
    for day in 1..=8 {
        walk.push(row(
            "Tomato",
            "Kolar",
            &format!("{day:02}/03/2024"),
            &format!("{}", 1000 + day * 10),
        ));
    }
    // Too few observations to produce any feature row
    walk.push(row("Tomato", "Madanapalle", "01/03/2024", "800"));

    let source = FakeSource::new()
        .page(0, vec![row("Tomato", "Kolar", "01/03/2024", "1010")])
        .entity_page("Tomato", 0, walk);

    let config = per_entity_builder(dir.path(), 100)
        .with_profile(OutputProfile::WithFeatures)
        .build()
        .unwrap();
    let report = IngestExecutor::new(config, source).run().await.unwrap();
    assert_eq!(report.rows_written, 2);

    let tomato = read(&dir.path().join("crops/tomato.csv")).unwrap();
    let lines: Vec<&str> = tomato.lines().collect();
    assert_eq!(
        lines[0],
        "State,Market,Commodity,Arrival_Date,Modal_Price,price_lag_1,rolling_mean_7,market_id"
    );
    // 7th day: lag = day 6 price, mean of days 1..=7
    assert_eq!(lines[1], "Delhi,Kolar,Tomato,2024-03-07,1070.0,1060.0,1040.0,0");
    assert_eq!(lines[2], "Delhi,Kolar,Tomato,2024-03-08,1080.0,1070.0,1050.0,0");
}

#[tokio::test(start_paused = true)]
async fn test_commodity_walk_stops_at_offset_bound() {
    let dir = TempDir::new().unwrap();
    let mut source = FakeSource::new().page(0, vec![row("Garlic", "Mandsaur", "01/01/2024", "9000")]);
    // The filtered source never runs dry
    for (day, offset) in [0u64, 10, 20, 30, 40].into_iter().enumerate() {
        source = source.entity_page(
            "Garlic",
            offset,
            vec![row("Garlic", "Mandsaur", &format!("{:02}/01/2024", day + 1), "9000")],
        );
    }
    let handle = source.clone();

    let config = per_entity_builder(dir.path(), 10)
        .with_strategy(PaginationStrategy::PerEntity {
            discovery_pages: 1,
            per_entity_max_offset: 30,
        })
        .build()
        .unwrap();
    let report = IngestExecutor::new(config, source).run().await.unwrap();

    let walked: Vec<u64> = handle
        .requests()
        .into_iter()
        .filter_map(|(filter, offset)| filter.map(|_| offset))
        .collect();
    assert_eq!(walked, vec![0, 10, 20, 30]);
    assert_eq!(report.entities_succeeded, 1);
    assert!(entity_progress(&dir).completed().contains("Garlic"));

    let garlic = read(&dir.path().join("crops/garlic.csv")).unwrap();
    assert_eq!(garlic.lines().count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_spellings_sharing_a_file_are_merged() {
    let dir = TempDir::new().unwrap();
    let source = FakeSource::new()
        .page(
            0,
            vec![
                row("Onion", "Lasalgaon", "01/01/2024", "900"),
                row("ONION", "Pimpalgaon", "01/01/2024", "950"),
            ],
        )
        .entity_page("Onion", 0, vec![row("Onion", "Lasalgaon", "01/01/2024", "900")])
        .entity_page("ONION", 0, vec![row("ONION", "Pimpalgaon", "01/01/2024", "950")]);

    let config = per_entity_builder(dir.path(), 2).build().unwrap();
    let report = IngestExecutor::new(config, source).run().await.unwrap();

    assert_eq!(report.entities_succeeded, 1);
    assert_eq!(report.rows_written, 2);

    let onion = read(&dir.path().join("crops/onion.csv")).unwrap();
    assert_eq!(onion.lines().count(), 3);
    assert!(onion.contains("Lasalgaon"));
    assert!(onion.contains("Pimpalgaon"));

    let progress = entity_progress(&dir);
    let completed: Vec<&str> = progress.completed().iter().map(String::as_str).collect();
    assert_eq!(completed, vec!["ONION", "Onion"]);
}

#[tokio::test(start_paused = true)]
async fn test_market_ids_count_markets_without_features() {
    let dir = TempDir::new().unwrap();
    // Bangalore sorts first but has too few rows for features
    let mut walk = vec![row("Tomato", "Bangalore", "01/03/2024", "900")];
    for day in 1..=7 {
        walk.push(row("Tomato", "Kolar", &format!("{day:02}/03/2024"), "1000"));
    }

    let source = FakeSource::new()
        .page(0, vec![row("Tomato", "Kolar", "01/03/2024", "1000")])
        .entity_page("Tomato", 0, walk);
    let config = per_entity_builder(dir.path(), 100)
        .with_profile(OutputProfile::WithFeatures)
        .build()
        .unwrap();
    let report = IngestExecutor::new(config, source).run().await.unwrap();
    assert_eq!(report.rows_written, 1);

    let tomato = read(&dir.path().join("crops/tomato.csv")).unwrap();
    let lines: Vec<&str> = tomato.lines().collect();
    assert_eq!(lines[1], "Delhi,Kolar,Tomato,2024-03-07,1000.0,1000.0,1000.0,1");
}
