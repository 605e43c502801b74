//! Unit tests for commodity name normalization

use agmarknet_ingest::output::path::UNNAMED_STEM;
use agmarknet_ingest::output::{entity_path, normalize_entity_name, CsvEntitySink, WriteMode};
use agmarknet_ingest::Record;
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

const NAMES: &[&str] = &[
    "Wheat",
    "  Green Chilli ",
    "Bhindi(Ladies Finger)",
    "Paddy(Dhan)(Common)",
    "Arhar (Tur/Red Gram)(Whole)",
    "Coconut Seed",
    "Kabuli-Chana",
    "फूलगोभी",
    "???",
    "",
];

#[test]
fn test_normalization_is_deterministic_and_idempotent() {
    for name in NAMES {
        let once = normalize_entity_name(name);
        assert_eq!(once, normalize_entity_name(name));
        assert_eq!(once, normalize_entity_name(&once), "not idempotent for {name:?}");
        assert!(!once.is_empty());
        assert!(!once.contains(char::is_whitespace));
        assert!(!once.contains('/'));
    }
}

#[test]
fn test_known_names() {
    assert_eq!(normalize_entity_name("Arhar (Tur/Red Gram)(Whole)"), "arhar_turred_gramwhole");
    assert_eq!(normalize_entity_name("Kabuli-Chana"), "kabuli-chana");
    assert_eq!(normalize_entity_name("???"), UNNAMED_STEM);
    assert_eq!(
        entity_path(Path::new("data/crops"), "Coconut Seed"),
        Path::new("data/crops/coconut_seed.csv")
    );
}

#[test]
fn test_colliding_names_share_one_file() {
    let dir = TempDir::new().unwrap();
    let sink = CsvEntitySink::new(dir.path(), WriteMode::Append);

    for name in ["Green Chilli", "green  chilli", " GREEN CHILLI!"] {
        let record: Record = serde_json::from_value(json!({
            "Commodity": name,
            "Modal_Price": 3000.0
        }))
        .unwrap();
        sink.write_entity(name, &[record]).unwrap();
    }

    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
    let contents = std::fs::read_to_string(dir.path().join("green_chilli.csv")).unwrap();
    assert_eq!(contents.lines().count(), 4);
}
