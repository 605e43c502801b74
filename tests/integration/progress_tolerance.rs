//! Integration tests for loading damaged or foreign progress files

use agmarknet_ingest::resume::{CursorProgress, EntityProgress, ProgressStore};
use std::path::PathBuf;
use tempfile::TempDir;

fn write(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("progress.json");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_missing_file_gives_default() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    assert_eq!(
        ProgressStore::<CursorProgress>::new(&path).load(),
        CursorProgress::default()
    );
    assert_eq!(
        ProgressStore::<EntityProgress>::new(&path).load(),
        EntityProgress::default()
    );
}

#[test]
fn test_empty_file_gives_default() {
    let dir = TempDir::new().unwrap();
    for contents in ["", "   \n"] {
        let path = write(&dir, contents);
        assert_eq!(ProgressStore::<CursorProgress>::new(&path).load().last_offset, 0);
        assert!(ProgressStore::<EntityProgress>::new(&path)
            .load()
            .attempted()
            .is_empty());
    }
}

#[test]
fn test_invalid_json_gives_default() {
    let dir = TempDir::new().unwrap();
    for contents in ["{", "last_offset: 5000", "[]", "null", r#"{"last_offset": -3}"#] {
        let path = write(&dir, contents);
        assert_eq!(
            ProgressStore::<CursorProgress>::new(&path).load(),
            CursorProgress::default(),
            "contents: {contents}"
        );
    }
}

#[test]
fn test_other_shape_gives_default() {
    let dir = TempDir::new().unwrap();

    let path = write(&dir, r#"{"attempted": ["Wheat"], "completed": ["Wheat"]}"#);
    assert_eq!(
        ProgressStore::<CursorProgress>::new(&path).load(),
        CursorProgress::default()
    );

    let path = write(&dir, r#"{"last_offset": 5000}"#);
    assert_eq!(
        ProgressStore::<EntityProgress>::new(&path).load(),
        EntityProgress::default()
    );
}

#[test]
fn test_load_never_touches_damaged_file() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "{ broken");
    ProgressStore::<CursorProgress>::new(&path).load();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ broken");
}

#[test]
fn test_entity_sets_saved_sorted() {
    let dir = TempDir::new().unwrap();
    let store = ProgressStore::<EntityProgress>::new(dir.path().join("progress.json"));

    let mut progress = EntityProgress::default();
    progress.mark_failed("Potato");
    progress.mark_completed("Onion");
    progress.mark_completed("Apple");
    store.save(&progress).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "attempted": ["Apple", "Onion", "Potato"],
            "completed": ["Apple", "Onion"]
        })
    );
    assert_eq!(store.load(), progress);
}
