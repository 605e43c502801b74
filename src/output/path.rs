//! Commodity name to file path mapping

use std::path::{Path, PathBuf};

/// Stem used when a commodity name normalizes to nothing
pub const UNNAMED_STEM: &str = "unnamed";

/// Normalize a commodity name into a filename stem.
///
/// Lowercases and trims, removes everything except letters, digits,
/// underscores, hyphens and whitespace, then turns each whitespace run into a
/// single underscore. "Paddy(Dhan)(Common)" becomes "paddydhancommon" and
/// "Bhindi (Ladies Finger)" becomes "bhindi_ladies_finger".
pub fn normalize_entity_name(name: &str) -> String {
    let kept: String = name
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();

    let stem = kept.split_whitespace().collect::<Vec<_>>().join("_");
    if stem.is_empty() {
        UNNAMED_STEM.to_string()
    } else {
        stem
    }
}

/// `<data_dir>/<normalized name>.csv`
pub fn entity_path(data_dir: &Path, name: &str) -> PathBuf {
    data_dir.join(format!("{}.csv", normalize_entity_name(name)))
}
