//! CSV sink writing one file per commodity

use crate::Record;
use csv::{ReaderBuilder, WriterBuilder};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::path::{entity_path, normalize_entity_name};
use super::{OutputError, OutputResult, WriteMode, WriteSummary};

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// Writes rows to `<data_dir>/<normalized commodity>.csv`
#[derive(Debug, Clone)]
pub struct CsvEntitySink {
    data_dir: PathBuf,
    mode: WriteMode,
}

impl CsvEntitySink {
    /// Create a sink. The directory is created on first write.
    pub fn new(data_dir: impl Into<PathBuf>, mode: WriteMode) -> Self {
        Self {
            data_dir: data_dir.into(),
            mode,
        }
    }

    /// Output directory
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Write mode
    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Path for a commodity
    pub fn path_for(&self, entity: &str) -> PathBuf {
        entity_path(&self.data_dir, entity)
    }

    /// Write rows grouped by entity. Names that normalize to the same stem go
    /// to the same file, in the order the groups are given.
    pub fn write_groups(
        &self,
        groups: &BTreeMap<String, Vec<Record>>,
    ) -> OutputResult<Vec<WriteSummary>> {
        let mut by_stem: BTreeMap<String, Vec<&Record>> = BTreeMap::new();
        for (entity, rows) in groups {
            by_stem
                .entry(normalize_entity_name(entity))
                .or_default()
                .extend(rows.iter());
        }

        let mut summaries = Vec::with_capacity(by_stem.len());
        for (stem, rows) in by_stem {
            summaries.push(self.write_rows(&stem, &rows)?);
        }
        Ok(summaries)
    }

    /// Write all rows of one entity
    pub fn write_entity(&self, entity: &str, rows: &[Record]) -> OutputResult<WriteSummary> {
        let rows: Vec<&Record> = rows.iter().collect();
        self.write_rows(entity, &rows)
    }

    fn write_rows(&self, entity: &str, rows: &[&Record]) -> OutputResult<WriteSummary> {
        let path = self.path_for(entity);
        if rows.is_empty() {
            return Ok(WriteSummary {
                path,
                rows: 0,
                created: false,
            });
        }

        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| OutputError::IoError(format!("Failed to create directory: {e}")))?;

        match self.mode {
            WriteMode::Append => append_or_create(&path, rows),
            WriteMode::Replace => replace(&self.data_dir, &path, rows),
        }
    }
}

/// Append to an existing file under its own header, or create a new one
fn append_or_create(path: &Path, rows: &[&Record]) -> OutputResult<WriteSummary> {
    let existing_header = read_header(path)?;

    let (file, header, created) = match existing_header {
        Some(header) => {
            let file = OpenOptions::new()
                .append(true)
                .open(path)
                .map_err(|e| OutputError::IoError(format!("Failed to open file: {e}")))?;
            (file, header, false)
        }
        None => {
            let file = File::create(path)
                .map_err(|e| OutputError::IoError(format!("Failed to create file: {e}")))?;
            (file, column_union(rows), true)
        }
    };

    write_csv(file, &header, rows, created)?;

    if created {
        info!(path = %path.display(), rows = rows.len(), "Created entity file");
    } else {
        info!(path = %path.display(), rows = rows.len(), "Appended to entity file");
    }

    Ok(WriteSummary {
        path: path.to_path_buf(),
        rows: rows.len(),
        created,
    })
}

/// Write a complete file next to the target and rename it into place
fn replace(dir: &Path, path: &Path, rows: &[&Record]) -> OutputResult<WriteSummary> {
    let existed = path.exists();
    let temp_file = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| OutputError::IoError(format!("Failed to create temp file: {e}")))?;
    let file = temp_file
        .reopen()
        .map_err(|e| OutputError::IoError(format!("Failed to open temp file: {e}")))?;

    write_csv(file, &column_union(rows), rows, true)?;

    temp_file
        .persist(path)
        .map_err(|e| OutputError::PersistError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    info!(
        path = %path.display(),
        rows = rows.len(),
        replaced = existed,
        "Wrote entity file"
    );

    Ok(WriteSummary {
        path: path.to_path_buf(),
        rows: rows.len(),
        created: !existed,
    })
}

fn write_csv(
    file: File,
    header: &[String],
    rows: &[&Record],
    write_header: bool,
) -> OutputResult<()> {
    let buf_writer = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file);
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(buf_writer);

    if write_header {
        writer
            .write_record(header)
            .map_err(|e| OutputError::CsvError(format!("Failed to write header: {e}")))?;
    }

    for row in rows {
        let cells = header
            .iter()
            .map(|column| row.get(column).map(cell).unwrap_or_default());
        writer
            .write_record(cells)
            .map_err(|e| OutputError::CsvError(format!("Failed to write row: {e}")))?;
    }

    let mut buf_writer = writer
        .into_inner()
        .map_err(|e| OutputError::IoError(format!("Failed to get inner writer: {e}")))?;
    buf_writer
        .flush()
        .map_err(|e| OutputError::IoError(format!("Failed to flush: {e}")))?;
    let file = buf_writer
        .into_inner()
        .map_err(|e| OutputError::IoError(format!("Failed to get file handle: {e}")))?;
    file.sync_all()
        .map_err(|e| OutputError::IoError(format!("Failed to sync file: {e}")))
}

/// Header of an existing, non-empty file
fn read_header(path: &Path) -> OutputResult<Option<Vec<String>>> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => {}
        Ok(_) => return Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(OutputError::IoError(e.to_string())),
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| OutputError::CsvError(format!("Failed to open existing file: {e}")))?;
    let header: Vec<String> = reader
        .headers()
        .map_err(|e| OutputError::CsvError(format!("Failed to read header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    debug!(path = %path.display(), columns = header.len(), "Existing header");
    Ok((!header.is_empty()).then_some(header))
}

/// Columns of all rows, in first-seen order
fn column_union(rows: &[&Record]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for name in row.field_names() {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.to_string());
            }
        }
    }
    columns
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
