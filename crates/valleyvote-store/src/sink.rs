//! Directory-backed implementations of the core storage boundaries.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;
use valleyvote_core::io::{BoxError, MentionSource, RecordSink};
use valleyvote_core::{EntityKind, RawMention, Row, Table};

use crate::StoreError;
use crate::batch::rows_to_batch;
use crate::files::{load_json, save_json, write_parquet};

/// Writes under one root directory:
///
/// ```text
/// <root>/raw/<kind>/<unit>/<id>.json   fetched entity bodies
/// <root>/tables/<table>.parquet        consolidated tables
/// <root>/<name>.json                   documents
/// ```
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self, kind: EntityKind, unit: u64) -> PathBuf {
        self.root.join("raw").join(kind.as_str()).join(unit.to_string())
    }

    pub fn raw_path(&self, kind: EntityKind, unit: u64, id: u64) -> PathBuf {
        self.raw_dir(kind, unit).join(format!("{id}.json"))
    }

    pub fn table_path(&self, table: Table) -> PathBuf {
        self.root.join("tables").join(format!("{}.parquet", table.name()))
    }

    pub fn document_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    pub fn save_table(&self, table: Table, rows: &[Row]) -> Result<(), StoreError> {
        let batch = rows_to_batch(&table.schema(), rows)?;
        write_parquet(&self.table_path(table), &batch)?;
        info!(table = table.name(), rows = rows.len(), "wrote table");
        Ok(())
    }
}

impl RecordSink for DirectorySink {
    fn write_raw(&self, kind: EntityKind, unit: u64, id: u64, body: &Value) -> Result<(), BoxError> {
        save_json(&self.raw_path(kind, unit, id), body)?;
        Ok(())
    }

    fn write_table(&self, table: Table, rows: &[Row]) -> Result<(), BoxError> {
        self.save_table(table, rows)?;
        Ok(())
    }

    fn write_document(&self, name: &str, value: &Value) -> Result<(), BoxError> {
        save_json(&self.document_path(name), value)?;
        Ok(())
    }

    fn read_raw(&self, kind: EntityKind, unit: u64, id: u64) -> Result<Option<Value>, BoxError> {
        Ok(load_if_exists(&self.raw_path(kind, unit, id))?)
    }

    fn read_document(&self, name: &str) -> Result<Option<Value>, BoxError> {
        Ok(load_if_exists(&self.document_path(name))?)
    }

    fn stored_ids(&self, kind: EntityKind, unit: u64) -> Result<Vec<u64>, BoxError> {
        let entries = match std::fs::read_dir(self.raw_dir(kind, unit)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.parse::<u64>().ok()) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

fn load_if_exists(path: &Path) -> Result<Option<Value>, StoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// A JSON array of [`RawMention`]s on disk.
#[derive(Debug, Clone)]
pub struct JsonMentionFile {
    path: PathBuf,
}

impl JsonMentionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MentionSource for JsonMentionFile {
    fn mentions(&self) -> Result<Vec<RawMention>, BoxError> {
        let mentions: Vec<RawMention> = load_json(&self.path)?;
        info!(path = %self.path.display(), count = mentions.len(), "loaded mentions");
        Ok(mentions)
    }
}
