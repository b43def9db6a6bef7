//! Boundaries to the collaborators outside the engine: the scraper that
//! produces mentions and the storage that keeps what the pipeline produces.

use serde_json::Value;

use crate::model::{EntityKind, RawMention};
use crate::row::Row;
use crate::schema::Table;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Consumes pipeline output.
pub trait RecordSink: Send + Sync {
    /// Store one fetched entity body as received.
    fn write_raw(&self, kind: EntityKind, unit: u64, id: u64, body: &Value) -> Result<(), BoxError>;

    /// Replace a table with `rows`.
    fn write_table(&self, table: Table, rows: &[Row]) -> Result<(), BoxError>;

    /// Store a named JSON document (registry snapshot, run summary).
    fn write_document(&self, name: &str, value: &Value) -> Result<(), BoxError>;

    /// A previously stored entity body, if any.
    fn read_raw(&self, kind: EntityKind, unit: u64, id: u64) -> Result<Option<Value>, BoxError>;

    /// A previously stored document, if any.
    fn read_document(&self, name: &str) -> Result<Option<Value>, BoxError>;

    /// Ids of the entity bodies stored for `kind` in `unit`, ascending.
    fn stored_ids(&self, kind: EntityKind, unit: u64) -> Result<Vec<u64>, BoxError>;
}

/// Produces scraped mentions to resolve.
pub trait MentionSource: Send + Sync {
    fn mentions(&self) -> Result<Vec<RawMention>, BoxError>;
}

impl MentionSource for Vec<RawMention> {
    fn mentions(&self) -> Result<Vec<RawMention>, BoxError> {
        Ok(self.clone())
    }
}
