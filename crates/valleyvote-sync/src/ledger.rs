//! Local hash ledger: last-seen content hash per remote entity.
//!
//! Entries change only through [`HashLedger::commit`], a compare-and-set on
//! the previous hash, which the synchronizer calls after an entity's payload
//! has been fetched and persisted.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LedgerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub content_hash: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct HashLedger {
    entries: Mutex<BTreeMap<String, LedgerEntry>>,
}

impl HashLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a saved ledger. A missing file is an empty ledger.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let entries = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "loaded ledger");
        Ok(Self {
            entries: Mutex::new(entries),
        })
    }

    /// Write the ledger atomically: a temp file in the same directory, then rename.
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        let snapshot = self.snapshot();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &snapshot)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        debug!(path = %path.display(), entries = snapshot.len(), "saved ledger");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<LedgerEntry> {
        self.lock().get(key).cloned()
    }

    pub fn hash(&self, key: &str) -> Option<String> {
        self.lock().get(key).map(|e| e.content_hash.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, LedgerEntry> {
        self.lock().clone()
    }

    /// Record `new_hash` for `key` if the current hash is still `expected`.
    ///
    /// `expected` is `None` for an entity that had no entry when it was planned.
    pub fn commit(&self, key: &str, expected: Option<&str>, new_hash: &str) -> Result<(), LedgerError> {
        let mut entries = self.lock();
        let current = entries.get(key).map(|e| e.content_hash.as_str());
        if current != expected {
            return Err(LedgerError::WriteConflict {
                key: key.to_string(),
                expected: expected.map(str::to_string),
                found: current.map(str::to_string),
            });
        }
        entries.insert(
            key.to_string(),
            LedgerEntry {
                content_hash: new_hash.to_string(),
                fetched_at: Utc::now(),
            },
        );
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, LedgerEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
