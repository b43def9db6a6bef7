use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use valleyvote_core::{Decision, MatchResult};

/// Resolution outcome counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionCounts {
    pub accepted: usize,
    pub ambiguous: usize,
    pub rejected: usize,
}

impl MentionCounts {
    pub fn tally<'a>(results: impl IntoIterator<Item = &'a MatchResult>) -> Self {
        let mut counts = Self::default();
        for r in results {
            match r.decision {
                Decision::Accepted => counts.accepted += 1,
                Decision::Ambiguous => counts.ambiguous += 1,
                Decision::Rejected => counts.rejected += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.accepted + self.ambiguous + self.rejected
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub unit: u64,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFailureRecord {
    pub unit: u64,
    pub key: String,
    pub error: String,
}

/// What one run did. Non-fatal failures are listed here rather than raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub state: String,
    pub year_start: i32,
    pub year_end: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub units_attempted: usize,
    pub units_failed: usize,
    /// Sessions whose dataset hash was unchanged, loaded from storage.
    pub units_unchanged: usize,
    pub entities_listed: usize,
    pub entities_new: usize,
    pub entities_changed: usize,
    pub entities_unchanged: usize,
    pub entities_fetched: usize,
    pub legislators: usize,
    pub registry_fingerprint: String,
    pub mentions: MentionCounts,
    pub unit_failures: Vec<UnitFailure>,
    pub entity_failures: Vec<EntityFailureRecord>,
    pub storage_errors: Vec<String>,
}

impl RunSummary {
    pub fn new(state: &str, year_start: i32, year_end: i32) -> Self {
        let now = Utc::now();
        Self {
            state: state.to_string(),
            year_start,
            year_end,
            started_at: now,
            finished_at: now,
            units_attempted: 0,
            units_failed: 0,
            units_unchanged: 0,
            entities_listed: 0,
            entities_new: 0,
            entities_changed: 0,
            entities_unchanged: 0,
            entities_fetched: 0,
            legislators: 0,
            registry_fingerprint: String::new(),
            mentions: MentionCounts::default(),
            unit_failures: Vec::new(),
            entity_failures: Vec::new(),
            storage_errors: Vec::new(),
        }
    }

    /// No failures of any kind.
    pub fn is_clean(&self) -> bool {
        self.units_failed == 0 && self.entity_failures.is_empty() && self.storage_errors.is_empty()
    }

    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
