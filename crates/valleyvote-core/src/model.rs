//! Shared types for sync, consolidation and entity resolution.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Which LegiScan id space a remote entity belongs to.
///
/// Session, person, bill and roll call ids are allocated independently, so the
/// kind is part of every ledger key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Session,
    Person,
    Bill,
    RollCall,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Session => "session",
            EntityKind::Person => "person",
            EntityKind::Bill => "bill",
            EntityKind::RollCall => "roll_call",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content hash used for entities that never change once published.
///
/// Roll calls have no change hash in the API; a constant hash makes them
/// NEW exactly once and UNCHANGED forever after.
pub const IMMUTABLE_CONTENT_HASH: &str = "immutable";

/// A listed remote entity: identity, content hash and owning unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteEntityRef {
    pub kind: EntityKind,
    pub id: u64,
    pub content_hash: String,
    /// Grouping key, the LegiScan session id.
    pub unit: u64,
}

impl RemoteEntityRef {
    pub fn new(kind: EntityKind, id: u64, content_hash: impl Into<String>, unit: u64) -> Self {
        Self {
            kind,
            id,
            content_hash: content_hash.into(),
            unit,
        }
    }

    /// Ref for an entity whose body never changes (roll calls).
    pub fn immutable(kind: EntityKind, id: u64, unit: u64) -> Self {
        Self::new(kind, id, IMMUTABLE_CONTENT_HASH, unit)
    }

    /// Ledger key: `"<kind>/<id>"`, or `"person/<unit>/<id>"` for people.
    ///
    /// A person is listed once per session with a per-session hash, so their
    /// entries are scoped by unit.
    pub fn key(&self) -> String {
        match self.kind {
            EntityKind::Person => format!("{}/{}/{}", self.kind.as_str(), self.unit, self.id),
            _ => entity_key(self.kind, self.id),
        }
    }
}

/// Format a ledger key for an entity.
pub fn entity_key(kind: EntityKind, id: u64) -> String {
    format!("{}/{}", kind.as_str(), id)
}

/// A legislative session used as the unit of synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUnit {
    pub session_id: u64,
    pub year_start: i32,
    pub year_end: i32,
    pub name: String,
}

impl SessionUnit {
    /// Recency ordering key: later start year first, ties broken by session id.
    pub fn recency(&self) -> (i32, u64) {
        (self.year_start, self.session_id)
    }

    /// Calendar years the session spans, inclusive.
    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.year_start..=self.year_end.max(self.year_start)
    }
}

/// Legislative chamber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chamber {
    House,
    Senate,
    Joint,
}

impl Chamber {
    /// Parse LegiScan body codes (`H`, `S`, `J`), role abbreviations
    /// (`Rep`, `Sen`) and full names.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h" | "a" | "rep" | "house" | "assembly" | "representative" => Some(Chamber::House),
            "s" | "sen" | "senate" | "senator" => Some(Chamber::Senate),
            "j" | "joint" => Some(Chamber::Joint),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Chamber::House => "house",
            Chamber::Senate => "senate",
            Chamber::Joint => "joint",
        }
    }
}

/// A canonical person (legislator) record owned by the consolidator.
///
/// `canonical_id` is the LegiScan `people_id` and never changes; every other
/// field may be refreshed by a later consolidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub canonical_id: u64,
    pub display_name: String,
    pub normalized_name: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub middle_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub suffix: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub party: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub chamber: Option<Chamber>,
    #[serde(default)]
    pub district: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub person_hash: String,
    #[serde(default)]
    pub ftm_eid: Option<u64>,
    #[serde(default)]
    pub votesmart_id: Option<u64>,
    #[serde(default)]
    pub opensecrets_id: String,
    #[serde(default)]
    pub ballotpedia: String,
    #[serde(default)]
    pub active_years: BTreeSet<i32>,
    /// Session in which the person was first seen. First write wins.
    pub first_seen_session: u64,
    /// Most recent session the attributes were taken from.
    pub last_seen_session: u64,
    /// Start year of `last_seen_session`; with it, orders attribute refreshes.
    pub last_seen_year: i32,
}

impl CanonicalRecord {
    /// Name forms the resolver scores against: the display name, plus
    /// "nickname last" when a nickname is known.
    pub fn name_variants(&self) -> Vec<String> {
        let mut variants = vec![self.display_name.clone()];
        if !self.nickname.is_empty() && !self.last_name.is_empty() {
            variants.push(format!("{} {}", self.nickname, self.last_name));
        }
        variants
    }

    /// Whether the record could plausibly be the subject of a mention with
    /// the given context. Unknown values on either side never exclude.
    pub fn fits_context(&self, context: &MentionContext) -> bool {
        let chamber_ok = match (context.chamber, self.chamber) {
            (Some(wanted), Some(have)) => wanted == have || wanted == Chamber::Joint,
            _ => true,
        };
        let year_ok = match context.year {
            Some(year) if !self.active_years.is_empty() => self.active_years.contains(&year),
            _ => true,
        };
        chamber_ok && year_ok
    }
}

/// Where a raw mention was scraped from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionOrigin {
    CommitteeRoster,
    FinanceFiler,
    Other(String),
}

impl MentionOrigin {
    pub fn label(&self) -> &str {
        match self {
            MentionOrigin::CommitteeRoster => "committee_roster",
            MentionOrigin::FinanceFiler => "finance_filer",
            MentionOrigin::Other(label) => label,
        }
    }
}

/// Context a mention was found in, used for candidate narrowing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MentionContext {
    #[serde(default)]
    pub committee: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub chamber: Option<Chamber>,
    #[serde(default)]
    pub role: Option<String>,
}

/// A free-text entity mention produced by a scraper. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawMention {
    pub source_text: String,
    #[serde(default)]
    pub context: MentionContext,
    pub origin: MentionOrigin,
}

impl RawMention {
    pub fn new(source_text: impl Into<String>, context: MentionContext, origin: MentionOrigin) -> Self {
        Self {
            source_text: source_text.into(),
            context,
            origin,
        }
    }

    /// Identity of a mention for superseding older match results.
    pub fn key(&self) -> (&str, &MentionContext) {
        (self.source_text.as_str(), &self.context)
    }
}

/// A scored candidate, alive only for the duration of one resolution call.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate<'a> {
    pub mention: &'a RawMention,
    pub canonical_id: u64,
    pub similarity_score: f64,
}

/// Outcome class of a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accepted,
    Rejected,
    Ambiguous,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Accepted => "accepted",
            Decision::Rejected => "rejected",
            Decision::Ambiguous => "ambiguous",
        }
    }
}

/// Terminal, immutable provenance record for one resolved mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub mention: RawMention,
    /// Normalized text that was actually scored.
    pub scored_name: String,
    pub canonical_id: Option<u64>,
    pub score: f64,
    pub runner_up_score: Option<f64>,
    pub decision: Decision,
    pub matched_display_name: Option<String>,
    /// Candidates tied for the top score when the decision is ambiguous.
    #[serde(default)]
    pub tied_ids: Vec<u64>,
    pub threshold: f64,
}
