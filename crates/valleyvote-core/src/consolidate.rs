//! Merge per-session legislator listings into one canonical registry.
//!
//! People are keyed by LegiScan `people_id`, never by name. Units are folded
//! oldest first, ordered by `(year_start, session_id)`, so the result does not
//! depend on the order units arrive in: attributes end up taken from the most
//! recent session a person appears in, and `first_seen_session` from the
//! earliest.
//!
//! Flat legislative rows (bills, sponsors, votes) are deduplicated separately
//! with [`dedupe_rows`].

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use ring::digest;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::legiscan::SessionPerson;
use crate::model::{CanonicalRecord, SessionUnit};
use crate::names::normalize_name;
use crate::row::{Row, ToRow};

/// Composite key for deduplicating bill rows.
pub const BILL_KEY: &[&str] = &["bill_id"];
/// Composite key for deduplicating sponsor rows.
pub const SPONSOR_KEY: &[&str] = &["bill_id", "legislator_id", "sponsor_type_id", "committee_id"];
/// Composite key for deduplicating individual vote rows.
pub const VOTE_KEY: &[&str] = &["vote_id", "legislator_id"];

/// People listed for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitPeople {
    pub unit: SessionUnit,
    pub people: Vec<SessionPerson>,
}

/// Canonical legislators keyed by `canonical_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalRegistry {
    records: BTreeMap<u64, CanonicalRecord>,
}

impl CanonicalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored records. A later duplicate id replaces an earlier one.
    pub fn from_records(records: impl IntoIterator<Item = CanonicalRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.canonical_id, r)).collect(),
        }
    }

    pub fn get(&self, canonical_id: u64) -> Option<&CanonicalRecord> {
        self.records.get(&canonical_id)
    }

    /// Records in ascending `canonical_id` order.
    pub fn iter(&self) -> impl Iterator<Item = &CanonicalRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Canonical JSON encoding: records as an array in id order.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let records: Vec<&CanonicalRecord> = self.records.values().collect();
        serde_json::to_vec(&records)
    }

    /// Hex SHA-256 of [`to_json_bytes`](Self::to_json_bytes).
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let bytes = self.to_json_bytes()?;
        let hash = digest::digest(&digest::SHA256, &bytes);
        Ok(hash.as_ref().iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn rows(&self) -> Vec<Row> {
        self.records.values().map(ToRow::to_row).collect()
    }
}

/// Folds [`UnitPeople`] into a [`CanonicalRegistry`]. Pure.
#[derive(Debug, Clone, Default)]
pub struct Consolidator {
    state: String,
}

impl Consolidator {
    /// `state` is the two-letter code stamped on every record.
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
        }
    }

    /// Build a fresh registry from per-unit listings.
    pub fn consolidate(&self, units: &[UnitPeople]) -> CanonicalRegistry {
        let mut registry = CanonicalRegistry::new();
        self.merge_into(&mut registry, units);
        registry
    }

    /// Refresh `registry` in place. Records missing from `units` are kept.
    pub fn merge_into(&self, registry: &mut CanonicalRegistry, units: &[UnitPeople]) {
        let mut ordered: Vec<&UnitPeople> = units.iter().collect();
        ordered.sort_by_key(|u| u.unit.recency());

        for unit in ordered {
            if unit.people.is_empty() {
                debug!(session_id = unit.unit.session_id, "empty unit, nothing to merge");
                continue;
            }
            for person in &unit.people {
                match registry.records.entry(person.people_id) {
                    Entry::Vacant(slot) => {
                        slot.insert(self.new_record(person, &unit.unit));
                    }
                    Entry::Occupied(mut slot) => self.refresh(slot.get_mut(), person, &unit.unit),
                }
            }
            debug!(
                session_id = unit.unit.session_id,
                people = unit.people.len(),
                registry = registry.len(),
                "merged unit"
            );
        }
    }

    fn new_record(&self, person: &SessionPerson, unit: &SessionUnit) -> CanonicalRecord {
        let display_name = display_name(person);
        CanonicalRecord {
            canonical_id: person.people_id,
            normalized_name: normalize_name(&display_name),
            display_name,
            first_name: person.first_name.clone(),
            middle_name: person.middle_name.clone(),
            last_name: person.last_name.clone(),
            suffix: person.suffix.clone(),
            nickname: person.nickname.clone(),
            party: person.party.clone(),
            role: person.role.clone(),
            chamber: person.chamber(),
            district: person.district.clone(),
            state: self.state.clone(),
            person_hash: person.person_hash.clone(),
            ftm_eid: person.ftm_eid.filter(|&id| id != 0),
            votesmart_id: person.votesmart_id.filter(|&id| id != 0),
            opensecrets_id: person.opensecrets_id.clone().unwrap_or_default(),
            ballotpedia: person.ballotpedia.clone().unwrap_or_default(),
            active_years: unit.years().collect(),
            first_seen_session: unit.session_id,
            last_seen_session: unit.session_id,
            last_seen_year: unit.year_start,
        }
    }

    fn refresh(&self, record: &mut CanonicalRecord, person: &SessionPerson, unit: &SessionUnit) {
        record.active_years.extend(unit.years());
        if unit.recency() < (record.last_seen_year, record.last_seen_session) {
            return;
        }

        let name = display_name(person);
        if !name.is_empty() {
            record.normalized_name = normalize_name(&name);
            record.display_name = name;
        }
        overwrite(&mut record.first_name, &person.first_name);
        overwrite(&mut record.middle_name, &person.middle_name);
        overwrite(&mut record.last_name, &person.last_name);
        overwrite(&mut record.suffix, &person.suffix);
        overwrite(&mut record.nickname, &person.nickname);
        overwrite(&mut record.party, &person.party);
        overwrite(&mut record.role, &person.role);
        overwrite(&mut record.district, &person.district);
        overwrite(&mut record.person_hash, &person.person_hash);
        overwrite(&mut record.state, &self.state);
        if let Some(chamber) = person.chamber() {
            record.chamber = Some(chamber);
        }
        if let Some(id) = person.ftm_eid.filter(|&id| id != 0) {
            record.ftm_eid = Some(id);
        }
        if let Some(id) = person.votesmart_id.filter(|&id| id != 0) {
            record.votesmart_id = Some(id);
        }
        if let Some(id) = person.opensecrets_id.as_deref() {
            overwrite(&mut record.opensecrets_id, id);
        }
        if let Some(slug) = person.ballotpedia.as_deref() {
            overwrite(&mut record.ballotpedia, slug);
        }
        record.last_seen_session = unit.session_id;
        record.last_seen_year = unit.year_start;
    }
}

fn display_name(person: &SessionPerson) -> String {
    if !person.name.trim().is_empty() {
        return person.name.trim().to_string();
    }
    [&person.first_name, &person.middle_name, &person.last_name, &person.suffix]
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replace `field` unless the fresher value is blank.
fn overwrite(field: &mut String, value: &str) {
    if !value.trim().is_empty() {
        *field = value.to_string();
    }
}

/// Deduplicate rows by a single or composite key.
///
/// A later row with the same key replaces the earlier one at the earlier
/// row's position. Rows missing any key field (absent or null) are kept as-is.
pub fn dedupe_rows(rows: Vec<Row>, key: &[&str]) -> Vec<Row> {
    let mut out: Vec<Row> = Vec::with_capacity(rows.len());
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();

    for row in rows {
        let parts: Option<Vec<&serde_json::Value>> = key
            .iter()
            .map(|field| row.get(field).filter(|v| !v.is_null()))
            .collect();
        let Some(parts) = parts else {
            out.push(row);
            continue;
        };
        let composite = parts.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("\u{1f}");
        match seen.get(&composite) {
            Some(&at) => out[at] = row,
            None => {
                seen.insert(composite, out.len());
                out.push(row);
            }
        }
    }
    out
}

impl ToRow for CanonicalRecord {
    fn to_row(&self) -> Row {
        let years: Vec<String> = self.active_years.iter().map(|y| y.to_string()).collect();
        Row::new()
            .with("legislator_id", self.canonical_id)
            .with("name", self.display_name.as_str())
            .with("normalized_name", self.normalized_name.as_str())
            .with("first_name", self.first_name.as_str())
            .with("middle_name", self.middle_name.as_str())
            .with("last_name", self.last_name.as_str())
            .with("suffix", self.suffix.as_str())
            .with("nickname", self.nickname.as_str())
            .with("party", self.party.as_str())
            .with("role", self.role.as_str())
            .with("chamber", self.chamber.map(|c| c.as_str()))
            .with("district", self.district.as_str())
            .with("state", self.state.as_str())
            .with("person_hash", self.person_hash.as_str())
            .with("ftm_eid", self.ftm_eid)
            .with("votesmart_id", self.votesmart_id)
            .with("opensecrets_id", self.opensecrets_id.as_str())
            .with("ballotpedia", self.ballotpedia.as_str())
            .with("active_years", years.join(";"))
            .with("first_seen_session", self.first_seen_session)
            .with("last_seen_session", self.last_seen_session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Chamber;

    fn person(id: u64, name: &str, role: &str) -> SessionPerson {
        let mut parts = name.split(' ');
        SessionPerson {
            people_id: id,
            person_hash: format!("h{id}"),
            name: name.into(),
            first_name: parts.next().unwrap_or_default().into(),
            middle_name: String::new(),
            last_name: parts.last().unwrap_or_default().into(),
            suffix: String::new(),
            nickname: String::new(),
            party: "R".into(),
            role: role.into(),
            district: "HD-001".into(),
            ftm_eid: None,
            votesmart_id: None,
            opensecrets_id: None,
            ballotpedia: None,
        }
    }

    fn unit(session_id: u64, year: i32, people: Vec<SessionPerson>) -> UnitPeople {
        UnitPeople {
            unit: SessionUnit {
                session_id,
                year_start: year,
                year_end: year,
                name: format!("{year} Regular"),
            },
            people,
        }
    }

    #[test]
    fn dedupes_by_id_not_name() {
        let units = vec![unit(
            1,
            2023,
            vec![person(1, "John Smith", "Rep"), person(2, "John Smith", "Sen")],
        )];
        let registry = Consolidator::new("ID").consolidate(&units);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn most_recent_unit_wins() {
        let u1 = unit(1, 2023, vec![person(7, "John Smith", "Rep")]);
        let u2 = unit(2, 2024, vec![person(7, "John Smith", "Sen")]);

        let c = Consolidator::new("ID");
        let forward = c.consolidate(&[u1.clone(), u2.clone()]);
        let reverse = c.consolidate(&[u2, u1]);

        let rec = forward.get(7).unwrap();
        assert_eq!(rec.role, "Sen");
        assert_eq!(rec.chamber, Some(Chamber::Senate));
        assert_eq!(rec.first_seen_session, 1);
        assert_eq!(rec.last_seen_session, 2);
        assert_eq!(rec.active_years.iter().copied().collect::<Vec<_>>(), vec![2023, 2024]);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn idempotent_bytes() {
        let units = vec![
            unit(1, 2023, vec![person(7, "John Smith", "Rep"), person(9, "Jon Smythe", "Rep")]),
            unit(2, 2024, vec![person(7, "John Smith", "Sen")]),
        ];
        let c = Consolidator::new("ID");
        let a = c.consolidate(&units);
        let b = c.consolidate(&units);
        assert_eq!(a.to_json_bytes().unwrap(), b.to_json_bytes().unwrap());
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_eq!(a.fingerprint().unwrap().len(), 64);
    }

    #[test]
    fn empty_units_tolerated() {
        let c = Consolidator::new("ID");
        assert!(c.consolidate(&[]).is_empty());
        let registry = c.consolidate(&[unit(1, 2023, vec![]), unit(2, 2024, vec![person(3, "Ann Lee", "Rep")])]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn blank_values_do_not_erase() {
        let mut later = person(7, "John Smith", "Sen");
        later.party = String::new();
        let registry = Consolidator::new("ID").consolidate(&[
            unit(1, 2023, vec![person(7, "John Smith", "Rep")]),
            unit(2, 2024, vec![later]),
        ]);
        assert_eq!(registry.get(7).unwrap().party, "R");
    }

    #[test]
    fn merge_into_keeps_absent_records() {
        let c = Consolidator::new("ID");
        let mut registry = c.consolidate(&[unit(1, 2023, vec![person(7, "John Smith", "Rep")])]);
        c.merge_into(&mut registry, &[unit(2, 2024, vec![person(9, "Ann Lee", "Rep")])]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(7).unwrap().last_seen_session, 1);

        // An older unit does not overwrite fresher attributes.
        c.merge_into(&mut registry, &[unit(0, 2021, vec![person(9, "Ann Lee", "Sen")])]);
        let ann = registry.get(9).unwrap();
        assert_eq!(ann.role, "Rep");
        assert!(ann.active_years.contains(&2021));
        assert_eq!(ann.first_seen_session, 2);
    }

    #[test]
    fn dedupe_rows_replaces_in_place() {
        let rows = vec![
            Row::new().with("vote_id", 1).with("legislator_id", 7).with("v", "a"),
            Row::new().with("vote_id", 1).with("legislator_id", 9).with("v", "b"),
            Row::new().with("vote_id", 1).with("legislator_id", 7).with("v", "c"),
            Row::new().with("vote_id", 2).with("v", "incomplete"),
            Row::new().with("vote_id", 2).with("v", "incomplete"),
        ];
        let out = dedupe_rows(rows, VOTE_KEY);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].get("v").unwrap(), "c");
        assert_eq!(out[1].get("v").unwrap(), "b");
    }

    #[test]
    fn registry_rows_carry_ids() {
        let registry = Consolidator::new("ID").consolidate(&[unit(1, 2023, vec![person(7, "John Smith", "Rep")])]);
        let rows = registry.rows();
        assert_eq!(rows[0].get("legislator_id").unwrap(), 7);
        assert_eq!(rows[0].get("chamber").unwrap(), "house");
        assert_eq!(rows[0].get("state").unwrap(), "ID");
    }
}
