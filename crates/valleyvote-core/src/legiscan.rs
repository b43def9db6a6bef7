//! LegiScan record shapes and the flattening of them into storage rows.
//!
//! Field names follow the LegiScan JSON API so payloads deserialize directly.
//! Everything except ids is defaulted: the API omits fields freely.

use serde::{Deserialize, Serialize};

use crate::model::{Chamber, SessionUnit};
use crate::row::{Row, ToRow};

/// Entry from `getSessionList`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: u64,
    #[serde(default)]
    pub state_id: u64,
    #[serde(default)]
    pub year_start: i32,
    #[serde(default)]
    pub year_end: i32,
    #[serde(default)]
    pub special: u8,
    #[serde(default)]
    pub session_tag: String,
    #[serde(default)]
    pub session_title: String,
    #[serde(default)]
    pub session_name: String,
    #[serde(default)]
    pub dataset_hash: String,
}

impl Session {
    /// Whether the session spans any year in `start..=end`.
    ///
    /// Sessions without a start year never overlap; a missing end year means
    /// a single-year session.
    pub fn overlaps(&self, start: i32, end: i32) -> bool {
        if self.year_start <= 0 {
            return false;
        }
        let last = self.year_end.max(self.year_start);
        self.year_start <= end && last >= start
    }

    pub fn unit(&self) -> SessionUnit {
        SessionUnit {
            session_id: self.session_id,
            year_start: self.year_start,
            year_end: self.year_end.max(self.year_start),
            name: self.session_name.clone(),
        }
    }
}

/// Person entry from `getSessionPeople`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPerson {
    pub people_id: u64,
    #[serde(default)]
    pub person_hash: String,
    #[serde(default)]
    pub name: String,
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
    pub district: String,
    #[serde(default)]
    pub ftm_eid: Option<u64>,
    #[serde(default)]
    pub votesmart_id: Option<u64>,
    #[serde(default)]
    pub opensecrets_id: Option<String>,
    #[serde(default)]
    pub ballotpedia: Option<String>,
}

impl SessionPerson {
    pub fn chamber(&self) -> Option<Chamber> {
        Chamber::parse(&self.role)
    }
}

/// Stub from `getMasterList`: just enough to decide whether to re-fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillStub {
    pub bill_id: u64,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub change_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub subject_id: u64,
    #[serde(default)]
    pub subject_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillSponsor {
    pub people_id: u64,
    #[serde(default)]
    pub sponsor_type_id: u8,
    #[serde(default)]
    pub sponsor_order: u32,
    #[serde(default)]
    pub committee_id: u64,
}

/// Roll call summary embedded in a bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollCallStub {
    pub roll_call_id: u64,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub desc: String,
}

/// Full bill from `getBill`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub bill_id: u64,
    #[serde(default)]
    pub change_hash: String,
    #[serde(default)]
    pub session_id: u64,
    #[serde(default)]
    pub bill_number: String,
    #[serde(default)]
    pub bill_type: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub current_body: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: u32,
    #[serde(default)]
    pub status_date: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub state_link: String,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub sponsors: Vec<BillSponsor>,
    #[serde(default)]
    pub votes: Vec<RollCallStub>,
}

impl Bill {
    /// Bill row, with the year of the session it was collected under.
    pub fn row(&self, year: i32) -> Row {
        let subjects: Vec<&str> = self.subjects.iter().map(|s| s.subject_name.as_str()).collect();
        Row::new()
            .with("bill_id", self.bill_id)
            .with("change_hash", self.change_hash.as_str())
            .with("session_id", self.session_id)
            .with("year", year)
            .with("number", self.bill_number.as_str())
            .with("type", self.bill_type.as_str())
            .with("body", self.body.as_str())
            .with("current_body", self.current_body.as_str())
            .with("title", self.title.as_str())
            .with("description", self.description.as_str())
            .with("status", self.status)
            .with("status_desc", status_description(self.status))
            .with("status_date", self.status_date.clone())
            .with("url", self.url.as_str())
            .with("state_link", self.state_link.as_str())
            .with("subjects", subjects.join(";"))
    }

    pub fn sponsor_rows(&self, year: i32) -> Vec<Row> {
        self.sponsors
            .iter()
            .map(|s| {
                Row::new()
                    .with("bill_id", self.bill_id)
                    .with("legislator_id", s.people_id)
                    .with("sponsor_type_id", s.sponsor_type_id)
                    .with("sponsor_type", sponsor_type_label(s.sponsor_type_id))
                    .with("sponsor_order", s.sponsor_order)
                    .with("committee_id", s.committee_id)
                    .with("session_id", self.session_id)
                    .with("year", year)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualVote {
    pub people_id: u64,
    #[serde(default)]
    pub vote_text: String,
}

/// Full roll call from `getRollCall`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollCall {
    pub roll_call_id: u64,
    #[serde(default)]
    pub bill_id: u64,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub yea: u32,
    #[serde(default)]
    pub nay: u32,
    #[serde(default)]
    pub nv: u32,
    #[serde(default)]
    pub absent: u32,
    #[serde(default)]
    pub passed: u8,
    #[serde(default)]
    pub chamber: String,
    #[serde(default)]
    pub votes: Vec<IndividualVote>,
}

impl RollCall {
    pub fn row(&self, session_id: u64, year: i32) -> Row {
        Row::new()
            .with("vote_id", self.roll_call_id)
            .with("bill_id", self.bill_id)
            .with("date", self.date.as_str())
            .with("desc", self.desc.as_str())
            .with("yea", self.yea)
            .with("nay", self.nay)
            .with("nv", self.nv)
            .with("absent", self.absent)
            .with("passed", self.passed == 1)
            .with("chamber", self.chamber.as_str())
            .with("session_id", session_id)
            .with("year", year)
    }

    /// One row per legislator vote.
    pub fn vote_rows(&self, session_id: u64, year: i32) -> Vec<Row> {
        self.votes
            .iter()
            .map(|v| {
                Row::new()
                    .with("vote_id", self.roll_call_id)
                    .with("bill_id", self.bill_id)
                    .with("legislator_id", v.people_id)
                    .with("vote_text", v.vote_text.as_str())
                    .with("vote_value", map_vote_value(&v.vote_text))
                    .with("date", self.date.as_str())
                    .with("session_id", session_id)
                    .with("year", year)
            })
            .collect()
    }
}

/// Map vote text to a numeric value.
///
/// 1 yea, 0 nay, -1 abstain/present/not voting, -2 absent/excused,
/// -9 anything else.
pub fn map_vote_value(vote_text: &str) -> i8 {
    match vote_text.trim().to_lowercase().as_str() {
        "yea" | "aye" | "yes" | "pass" | "y" => 1,
        "nay" | "no" | "fail" | "n" => 0,
        "not voting" | "abstain" | "present" | "nv" | "av" => -1,
        "absent" | "excused" | "abs" | "exc" => -2,
        _ => -9,
    }
}

pub fn sponsor_type_label(sponsor_type_id: u8) -> &'static str {
    match sponsor_type_id {
        0 => "Sponsor (Generic / Unspecified)",
        1 => "Primary Sponsor",
        2 => "Co-Sponsor",
        3 => "Joint Sponsor",
        _ => "Unknown",
    }
}

/// LegiScan progress status codes.
pub fn status_description(status: u32) -> &'static str {
    match status {
        1 => "Introduced",
        2 => "Engrossed",
        3 => "Enrolled",
        4 => "Passed",
        5 => "Vetoed",
        6 => "Failed",
        7 => "Override",
        8 => "Chaptered",
        9 => "Refer",
        10 => "Report Pass",
        11 => "Report DNP",
        12 => "Draft",
        _ => "Unknown",
    }
}

impl ToRow for Session {
    fn to_row(&self) -> Row {
        Row::new()
            .with("session_id", self.session_id)
            .with("state_id", self.state_id)
            .with("year_start", self.year_start)
            .with("year_end", self.year_end)
            .with("special", self.special == 1)
            .with("session_name", self.session_name.as_str())
            .with("session_title", self.session_title.as_str())
            .with("dataset_hash", self.dataset_hash.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(start: i32, end: i32) -> Session {
        Session {
            session_id: 1,
            state_id: 13,
            year_start: start,
            year_end: end,
            special: 0,
            session_tag: String::new(),
            session_title: String::new(),
            session_name: "Regular".into(),
            dataset_hash: String::new(),
        }
    }

    #[test]
    fn vote_text_mapping() {
        assert_eq!(map_vote_value("Yea"), 1);
        assert_eq!(map_vote_value(" AYE "), 1);
        assert_eq!(map_vote_value("Nay"), 0);
        assert_eq!(map_vote_value("NV"), -1);
        assert_eq!(map_vote_value("Absent"), -2);
        assert_eq!(map_vote_value("Excused"), -2);
        assert_eq!(map_vote_value("maybe"), -9);
        assert_eq!(map_vote_value(""), -9);
    }

    #[test]
    fn session_overlap() {
        assert!(session(2023, 2024).overlaps(2024, 2025));
        assert!(session(2023, 0).overlaps(2023, 2023));
        assert!(!session(2023, 0).overlaps(2024, 2025));
        assert!(!session(0, 0).overlaps(2000, 2030));
        assert!(!session(2010, 2011).overlaps(2012, 2020));
    }

    #[test]
    fn bill_deserializes_with_missing_fields() {
        let json = r#"{
            "bill_id": 1200,
            "change_hash": "c0ffee",
            "session_id": 2011,
            "bill_number": "H0001",
            "title": "Appropriations",
            "subjects": [{"subject_id": 5, "subject_name": "Budget"}, {"subject_id": 6, "subject_name": "Tax"}],
            "sponsors": [{"people_id": 7, "sponsor_type_id": 1, "sponsor_order": 1}],
            "votes": [{"roll_call_id": 99, "date": "2023-02-01", "desc": "Third Reading"}]
        }"#;
        let bill: Bill = serde_json::from_str(json).unwrap();
        assert_eq!(bill.votes[0].roll_call_id, 99);
        let row = bill.row(2023);
        assert_eq!(row.get("subjects").unwrap(), "Budget;Tax");
        assert_eq!(row.get("status_desc").unwrap(), "Unknown");
        let sponsors = bill.sponsor_rows(2023);
        assert_eq!(sponsors[0].get("sponsor_type").unwrap(), "Primary Sponsor");
    }

    #[test]
    fn roll_call_vote_rows() {
        let json = r#"{
            "roll_call_id": 99, "bill_id": 1200, "date": "2023-02-01",
            "yea": 1, "nay": 1, "passed": 0,
            "votes": [{"people_id": 7, "vote_text": "Yea"}, {"people_id": 9, "vote_text": "Nay"}]
        }"#;
        let rc: RollCall = serde_json::from_str(json).unwrap();
        let rows = rc.vote_rows(2011, 2023);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("vote_value").unwrap(), 1);
        assert_eq!(rows[1].get("vote_value").unwrap(), 0);
        assert_eq!(rc.row(2011, 2023).get("passed").unwrap(), false);
    }
}
