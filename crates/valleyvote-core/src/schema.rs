/// Arrow schema definitions for the tables the pipeline writes.
///
/// Field names match the [`Row`](crate::row::Row)s the core produces; storage
/// adapters build record batches against these.
pub mod legislature {
    use arrow::datatypes::{DataType, Field, Schema};

    fn utf8(name: &str) -> Field {
        Field::new(name, DataType::Utf8, false)
    }

    fn nullable_utf8(name: &str) -> Field {
        Field::new(name, DataType::Utf8, true)
    }

    fn id(name: &str) -> Field {
        Field::new(name, DataType::UInt64, false)
    }

    /// Schema for sessions returned by `getSessionList`.
    pub fn sessions_schema() -> Schema {
        Schema::new(vec![
            id("session_id"),
            id("state_id"),
            Field::new("year_start", DataType::Int32, false),
            Field::new("year_end", DataType::Int32, false),
            Field::new("special", DataType::Boolean, false),
            utf8("session_name"),
            utf8("session_title"),
            utf8("dataset_hash"),
        ])
    }

    /// Schema for consolidated legislators.
    pub fn legislators_schema() -> Schema {
        Schema::new(vec![
            id("legislator_id"),
            utf8("name"),
            utf8("normalized_name"),
            utf8("first_name"),
            utf8("middle_name"),
            utf8("last_name"),
            utf8("suffix"),
            utf8("nickname"),
            utf8("party"),
            utf8("role"),
            nullable_utf8("chamber"),
            utf8("district"),
            utf8("state"),
            utf8("person_hash"),
            Field::new("ftm_eid", DataType::UInt64, true),
            Field::new("votesmart_id", DataType::UInt64, true),
            utf8("opensecrets_id"),
            utf8("ballotpedia"),
            utf8("active_years"),
            id("first_seen_session"),
            id("last_seen_session"),
        ])
    }

    pub fn bills_schema() -> Schema {
        Schema::new(vec![
            id("bill_id"),
            utf8("change_hash"),
            id("session_id"),
            Field::new("year", DataType::Int32, false),
            utf8("number"),
            utf8("type"),
            utf8("body"),
            utf8("current_body"),
            utf8("title"),
            utf8("description"),
            Field::new("status", DataType::UInt32, false),
            utf8("status_desc"),
            nullable_utf8("status_date"),
            utf8("url"),
            utf8("state_link"),
            utf8("subjects"),
        ])
    }

    pub fn sponsors_schema() -> Schema {
        Schema::new(vec![
            id("bill_id"),
            id("legislator_id"),
            Field::new("sponsor_type_id", DataType::UInt8, false),
            utf8("sponsor_type"),
            Field::new("sponsor_order", DataType::UInt32, false),
            id("committee_id"),
            id("session_id"),
            Field::new("year", DataType::Int32, false),
        ])
    }

    /// Schema for roll call summaries.
    pub fn roll_calls_schema() -> Schema {
        Schema::new(vec![
            id("vote_id"),
            id("bill_id"),
            utf8("date"),
            utf8("desc"),
            Field::new("yea", DataType::UInt32, false),
            Field::new("nay", DataType::UInt32, false),
            Field::new("nv", DataType::UInt32, false),
            Field::new("absent", DataType::UInt32, false),
            Field::new("passed", DataType::Boolean, false),
            utf8("chamber"),
            id("session_id"),
            Field::new("year", DataType::Int32, false),
        ])
    }

    /// Schema for individual legislator votes.
    pub fn votes_schema() -> Schema {
        Schema::new(vec![
            id("vote_id"),
            id("bill_id"),
            id("legislator_id"),
            utf8("vote_text"),
            Field::new("vote_value", DataType::Int8, false),
            utf8("date"),
            id("session_id"),
            Field::new("year", DataType::Int32, false),
        ])
    }

    /// Schema for entity resolution provenance.
    pub fn match_results_schema() -> Schema {
        Schema::new(vec![
            utf8("source_text"),
            utf8("origin"),
            nullable_utf8("committee"),
            Field::new("year", DataType::Int32, true),
            nullable_utf8("chamber"),
            nullable_utf8("context_role"),
            utf8("scored_name"),
            Field::new("legislator_id", DataType::UInt64, true),
            nullable_utf8("matched_name"),
            Field::new("score", DataType::Float64, false),
            Field::new("runner_up_score", DataType::Float64, true),
            utf8("decision"),
            utf8("tied_ids"),
            Field::new("threshold", DataType::Float64, false),
        ])
    }
}

/// Output tables, each with a file stem and a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Sessions,
    Legislators,
    Bills,
    Sponsors,
    RollCalls,
    Votes,
    MatchResults,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Sessions,
        Table::Legislators,
        Table::Bills,
        Table::Sponsors,
        Table::RollCalls,
        Table::Votes,
        Table::MatchResults,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Sessions => "sessions",
            Table::Legislators => "legislators",
            Table::Bills => "bills",
            Table::Sponsors => "sponsors",
            Table::RollCalls => "roll_calls",
            Table::Votes => "votes",
            Table::MatchResults => "match_results",
        }
    }

    pub fn schema(&self) -> arrow::datatypes::Schema {
        match self {
            Table::Sessions => legislature::sessions_schema(),
            Table::Legislators => legislature::legislators_schema(),
            Table::Bills => legislature::bills_schema(),
            Table::Sponsors => legislature::sponsors_schema(),
            Table::RollCalls => legislature::roll_calls_schema(),
            Table::Votes => legislature::votes_schema(),
            Table::MatchResults => legislature::match_results_schema(),
        }
    }
}
