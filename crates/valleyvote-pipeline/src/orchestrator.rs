//! One sync-consolidate-resolve run over the configured state and years.
//!
//! Sessions overlapping the year range are the units of work. Each unit
//! lists its people, bills and roll calls, fetches only what the ledger says
//! changed, and loads the rest from the sink. A session whose dataset hash is
//! unchanged since its last clean sync is loaded from the sink without any
//! listing. A unit whose listing fails is recorded and rebuilt from its stored
//! bodies; the others carry on. After every unit has finished, people are
//! folded into the canonical registry, flat tables are rebuilt, mentions are
//! resolved, and the ledger is saved.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use valleyvote_core::consolidate::{BILL_KEY, SPONSOR_KEY, VOTE_KEY};
use valleyvote_core::legiscan::{Bill, RollCall, Session, SessionPerson};
use valleyvote_core::model::entity_key;
use valleyvote_core::{
    BoxError, CanonicalRegistry, Config, Consolidator, EntityKind, MatchResult, MentionSource, RecordSink,
    RemoteEntityRef, Row, Table, ToRow, UnitPeople, dedupe_rows,
};
use valleyvote_sync::legiscan::{bill_refs, person_refs, roll_call_refs};
use valleyvote_sync::{
    FetchClient, FetchError, FetchReport, HashLedger, RateLimiter, RemoteSource, RetryPolicy, SyncError, SyncPlan,
    Synchronizer, plan,
};

use crate::error::PipelineError;
use crate::resolution::resolve_mentions;
use crate::summary::{EntityFailureRecord, RunSummary, UnitFailure};

pub const LEDGER_FILE: &str = "ledger.json";
pub const REGISTRY_DOCUMENT: &str = "registry";
pub const MATCH_RESULTS_DOCUMENT: &str = "match_results";
pub const RUN_SUMMARY_DOCUMENT: &str = "run_summary";

const ROLL_CALL_KEY: &[&str] = &["vote_id"];

/// What a sync of one session would fetch.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub session_id: u64,
    pub people: SyncPlan,
    pub bills: SyncPlan,
}

/// Everything one unit produced, fetched or loaded.
#[derive(Debug)]
struct UnitOutcome {
    session: Session,
    people: Option<Vec<SessionPerson>>,
    bills: Vec<Bill>,
    roll_calls: Vec<RollCall>,
    listed: usize,
    new: usize,
    changed: usize,
    unchanged: usize,
    fetched: usize,
    /// Loaded from storage because the dataset hash was unchanged.
    skipped: bool,
    failure: Option<String>,
    entity_failures: Vec<EntityFailureRecord>,
    storage_errors: Vec<String>,
}

impl UnitOutcome {
    fn new(session: Session) -> Self {
        Self {
            session,
            people: None,
            bills: Vec::new(),
            roll_calls: Vec::new(),
            listed: 0,
            new: 0,
            changed: 0,
            unchanged: 0,
            fetched: 0,
            skipped: false,
            failure: None,
            entity_failures: Vec::new(),
            storage_errors: Vec::new(),
        }
    }

    fn record_plan(&mut self, plan: &SyncPlan) {
        self.listed += plan.listed();
        self.new += plan.new_count;
        self.changed += plan.changed_count;
        self.unchanged += plan.unchanged_count;
    }

    /// Fetched bodies, and the keys of the entities that failed.
    fn record_report<T>(&mut self, report: FetchReport<T>) -> (Vec<T>, Vec<String>) {
        self.fetched += report.fetched.len();
        let unit = self.session.session_id;
        let mut failed = Vec::with_capacity(report.failures.len());
        for f in report.failures {
            failed.push(f.key.clone());
            self.entity_failures.push(EntityFailureRecord {
                unit,
                key: f.key,
                error: f.error.to_string(),
            });
        }
        (report.fetched.into_iter().map(|(_, body)| body).collect(), failed)
    }

    fn is_complete(&self) -> bool {
        self.failure.is_none() && self.entity_failures.is_empty() && self.storage_errors.is_empty()
    }

    fn fail(&mut self, err: SyncError) {
        self.failure = Some(err.to_string());
    }

    fn year(&self) -> i32 {
        self.session.year_start
    }
}

pub struct Orchestrator {
    config: Config,
    client: FetchClient,
    synchronizer: Synchronizer,
    sink: Arc<dyn RecordSink>,
    mentions: Option<Arc<dyn MentionSource>>,
    ledger_path: PathBuf,
}

impl Orchestrator {
    /// Validate `config`, wire the fetch stack and load the hash ledger.
    pub fn new(
        config: Config,
        source: Arc<dyn RemoteSource>,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let client = FetchClient::new(
            source,
            Arc::new(RateLimiter::new(&config.rate_limit)),
            RetryPolicy::from_config(&config.retry),
            config.request_timeout(),
        );
        let ledger_path = config.data_dir.join(LEDGER_FILE);
        let ledger = HashLedger::load(&ledger_path)?;
        info!(path = %ledger_path.display(), entries = ledger.len(), "loaded ledger");

        Ok(Self {
            config,
            client,
            synchronizer: Synchronizer::new(Arc::new(ledger)),
            sink,
            mentions: None,
            ledger_path,
        })
    }

    /// Resolve mentions from `source` at the end of each run.
    pub fn with_mentions(mut self, source: Arc<dyn MentionSource>) -> Self {
        self.mentions = Some(source);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.client = self.client.with_cancellation(cancel);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &HashLedger {
        self.synchronizer.ledger()
    }

    /// Sessions of the configured state overlapping the year range, oldest
    /// first.
    pub async fn sessions(&self) -> Result<Vec<Session>, PipelineError> {
        let mut sessions = self
            .client
            .session_list(&self.config.state)
            .await
            .map_err(PipelineError::session_list)?;
        let listed = sessions.len();
        sessions.retain(|s| s.overlaps(self.config.year_start, self.config.year_end));
        sessions.sort_by_key(|s| s.unit().recency());
        info!(
            state = %self.config.state,
            listed,
            in_range = sessions.len(),
            "session list"
        );
        Ok(sessions)
    }

    /// Classify a session's people and bills against the ledger without
    /// fetching bodies or committing anything.
    pub async fn plan_session(&self, session_id: u64) -> Result<SessionPlan, SyncError> {
        let people = self
            .client
            .session_people(session_id)
            .await
            .map_err(|source| SyncError::Listing {
                unit: session_id,
                source,
            })?;
        let bills = self
            .synchronizer
            .sync(session_id, async {
                let stubs = self.client.master_list(session_id).await?;
                Ok::<_, FetchError>(bill_refs(session_id, &stubs))
            })
            .await?;
        Ok(SessionPlan {
            session_id,
            people: plan(session_id, &person_refs(session_id, &people), self.ledger()),
            bills,
        })
    }

    /// Run the whole pipeline once.
    ///
    /// Only an invalid setup, an unreadable registry or an unreachable
    /// session list is an error; everything else is reported in the returned
    /// summary.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::new(&self.config.state, self.config.year_start, self.config.year_end);
        let prior = self.load_registry()?;
        // Without a stored registry, skipped sessions would contribute no people.
        let allow_skip = prior.is_some();
        let sessions = self.sessions().await?;
        summary.units_attempted = sessions.len();

        let mut outcomes: Vec<UnitOutcome> = stream::iter(sessions.iter().cloned())
            .map(|session| self.process_unit(session, allow_skip))
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;
        outcomes.sort_by_key(|o| o.session.unit().recency());

        let mut settled = Vec::new();
        for outcome in &mut outcomes {
            if outcome.skipped {
                summary.units_unchanged += 1;
            } else if outcome.is_complete() && !outcome.session.dataset_hash.is_empty() {
                settled.push((dataset_key(&outcome.session), outcome.session.dataset_hash.clone()));
            }
            summary.entities_listed += outcome.listed;
            summary.entities_new += outcome.new;
            summary.entities_changed += outcome.changed;
            summary.entities_unchanged += outcome.unchanged;
            summary.entities_fetched += outcome.fetched;
            summary.entity_failures.append(&mut outcome.entity_failures);
            summary.storage_errors.append(&mut outcome.storage_errors);
            if let Some(error) = outcome.failure.take() {
                summary.units_failed += 1;
                summary.unit_failures.push(UnitFailure {
                    unit: outcome.session.session_id,
                    error,
                });
            }
        }

        let unit_errors = summary.storage_errors.len();
        let registry = self.consolidate(prior.unwrap_or_default(), &outcomes, &mut summary);
        self.write_tables(&sessions, &outcomes, &registry, &mut summary);
        // A dataset hash is only trusted once everything built from it is stored.
        if summary.storage_errors.len() == unit_errors {
            self.settle_datasets(settled, &mut summary);
        }
        self.resolve(&registry, &mut summary);

        if let Err(e) = self.ledger().save(&self.ledger_path) {
            warn!(path = %self.ledger_path.display(), error = %e, "ledger save failed");
            summary.storage_errors.push(format!("ledger: {e}"));
        }

        summary.finished_at = Utc::now();
        match serde_json::to_value(&summary) {
            Ok(doc) => {
                if let Err(e) = self.sink.write_document(RUN_SUMMARY_DOCUMENT, &doc) {
                    warn!(error = %e, "run summary not stored");
                }
            }
            Err(e) => warn!(error = %e, "run summary not serializable"),
        }
        info!(
            units = summary.units_attempted,
            failed = summary.units_failed,
            unchanged_units = summary.units_unchanged,
            fetched = summary.entities_fetched,
            unchanged = summary.entities_unchanged,
            legislators = summary.legislators,
            elapsed_secs = summary.elapsed_secs(),
            "run complete"
        );
        Ok(summary)
    }

    async fn process_unit(&self, session: Session, allow_skip: bool) -> UnitOutcome {
        let sid = session.session_id;
        let mut out = UnitOutcome::new(session);

        if allow_skip && self.dataset_unchanged(&out.session) {
            self.restore_stored(&mut out);
            if out.storage_errors.is_empty() {
                info!(session_id = sid, bills = out.bills.len(), "dataset unchanged, loaded from storage");
                out.skipped = true;
                return out;
            }
            warn!(
                session_id = sid,
                errors = out.storage_errors.len(),
                "stored session incomplete, syncing it"
            );
            out = UnitOutcome::new(out.session);
        }
        info!(session_id = sid, name = %out.session.session_name, "processing session");

        // People: the listing carries full records, so it doubles as the body.
        let people = match self.client.session_people(sid).await {
            Ok(people) => people,
            Err(source) => {
                warn!(session_id = sid, error = %source, "people listing failed, using stored bodies");
                out.fail(SyncError::Listing { unit: sid, source });
                self.restore_stored(&mut out);
                return out;
            }
        };
        let people_plan = plan(sid, &person_refs(sid, &people), self.ledger());
        out.record_plan(&people_plan);
        let report = self
            .synchronizer
            .fetch_changed(
                &people_plan,
                |entity: RemoteEntityRef| {
                    let person = people.iter().find(|p| p.people_id == entity.id).cloned();
                    async move { person.ok_or_else(|| FetchError::NotFound(entity.key())) }
                },
                |entity: &RemoteEntityRef, person: &SessionPerson| self.persist_raw(entity, person),
            )
            .await;
        out.record_report(report);
        out.people = Some(people);

        // Bills, by change hash.
        let bill_plan = match self
            .synchronizer
            .sync(sid, async {
                let stubs = self.client.master_list(sid).await?;
                Ok::<_, FetchError>(bill_refs(sid, &stubs))
            })
            .await
        {
            Ok(plan) => plan,
            Err(e) => {
                warn!(session_id = sid, error = %e, "bill listing failed, using stored bodies");
                out.fail(e);
                self.restore_stored(&mut out);
                return out;
            }
        };
        out.record_plan(&bill_plan);
        let report = self
            .synchronizer
            .fetch_changed(
                &bill_plan,
                |entity: RemoteEntityRef| {
                    let client = self.client.clone();
                    async move { client.bill(entity.id).await }
                },
                |entity: &RemoteEntityRef, bill: &Bill| self.persist_raw(entity, bill),
            )
            .await;
        let (fetched, failed) = out.record_report(report);
        out.bills = fetched;
        let stored: Vec<Bill> =
            self.load_stored(bill_plan.unchanged.iter().chain(stale(&bill_plan, &failed)), &mut out);
        out.bills.extend(stored);
        out.bills.sort_by_key(|b| b.bill_id);

        // Roll calls never change; each is fetched once.
        let rc_plan = plan(sid, &roll_call_refs(sid, &out.bills), self.ledger());
        out.record_plan(&rc_plan);
        let report = self
            .synchronizer
            .fetch_changed(
                &rc_plan,
                |entity: RemoteEntityRef| {
                    let client = self.client.clone();
                    async move { client.roll_call(entity.id).await }
                },
                |entity: &RemoteEntityRef, rc: &RollCall| self.persist_raw(entity, rc),
            )
            .await;
        let (fetched, failed) = out.record_report(report);
        out.roll_calls = fetched;
        let stored: Vec<RollCall> =
            self.load_stored(rc_plan.unchanged.iter().chain(stale(&rc_plan, &failed)), &mut out);
        out.roll_calls.extend(stored);
        out.roll_calls.sort_by_key(|rc| rc.roll_call_id);

        info!(
            session_id = sid,
            people = out.people.as_ref().map_or(0, Vec::len),
            bills = out.bills.len(),
            roll_calls = out.roll_calls.len(),
            fetched = out.fetched,
            failed = out.entity_failures.len(),
            "session done"
        );
        out
    }

    fn persist_raw<T: Serialize>(&self, entity: &RemoteEntityRef, body: &T) -> Result<(), BoxError> {
        let value = serde_json::to_value(body)?;
        self.sink.write_raw(entity.kind, entity.unit, entity.id, &value)
    }

    /// Bodies stored by an earlier run.
    fn load_stored<'a, T: DeserializeOwned>(
        &self,
        entities: impl IntoIterator<Item = &'a RemoteEntityRef>,
        out: &mut UnitOutcome,
    ) -> Vec<T> {
        let mut bodies = Vec::new();
        for entity in entities {
            match self.sink.read_raw(entity.kind, entity.unit, entity.id) {
                Ok(Some(value)) => match serde_json::from_value(value) {
                    Ok(body) => bodies.push(body),
                    Err(e) => out.storage_errors.push(format!("{}: {e}", entity.key())),
                },
                Ok(None) => out.storage_errors.push(format!("{}: no stored body", entity.key())),
                Err(e) => out.storage_errors.push(format!("{}: {e}", entity.key())),
            }
        }
        bodies
    }

    /// Rebuild a unit's bills and roll calls from stored bodies the ledger
    /// has entries for.
    fn restore_stored(&self, out: &mut UnitOutcome) {
        let sid = out.session.session_id;
        let ids = match self.sink.stored_ids(EntityKind::Bill, sid) {
            Ok(ids) => ids,
            Err(e) => {
                out.storage_errors.push(format!("stored bills of session {sid}: {e}"));
                return;
            }
        };
        let bills: Vec<RemoteEntityRef> = ids
            .into_iter()
            .map(|id| RemoteEntityRef::new(EntityKind::Bill, id, "", sid))
            .filter(|r| self.ledger().hash(&r.key()).is_some())
            .collect();
        out.bills = self.load_stored(&bills, out);
        out.bills.sort_by_key(|b| b.bill_id);

        let roll_calls: Vec<RemoteEntityRef> = roll_call_refs(sid, &out.bills)
            .into_iter()
            .filter(|r| self.ledger().hash(&r.key()).is_some())
            .collect();
        out.roll_calls = self.load_stored(&roll_calls, out);
        out.roll_calls.sort_by_key(|rc| rc.roll_call_id);
        info!(
            session_id = sid,
            bills = out.bills.len(),
            roll_calls = out.roll_calls.len(),
            "restored session from storage"
        );
    }

    fn dataset_unchanged(&self, session: &Session) -> bool {
        !session.dataset_hash.is_empty()
            && self.ledger().hash(&dataset_key(session)).as_deref() == Some(session.dataset_hash.as_str())
    }

    /// Record the dataset hashes of sessions that synced completely.
    fn settle_datasets(&self, settled: Vec<(String, String)>, summary: &mut RunSummary) {
        for (key, hash) in settled {
            let current = self.ledger().hash(&key);
            if let Err(e) = self.ledger().commit(&key, current.as_deref(), &hash) {
                summary.storage_errors.push(format!("{key}: {e}"));
            }
        }
    }

    /// The stored registry, or `None` if there is none yet.
    fn load_registry(&self) -> Result<Option<CanonicalRegistry>, PipelineError> {
        let Some(doc) = self
            .sink
            .read_document(REGISTRY_DOCUMENT)
            .map_err(PipelineError::Registry)?
        else {
            return Ok(None);
        };
        let registry: CanonicalRegistry =
            serde_json::from_value(doc).map_err(|e| PipelineError::Registry(e.into()))?;
        info!(legislators = registry.len(), "loaded registry");
        Ok(Some(registry))
    }

    fn consolidate(
        &self,
        mut registry: CanonicalRegistry,
        outcomes: &[UnitOutcome],
        summary: &mut RunSummary,
    ) -> CanonicalRegistry {
        let prior = registry.len();
        let units: Vec<UnitPeople> = outcomes
            .iter()
            .filter_map(|o| {
                o.people.as_ref().map(|people| UnitPeople {
                    unit: o.session.unit(),
                    people: people.clone(),
                })
            })
            .collect();
        Consolidator::new(self.config.state.as_str()).merge_into(&mut registry, &units);

        summary.legislators = registry.len();
        match registry.fingerprint() {
            Ok(fp) => summary.registry_fingerprint = fp,
            Err(e) => summary.storage_errors.push(format!("registry fingerprint: {e}")),
        }
        info!(prior, legislators = registry.len(), units = units.len(), "consolidated registry");

        match serde_json::to_value(&registry) {
            Ok(doc) => self.store_document(REGISTRY_DOCUMENT, &doc, summary),
            Err(e) => summary.storage_errors.push(format!("{REGISTRY_DOCUMENT}: {e}")),
        }
        registry
    }

    fn write_tables(
        &self,
        sessions: &[Session],
        outcomes: &[UnitOutcome],
        registry: &CanonicalRegistry,
        summary: &mut RunSummary,
    ) {
        let mut bills = Vec::new();
        let mut sponsors = Vec::new();
        let mut roll_calls = Vec::new();
        let mut votes = Vec::new();
        for o in outcomes {
            let (sid, year) = (o.session.session_id, o.year());
            for bill in &o.bills {
                bills.push(bill.row(year));
                sponsors.extend(bill.sponsor_rows(year));
            }
            for rc in &o.roll_calls {
                roll_calls.push(rc.row(sid, year));
                votes.extend(rc.vote_rows(sid, year));
            }
        }

        let tables: [(Table, Vec<Row>); 6] = [
            (Table::Sessions, sessions.iter().map(ToRow::to_row).collect()),
            (Table::Legislators, registry.rows()),
            (Table::Bills, dedupe_rows(bills, BILL_KEY)),
            (Table::Sponsors, dedupe_rows(sponsors, SPONSOR_KEY)),
            (Table::RollCalls, dedupe_rows(roll_calls, ROLL_CALL_KEY)),
            (Table::Votes, dedupe_rows(votes, VOTE_KEY)),
        ];
        for (table, rows) in tables {
            self.store_table(table, &rows, summary);
        }
    }

    fn resolve(&self, registry: &CanonicalRegistry, summary: &mut RunSummary) {
        let Some(source) = &self.mentions else {
            return;
        };
        let mentions = match source.mentions() {
            Ok(mentions) => mentions,
            Err(e) => {
                warn!(error = %e, "mention source failed");
                summary.storage_errors.push(format!("mentions: {e}"));
                return;
            }
        };
        let prior: Vec<MatchResult> = self
            .read_document(MATCH_RESULTS_DOCUMENT, summary)
            .unwrap_or_default();
        let (results, counts) = resolve_mentions(registry, &mentions, &self.config.matching, prior);
        summary.mentions = counts;

        let rows: Vec<Row> = results.iter().map(ToRow::to_row).collect();
        self.store_table(Table::MatchResults, &rows, summary);
        match serde_json::to_value(&results) {
            Ok(doc) => self.store_document(MATCH_RESULTS_DOCUMENT, &doc, summary),
            Err(e) => summary.storage_errors.push(format!("{MATCH_RESULTS_DOCUMENT}: {e}")),
        }
    }

    fn read_document<T: DeserializeOwned>(&self, name: &str, summary: &mut RunSummary) -> Option<T> {
        let decoded = self
            .sink
            .read_document(name)
            .and_then(|doc| doc.map(serde_json::from_value).transpose().map_err(BoxError::from));
        match decoded {
            Ok(value) => value,
            Err(e) => {
                warn!(document = name, error = %e, "stored document unreadable, starting empty");
                summary.storage_errors.push(format!("{name}: {e}"));
                None
            }
        }
    }

    fn store_document(&self, name: &str, doc: &serde_json::Value, summary: &mut RunSummary) {
        if let Err(e) = self.sink.write_document(name, doc) {
            warn!(document = name, error = %e, "document write failed");
            summary.storage_errors.push(format!("{name}: {e}"));
        }
    }

    fn store_table(&self, table: Table, rows: &[Row], summary: &mut RunSummary) {
        match self.sink.write_table(table, rows) {
            Ok(()) => info!(table = table.name(), rows = rows.len(), "table written"),
            Err(e) => {
                warn!(table = table.name(), error = %e, "table write failed");
                summary.storage_errors.push(format!("{}: {e}", table.name()));
            }
        }
    }
}

/// Ledger key of a session's dataset hash.
fn dataset_key(session: &Session) -> String {
    entity_key(EntityKind::Session, session.session_id)
}

/// Entities that failed this run but were fetched by an earlier one, so a
/// stored body exists.
fn stale<'a>(plan: &'a SyncPlan, failed: &'a [String]) -> impl Iterator<Item = &'a RemoteEntityRef> + 'a {
    plan.to_fetch
        .iter()
        .filter(move |p| p.previous_hash.is_some() && failed.contains(&p.entity.key()))
        .map(|p| &p.entity)
}
