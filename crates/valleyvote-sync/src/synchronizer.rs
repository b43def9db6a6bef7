//! Change-hash dataset synchronizer.
//!
//! A unit's listing carries a content hash per entity. Comparing it against
//! the [`HashLedger`] classifies each entity NEW, CHANGED or UNCHANGED; only
//! the first two are fetched, so the fetch count tracks how much changed, not
//! how much exists. A ledger entry moves forward only after its payload has
//! been fetched and persisted.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};
use valleyvote_core::RemoteEntityRef;

use crate::error::{FetchError, SyncError};
use crate::ledger::HashLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    New,
    Changed,
    Unchanged,
}

/// An entity selected for fetching, with the hash its ledger entry must
/// still hold when the fetch is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFetch {
    pub entity: RemoteEntityRef,
    pub change: ChangeKind,
    pub previous_hash: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub unit: u64,
    pub to_fetch: Vec<PlannedFetch>,
    /// Listed entities whose hash matches the ledger.
    pub unchanged: Vec<RemoteEntityRef>,
    pub new_count: usize,
    pub changed_count: usize,
    pub unchanged_count: usize,
}

impl SyncPlan {
    /// Distinct entities in the listing.
    pub fn listed(&self) -> usize {
        self.new_count + self.changed_count + self.unchanged_count
    }

    pub fn is_empty(&self) -> bool {
        self.to_fetch.is_empty()
    }
}

/// Per-entity failure. Siblings are unaffected.
#[derive(Debug)]
pub struct EntityFailure {
    pub key: String,
    pub error: SyncError,
}

#[derive(Debug)]
pub struct FetchReport<T> {
    pub fetched: Vec<(RemoteEntityRef, T)>,
    pub failures: Vec<EntityFailure>,
}

impl<T> Default for FetchReport<T> {
    fn default() -> Self {
        Self {
            fetched: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Classify a listing against the ledger. Duplicate entries are planned once.
pub fn plan(unit: u64, listing: &[RemoteEntityRef], ledger: &HashLedger) -> SyncPlan {
    let mut seen = BTreeSet::new();
    let mut plan = SyncPlan {
        unit,
        ..SyncPlan::default()
    };

    for entity in listing {
        let key = entity.key();
        if !seen.insert(key.clone()) {
            continue;
        }
        let previous_hash = ledger.hash(&key);
        let change = match previous_hash.as_deref() {
            None => ChangeKind::New,
            Some(h) if h == entity.content_hash => ChangeKind::Unchanged,
            Some(_) => ChangeKind::Changed,
        };
        match change {
            ChangeKind::New => plan.new_count += 1,
            ChangeKind::Changed => plan.changed_count += 1,
            ChangeKind::Unchanged => {
                plan.unchanged_count += 1;
                plan.unchanged.push(entity.clone());
                continue;
            }
        }
        plan.to_fetch.push(PlannedFetch {
            entity: entity.clone(),
            change,
            previous_hash,
        });
    }
    plan
}

/// Drives plans and commits against a shared ledger.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    ledger: Arc<HashLedger>,
}

impl Synchronizer {
    pub fn new(ledger: Arc<HashLedger>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<HashLedger> {
        &self.ledger
    }

    /// Await a unit's listing and plan it. A failed listing skips the unit.
    pub async fn sync<L>(&self, unit: u64, listing: L) -> Result<SyncPlan, SyncError>
    where
        L: Future<Output = Result<Vec<RemoteEntityRef>, FetchError>>,
    {
        let listing = listing.await.map_err(|source| {
            warn!(unit, error = %source, "listing failed, skipping unit");
            SyncError::Listing { unit, source }
        })?;
        let plan = plan(unit, &listing, &self.ledger);
        info!(
            unit,
            listed = plan.listed(),
            new = plan.new_count,
            changed = plan.changed_count,
            unchanged = plan.unchanged_count,
            "planned sync"
        );
        Ok(plan)
    }

    /// Fetch and persist every planned entity in order, committing each to
    /// the ledger on success. Failures are collected, not raised.
    pub async fn fetch_changed<T, F, Fut, P, E>(&self, plan: &SyncPlan, fetch: F, mut persist: P) -> FetchReport<T>
    where
        F: Fn(RemoteEntityRef) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
        P: FnMut(&RemoteEntityRef, &T) -> Result<(), E>,
        E: fmt::Display,
    {
        let mut report = FetchReport::default();
        for planned in &plan.to_fetch {
            let entity = &planned.entity;
            let key = entity.key();

            let body = match fetch(entity.clone()).await {
                Ok(body) => body,
                Err(source) => {
                    warn!(unit = plan.unit, key = %key, error = %source, "fetch failed");
                    report.failures.push(EntityFailure {
                        key: key.clone(),
                        error: SyncError::Fetch { key, source },
                    });
                    continue;
                }
            };

            if let Err(e) = persist(entity, &body) {
                warn!(unit = plan.unit, key = %key, error = %e, "persist failed");
                report.failures.push(EntityFailure {
                    key: key.clone(),
                    error: SyncError::Persist {
                        key,
                        message: e.to_string(),
                    },
                });
                continue;
            }

            if let Err(e) = self
                .ledger
                .commit(&key, planned.previous_hash.as_deref(), &entity.content_hash)
            {
                warn!(unit = plan.unit, key = %key, error = %e, "ledger commit rejected");
                report.failures.push(EntityFailure {
                    key,
                    error: e.into(),
                });
                continue;
            }
            report.fetched.push((entity.clone(), body));
        }
        info!(
            unit = plan.unit,
            fetched = report.fetched.len(),
            failed = report.failures.len(),
            "fetched changed entities"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use valleyvote_core::EntityKind;

    fn bill(id: u64, hash: &str) -> RemoteEntityRef {
        RemoteEntityRef::new(EntityKind::Bill, id, hash, 1)
    }

    fn listing(n: u64) -> Vec<RemoteEntityRef> {
        (1..=n).map(|id| bill(id, &format!("h{id}"))).collect()
    }

    async fn fetch_ok(entity: RemoteEntityRef) -> Result<u64, FetchError> {
        Ok(entity.id)
    }

    fn persist_ok(_: &RemoteEntityRef, _: &u64) -> Result<(), String> {
        Ok(())
    }

    #[tokio::test]
    async fn second_sync_fetches_nothing() {
        let sync = Synchronizer::new(Arc::new(HashLedger::new()));
        let first = sync.sync(1, async { Ok(listing(5)) }).await.unwrap();
        assert_eq!(first.new_count, 5);
        let report = sync.fetch_changed(&first, fetch_ok, persist_ok).await;
        assert_eq!(report.fetched.len(), 5);

        let second = sync.sync(1, async { Ok(listing(5)) }).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(second.unchanged_count, 5);
        assert_eq!(second.unchanged.len(), 5);
    }

    #[tokio::test]
    async fn only_changed_entities_fetched() {
        let ledger = Arc::new(HashLedger::new());
        for e in listing(10) {
            ledger.commit(&e.key(), None, &e.content_hash).unwrap();
        }
        let mut changed = listing(10);
        changed[2].content_hash = "new".into();
        changed[7].content_hash = "new".into();
        changed.push(bill(11, "h11"));

        let p = plan(1, &changed, &ledger);
        assert_eq!(p.to_fetch.len(), 3);
        assert_eq!((p.new_count, p.changed_count, p.unchanged_count), (1, 2, 8));
        assert_eq!(p.to_fetch[0].previous_hash.as_deref(), Some("h3"));
        assert_eq!(p.to_fetch[2].change, ChangeKind::New);
    }

    #[test]
    fn duplicates_planned_once() {
        let ledger = HashLedger::new();
        let p = plan(1, &[bill(1, "a"), bill(1, "a"), bill(2, "b")], &ledger);
        assert_eq!(p.to_fetch.len(), 2);
        assert_eq!(p.listed(), 2);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_ledger_untouched() {
        let ledger = Arc::new(HashLedger::new());
        ledger.commit("bill/2", None, "old").unwrap();
        let sync = Synchronizer::new(ledger.clone());

        let entities = vec![bill(1, "h1"), bill(2, "new"), bill(3, "h3")];
        let p = sync.sync(1, async { Ok(entities.clone()) }).await.unwrap();
        let report = sync
            .fetch_changed(
                &p,
                |e: RemoteEntityRef| async move {
                    if e.id == 2 {
                        Err(FetchError::NetworkTransient {
                            attempts: 5,
                            message: "reset".into(),
                        })
                    } else {
                        Ok(e.id)
                    }
                },
                persist_ok,
            )
            .await;

        assert_eq!(report.fetched.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, "bill/2");
        assert_eq!(ledger.hash("bill/2").as_deref(), Some("old"));

        let rerun = sync.sync(1, async { Ok(entities) }).await.unwrap();
        assert_eq!(rerun.to_fetch.len(), 1);
        assert_eq!(rerun.to_fetch[0].change, ChangeKind::Changed);
    }

    #[tokio::test]
    async fn failed_persist_not_committed() {
        let ledger = Arc::new(HashLedger::new());
        let sync = Synchronizer::new(ledger.clone());
        let p = plan(1, &listing(2), &ledger);
        let report = sync
            .fetch_changed(&p, fetch_ok, |e: &RemoteEntityRef, _: &u64| {
                if e.id == 1 { Err("disk full") } else { Ok(()) }
            })
            .await;
        assert!(matches!(report.failures[0].error, SyncError::Persist { .. }));
        assert!(ledger.hash("bill/1").is_none());
        assert_eq!(ledger.hash("bill/2").as_deref(), Some("h2"));
    }

    #[tokio::test]
    async fn concurrent_commit_reported_as_conflict() {
        let ledger = Arc::new(HashLedger::new());
        let sync = Synchronizer::new(ledger.clone());
        let p = plan(1, &listing(1), &ledger);
        // Another worker commits between planning and fetching.
        ledger.commit("bill/1", None, "other").unwrap();

        let report = sync.fetch_changed(&p, fetch_ok, persist_ok).await;
        assert!(report.fetched.is_empty());
        assert!(matches!(report.failures[0].error, SyncError::Ledger(_)));
        assert_eq!(ledger.hash("bill/1").as_deref(), Some("other"));
    }

    #[tokio::test]
    async fn listing_failure_skips_unit() {
        let sync = Synchronizer::new(Arc::new(HashLedger::new()));
        let err = sync
            .sync(4, async { Err(FetchError::RateLimited { attempts: 5 }) })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Listing { unit: 4, .. }));
    }
}
