use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use valleyvote_core::legiscan::Bill;
use valleyvote_sync::legiscan::bill_refs;
use valleyvote_sync::testing::ScriptedSource;
use valleyvote_sync::{
    FetchClient, FetchError, HashLedger, Operation, RateLimiter, RawReply, RetryPolicy, Synchronizer, params,
};

const SESSION: u64 = 2011;

fn master_list(hashes: &[(u64, &str)]) -> RawReply {
    let mut list = serde_json::Map::new();
    list.insert("session".into(), json!({"session_id": SESSION}));
    for (i, (id, hash)) in hashes.iter().enumerate() {
        list.insert(
            i.to_string(),
            json!({"bill_id": id, "number": format!("H{id:04}"), "change_hash": hash}),
        );
    }
    RawReply::ok(json!({"status": "OK", "masterlist": list}).to_string())
}

fn script_bills(source: &ScriptedSource, ids: &[u64]) {
    for id in ids {
        source.set(
            Operation::Bill,
            params([("id", id.to_string())]),
            Ok(RawReply::ok(
                json!({"status": "OK", "bill": {"bill_id": id, "session_id": SESSION, "title": format!("Bill {id}")}})
                    .to_string(),
            )),
        );
    }
}

fn client(source: Arc<ScriptedSource>) -> FetchClient {
    FetchClient::new(
        source,
        Arc::new(RateLimiter::unlimited(1)),
        RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5)),
        Duration::from_secs(5),
    )
}

async fn run_once(client: &FetchClient, sync: &Synchronizer) -> (usize, Vec<u64>) {
    let plan = sync
        .sync(SESSION, async {
            let stubs = client.master_list(SESSION).await?;
            Ok::<_, FetchError>(bill_refs(SESSION, &stubs))
        })
        .await
        .unwrap();
    let report = sync
        .fetch_changed(
            &plan,
            |e| async move { client.bill(e.id).await },
            |_, _: &Bill| Ok::<(), String>(()),
        )
        .await;
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    (plan.listed(), report.fetched.iter().map(|(e, _)| e.id).collect())
}

#[tokio::test]
async fn fetches_scale_with_changes_not_size() {
    let source = Arc::new(ScriptedSource::new());
    let ids: Vec<u64> = (1..=20).collect();
    let hashes: Vec<(u64, &str)> = ids.iter().map(|&id| (id, "v1")).collect();
    source.set(Operation::MasterList, params([("id", SESSION.to_string())]), Ok(master_list(&hashes)));
    script_bills(&source, &ids);

    let client = client(source.clone());
    let sync = Synchronizer::new(Arc::new(HashLedger::new()));

    let (listed, fetched) = run_once(&client, &sync).await;
    assert_eq!(listed, 20);
    assert_eq!(fetched.len(), 20);
    assert_eq!(source.calls(Operation::Bill), 20);

    // Unchanged listing: nothing fetched.
    source.reset_calls();
    let (_, fetched) = run_once(&client, &sync).await;
    assert!(fetched.is_empty());
    assert_eq!(source.calls(Operation::Bill), 0);

    // Two of twenty change.
    let mut changed = hashes.clone();
    changed[4].1 = "v2";
    changed[15].1 = "v2";
    source.set(Operation::MasterList, params([("id", SESSION.to_string())]), Ok(master_list(&changed)));
    source.reset_calls();
    let (_, fetched) = run_once(&client, &sync).await;
    assert_eq!(fetched, vec![5, 16]);
    assert_eq!(source.calls(Operation::Bill), 2);
}

#[tokio::test]
async fn ledger_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("ledger.json");

    let source = Arc::new(ScriptedSource::new());
    source.set(
        Operation::MasterList,
        params([("id", SESSION.to_string())]),
        Ok(master_list(&[(1, "a"), (2, "b")])),
    );
    script_bills(&source, &[1, 2]);
    let client = client(source.clone());

    let first = Synchronizer::new(Arc::new(HashLedger::new()));
    let (_, fetched) = run_once(&client, &first).await;
    assert_eq!(fetched.len(), 2);
    first.ledger().save(&path).unwrap();

    let restarted = Synchronizer::new(Arc::new(HashLedger::load(&path).unwrap()));
    source.reset_calls();
    let (_, fetched) = run_once(&client, &restarted).await;
    assert!(fetched.is_empty());
    assert_eq!(source.calls(Operation::Bill), 0);
}
