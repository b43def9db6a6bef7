//! Typed LegiScan operations on top of [`FetchClient`], and the listings the
//! synchronizer plans from.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use valleyvote_core::legiscan::{Bill, BillStub, RollCall, Session, SessionPerson};
use valleyvote_core::{EntityKind, RemoteEntityRef};

use crate::client::FetchClient;
use crate::error::FetchError;
use crate::source::{Operation, params};

impl FetchClient {
    /// Sessions for a state, e.g. `"ID"`.
    pub async fn session_list(&self, state: &str) -> Result<Vec<Session>, FetchError> {
        let payload = self
            .fetch(Operation::SessionList, &params([("state", state.to_string())]))
            .await?;
        decode_field(&payload, "/sessions")
    }

    /// People serving in a session.
    pub async fn session_people(&self, session_id: u64) -> Result<Vec<SessionPerson>, FetchError> {
        let payload = self
            .fetch(Operation::SessionPeople, &params([("id", session_id.to_string())]))
            .await?;
        decode_field(&payload, "/sessionpeople/people")
    }

    /// Bill stubs (id + change hash) for a session.
    pub async fn master_list(&self, session_id: u64) -> Result<Vec<BillStub>, FetchError> {
        let payload = self
            .fetch(Operation::MasterList, &params([("id", session_id.to_string())]))
            .await?;
        decode_master_list(&payload)
    }

    pub async fn bill(&self, bill_id: u64) -> Result<Bill, FetchError> {
        let payload = self.fetch(Operation::Bill, &params([("id", bill_id.to_string())])).await?;
        decode_field(&payload, "/bill")
    }

    pub async fn roll_call(&self, roll_call_id: u64) -> Result<RollCall, FetchError> {
        let payload = self
            .fetch(Operation::RollCall, &params([("id", roll_call_id.to_string())]))
            .await?;
        decode_field(&payload, "/roll_call")
    }
}

fn decode_field<T: DeserializeOwned>(payload: &Value, pointer: &str) -> Result<T, FetchError> {
    let field = payload
        .pointer(pointer)
        .ok_or_else(|| FetchError::Decode(format!("response has no {pointer}")))?;
    T::deserialize(field).map_err(|e| FetchError::Decode(format!("{pointer}: {e}")))
}

/// The master list is an object of numbered stubs plus a `session` block.
fn decode_master_list(payload: &Value) -> Result<Vec<BillStub>, FetchError> {
    let list = payload
        .get("masterlist")
        .and_then(Value::as_object)
        .ok_or_else(|| FetchError::Decode("response has no masterlist object".into()))?;
    let mut stubs = Vec::with_capacity(list.len());
    for (key, entry) in list {
        if key == "session" || entry.get("bill_id").is_none() {
            continue;
        }
        let stub = BillStub::deserialize(entry).map_err(|e| FetchError::Decode(format!("masterlist/{key}: {e}")))?;
        stubs.push(stub);
    }
    stubs.sort_by_key(|s| s.bill_id);
    Ok(stubs)
}

/// Listing refs for a session's people, hashed by `person_hash`.
pub fn person_refs(session_id: u64, people: &[SessionPerson]) -> Vec<RemoteEntityRef> {
    people
        .iter()
        .map(|p| RemoteEntityRef::new(EntityKind::Person, p.people_id, p.person_hash.as_str(), session_id))
        .collect()
}

/// Listing refs for a session's bills, hashed by `change_hash`.
pub fn bill_refs(session_id: u64, stubs: &[BillStub]) -> Vec<RemoteEntityRef> {
    stubs
        .iter()
        .map(|s| RemoteEntityRef::new(EntityKind::Bill, s.bill_id, s.change_hash.as_str(), session_id))
        .collect()
}

/// Listing refs for the roll calls of freshly fetched bills. Roll calls are
/// immutable, so each is fetched once.
pub fn roll_call_refs<'a>(session_id: u64, bills: impl IntoIterator<Item = &'a Bill>) -> Vec<RemoteEntityRef> {
    bills
        .into_iter()
        .flat_map(|b| b.votes.iter())
        .map(|v| RemoteEntityRef::immutable(EntityKind::RollCall, v.roll_call_id, session_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn master_list_skips_session_block() {
        let payload = json!({
            "status": "OK",
            "masterlist": {
                "session": {"session_id": 2011, "session_name": "2023 Regular"},
                "1": {"bill_id": 20, "number": "H0002", "change_hash": "bb"},
                "0": {"bill_id": 10, "number": "H0001", "change_hash": "aa"}
            }
        });
        let stubs = decode_master_list(&payload).unwrap();
        assert_eq!(stubs.iter().map(|s| s.bill_id).collect::<Vec<_>>(), vec![10, 20]);
        assert_eq!(stubs[0].change_hash, "aa");
    }

    #[test]
    fn missing_field_is_decode_error() {
        let err = decode_field::<Vec<Session>>(&json!({"status": "OK"}), "/sessions").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn session_people_decoded() {
        let payload = json!({
            "status": "OK",
            "sessionpeople": {
                "session": {"session_id": 2011},
                "people": [{"people_id": 7, "person_hash": "p7", "name": "John Smith", "role": "Rep"}]
            }
        });
        let people: Vec<SessionPerson> = decode_field(&payload, "/sessionpeople/people").unwrap();
        let refs = person_refs(2011, &people);
        assert_eq!(refs[0].key(), "person/2011/7");
        assert_eq!(refs[0].content_hash, "p7");
        assert_eq!(refs[0].unit, 2011);
    }

    #[test]
    fn roll_call_refs_are_immutable() {
        let bill: Bill = serde_json::from_value(json!({
            "bill_id": 1,
            "votes": [{"roll_call_id": 5}, {"roll_call_id": 6}]
        }))
        .unwrap();
        let refs = roll_call_refs(2011, [&bill]);
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().all(|r| r.content_hash == valleyvote_core::model::IMMUTABLE_CONTENT_HASH));
    }
}
