//! In-memory [`RemoteSource`] with scripted replies, for tests and dry runs.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::source::{Operation, Params, RawReply, RemoteSource, TransportError};

type Script = BTreeMap<(Operation, Params), VecDeque<Result<RawReply, TransportError>>>;

/// Replies are queued per (operation, params). The last queued reply repeats
/// once the queue drains; an unscripted call gets a 404.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: Mutex<Script>,
    log: Mutex<Vec<(Operation, Params)>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, op: Operation, params: Params, reply: Result<RawReply, TransportError>) {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        script.entry((op, params)).or_default().push_back(reply);
    }

    /// Replace every queued reply for `(op, params)` with `reply`.
    pub fn set(&self, op: Operation, params: Params, reply: Result<RawReply, TransportError>) {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        script.insert((op, params), VecDeque::from([reply]));
    }

    /// Number of calls made for `op`, any params.
    pub fn calls(&self, op: Operation) -> usize {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.iter().filter(|(o, _)| *o == op).count()
    }

    pub fn total_calls(&self) -> usize {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Forget recorded calls; the script is kept.
    pub fn reset_calls(&self) {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[async_trait]
impl RemoteSource for ScriptedSource {
    async fn call(&self, op: Operation, params: &Params) -> Result<RawReply, TransportError> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((op, params.clone()));

        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        match script.get_mut(&(op, params.clone())) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| Ok(RawReply::new(404, "unscripted"))),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(RawReply::new(404, "unscripted"))),
            None => Ok(RawReply::new(404, "unscripted")),
        }
    }
}
