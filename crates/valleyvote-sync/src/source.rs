//! The remote data source boundary.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// LegiScan API operations used by the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    SessionList,
    SessionPeople,
    MasterList,
    Bill,
    RollCall,
}

impl Operation {
    /// Wire name, the `op` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::SessionList => "getSessionList",
            Operation::SessionPeople => "getSessionPeople",
            Operation::MasterList => "getMasterList",
            Operation::Bill => "getBill",
            Operation::RollCall => "getRollCall",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation parameters, e.g. `{"id": "2011"}`. Never carries the API key.
pub type Params = BTreeMap<String, String>;

/// Build [`Params`] from pairs.
pub fn params<const N: usize>(pairs: [(&str, String); N]) -> Params {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// Status and body of a completed exchange, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReply {
    pub status: u16,
    pub body: String,
}

impl RawReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }
}

/// Failure to complete an exchange at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Other(String),
}

#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn call(&self, op: Operation, params: &Params) -> Result<RawReply, TransportError>;
}
