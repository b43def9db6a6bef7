use thiserror::Error;

/// Outcome of a failed remote operation, after retries.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("remote error {code}: {message}")]
    RemoteError { code: String, message: String },
    #[error("network error after {attempts} attempts: {message}")]
    NetworkTransient { attempts: u32, message: String },
    #[error("undecodable response: {0}")]
    Decode(String),
    #[error("cancelled")]
    Cancelled,
    #[error("no API key configured")]
    MissingCredential,
}

impl FetchError {
    /// Short classification used in logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::RateLimited { .. } => "rate_limited",
            FetchError::NotFound(_) => "not_found",
            FetchError::RemoteError { .. } => "remote_error",
            FetchError::NetworkTransient { .. } => "network_transient",
            FetchError::Decode(_) => "decode",
            FetchError::Cancelled => "cancelled",
            FetchError::MissingCredential => "missing_credential",
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger write conflict on {key}: expected {expected:?}, found {found:?}")]
    WriteConflict {
        key: String,
        expected: Option<String>,
        found: Option<String>,
    },
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("listing for unit {unit} failed: {source}")]
    Listing { unit: u64, source: FetchError },
    #[error("fetching {key} failed: {source}")]
    Fetch { key: String, source: FetchError },
    #[error("persisting {key} failed: {message}")]
    Persist { key: String, message: String },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
