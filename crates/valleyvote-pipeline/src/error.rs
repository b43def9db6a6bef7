use thiserror::Error;
use valleyvote_core::{BoxError, ConfigError};
use valleyvote_sync::{FetchError, LedgerError};

/// Conditions that stop a run before any unit is processed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no API key configured")]
    MissingCredential,
    #[error("session list unavailable: {0}")]
    SessionList(FetchError),
    #[error("ledger unavailable: {0}")]
    Ledger(#[from] LedgerError),
    /// The stored registry exists but cannot be read. Starting empty would
    /// drop every legislator outside the current year range.
    #[error("stored registry unreadable: {0}")]
    Registry(BoxError),
}

impl PipelineError {
    pub(crate) fn session_list(err: FetchError) -> Self {
        match err {
            FetchError::MissingCredential => PipelineError::MissingCredential,
            other => PipelineError::SessionList(other),
        }
    }
}
