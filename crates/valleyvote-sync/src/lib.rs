//! Sync layer: resilient LegiScan fetching and change-hash synchronization.

mod error;
pub use error::{FetchError, LedgerError, SyncError};

pub mod client;
pub mod ledger;
pub mod legiscan;
pub mod limiter;
pub mod retry;
pub mod source;
pub mod synchronizer;
pub mod testing;

#[cfg(feature = "http")]
pub mod http;

pub use client::FetchClient;
pub use ledger::{HashLedger, LedgerEntry};
pub use limiter::RateLimiter;
pub use retry::{FailureClass, RetryDecision, RetryPolicy};
pub use source::{Operation, Params, RawReply, RemoteSource, TransportError, params};
pub use synchronizer::{ChangeKind, EntityFailure, FetchReport, PlannedFetch, SyncPlan, Synchronizer, plan};

#[cfg(feature = "http")]
pub use http::LegiScanHttp;
