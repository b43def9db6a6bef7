//! Resilient fetch client: rate limiting, per-attempt timeout, retry with
//! backoff, and failure classification over any [`RemoteSource`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::FetchError;
use crate::limiter::RateLimiter;
use crate::retry::{FailureClass, RetryDecision, RetryPolicy};
use crate::source::{Operation, Params, RawReply, RemoteSource};

/// Application error messages that mean the requested entity does not exist.
const NOT_FOUND_MARKERS: &[&str] = &["not found", "invalid id", "does not exist", "no data"];
const CREDENTIAL_MARKERS: &[&str] = &["invalid api key", "missing api key", "api key required"];

/// One failed attempt, before the retry decision.
#[derive(Debug)]
enum AttemptFailure {
    RateLimited,
    Transient(String),
    Terminal(FetchError),
}

impl AttemptFailure {
    fn class(&self) -> FailureClass {
        match self {
            AttemptFailure::RateLimited => FailureClass::RateLimited,
            AttemptFailure::Transient(_) => FailureClass::Transient,
            AttemptFailure::Terminal(_) => FailureClass::Terminal,
        }
    }

    fn into_error(self, attempts: u32) -> FetchError {
        match self {
            AttemptFailure::RateLimited => FetchError::RateLimited { attempts },
            AttemptFailure::Transient(message) => FetchError::NetworkTransient { attempts, message },
            AttemptFailure::Terminal(err) => err,
        }
    }

    fn describe(&self) -> String {
        match self {
            AttemptFailure::RateLimited => "rate limited".into(),
            AttemptFailure::Transient(message) => message.clone(),
            AttemptFailure::Terminal(err) => err.to_string(),
        }
    }
}

/// Cheap to clone; clones share the limiter and cancellation token.
#[derive(Clone)]
pub struct FetchClient {
    source: Arc<dyn RemoteSource>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    timeout: Duration,
    cancel: CancellationToken,
}

impl FetchClient {
    pub fn new(
        source: Arc<dyn RemoteSource>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            limiter,
            policy,
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `cancel` to abort limiter waits, requests and backoff sleeps.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Perform `op`, retrying rate-limit and transient failures per policy.
    ///
    /// Returns the decoded JSON payload of a successful reply.
    pub async fn fetch(&self, op: Operation, params: &Params) -> Result<Value, FetchError> {
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = self.attempt(op, params).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let failure = match outcome {
                Ok(value) => {
                    info!(op = %op, ?params, attempt, elapsed_ms, outcome = "ok", "fetched");
                    return Ok(value);
                }
                Err(AttemptFailure::Terminal(FetchError::Cancelled)) => {
                    warn!(op = %op, ?params, attempt, outcome = "cancelled", "fetch cancelled");
                    return Err(FetchError::Cancelled);
                }
                Err(failure) => failure,
            };

            match self.policy.decide(attempt, failure.class()) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        op = %op,
                        ?params,
                        attempt,
                        elapsed_ms,
                        delay_ms = delay.as_millis() as u64,
                        reason = %failure.describe(),
                        "retrying"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::Fail => {
                    let err = failure.into_error(attempt);
                    warn!(op = %op, ?params, attempt, elapsed_ms, outcome = err.kind(), error = %err, "fetch failed");
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(&self, op: Operation, params: &Params) -> Result<Value, AttemptFailure> {
        let _permit = self
            .limiter
            .acquire(&self.cancel)
            .await
            .map_err(AttemptFailure::Terminal)?;

        let reply = tokio::select! {
            _ = self.cancel.cancelled() => return Err(AttemptFailure::Terminal(FetchError::Cancelled)),
            r = tokio::time::timeout(self.timeout, self.source.call(op, params)) => r,
        };
        match reply {
            Err(_) => Err(AttemptFailure::Transient(format!(
                "timed out after {}ms",
                self.timeout.as_millis()
            ))),
            Ok(Err(err)) => Err(AttemptFailure::Transient(err.to_string())),
            Ok(Ok(reply)) => classify(reply),
        }
    }
}

/// Map a completed exchange to a payload or a failure class.
fn classify(reply: RawReply) -> Result<Value, AttemptFailure> {
    match reply.status {
        429 => return Err(AttemptFailure::RateLimited),
        404 => return Err(AttemptFailure::Terminal(FetchError::NotFound(snippet(&reply.body)))),
        500..=599 => {
            return Err(AttemptFailure::Transient(format!("server returned {}", reply.status)));
        }
        200..=299 => {}
        status => {
            return Err(AttemptFailure::Terminal(FetchError::RemoteError {
                code: status.to_string(),
                message: snippet(&reply.body),
            }));
        }
    }

    let value: Value = serde_json::from_str(&reply.body)
        .map_err(|e| AttemptFailure::Terminal(FetchError::Decode(e.to_string())))?;

    if value.get("status").and_then(Value::as_str) == Some("ERROR") {
        let message = value
            .pointer("/alert/message")
            .and_then(Value::as_str)
            .unwrap_or("unspecified error")
            .to_string();
        let lower = message.to_lowercase();
        let err = if CREDENTIAL_MARKERS.iter().any(|m| lower.contains(m)) {
            FetchError::MissingCredential
        } else if NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m)) {
            FetchError::NotFound(message)
        } else {
            FetchError::RemoteError {
                code: "ERROR".into(),
                message,
            }
        };
        return Err(AttemptFailure::Terminal(err));
    }
    Ok(value)
}

/// First 200 characters of a response body, for error messages.
fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{TransportError, params};
    use crate::testing::ScriptedSource;
    use async_trait::async_trait;

    fn client(source: Arc<dyn RemoteSource>) -> FetchClient {
        FetchClient::new(
            source,
            Arc::new(RateLimiter::unlimited(4)),
            RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1)),
            Duration::from_secs(5),
        )
    }

    fn bill_params() -> Params {
        params([("id", "1200".to_string())])
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_retried_then_succeeds() {
        let source = Arc::new(ScriptedSource::new());
        source.push(Operation::Bill, bill_params(), Ok(RawReply::new(429, "")));
        source.push(Operation::Bill, bill_params(), Ok(RawReply::new(429, "")));
        source.push(Operation::Bill, bill_params(), Ok(RawReply::ok(r#"{"status":"OK","bill":{}}"#)));

        let value = client(source.clone()).fetch(Operation::Bill, &bill_params()).await.unwrap();
        assert_eq!(value["status"], "OK");
        assert_eq!(source.calls(Operation::Bill), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_exhausted() {
        let source = Arc::new(ScriptedSource::new());
        source.push(Operation::Bill, bill_params(), Ok(RawReply::new(429, "")));

        let err = client(source.clone()).fetch(Operation::Bill, &bill_params()).await.unwrap_err();
        assert_eq!(err, FetchError::RateLimited { attempts: 3 });
        assert_eq!(source.calls(Operation::Bill), 3);
    }

    #[tokio::test]
    async fn not_found_not_retried() {
        let source = Arc::new(ScriptedSource::new());
        source.push(Operation::Bill, bill_params(), Ok(RawReply::new(404, "gone")));

        let err = client(source.clone()).fetch(Operation::Bill, &bill_params()).await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
        assert_eq!(source.calls(Operation::Bill), 1);
    }

    #[tokio::test]
    async fn application_errors_classified() {
        let source = Arc::new(ScriptedSource::new());
        source.push(
            Operation::Bill,
            bill_params(),
            Ok(RawReply::ok(r#"{"status":"ERROR","alert":{"message":"Unknown bill id: Invalid ID"}}"#)),
        );
        let err = client(source.clone()).fetch(Operation::Bill, &bill_params()).await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)), "{err:?}");

        let other = params([("id", "9".to_string())]);
        source.push(
            Operation::RollCall,
            other.clone(),
            Ok(RawReply::ok(r#"{"status":"ERROR","alert":{"message":"Key quota exceeded"}}"#)),
        );
        let err = client(source.clone()).fetch(Operation::RollCall, &other).await.unwrap_err();
        assert_eq!(
            err,
            FetchError::RemoteError {
                code: "ERROR".into(),
                message: "Key quota exceeded".into()
            }
        );
        assert_eq!(source.calls(Operation::RollCall), 1);

        let list = params([("state", "ID".to_string())]);
        source.push(
            Operation::SessionList,
            list.clone(),
            Ok(RawReply::ok(r#"{"status":"ERROR","alert":{"message":"Invalid API key"}}"#)),
        );
        let err = client(source).fetch(Operation::SessionList, &list).await.unwrap_err();
        assert_eq!(err, FetchError::MissingCredential);
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_are_transient() {
        let source = Arc::new(ScriptedSource::new());
        source.push(Operation::Bill, bill_params(), Ok(RawReply::new(503, "busy")));
        source.push(Operation::Bill, bill_params(), Err(TransportError::Connect("reset".into())));
        source.push(Operation::Bill, bill_params(), Ok(RawReply::ok(r#"{"status":"OK"}"#)));

        assert!(client(source.clone()).fetch(Operation::Bill, &bill_params()).await.is_ok());
        assert_eq!(source.calls(Operation::Bill), 3);
    }

    #[tokio::test]
    async fn other_client_errors_terminal() {
        let source = Arc::new(ScriptedSource::new());
        source.push(Operation::Bill, bill_params(), Ok(RawReply::new(403, "forbidden")));

        let err = client(source.clone()).fetch(Operation::Bill, &bill_params()).await.unwrap_err();
        assert_eq!(
            err,
            FetchError::RemoteError {
                code: "403".into(),
                message: "forbidden".into()
            }
        );
    }

    #[tokio::test]
    async fn invalid_json_is_decode_error() {
        let source = Arc::new(ScriptedSource::new());
        source.push(Operation::Bill, bill_params(), Ok(RawReply::ok("<html>")));

        let err = client(source.clone()).fetch(Operation::Bill, &bill_params()).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
        assert_eq!(source.calls(Operation::Bill), 1);
    }

    struct Stalled;

    #[async_trait]
    impl RemoteSource for Stalled {
        async fn call(&self, _op: Operation, _params: &Params) -> Result<RawReply, TransportError> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(RawReply::ok("{}"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_exhaust_to_network_transient() {
        let err = client(Arc::new(Stalled)).fetch(Operation::Bill, &bill_params()).await.unwrap_err();
        assert!(matches!(err, FetchError::NetworkTransient { attempts: 3, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let c = client(Arc::new(Stalled)).with_cancellation(cancel);
        assert_eq!(c.fetch(Operation::Bill, &bill_params()).await.unwrap_err(), FetchError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_backoff() {
        let source = Arc::new(ScriptedSource::new());
        source.push(Operation::Bill, bill_params(), Ok(RawReply::new(429, "")));
        let cancel = CancellationToken::new();
        let c = FetchClient::new(
            source.clone(),
            Arc::new(RateLimiter::unlimited(4)),
            RetryPolicy::new(3, Duration::from_secs(60), Duration::from_secs(60)),
            Duration::from_secs(5),
        )
        .with_cancellation(cancel.clone());

        let started = Instant::now();
        let task = tokio::spawn(async move { c.fetch(Operation::Bill, &bill_params()).await });
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.calls(Operation::Bill), 1);

        cancel.cancel();
        assert_eq!(task.await.unwrap().unwrap_err(), FetchError::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(source.calls(Operation::Bill), 1);
    }

    #[test]
    fn snippet_truncates() {
        assert_eq!(snippet(&"x".repeat(500)).len(), 200);
    }
}
