//! reqwest transport for the LegiScan JSON API.

use std::fmt;

use async_trait::async_trait;
use tracing::debug;

use crate::error::FetchError;
use crate::source::{Operation, Params, RawReply, RemoteSource, TransportError};

/// LegiScan over HTTPS. The API key is added to every request and never
/// logged or printed.
pub struct LegiScanHttp {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl fmt::Debug for LegiScanHttp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegiScanHttp")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl LegiScanHttp {
    /// Create a client for `base_url`, e.g. `https://api.legiscan.com/`.
    ///
    /// Fails with [`FetchError::MissingCredential`] when `api_key` is blank,
    /// before any request is made.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, FetchError> {
        if api_key.trim().is_empty() {
            return Err(FetchError::MissingCredential);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: format!("{}/", base_url.trim_end_matches('/')),
            api_key: api_key.trim().to_string(),
        })
    }
}

#[async_trait]
impl RemoteSource for LegiScanHttp {
    async fn call(&self, op: Operation, params: &Params) -> Result<RawReply, TransportError> {
        let mut query: Vec<(&str, &str)> = vec![("key", self.api_key.as_str()), ("op", op.as_str())];
        query.extend(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        debug!(url = %self.base_url, op = %op, ?params, "calling LegiScan");
        let resp = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(transport_error)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(transport_error)?;
        Ok(RawReply { status, body })
    }
}

/// Classify a reqwest error, dropping the URL so the key cannot leak.
fn transport_error(err: reqwest::Error) -> TransportError {
    let err = err.without_url();
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}
