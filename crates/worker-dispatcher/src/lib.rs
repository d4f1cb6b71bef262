//! Typed wrapper over the dispatcher's JSON HTTP API.

mod endpoints;

use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use worker_core::constants::HTTP_TIMEOUT;

pub use endpoints::*;

/// The three failure classes a dispatcher call can produce.
#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    /// Timeout, DNS failure, connection reset — retryable.
    #[error("transient network error: {0}")]
    Transient(String),
    /// HTTP 4xx other than the semantic-error shapes handled by a caller.
    #[error("dispatcher rejected request: http {status}: {body}")]
    Rejected { status: u16, body: String },
    /// The response body could not be parsed as JSON.
    #[error("malformed response body: {0}")]
    MalformedBody(String),
}

/// Thin HTTP client over the dispatcher's API.
#[derive(Clone)]
pub struct DispatcherClient {
    http: reqwest::Client,
    base_url: Url,
}

impl DispatcherClient {
    pub fn new(base_url: Url) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self { http, base_url })
    }

    /// For tests: a client with a caller-supplied timeout and transport.
    pub fn with_client(base_url: Url, http: reqwest::Client) -> Self {
        Self { http, base_url }
    }

    pub fn timeout(&self) -> Duration {
        HTTP_TIMEOUT
    }

    /// POSTs `payload` to `endpoint` (joined against the configured base URL)
    /// and returns the parsed JSON body.
    ///
    /// A response body containing an `"error"` key is still returned as
    /// `Ok(_)`: that is a semantic failure the caller must inspect, not a
    /// transport-level error. Only network failures and unhandled 4xx/5xx
    /// statuses become `Err`.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        payload: &T,
    ) -> Result<Value, DispatcherError> {
        let url = self
            .base_url
            .join(endpoint)
            .map_err(|err| DispatcherError::MalformedBody(err.to_string()))?;

        let res = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|err| DispatcherError::Transient(err.to_string()))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|err| DispatcherError::Transient(err.to_string()))?;

        if !status.is_success() {
            return Err(DispatcherError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|err| DispatcherError::MalformedBody(err.to_string()))
    }
}

/// Returns the `error` field of a dispatcher response, if present.
pub fn semantic_error(response: &Value) -> Option<String> {
    response
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
}
