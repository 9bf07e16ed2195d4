// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resilient request executor.
//!
//! One logical call becomes up to `max_retries + 1` physical attempts. Rate
//! limiting (429), transient server errors (500, 502, 503) and transport
//! failures are retried with exponential backoff; a 429 `Retry-After` value
//! replaces the computed delay for that attempt. Everything else is terminal.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Once};
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, ACCEPT, RETRY_AFTER};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

pub use reqwest::Method;

use crate::error::{is_retryable_status, Error, Result};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ---------------------------------------------------------------------------
// Physical requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

/// A single HTTP attempt, independent of the transport that performs it.
#[derive(Debug, Clone)]
pub struct PhysicalRequest {
    pub method: Method,
    pub url: Url,
    pub bearer: Option<String>,
    pub body: RequestBody,
}

impl PhysicalRequest {
    /// Form-encoded POST, as used by the OAuth token endpoint.
    pub fn form(url: Url, fields: Vec<(String, String)>) -> Self {
        Self { method: Method::POST, url, bearer: None, body: RequestBody::Form(fields) }
    }
}

#[derive(Debug, Clone)]
pub struct PhysicalResponse {
    pub status: u16,
    /// Parsed `Retry-After` header, if any.
    pub retry_after: Option<Duration>,
    pub body: Bytes,
}

impl PhysicalResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decoded body. Empty bodies are `None`; non-JSON text becomes a JSON string.
    pub fn json(&self) -> Option<Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        match serde_json::from_slice(&self.body) {
            Ok(value) => Some(value),
            Err(_) => Some(Value::String(String::from_utf8_lossy(&self.body).into_owned())),
        }
    }

    /// Terminal error for a non-2xx response.
    pub fn into_error(self) -> Error {
        let body = self.json();
        let message = error_message(body.as_ref(), self.status);
        if self.status == 429 {
            Error::RateLimited { message, body, retry_after: self.retry_after }
        } else {
            Error::ApiRequest { status: self.status, message, body }
        }
    }
}

/// Best human-readable message from an error body.
pub fn error_message(body: Option<&Value>, status: u16) -> String {
    let from_body = body.and_then(|b| {
        ["error_description", "message", "error"]
            .iter()
            .find_map(|key| b.get(key).and_then(Value::as_str))
            .map(str::to_owned)
            .or_else(|| {
                let first = b.get("errors")?.as_array()?.first()?;
                first
                    .as_str()
                    .or_else(|| first.get("message").and_then(Value::as_str))
                    .map(str::to_owned)
            })
            .or_else(|| b.as_str().filter(|s| !s.trim().is_empty()).map(str::to_owned))
    });
    from_body.unwrap_or_else(|| {
        reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("request failed")
            .to_owned()
    })
}

/// Parse `Retry-After` as delta seconds (fractional values allowed).
///
/// Values no `Duration` can hold are ignored like any other malformed header.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let secs: f64 = raw.parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Performs one physical attempt. Object-safe for use as `Arc<dyn Transport>`.
///
/// Implementations return `Ok` for every response the server produced,
/// whatever its status, and `Error::Transport` when no response arrived.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, request: &'a PhysicalRequest) -> BoxFuture<'a, Result<PhysicalResponse>>;
}

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times; only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// reqwest-backed transport holding the client's connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        ensure_crypto();
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Share a caller-owned client (and its pool).
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn send<'a>(&'a self, request: &'a PhysicalRequest) -> BoxFuture<'a, Result<PhysicalResponse>> {
        Box::pin(async move {
            let mut req = self
                .client
                .request(request.method.clone(), request.url.clone())
                .header(ACCEPT, "application/json");
            if let Some(ref token) = request.bearer {
                req = req.bearer_auth(token);
            }
            req = match request.body {
                RequestBody::Empty => req,
                RequestBody::Json(ref value) => req.json(value),
                RequestBody::Form(ref fields) => req.form(fields),
            };

            let resp = req.send().await.map_err(|e| Error::transport(&e))?;
            let status = resp.status().as_u16();
            let retry_after = parse_retry_after(resp.headers());
            let body = resp.bytes().await.map_err(|e| Error::transport(&e))?;
            Ok(PhysicalResponse { status, retry_after, body })
        })
    }
}

// ---------------------------------------------------------------------------
// Endpoint + retry policy
// ---------------------------------------------------------------------------

/// API version segment, path, and query parameters of one logical call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub version: String,
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl Endpoint {
    pub fn new(version: impl Into<String>, path: impl Into<String>) -> Self {
        Self { version: version.into(), path: path.into(), query: Vec::new() }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// `<base>/<version>/<path>?<query>`.
    pub fn url(&self, base: &str) -> Result<Url> {
        let raw = format!(
            "{}/{}/{}",
            base.trim_end_matches('/'),
            self.version.trim_matches('/'),
            self.path.trim_start_matches('/'),
        );
        let mut url = Url::parse(&raw).map_err(|e| Error::Transport {
            message: format!("invalid request url {raw}: {e}"),
            timeout: false,
        })?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay, doubled per attempt.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, backoff: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows `attempt` (0-based).
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(wait) => wait,
            None => self.backoff.saturating_mul(2u32.saturating_pow(attempt)),
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct Executor {
    transport: Arc<dyn Transport>,
    api_base: String,
    policy: RetryPolicy,
}

impl Executor {
    pub fn new(transport: Arc<dyn Transport>, api_base: impl Into<String>, policy: RetryPolicy) -> Self {
        Self { transport, api_base: api_base.into(), policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run one physical request under the retry policy.
    ///
    /// Returns the first 2xx response, or the taxonomy error for the last
    /// failure once it is non-retryable or the retry budget is spent.
    pub async fn send(&self, request: &PhysicalRequest) -> Result<PhysicalResponse> {
        let mut attempt: u32 = 0;
        loop {
            let (err, retry_after) = match self.transport.send(request).await {
                Ok(resp) if resp.is_success() => return Ok(resp),
                Ok(resp) if is_retryable_status(resp.status) => {
                    let retry_after = if resp.status == 429 { resp.retry_after } else { None };
                    (resp.into_error(), retry_after)
                }
                Ok(resp) => return Err(resp.into_error()),
                Err(err @ Error::Transport { .. }) => (err, None),
                Err(err) => return Err(err),
            };

            if attempt >= self.policy.max_retries {
                warn!(
                    method = %request.method,
                    path = request.url.path(),
                    attempts = attempt + 1,
                    error = %err,
                    "request failed, retries exhausted"
                );
                return Err(err);
            }

            let delay = self.policy.delay(attempt, retry_after);
            debug!(
                method = %request.method,
                path = request.url.path(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Perform one logical API call and decode its JSON body.
    ///
    /// An empty 2xx body decodes to `Value::Null`.
    pub async fn execute(
        &self,
        method: Method,
        endpoint: &Endpoint,
        body: Option<&Value>,
        token: &str,
    ) -> Result<Value> {
        let request = PhysicalRequest {
            method,
            url: endpoint.url(&self.api_base)?,
            bearer: Some(token.to_owned()),
            body: body.cloned().map(RequestBody::Json).unwrap_or(RequestBody::Empty),
        };
        let resp = self.send(&request).await?;
        debug!(
            method = %request.method,
            path = request.url.path(),
            status = resp.status,
            "request succeeded"
        );
        Ok(resp.json().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
