// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted transport for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::executor::{BoxFuture, PhysicalRequest, PhysicalResponse, Transport};

/// Replays canned outcomes in order, repeating the last one once the script
/// runs out. Records every request and the (tokio) instant it arrived.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<PhysicalResponse>>>,
    last: Mutex<Option<Result<PhysicalResponse>>>,
    seen: Mutex<Vec<(tokio::time::Instant, PhysicalRequest)>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<PhysicalResponse>>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(script.into()), ..Self::default() })
    }

    pub fn requests(&self) -> Vec<PhysicalRequest> {
        lock(&self.seen).iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn calls(&self) -> usize {
        lock(&self.seen).len()
    }

    /// Gaps between consecutive attempts.
    pub fn gaps(&self) -> Vec<Duration> {
        let seen = lock(&self.seen);
        seen.windows(2).map(|w| w[1].0.duration_since(w[0].0)).collect()
    }
}

impl Transport for ScriptedTransport {
    fn send<'a>(&'a self, request: &'a PhysicalRequest) -> BoxFuture<'a, Result<PhysicalResponse>> {
        lock(&self.seen).push((tokio::time::Instant::now(), request.clone()));
        let next = lock(&self.script).pop_front();
        let outcome = match next {
            Some(outcome) => {
                *lock(&self.last) = Some(outcome.clone());
                outcome
            }
            None => lock(&self.last).clone().unwrap_or_else(|| Ok(respond(200, ""))),
        };
        Box::pin(async move { outcome })
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

pub fn respond(status: u16, body: &str) -> PhysicalResponse {
    PhysicalResponse { status, retry_after: None, body: Bytes::from(body.to_owned()) }
}

pub fn respond_json(status: u16, body: serde_json::Value) -> PhysicalResponse {
    respond(status, &body.to_string())
}

pub fn rate_limited(retry_after: Option<Duration>) -> PhysicalResponse {
    PhysicalResponse { retry_after, ..respond(429, r#"{"error":"rate limited"}"#) }
}

pub fn unreachable() -> Result<PhysicalResponse> {
    Err(Error::Transport { message: "connection refused".into(), timeout: false })
}

pub fn token_body(access: &str, refresh: Option<&str>, expires_in: u64) -> PhysicalResponse {
    let mut body = serde_json::json!({
        "access_token": access,
        "token_type": "Bearer",
        "expires_in": expires_in,
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = serde_json::Value::from(refresh);
    }
    respond_json(200, body)
}
