// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use serde_json::json;

use super::*;

#[yare::parameterized(
    too_many_requests = { 429, true },
    internal = { 500, true },
    bad_gateway = { 502, true },
    unavailable = { 503, true },
    gateway_timeout = { 504, false },
    bad_request = { 400, false },
    unauthorized = { 401, false },
    forbidden = { 403, false },
    not_found = { 404, false },
    unprocessable = { 422, false },
)]
fn retryable_statuses(status: u16, expected: bool) {
    assert_eq!(is_retryable_status(status), expected);
}

#[test]
fn rate_limited_reports_429() {
    let err = Error::RateLimited {
        message: "slow down".into(),
        body: Some(json!({"error": "slow down"})),
        retry_after: Some(Duration::from_secs(5)),
    };
    assert_eq!(err.status(), Some(429));
    assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));
    assert_eq!(err.body(), Some(&json!({"error": "slow down"})));
    assert!(err.is_retryable());
    assert!(!err.requires_reauth());
    assert_eq!(err.code(), "RATE_LIMITED");
    assert_eq!(err.to_string(), "HTTP 429: slow down");
}

#[test]
fn api_request_carries_status_and_body() {
    let err = Error::ApiRequest {
        status: 404,
        message: "Not Found".into(),
        body: Some(json!({"error": "missing"})),
    };
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.body(), Some(&json!({"error": "missing"})));
    assert!(!err.is_retryable());
    assert_eq!(err.retry_after(), None);
    assert_eq!(err.to_string(), "HTTP 404: Not Found");
}

#[test]
fn authentication_requires_reauth() {
    let err = Error::authentication("refresh token revoked");
    assert!(err.requires_reauth());
    assert!(!err.is_retryable());
    assert_eq!(err.status(), None);
    assert_eq!(err.code(), "AUTHENTICATION");
    assert_eq!(err.to_string(), "authentication failed: refresh token revoked");
}

#[test]
fn transport_is_retryable_without_status() {
    let err = Error::Transport { message: "connection refused".into(), timeout: false };
    assert!(err.is_retryable());
    assert_eq!(err.status(), None);
    assert_eq!(err.body(), None);
    assert_eq!(err.code(), "TRANSPORT");
}
