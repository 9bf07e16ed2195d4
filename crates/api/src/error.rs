// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failure taxonomy shared by the token lifecycle and the request executor.

use std::time::Duration;

use serde_json::Value;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the client surfaces. Each variant carries the structured
/// fields a caller needs to decide between re-authenticating, backing off,
/// or giving up.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Token acquisition or refresh failed. A human has to supply a new
    /// authorization code unless a valid refresh token is restored.
    #[error("authentication failed: {reason}")]
    Authentication { reason: String },

    /// Non-2xx response that was either non-retryable or outlived the retry budget.
    #[error("HTTP {status}: {message}")]
    ApiRequest { status: u16, message: String, body: Option<Value> },

    /// HTTP 429 after the retry budget was spent.
    #[error("HTTP 429: {message}")]
    RateLimited { message: String, body: Option<Value>, retry_after: Option<Duration> },

    /// The server could not be reached (connect refused, DNS, timeout, broken body).
    #[error("transport failure: {message}")]
    Transport { message: String, timeout: bool },
}

impl Error {
    pub fn authentication(reason: impl Into<String>) -> Self {
        Self::Authentication { reason: reason.into() }
    }

    pub fn transport(err: &reqwest::Error) -> Self {
        Self::Transport { message: err.to_string(), timeout: err.is_timeout() }
    }

    /// HTTP status associated with the failure, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiRequest { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::Authentication { .. } | Self::Transport { .. } => None,
        }
    }

    /// Decoded response body, when one was returned.
    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::ApiRequest { body, .. } | Self::RateLimited { body, .. } => body.as_ref(),
            Self::Authentication { .. } | Self::Transport { .. } => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether repeating the same logical call later can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Transport { .. } => true,
            Self::ApiRequest { status, .. } => is_retryable_status(*status),
            Self::Authentication { .. } => false,
        }
    }

    /// Whether the caller must obtain new credentials before retrying.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "AUTHENTICATION",
            Self::ApiRequest { .. } => "API_REQUEST",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Transport { .. } => "TRANSPORT",
        }
    }
}

/// Statuses the executor retries: rate limiting and transient server failures.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503)
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
