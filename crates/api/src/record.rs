// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The credential record: the single unit of persisted and injectable token state.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize};

use crate::oauth::TokenResponse;

/// Token lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 1800;

/// OAuth credentials for one client instance.
///
/// Serializes to the flat record stored in the token file. Absent fields are
/// `None`; empty strings read from storage are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// One-time authorization code. Retained after the first exchange for reference.
    #[serde(default, deserialize_with = "non_empty")]
    pub auth_code: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    pub access_token: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    pub refresh_token: Option<String>,
    /// Expiry as epoch seconds.
    #[serde(default, deserialize_with = "epoch_seconds")]
    pub token_expiry: Option<u64>,
}

impl CredentialRecord {
    /// A record holding only an authorization code, ready for the first exchange.
    pub fn with_auth_code(code: impl Into<String>) -> Self {
        Self { auth_code: Some(code.into()), ..Self::default() }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn auth_code(&self) -> Option<&str> {
        self.auth_code.as_deref().filter(|c| !c.is_empty())
    }

    /// Whether the access token outlives `now` by at least `margin`.
    pub fn is_fresh(&self, now: u64, margin: Duration) -> bool {
        match (self.access_token(), self.token_expiry) {
            (Some(_), Some(expiry)) => expiry > now.saturating_add(margin.as_secs()),
            _ => false,
        }
    }

    pub fn seconds_remaining(&self, now: u64) -> Option<u64> {
        self.token_expiry.map(|expiry| expiry.saturating_sub(now))
    }

    /// Record produced by a successful grant. A response without a refresh
    /// token keeps the current one.
    pub fn apply(&self, grant: &TokenResponse, now: u64) -> Self {
        let expires_in = grant.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        Self {
            auth_code: self.auth_code.clone(),
            access_token: Some(grant.access_token.clone()),
            refresh_token: grant
                .refresh_token
                .clone()
                .filter(|t| !t.is_empty())
                .or_else(|| self.refresh_token.clone()),
            token_expiry: Some(now.saturating_add(expires_in)),
        }
    }

    /// Same record with the access token marked expired.
    pub fn expired(&self) -> Self {
        Self { token_expiry: Some(0), ..self.clone() }
    }
}

/// Current time as epoch seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

fn non_empty<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(de)?;
    Ok(value.filter(|s| !s.is_empty()))
}

// Older token files store fractional epoch seconds.
fn epoch_seconds<'de, D: Deserializer<'de>>(de: D) -> Result<Option<u64>, D::Error> {
    let Some(number) = Option::<serde_json::Number>::deserialize(de)? else {
        return Ok(None);
    };
    if let Some(secs) = number.as_u64() {
        return Ok(Some(secs));
    }
    match number.as_f64() {
        Some(secs) if secs.is_finite() && secs > 0.0 => Ok(Some(secs as u64)),
        _ => Ok(Some(0)),
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
