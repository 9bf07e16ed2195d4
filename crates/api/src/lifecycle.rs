// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token lifecycle: decides when the access token is usable and renews it.
//!
//! The credential record moves through an explicit state machine:
//!
//! ```text
//! PendingExchange --accepted--> Valid --expire--> Expired --advance--> Refreshing
//!        |                                           |                   |    |
//!        +--rejected--> Unauthenticated <--advance---+  <--rejected------+    |
//!                                                     Valid <--accepted-------+
//! ```
//!
//! [`TokenManager::validate`] runs the machine to completion while holding the
//! store lock, so overlapping callers share a single exchange instead of each
//! spending (and possibly rotating away) the refresh token.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::executor::{Executor, PhysicalRequest};
use crate::oauth::{ClientCredentials, Grant, TokenErrorResponse, TokenResponse};
use crate::record::{epoch_secs, CredentialRecord};
use crate::store::TokenStore;

/// Where the credential record stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    /// No usable token and nothing to renew it with.
    Unauthenticated,
    /// An authorization code is waiting to be exchanged.
    PendingExchange,
    Valid,
    Expired,
    /// A refresh-token exchange is in progress.
    Refreshing,
}

/// Inputs that move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenEvent {
    /// Take the automatic transition out of the current state.
    Advance,
    /// The access token passed its expiry (or the server rejected it).
    Expire,
    GrantAccepted,
    GrantRejected,
}

impl TokenState {
    /// Entry state for a record at time `now` (epoch seconds).
    pub fn classify(record: &CredentialRecord, now: u64, margin: Duration) -> Self {
        match record.access_token() {
            Some(_) if record.is_fresh(now, margin) => Self::Valid,
            Some(_) => Self::Expired,
            None if record.refresh_token().is_some() => Self::Expired,
            None if record.auth_code().is_some() => Self::PendingExchange,
            None => Self::Unauthenticated,
        }
    }

    pub fn next(self, record: &CredentialRecord, event: TokenEvent) -> Self {
        match (self, event) {
            (Self::Valid, TokenEvent::Expire) => Self::Expired,
            (Self::Expired, TokenEvent::Advance) => {
                if record.refresh_token().is_some() {
                    Self::Refreshing
                } else {
                    Self::Unauthenticated
                }
            }
            (Self::PendingExchange | Self::Refreshing, TokenEvent::GrantAccepted) => Self::Valid,
            (Self::PendingExchange | Self::Refreshing, TokenEvent::GrantRejected) => {
                Self::Unauthenticated
            }
            (state, _) => state,
        }
    }
}

/// The token endpoint refused a grant.
#[derive(Debug, Clone)]
struct Rejection {
    status: u16,
    description: String,
    /// `invalid_grant`: the code or refresh token is spent and must be dropped.
    revoked: bool,
}

enum ExchangeError {
    Rejected(Rejection),
    Failed(Error),
}

/// Owns the credential record and keeps a valid access token available.
pub struct TokenManager {
    store: Mutex<TokenStore>,
    snapshot: watch::Sender<CredentialRecord>,
    credentials: ClientCredentials,
    token_url: Url,
    margin: Duration,
    executor: Arc<Executor>,
}

impl TokenManager {
    pub fn new(
        store: TokenStore,
        credentials: ClientCredentials,
        token_url: Url,
        margin: Duration,
        executor: Arc<Executor>,
    ) -> Self {
        let (snapshot, _) = watch::channel(store.export());
        Self { store: Mutex::new(store), snapshot, credentials, token_url, margin, executor }
    }

    /// Load persisted credentials, falling back to `auth_code` for a first exchange.
    ///
    /// A configured code only replaces the stored one when the stored record
    /// has nothing left to renew with.
    pub async fn load(&self, auth_code: Option<&str>) -> anyhow::Result<()> {
        let mut store = self.store.lock().await;
        let found = store.load().await?;
        let code = auth_code.filter(|c| !c.is_empty());
        if let Some(code) = code {
            let record = store.record();
            let renewable = record.access_token().is_some() || record.refresh_token().is_some();
            if !renewable || record.auth_code().is_none() {
                let mut record = record.clone();
                record.auth_code = Some(code.to_owned());
                store.set(record);
            }
        }
        info!(persisted = found, state = ?self.classify(store.record()), "credentials loaded");
        self.publish(&store);
        Ok(())
    }

    pub fn classify(&self, record: &CredentialRecord) -> TokenState {
        TokenState::classify(record, epoch_secs(), self.margin)
    }

    /// Current state without running any exchange.
    pub fn state(&self) -> TokenState {
        self.classify(&self.snapshot.borrow())
    }

    /// Last known access token, read without waiting on an in-flight renewal.
    pub fn current_token(&self) -> Option<String> {
        self.snapshot.borrow().access_token().map(str::to_owned)
    }

    /// Current record in transportable form.
    pub fn export(&self) -> CredentialRecord {
        self.snapshot.borrow().clone()
    }

    /// Watch the record; a new value is published after every change.
    pub fn subscribe(&self) -> watch::Receiver<CredentialRecord> {
        self.snapshot.subscribe()
    }

    /// Return a valid access token, exchanging or refreshing as needed.
    pub async fn validate(&self) -> Result<String> {
        let mut store = self.store.lock().await;
        let mut state = self.classify(store.record());
        if state != TokenState::Valid {
            // Spend only the newest grant: an earlier cancelled call may have
            // persisted tokens this instance never adopted.
            match store.reload().await {
                Ok(true) => {
                    self.publish(&store);
                    state = self.classify(store.record());
                }
                Ok(false) => {}
                Err(e) => warn!("failed to re-read persisted credentials: {e:#}"),
            }
        }
        let mut reason = String::from("no credentials available");

        loop {
            debug!(state = ?state, "token state");
            state = match state {
                TokenState::Valid => {
                    return store
                        .record()
                        .access_token()
                        .map(str::to_owned)
                        .ok_or_else(|| Error::authentication(reason));
                }
                TokenState::Unauthenticated => {
                    warn!(reason = %reason, "no usable credentials");
                    return Err(Error::authentication(reason));
                }
                TokenState::Expired => {
                    let next = state.next(store.record(), TokenEvent::Advance);
                    if next == TokenState::Unauthenticated {
                        reason = "access token expired and no refresh token is available".into();
                    }
                    next
                }
                TokenState::PendingExchange => {
                    let code = store.record().auth_code.clone().unwrap_or_default();
                    info!("exchanging authorization code");
                    match self.exchange(Grant::AuthorizationCode(&code)).await {
                        Ok(grant) => {
                            let record = store.record().apply(&grant, epoch_secs());
                            self.commit(&mut store, record).await;
                            state.next(store.record(), TokenEvent::GrantAccepted)
                        }
                        Err(ExchangeError::Rejected(rejection)) => {
                            reason = format!("authorization code rejected: {}", rejection.description);
                            warn!(status = rejection.status, reason = %reason, "token exchange rejected");
                            if rejection.revoked {
                                let record =
                                    CredentialRecord { auth_code: None, ..store.record().clone() };
                                self.commit(&mut store, record).await;
                            }
                            state.next(store.record(), TokenEvent::GrantRejected)
                        }
                        Err(ExchangeError::Failed(e)) => return Err(e),
                    }
                }
                TokenState::Refreshing => {
                    let refresh = store.record().refresh_token.clone().unwrap_or_default();
                    info!("refreshing access token");
                    match self.exchange(Grant::RefreshToken(&refresh)).await {
                        Ok(grant) => {
                            let record = store.record().apply(&grant, epoch_secs());
                            self.commit(&mut store, record).await;
                            state.next(store.record(), TokenEvent::GrantAccepted)
                        }
                        Err(ExchangeError::Rejected(rejection)) => {
                            let what = if rejection.revoked {
                                "refresh token revoked"
                            } else {
                                "refresh rejected"
                            };
                            reason = format!("{what}: {}", rejection.description);
                            warn!(status = rejection.status, reason = %reason, "token refresh rejected");
                            if rejection.revoked {
                                self.commit(&mut store, CredentialRecord::default()).await;
                            }
                            state.next(store.record(), TokenEvent::GrantRejected)
                        }
                        Err(ExchangeError::Failed(e)) => return Err(e),
                    }
                }
            };
        }
    }

    /// Mark `stale` as expired so the next [`validate`](Self::validate) renews it.
    ///
    /// No-op when the live token already differs (another caller renewed it).
    pub async fn invalidate(&self, stale: &str) {
        let mut store = self.store.lock().await;
        if store.record().access_token() != Some(stale) {
            return;
        }
        let next = self.classify(store.record()).next(store.record(), TokenEvent::Expire);
        debug!(state = ?next, "access token invalidated");
        let record = store.record().expired();
        self.commit(&mut store, record).await;
    }

    /// Supply a fresh authorization code. The current token pair is dropped
    /// so the next validation exchanges the code.
    pub async fn set_auth_code(&self, code: &str) {
        let mut store = self.store.lock().await;
        self.commit(&mut store, CredentialRecord::with_auth_code(code)).await;
    }

    /// Replace the record verbatim (caller-managed storage).
    pub async fn inject(&self, record: CredentialRecord) -> anyhow::Result<()> {
        let mut store = self.store.lock().await;
        let result = store.inject(record).await;
        self.publish(&store);
        result
    }

    /// Forget all credentials, on disk and in memory.
    pub async fn delete(&self) -> anyhow::Result<()> {
        let mut store = self.store.lock().await;
        let result = store.clear().await;
        self.publish(&store);
        info!("credentials deleted");
        result
    }

    /// Persist and publish a new record. A failed write still keeps the new
    /// tokens live: the server may already have rotated the old refresh token.
    async fn commit(&self, store: &mut TokenStore, record: CredentialRecord) {
        if let Err(e) = store.save(record.clone()).await {
            warn!("failed to persist credentials: {e:#}");
            store.set(record);
        }
        self.publish(store);
    }

    fn publish(&self, store: &TokenStore) {
        self.snapshot.send_replace(store.export());
    }

    async fn exchange(&self, grant: Grant<'_>) -> std::result::Result<TokenResponse, ExchangeError> {
        let request = PhysicalRequest::form(self.token_url.clone(), grant.form(&self.credentials));
        match self.executor.send(&request).await {
            Ok(resp) => serde_json::from_slice::<TokenResponse>(&resp.body).map_err(|e| {
                ExchangeError::Failed(Error::authentication(format!(
                    "malformed token response: {e}"
                )))
            }),
            // Retrying an invalid code, token, or secret cannot succeed.
            Err(Error::ApiRequest { status, message, body }) if (400..500).contains(&status) => {
                let parsed = body
                    .and_then(|b| serde_json::from_value::<TokenErrorResponse>(b).ok());
                let rejection = match parsed {
                    Some(err) => Rejection {
                        status,
                        description: err.describe(),
                        revoked: err.error == "invalid_grant",
                    },
                    None => Rejection { status, description: message, revoked: false },
                };
                Err(ExchangeError::Rejected(rejection))
            }
            Err(e) => Err(ExchangeError::Failed(e)),
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
