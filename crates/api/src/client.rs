// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client facade pairing the token lifecycle with the request executor.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::info;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::executor::{Endpoint, Executor, HttpTransport, Method, Transport};
use crate::lifecycle::{TokenManager, TokenState};
use crate::record::CredentialRecord;
use crate::store::TokenStore;

/// Authenticated access to the Sharesight REST API.
///
/// Owns one HTTP session for its lifetime; [`SharesightClient::close`]
/// releases it.
pub struct SharesightClient {
    tokens: TokenManager,
    executor: Arc<Executor>,
    owns_session: bool,
}

impl SharesightClient {
    /// Build a client with its own HTTP session and load persisted tokens.
    pub async fn connect(config: ClientConfig) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(config.request_timeout())?;
        Self::build(config, Arc::new(transport), true).await
    }

    /// Build a client on a caller-owned `reqwest::Client`.
    pub async fn with_http_client(
        config: ClientConfig,
        client: reqwest::Client,
    ) -> anyhow::Result<Self> {
        Self::build(config, Arc::new(HttpTransport::from_client(client)), false).await
    }

    /// Build a client on any transport.
    pub async fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> anyhow::Result<Self> {
        Self::build(config, transport, false).await
    }

    async fn build(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        owns_session: bool,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let executor =
            Arc::new(Executor::new(transport, config.api_url_base(), config.retry_policy()));
        let tokens = TokenManager::new(
            TokenStore::new(config.token_path()),
            config.credentials(),
            Url::parse(config.token_url())?,
            config.expiry_margin(),
            Arc::clone(&executor),
        );
        tokens.load(config.auth_code.as_deref()).await?;
        Ok(Self { tokens, executor, owns_session })
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn state(&self) -> TokenState {
        self.tokens.state()
    }

    /// Return a valid access token, renewing it first if needed.
    pub async fn validate(&self) -> Result<String> {
        self.tokens.validate().await
    }

    pub fn export(&self) -> CredentialRecord {
        self.tokens.export()
    }

    pub async fn inject(&self, record: CredentialRecord) -> anyhow::Result<()> {
        self.tokens.inject(record).await
    }

    pub async fn set_auth_code(&self, code: &str) {
        self.tokens.set_auth_code(code).await
    }

    pub async fn delete_token(&self) -> anyhow::Result<()> {
        self.tokens.delete().await
    }

    /// Watch the credential record, e.g. to mirror it into external storage.
    pub fn subscribe(&self) -> watch::Receiver<CredentialRecord> {
        self.tokens.subscribe()
    }

    /// Perform one logical call with a validated token.
    ///
    /// A 401 invalidates the token and retries the call once after renewal.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &Endpoint,
        body: Option<&Value>,
    ) -> Result<Value> {
        let token = self.tokens.validate().await?;
        match self.executor.execute(method.clone(), endpoint, body, &token).await {
            Err(Error::ApiRequest { status: 401, .. }) => {
                info!(path = %endpoint.path, "access token rejected, renewing");
                self.tokens.invalidate(&token).await;
                let token = self.tokens.validate().await?;
                self.executor.execute(method, endpoint, body, &token).await
            }
            other => other,
        }
    }

    /// Perform one logical call with an explicit token, skipping validation.
    pub async fn request_with_token(
        &self,
        method: Method,
        endpoint: &Endpoint,
        body: Option<&Value>,
        token: &str,
    ) -> Result<Value> {
        self.executor.execute(method, endpoint, body, token).await
    }

    pub async fn get(&self, endpoint: &Endpoint) -> Result<Value> {
        self.request(Method::GET, endpoint, None).await
    }

    pub async fn post(&self, endpoint: &Endpoint, body: &Value) -> Result<Value> {
        self.request(Method::POST, endpoint, Some(body)).await
    }

    pub async fn put(&self, endpoint: &Endpoint, body: &Value) -> Result<Value> {
        self.request(Method::PUT, endpoint, Some(body)).await
    }

    pub async fn patch(&self, endpoint: &Endpoint, body: &Value) -> Result<Value> {
        self.request(Method::PATCH, endpoint, Some(body)).await
    }

    pub async fn delete(&self, endpoint: &Endpoint) -> Result<Value> {
        self.request(Method::DELETE, endpoint, None).await
    }

    /// Consume the client. Dropping it releases an owned HTTP session; a
    /// caller-supplied session stays open. This only adds a log line.
    pub fn close(self) {
        if self.owns_session {
            info!("closing Sharesight connection");
        }
    }
}
