// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::executor::RetryPolicy;
use crate::oauth::ClientCredentials;

/// Redirect URI for out-of-band (copy/paste) authorization codes.
pub const DEFAULT_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Which Sharesight deployment to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Production,
    /// Sandbox used for integration testing.
    Edge,
}

impl Environment {
    pub fn token_url(&self) -> &'static str {
        match self {
            Self::Production => "https://api.sharesight.com/oauth2/token",
            Self::Edge => "https://edge-api.sharesight.com/oauth2/token",
        }
    }

    pub fn api_url_base(&self) -> &'static str {
        match self {
            Self::Production => "https://api.sharesight.com/api/",
            Self::Edge => "https://edge-api.sharesight.com/api/",
        }
    }
}

/// Configuration for one API client instance.
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct ClientConfig {
    /// OAuth client ID.
    #[arg(long, env = "SHARESIGHT_CLIENT_ID")]
    pub client_id: String,

    /// OAuth client secret.
    #[arg(long, env = "SHARESIGHT_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// One-time authorization code for the first token exchange.
    #[arg(long, env = "SHARESIGHT_AUTH_CODE", hide_env_values = true)]
    #[serde(default)]
    pub auth_code: Option<String>,

    /// Redirect URI registered with the OAuth application.
    #[arg(long, default_value = DEFAULT_REDIRECT_URI, env = "SHARESIGHT_REDIRECT_URI")]
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Deployment supplying default token and API URLs.
    #[arg(long, value_enum, default_value_t = Environment::Production, env = "SHARESIGHT_ENVIRONMENT")]
    #[serde(default)]
    pub environment: Environment,

    /// Override the OAuth token endpoint.
    #[arg(long, env = "SHARESIGHT_TOKEN_URL")]
    #[serde(default)]
    pub token_url: Option<String>,

    /// Override the API base URL.
    #[arg(long, env = "SHARESIGHT_API_URL_BASE")]
    #[serde(default)]
    pub api_url_base: Option<String>,

    /// Token file path. Defaults to `<state dir>/sharesight_token_<client_id>.json`.
    #[arg(long, env = "SHARESIGHT_TOKEN_FILE")]
    #[serde(default)]
    pub token_file: Option<PathBuf>,

    /// Keep tokens in memory only; the caller stores them via export/inject.
    #[arg(long, env = "SHARESIGHT_NO_TOKEN_FILE")]
    #[serde(default)]
    pub no_token_file: bool,

    /// Retries after the first attempt for transient failures.
    #[arg(long, default_value_t = 3, env = "SHARESIGHT_MAX_RETRIES")]
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff in seconds, doubled per retry.
    #[arg(long, default_value_t = 1.0, env = "SHARESIGHT_RETRY_BACKOFF_SECS")]
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: f64,

    /// Treat the access token as expired this many seconds early.
    #[arg(long, default_value_t = 60, env = "SHARESIGHT_EXPIRY_MARGIN_SECS")]
    #[serde(default = "default_expiry_margin_secs")]
    pub expiry_margin_secs: u64,

    /// Per-attempt HTTP timeout in seconds.
    #[arg(long, default_value_t = 30, env = "SHARESIGHT_REQUEST_TIMEOUT_SECS")]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.to_owned()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_secs() -> f64 {
    1.0
}

fn default_expiry_margin_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl ClientConfig {
    /// Production defaults for the given OAuth application.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_code: None,
            redirect_uri: default_redirect_uri(),
            environment: Environment::default(),
            token_url: None,
            api_url_base: None,
            token_file: None,
            no_token_file: false,
            max_retries: default_max_retries(),
            retry_backoff_secs: default_retry_backoff_secs(),
            expiry_margin_secs: default_expiry_margin_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.client_id.trim().is_empty() {
            anyhow::bail!("client_id must not be empty");
        }
        if self.client_id.contains(['/', '\\']) || matches!(self.client_id.as_str(), "." | "..") {
            anyhow::bail!("client_id {:?} cannot be used in a token file name", self.client_id);
        }
        if self.client_secret.trim().is_empty() {
            anyhow::bail!("client_secret must not be empty");
        }
        if self.redirect_uri.trim().is_empty() {
            anyhow::bail!("redirect_uri must not be empty");
        }
        if Duration::try_from_secs_f64(self.retry_backoff_secs).is_err() {
            anyhow::bail!("retry_backoff_secs must be a non-negative number of seconds");
        }
        url::Url::parse(self.token_url())
            .map_err(|e| anyhow::anyhow!("invalid token_url {:?}: {e}", self.token_url()))?;
        url::Url::parse(self.api_url_base())
            .map_err(|e| anyhow::anyhow!("invalid api_url_base {:?}: {e}", self.api_url_base()))?;
        Ok(())
    }

    pub fn token_url(&self) -> &str {
        self.token_url.as_deref().unwrap_or_else(|| self.environment.token_url())
    }

    pub fn api_url_base(&self) -> &str {
        self.api_url_base.as_deref().unwrap_or_else(|| self.environment.api_url_base())
    }

    /// Where the token record is persisted, or `None` for memory-only storage.
    ///
    /// The default name embeds the client ID so instances for different
    /// applications never share a record.
    pub fn token_path(&self) -> Option<PathBuf> {
        if self.no_token_file {
            return None;
        }
        Some(match self.token_file {
            Some(ref path) => path.clone(),
            None => state_dir().join(format!("sharesight_token_{}.json", self.client_id)),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: Duration::try_from_secs_f64(self.retry_backoff_secs).unwrap_or_default(),
        }
    }

    pub fn expiry_margin(&self) -> Duration {
        Duration::from_secs(self.expiry_margin_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn credentials(&self) -> ClientCredentials {
        ClientCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_uri: self.redirect_uri.clone(),
        }
    }
}

/// Resolve the state directory for token files.
///
/// Checks `SHARESIGHT_STATE_DIR`, then `$XDG_STATE_HOME/sharesight`,
/// then `$HOME/.local/state/sharesight`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SHARESIGHT_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("sharesight");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/sharesight");
    }
    PathBuf::from(".sharesight")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
