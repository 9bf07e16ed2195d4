// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth2 token endpoint wire types and grant forms.

use serde::{Deserialize, Serialize};

/// Standard OAuth2 token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Token lifetime in seconds from issuance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// OAuth error response from the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenErrorResponse {
    pub fn describe(&self) -> String {
        match &self.error_description {
            Some(desc) if !desc.is_empty() => format!("{}: {desc}", self.error),
            _ => self.error.clone(),
        }
    }
}

/// Client credentials sent with every grant.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// The two grants the client performs against the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant<'a> {
    AuthorizationCode(&'a str),
    RefreshToken(&'a str),
}

impl Grant<'_> {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode(_) => "authorization_code",
            Self::RefreshToken(_) => "refresh_token",
        }
    }

    /// `application/x-www-form-urlencoded` fields for this grant.
    pub fn form(&self, creds: &ClientCredentials) -> Vec<(String, String)> {
        let mut form = vec![("grant_type".to_owned(), self.as_str().to_owned())];
        match self {
            Self::AuthorizationCode(code) => {
                form.push(("code".to_owned(), (*code).to_owned()));
                form.push(("redirect_uri".to_owned(), creds.redirect_uri.clone()));
            }
            Self::RefreshToken(token) => {
                form.push(("refresh_token".to_owned(), (*token).to_owned()));
            }
        }
        form.push(("client_id".to_owned(), creds.client_id.clone()));
        form.push(("client_secret".to_owned(), creds.client_secret.clone()));
        form
    }
}
