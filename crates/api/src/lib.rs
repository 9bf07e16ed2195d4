// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sharesight API client core: OAuth2 token lifecycle plus a retrying
//! request executor with a typed failure taxonomy.

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod oauth;
pub mod record;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::SharesightClient;
pub use config::{ClientConfig, Environment};
pub use error::{Error, Result};
pub use executor::{Endpoint, HttpTransport, Method, RetryPolicy, Transport};
pub use lifecycle::{TokenManager, TokenState};
pub use record::CredentialRecord;
pub use store::TokenStore;
