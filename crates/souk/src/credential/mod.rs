// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credentials: the persisted access/refresh token pair and the single-flight
//! refresh coordinator that replaces it.

pub mod refresh;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::storage::Store;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const TOKEN_TYPE_KEY: &str = "token_type";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// An access token together with its type (`Bearer`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub token_type: String,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self { token: token.into(), token_type: token_type.into() }
    }

    /// `Authorization` header value.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.token)
    }
}

/// The persisted credential. Access token and type are present together or not at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub access: Option<AccessToken>,
    pub refresh_token: Option<String>,
}

impl Credential {
    pub fn is_signed_in(&self) -> bool {
        self.access.is_some()
    }
}

/// Token endpoint response for both login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// Convert into a credential, keeping `previous_refresh` when the server
    /// did not rotate the refresh token.
    pub fn into_credential(self, previous_refresh: Option<String>) -> Credential {
        let token_type = self
            .token_type
            .filter(|t| !t.is_empty())
            .map(|t| normalize_token_type(&t))
            .unwrap_or_else(|| "Bearer".to_owned());
        Credential {
            access: Some(AccessToken::new(self.access_token, token_type)),
            refresh_token: self.refresh_token.or(previous_refresh),
        }
    }
}

fn normalize_token_type(t: &str) -> String {
    if t.eq_ignore_ascii_case("bearer") {
        "Bearer".to_owned()
    } else {
        t.to_owned()
    }
}

/// Session lifecycle notifications for the application shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    /// A new access token replaced the expired one.
    Refreshed,
    /// Credentials were cleared; the user must log in again.
    LoggedOut { reason: String },
}

/// Durable storage for the credential under fixed keys.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn Store>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn get(&self) -> anyhow::Result<Credential> {
        let token = self.store.get(ACCESS_TOKEN_KEY)?.filter(|t| !t.is_empty());
        let token_type = self.store.get(TOKEN_TYPE_KEY)?.filter(|t| !t.is_empty());
        let refresh_token = self.store.get(REFRESH_TOKEN_KEY)?.filter(|t| !t.is_empty());
        let access = match (token, token_type) {
            (Some(token), Some(token_type)) => Some(AccessToken { token, token_type }),
            _ => None,
        };
        Ok(Credential { access, refresh_token })
    }

    pub fn set(&self, credential: &Credential) -> anyhow::Result<()> {
        match credential.access {
            Some(ref access) => {
                self.store.set(TOKEN_TYPE_KEY, &access.token_type)?;
                self.store.set(ACCESS_TOKEN_KEY, &access.token)?;
            }
            None => {
                self.store.remove(ACCESS_TOKEN_KEY)?;
                self.store.remove(TOKEN_TYPE_KEY)?;
            }
        }
        match credential.refresh_token {
            Some(ref rt) => self.store.set(REFRESH_TOKEN_KEY, rt),
            None => self.store.remove(REFRESH_TOKEN_KEY),
        }
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        self.store.remove(ACCESS_TOKEN_KEY)?;
        self.store.remove(TOKEN_TYPE_KEY)?;
        self.store.remove(REFRESH_TOKEN_KEY)
    }
}
