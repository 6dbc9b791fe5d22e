// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated request layer.
//!
//! Attaches the stored credential to every request and hides token expiry
//! from callers: a 401 is resolved through the [`RefreshCoordinator`] and the
//! request replayed exactly once. A second 401, or any 403, ends the session.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::broadcast;

use crate::credential::refresh::{RefreshCoordinator, AUTHORIZATION, REFRESH_PATH};
use crate::credential::{CredentialStore, SessionEvent, TokenResponse};
use crate::error::{ApiError, ErrorCode};
use crate::http::{ApiRequest, ApiResponse, Transport};
use crate::messages::UserProfile;

pub const LOGIN_PATH: &str = "/auth/token";
pub const PROFILE_PATH: &str = "/api/users/me";

/// Shared HTTP client that carries the session credential.
pub struct AuthenticatedClient {
    transport: Arc<dyn Transport>,
    coordinator: Arc<RefreshCoordinator>,
}

impl AuthenticatedClient {
    pub fn new(transport: Arc<dyn Transport>, credentials: CredentialStore) -> Self {
        let coordinator = RefreshCoordinator::new(credentials, Arc::clone(&transport));
        Self { transport, coordinator }
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.coordinator.subscribe()
    }

    /// Perform a request with the current credential attached.
    pub async fn request(&self, mut req: ApiRequest) -> Result<ApiResponse, ApiError> {
        match self.coordinator.current_access().await? {
            Some(access) => req.set_header(AUTHORIZATION, access.authorization()),
            None => req.remove_header(AUTHORIZATION),
        }

        let resp = self.transport.send(req.clone()).await?;
        if resp.status == 401 && !is_token_endpoint(&req.path) {
            tracing::debug!(method = req.method.as_str(), path = %req.path, "unauthorized, awaiting fresh token");
            let replay = self.coordinator.handle_unauthorized(req).await?;
            return self.classify(replay, true);
        }
        self.classify(resp, false)
    }

    /// Perform a request and decode a JSON success body.
    pub async fn request_json<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T, ApiError> {
        self.request(req).await?.json()
    }

    fn classify(&self, resp: ApiResponse, retried: bool) -> Result<ApiResponse, ApiError> {
        if resp.is_success() {
            return Ok(resp);
        }
        if (resp.status == 401 && retried) || resp.status == 403 {
            if let Err(e) = self.coordinator.sign_out("session expired") {
                tracing::warn!(err = %e, "failed to clear credentials");
            }
            return Err(ApiError::session_expired().with_status(resp.status));
        }
        Err(ApiError::from_response(resp.status, &resp.body))
    }

    /// Exchange username/password for a credential and store it.
    ///
    /// Goes straight to the transport: a rejected login never triggers a refresh.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let req =
            ApiRequest::post_form(LOGIN_PATH, &[("username", username), ("password", password)]);
        let resp = self.transport.send(req).await?;
        if !resp.is_success() {
            let mut err = ApiError::from_response(resp.status, &resp.body);
            if matches!(resp.status, 400 | 401) {
                err.code = ErrorCode::Unauthenticated;
            }
            return Err(err);
        }
        let token: TokenResponse = resp.json()?;
        self.coordinator.install(&token.into_credential(None))?;
        tracing::info!(username, "logged in");
        Ok(())
    }

    pub fn logout(&self) -> Result<(), ApiError> {
        self.coordinator.sign_out("logged out")
    }

    pub fn is_signed_in(&self) -> Result<bool, ApiError> {
        Ok(self.coordinator.credential()?.is_signed_in())
    }

    /// Profile of the signed-in user.
    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        self.request_json(ApiRequest::get(PROFILE_PATH)).await
    }
}

/// Login and refresh answer 401 for bad input, not for an expired session.
fn is_token_endpoint(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path).trim_end_matches('/');
    path == LOGIN_PATH || path == REFRESH_PATH
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
