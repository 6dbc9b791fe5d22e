// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight access token refresh.
//!
//! At most one call to the refresh endpoint is outstanding at a time. Every
//! request that observes "unauthorized" while a refresh is pending is queued
//! behind it and replayed (or rejected) once it settles. Requests that start
//! while a refresh is pending wait for the new token instead of reading the
//! stale one.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};

use crate::credential::{AccessToken, Credential, CredentialStore, SessionEvent, TokenResponse};
use crate::error::{ApiError, ErrorCode};
use crate::http::{ApiRequest, ApiResponse, Transport};

pub const REFRESH_PATH: &str = "/auth/token/refresh";
pub const AUTHORIZATION: &str = "Authorization";

type Settlement = Result<AccessToken, ApiError>;

/// A request suspended until the in-flight refresh settles.
struct PendingRequest {
    id: u64,
    tx: oneshot::Sender<Settlement>,
}

#[derive(Default)]
struct Gate {
    refreshing: bool,
    queue: Vec<PendingRequest>,
    next_id: u64,
}

impl Gate {
    fn enqueue(&mut self) -> oneshot::Receiver<Settlement> {
        let (tx, rx) = oneshot::channel();
        self.next_id += 1;
        self.queue.push(PendingRequest { id: self.next_id, tx });
        rx
    }
}

/// Owns the refresh gate and every write to the stored credential.
pub struct RefreshCoordinator {
    gate: Mutex<Gate>,
    credentials: CredentialStore,
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<SessionEvent>,
}

impl RefreshCoordinator {
    pub fn new(credentials: CredentialStore, transport: Arc<dyn Transport>) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self { gate: Mutex::new(Gate::default()), credentials, transport, events })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn is_refreshing(&self) -> bool {
        self.gate.lock().refreshing
    }

    /// Number of requests waiting on the in-flight refresh.
    pub fn queued(&self) -> usize {
        self.gate.lock().queue.len()
    }

    /// Snapshot of the stored credential, read under the gate.
    pub fn credential(&self) -> Result<Credential, ApiError> {
        let _gate = self.gate.lock();
        self.credentials.get().map_err(ApiError::storage)
    }

    /// Access token to attach to an outgoing request.
    ///
    /// Waits for the pending refresh when one is in flight.
    pub async fn current_access(&self) -> Result<Option<AccessToken>, ApiError> {
        let rx = {
            let mut gate = self.gate.lock();
            if !gate.refreshing {
                return Ok(self.credentials.get().map_err(ApiError::storage)?.access);
            }
            gate.enqueue()
        };
        settle(rx).await.map(Some)
    }

    /// Resolve a request that was rejected as unauthorized: obtain a fresh
    /// token (starting a refresh or joining the one in flight) and replay it.
    ///
    /// The returned response is the replay's raw response; callers classify it.
    pub async fn handle_unauthorized(
        self: &Arc<Self>,
        mut failed: ApiRequest,
    ) -> Result<ApiResponse, ApiError> {
        let stale = failed
            .header(AUTHORIZATION)
            .and_then(|h| h.split_once(' '))
            .map(|(_, token)| token.to_owned());
        let access = self.fresh_access(stale.as_deref()).await?;
        failed.set_header(AUTHORIZATION, access.authorization());
        self.transport.send(failed).await
    }

    async fn fresh_access(self: &Arc<Self>, stale: Option<&str>) -> Settlement {
        let rx = {
            let mut gate = self.gate.lock();
            if gate.refreshing {
                gate.enqueue()
            } else {
                let current = self.credentials.get().map_err(ApiError::storage)?;
                // The stored token already differs from the one that was rejected:
                // a refresh (or login) completed after this request was sent.
                if let Some(access) = current.access {
                    if stale != Some(access.token.as_str()) {
                        return Ok(access);
                    }
                }
                gate.refreshing = true;
                let rx = gate.enqueue();
                let coordinator = Arc::clone(self);
                tokio::spawn(async move {
                    coordinator.run_refresh(current.refresh_token).await;
                });
                rx
            }
        };
        settle(rx).await
    }

    /// Perform the refresh and settle every queued request.
    async fn run_refresh(&self, refresh_token: Option<String>) {
        let outcome = match refresh_token {
            Some(ref rt) => self.request_refresh(rt).await,
            None => Err(ApiError::new(ErrorCode::SessionExpired, "no refresh token stored")),
        };

        let (settlement, waiters) = {
            let mut gate = self.gate.lock();
            // A rotated token that cannot be stored is as lost as a rejected one.
            let stored = outcome.and_then(|credential| {
                self.credentials.set(&credential).map_err(ApiError::storage)?;
                credential.access.ok_or_else(|| ApiError::decode("refresh returned no access token"))
            });
            let settlement = stored.map_err(|e| {
                tracing::warn!(err = %e, "token refresh failed, signing out");
                if let Err(ce) = self.credentials.clear() {
                    tracing::warn!(err = %ce, "failed to clear credentials");
                }
                ApiError::session_expired()
            });
            gate.refreshing = false;
            (settlement, std::mem::take(&mut gate.queue))
        };

        match settlement {
            Ok(_) => {
                tracing::info!(waiters = waiters.len(), "access token refreshed");
                let _ = self.events.send(SessionEvent::Refreshed);
            }
            Err(ref e) => {
                let _ = self.events.send(SessionEvent::LoggedOut { reason: e.message.clone() });
            }
        }

        for waiter in waiters {
            if waiter.tx.send(settlement.clone()).is_err() {
                tracing::debug!(id = waiter.id, "refresh waiter dropped before settlement");
            }
        }
    }

    /// Call the refresh endpoint directly on the transport (never through the
    /// authenticated path, so a 401 here cannot recurse into another refresh).
    async fn request_refresh(&self, refresh_token: &str) -> Result<Credential, ApiError> {
        let req = ApiRequest::post_json(
            REFRESH_PATH,
            serde_json::json!({ "refresh_token": refresh_token }),
        );
        let resp = self.transport.send(req).await?;
        if !resp.is_success() {
            return Err(ApiError::from_response(resp.status, &resp.body));
        }
        let token: TokenResponse = resp.json()?;
        Ok(token.into_credential(Some(refresh_token.to_owned())))
    }

    /// Store a credential obtained from the login flow.
    pub fn install(&self, credential: &Credential) -> Result<(), ApiError> {
        {
            let _gate = self.gate.lock();
            self.credentials.set(credential).map_err(ApiError::storage)?;
        }
        let _ = self.events.send(SessionEvent::LoggedIn);
        Ok(())
    }

    /// Clear the stored credential (logout or unrecoverable auth failure).
    pub fn sign_out(&self, reason: &str) -> Result<(), ApiError> {
        {
            let _gate = self.gate.lock();
            self.credentials.clear().map_err(ApiError::storage)?;
        }
        tracing::info!(reason, "signed out");
        let _ = self.events.send(SessionEvent::LoggedOut { reason: reason.to_owned() });
        Ok(())
    }
}

async fn settle(rx: oneshot::Receiver<Settlement>) -> Settlement {
    rx.await.unwrap_or_else(|_| Err(ApiError::network("token refresh was interrupted")))
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
