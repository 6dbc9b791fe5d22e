// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory stand-in for the marketplace backend: token auth with single-use
//! refresh tokens and the messaging endpoints.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::MockConfig;
use crate::state::MockState;

/// Build the axum `Router` with all mock routes.
pub fn build_router(state: Arc<MockState>) -> Router {
    Router::new()
        // Auth (no bearer)
        .route("/auth/token", post(http::login))
        .route("/auth/token/refresh", post(http::refresh))
        .route("/api/users/me", get(http::me))
        // Messaging
        .route("/api/messages/", post(http::send_message))
        .route("/api/messages/conversation/{user_a}/{user_b}", get(http::conversation))
        .route("/api/messages/new-messages/{user_id}", get(http::new_messages))
        .route("/api/messages/{id}/read", put(http::mark_read))
        .route("/api/messages/unread/count", get(http::unread_count))
        .route("/api/messages/chat-users/", get(http::chat_users))
        .with_state(state)
}

/// State seeded with the configured accounts.
pub fn seeded_state(config: &MockConfig) -> Arc<MockState> {
    let state = MockState::new();
    for (username, password) in config.seed_users() {
        let id = state.add_user(username, password);
        tracing::info!(id, username, "seeded user");
    }
    state.set_refresh_delay(config.refresh_delay());
    Arc::new(state)
}

/// A server running on an ephemeral local port. Stops when dropped.
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown: CancellationToken,
}

impl MockServer {
    /// Bind `127.0.0.1:0` and serve `state` in the background.
    pub async fn start(state: Arc<MockState>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let router = build_router(Arc::clone(&state));
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let result =
                axum::serve(listener, router).with_graceful_shutdown(sd.cancelled_owned()).await;
            if let Err(e) = result {
                tracing::error!("mock server error: {e}");
            }
        });
        Ok(Self { addr, state, shutdown })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn state(&self) -> &Arc<MockState> {
        &self.state
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Run the mock server until Ctrl-C.
pub async fn run(config: MockConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = seeded_state(&config);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("souk-mock listening on {addr}");

    let shutdown = CancellationToken::new();
    {
        let sd = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                sd.cancel();
            }
        });
    }
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
