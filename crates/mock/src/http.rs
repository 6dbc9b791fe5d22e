// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers of the mock marketplace API.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::authenticate;
use crate::error::{Failure, MockError};
use crate::state::{ChatUserRow, MockState, StoredMessage, TokenPair};

const MAX_PAGE: usize = 100;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Ids arrive as JSON numbers or numeric strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IdField {
    Int(u64),
    Str(String),
}

impl IdField {
    fn parse(&self) -> Option<u64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Str(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub content: String,
    pub product_id: IdField,
    pub receiver_id: IdField,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    MAX_PAGE
}

#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    #[serde(default)]
    pub since: u64,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: u64,
    pub username: String,
}

// -- Handlers -----------------------------------------------------------------

/// `POST /auth/token`: password login (form encoded).
pub async fn login(
    State(s): State<Arc<MockState>>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenPair>, Failure> {
    let id = s
        .check_password(&form.username, &form.password)
        .ok_or_else(|| MockError::Unauthorized.detail("Incorrect username or password"))?;
    tracing::info!(username = %form.username, "login");
    Ok(Json(s.issue_tokens(id)))
}

/// `POST /auth/token/refresh`: trade a refresh token for a new pair.
pub async fn refresh(
    State(s): State<Arc<MockState>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, Failure> {
    s.record_refresh_call();
    let delay = s.refresh_delay();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    if s.fail_refresh() {
        return Err(MockError::Unauthorized.detail("Invalid refresh token"));
    }
    let pair = s
        .rotate(&req.refresh_token)
        .ok_or_else(|| MockError::Unauthorized.detail("Invalid refresh token"))?;
    tracing::debug!(calls = s.refresh_calls(), "token refreshed");
    Ok(Json(pair))
}

/// `GET /api/users/me`
pub async fn me(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
) -> Result<Json<ProfileResponse>, Failure> {
    let id = authenticate(&s, &headers)?;
    let user = s.user(id).ok_or_else(|| MockError::NotFound.detail("User not found"))?;
    Ok(Json(ProfileResponse { id: user.id, username: user.username }))
}

/// `POST /api/messages/`
pub async fn send_message(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(req): Json<SendRequest>,
) -> Result<(StatusCode, Json<StoredMessage>), Failure> {
    let sender = authenticate(&s, &headers)?;
    let content = req.content.trim();
    if content.is_empty() {
        return Err(Failure::field("content", "Message content cannot be empty"));
    }
    let receiver = req
        .receiver_id
        .parse()
        .ok_or_else(|| Failure::field("receiver_id", "value is not a valid integer"))?;
    let product = req
        .product_id
        .parse()
        .ok_or_else(|| Failure::field("product_id", "value is not a valid integer"))?;
    if s.user(receiver).is_none() {
        return Err(MockError::NotFound.detail("Receiver not found"));
    }
    let msg = s.insert_message(sender, receiver, product, content);
    Ok((StatusCode::CREATED, Json(msg)))
}

/// `GET /api/messages/conversation/{user_a}/{user_b}?skip&limit`
pub async fn conversation(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
    Path((a, b)): Path<(u64, u64)>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<StoredMessage>>, Failure> {
    let user = authenticate(&s, &headers)?;
    if user != a && user != b {
        return Err(MockError::Forbidden.detail("Not authorized to view this conversation"));
    }
    Ok(Json(s.conversation(a, b, page.skip, page.limit.min(MAX_PAGE))))
}

/// `GET /api/messages/new-messages/{user_id}?since`
pub async fn new_messages(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(user_id): Path<u64>,
    Query(q): Query<SinceQuery>,
) -> Result<Json<Vec<StoredMessage>>, Failure> {
    let user = authenticate(&s, &headers)?;
    if user != user_id {
        return Err(MockError::Forbidden.detail("Not authorized to read these messages"));
    }
    Ok(Json(s.messages_since(user_id, q.since)))
}

/// `PUT /api/messages/{id}/read`
pub async fn mark_read(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<StoredMessage>, Failure> {
    let user = authenticate(&s, &headers)?;
    s.mark_read(id, user).map(Json).ok_or_else(|| MockError::NotFound.detail("Message not found"))
}

/// `GET /api/messages/unread/count`
pub async fn unread_count(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    let user = authenticate(&s, &headers)?;
    Ok(Json(json!({ "unread_count": s.unread_count(user) })))
}

/// `GET /api/messages/chat-users/`
pub async fn chat_users(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ChatUserRow>>, Failure> {
    let user = authenticate(&s, &headers)?;
    Ok(Json(s.chat_users(user)))
}
