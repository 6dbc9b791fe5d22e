// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed wrappers over the messaging endpoints.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::client::AuthenticatedClient;
use crate::error::ApiError;
use crate::http::{encode_component, ApiRequest};

pub const MESSAGES_PATH: &str = "/api/messages/";

/// A message as returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    #[serde(deserialize_with = "flexible_id")]
    pub sender_id: String,
    #[serde(deserialize_with = "flexible_id")]
    pub receiver_id: String,
    #[serde(deserialize_with = "flexible_id")]
    pub product_id: String,
    pub content: String,
    /// Epoch milliseconds.
    pub created_at: u64,
    #[serde(default)]
    pub is_read: bool,
}

/// Body of `POST /api/messages/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub content: String,
    pub product_id: String,
    pub receiver_id: String,
}

/// One entry of `GET /api/messages/chat-users/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    #[serde(deserialize_with = "flexible_id")]
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "flexible_opt_id")]
    pub product_id: Option<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<u64>,
    #[serde(default)]
    pub unread_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
struct UnreadCount {
    #[serde(alias = "count")]
    unread_count: u64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Int(i64),
    Str(String),
}

impl From<IdRepr> for String {
    fn from(id: IdRepr) -> Self {
        match id {
            IdRepr::Int(n) => n.to_string(),
            IdRepr::Str(s) => s,
        }
    }
}

/// Accept ids serialized as either JSON numbers or strings.
fn flexible_id<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    IdRepr::deserialize(de).map(String::from)
}

fn flexible_opt_id<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<IdRepr>::deserialize(de)?.map(String::from))
}

/// Messaging endpoints over the authenticated client.
#[derive(Clone)]
pub struct MessagesApi {
    client: Arc<AuthenticatedClient>,
}

impl MessagesApi {
    pub fn new(client: Arc<AuthenticatedClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<AuthenticatedClient> {
        &self.client
    }

    pub async fn send(&self, message: &NewMessage) -> Result<WireMessage, ApiError> {
        let body = serde_json::to_value(message).map_err(ApiError::decode)?;
        self.client.request_json(ApiRequest::post_json(MESSAGES_PATH, body)).await
    }

    /// History between two users, oldest first.
    pub async fn conversation(
        &self,
        user_a: &str,
        user_b: &str,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<WireMessage>, ApiError> {
        let path = format!(
            "/api/messages/conversation/{}/{}",
            encode_component(user_a),
            encode_component(user_b)
        );
        let req = ApiRequest::get(path).with_query("skip", skip).with_query("limit", limit);
        self.client.request_json(req).await
    }

    /// Messages to or from `user_id` created after `since` (epoch ms).
    pub async fn new_messages(&self, user_id: &str, since: u64) -> Result<Vec<WireMessage>, ApiError> {
        let path = format!("/api/messages/new-messages/{}", encode_component(user_id));
        self.client.request_json(ApiRequest::get(path).with_query("since", since)).await
    }

    pub async fn mark_read(&self, message_id: &str) -> Result<(), ApiError> {
        let path = format!("/api/messages/{}/read", encode_component(message_id));
        self.client.request(ApiRequest::put(path)).await?;
        Ok(())
    }

    pub async fn unread_count(&self) -> Result<u64, ApiError> {
        let count: UnreadCount =
            self.client.request_json(ApiRequest::get("/api/messages/unread/count")).await?;
        Ok(count.unread_count)
    }

    pub async fn chat_users(&self) -> Result<Vec<ChatUser>, ApiError> {
        self.client.request_json(ApiRequest::get("/api/messages/chat-users/")).await
    }
}
