// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::conversation::{ConversationKey, Message};
use crate::error::ApiError;
use crate::messages::ChatUser;
use crate::storage::Store;

pub const CHAT_USERS_KEY: &str = "chat_users_list";

/// Preview row of the conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub counterpart_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<u64>,
    #[serde(default)]
    pub unread_count: u64,
}

impl ConversationSummary {
    /// Summary previewing `message` for the conversation it belongs to.
    pub fn for_message(key: &ConversationKey, message: &Message) -> Self {
        Self {
            counterpart_id: key.counterpart_id.clone(),
            username: None,
            product_id: Some(message.product_id.clone()),
            last_message: Some(message.content.clone()),
            last_message_at: Some(message.created_at),
            unread_count: 0,
        }
    }
}

impl From<ChatUser> for ConversationSummary {
    fn from(user: ChatUser) -> Self {
        Self {
            counterpart_id: user.user_id,
            username: user.username,
            product_id: user.product_id,
            last_message: user.last_message,
            last_message_at: user.last_message_at,
            unread_count: user.unread_count,
        }
    }
}

/// Durable conversation timelines and the conversation list.
#[derive(Clone)]
pub struct ConversationCache {
    store: Arc<dyn Store>,
    summaries: Arc<Mutex<()>>,
}

impl ConversationCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, summaries: Arc::default() }
    }

    /// Cached timeline for `key`; empty when absent or unreadable.
    pub fn load(&self, key: &ConversationKey) -> Result<Vec<Message>, ApiError> {
        let Some(raw) = self.store.get(&key.cache_key()).map_err(ApiError::storage)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(messages) => Ok(messages),
            Err(e) => {
                tracing::warn!(conversation = %key, err = %e, "discarding unreadable cached timeline");
                Ok(Vec::new())
            }
        }
    }

    pub fn save(&self, key: &ConversationKey, messages: &[Message]) -> Result<(), ApiError> {
        let json = serde_json::to_string(messages).map_err(ApiError::storage)?;
        self.store.set(&key.cache_key(), &json).map_err(ApiError::storage)
    }

    /// Cached conversation list, most recent first.
    pub fn summaries(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        let _lock = self.summaries.lock();
        self.read_summaries()
    }

    pub fn save_summaries(&self, summaries: &[ConversationSummary]) -> Result<(), ApiError> {
        let _lock = self.summaries.lock();
        self.write_summaries(summaries)
    }

    /// Move the summary's conversation to the front, keeping its known
    /// username and product when the update leaves them empty.
    pub fn promote(&self, mut summary: ConversationSummary) -> Result<(), ApiError> {
        let _lock = self.summaries.lock();
        let mut list = self.read_summaries()?;
        if let Some(pos) = list.iter().position(|s| s.counterpart_id == summary.counterpart_id) {
            let previous = list.remove(pos);
            summary.username = summary.username.or(previous.username);
            summary.product_id = summary.product_id.or(previous.product_id);
        }
        list.insert(0, summary);
        self.write_summaries(&list)
    }

    fn read_summaries(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        let Some(raw) = self.store.get(CHAT_USERS_KEY).map_err(ApiError::storage)? else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(err = %e, "discarding unreadable conversation list");
            Vec::new()
        }))
    }

    fn write_summaries(&self, summaries: &[ConversationSummary]) -> Result<(), ApiError> {
        let json = serde_json::to_string(summaries).map_err(ApiError::storage)?;
        self.store.set(CHAT_USERS_KEY, &json).map_err(ApiError::storage)
    }
}
