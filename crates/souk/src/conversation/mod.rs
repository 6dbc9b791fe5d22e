// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-conversation sync: cached timeline, polling, and optimistic sends.

pub mod cache;
pub mod engine;
pub mod timeline;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{ApiError, ErrorCode};
use crate::messages::{MessagesApi, WireMessage};

pub use cache::{ConversationCache, ConversationSummary, CHAT_USERS_KEY};
pub use engine::{ConversationSyncEngine, PendingSend, PollOutcome, TimelineEvent};
pub use timeline::ConversationTimeline;

/// The participant pair a conversation is keyed by, seen from `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub user_id: String,
    pub counterpart_id: String,
}

impl ConversationKey {
    pub fn new(user_id: impl Into<String>, counterpart_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), counterpart_id: counterpart_id.into() }
    }

    /// Storage key of the cached timeline.
    pub fn cache_key(&self) -> String {
        format!("chat_messages_{}", self.counterpart_id)
    }

    /// Whether a server message belongs to this pair, in either direction.
    pub fn includes(&self, msg: &WireMessage) -> bool {
        (msg.sender_id == self.user_id && msg.receiver_id == self.counterpart_id)
            || (msg.sender_id == self.counterpart_id && msg.receiver_id == self.user_id)
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.counterpart_id)
    }
}

/// One chat message in a local timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_key: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub product_id: String,
    pub content: String,
    /// Epoch milliseconds.
    pub created_at: u64,
    #[serde(default)]
    pub is_provisional: bool,
}

impl Message {
    pub fn from_wire(wire: WireMessage, key: &ConversationKey) -> Self {
        Self {
            id: wire.id,
            conversation_key: key.to_string(),
            sender_id: wire.sender_id,
            receiver_id: wire.receiver_id,
            product_id: wire.product_id,
            content: wire.content,
            created_at: wire.created_at,
            is_provisional: false,
        }
    }
}

/// Timing knobs for sync engines.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub poll_interval: Duration,
    pub history_page_size: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(3), history_page_size: 50 }
    }
}

impl From<&ClientConfig> for SyncOptions {
    fn from(config: &ClientConfig) -> Self {
        Self { poll_interval: config.poll_interval(), history_page_size: config.history_page_size }
    }
}

type OpenRegistry = Arc<Mutex<HashMap<ConversationKey, (u64, CancellationToken)>>>;

/// Opens conversations and guarantees at most one engine per key.
pub struct ConversationHub {
    api: MessagesApi,
    cache: ConversationCache,
    options: SyncOptions,
    open: OpenRegistry,
    generation: AtomicU64,
}

impl ConversationHub {
    pub fn new(api: MessagesApi, cache: ConversationCache, options: SyncOptions) -> Self {
        Self { api, cache, options, open: Arc::default(), generation: AtomicU64::new(0) }
    }

    pub fn api(&self) -> &MessagesApi {
        &self.api
    }

    pub fn cache(&self) -> &ConversationCache {
        &self.cache
    }

    /// Open a conversation and start its poller.
    ///
    /// Must be called within a tokio runtime.
    pub fn open(
        &self,
        key: ConversationKey,
        product_id: impl Into<String>,
    ) -> Result<ConversationSyncEngine, ApiError> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        {
            let mut open = self.open.lock();
            if open.contains_key(&key) {
                return Err(ApiError::new(
                    ErrorCode::ConflictOrNotFound,
                    format!("conversation {key} already open"),
                ));
            }
            open.insert(key.clone(), (generation, token.clone()));
        }
        let guard = OpenGuard { registry: Arc::clone(&self.open), key: key.clone(), generation };
        ConversationSyncEngine::open(
            key,
            product_id.into(),
            self.api.clone(),
            self.cache.clone(),
            self.options.clone(),
            token,
            guard,
        )
    }

    /// Stop the engine holding `key`, if any. Returns whether one was open.
    pub fn close(&self, key: &ConversationKey) -> bool {
        match self.open.lock().remove(key) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self, key: &ConversationKey) -> bool {
        self.open.lock().contains_key(key)
    }

    /// Fetch the conversation list from the server and cache it.
    pub async fn refresh_summaries(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        let users = self.api.chat_users().await?;
        let summaries: Vec<ConversationSummary> =
            users.into_iter().map(ConversationSummary::from).collect();
        self.cache.save_summaries(&summaries)?;
        Ok(summaries)
    }

    /// Cached conversation list, most recent first.
    pub fn summaries(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        self.cache.summaries()
    }
}

/// Releases a registry slot when its engine closes or drops.
pub(crate) struct OpenGuard {
    registry: OpenRegistry,
    key: ConversationKey,
    generation: u64,
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        let mut open = self.registry.lock();
        if let Some((generation, token)) = open.get(&self.key) {
            if *generation == self.generation {
                token.cancel();
                open.remove(&self.key);
            }
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
