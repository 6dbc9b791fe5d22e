// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Souk: authenticated API client and conversation sync for a classifieds
//! marketplace backend.

pub mod client;
pub mod config;
pub mod conversation;
pub mod credential;
pub mod error;
pub mod http;
pub mod messages;
pub mod storage;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::client::AuthenticatedClient;
use crate::config::ClientConfig;
use crate::conversation::{ConversationCache, ConversationHub, SyncOptions};
use crate::credential::CredentialStore;
use crate::http::{HttpTransport, Transport};
use crate::messages::MessagesApi;
use crate::storage::{FileStore, Store};

/// The client's dependency graph: one coordinator, one client, one hub.
pub struct Souk {
    client: Arc<AuthenticatedClient>,
    messages: MessagesApi,
    conversations: ConversationHub,
}

impl Souk {
    /// Build from config: reqwest transport and file-backed state.
    pub fn connect(config: &ClientConfig) -> anyhow::Result<Self> {
        let store = FileStore::open(config.state_dir())?;
        tracing::debug!(state_dir = %store.dir().display(), api_url = %config.api_url, "client state");
        let transport = HttpTransport::new(&config.api_url, config.request_timeout());
        Ok(Self::with_parts(Arc::new(transport), Arc::new(store), SyncOptions::from(config)))
    }

    pub fn with_parts(
        transport: Arc<dyn Transport>,
        store: Arc<dyn Store>,
        options: SyncOptions,
    ) -> Self {
        let client =
            Arc::new(AuthenticatedClient::new(transport, CredentialStore::new(Arc::clone(&store))));
        let messages = MessagesApi::new(Arc::clone(&client));
        let conversations =
            ConversationHub::new(messages.clone(), ConversationCache::new(store), options);
        Self { client, messages, conversations }
    }

    pub fn client(&self) -> &Arc<AuthenticatedClient> {
        &self.client
    }

    pub fn messages(&self) -> &MessagesApi {
        &self.messages
    }

    pub fn conversations(&self) -> &ConversationHub {
        &self.conversations
    }
}
