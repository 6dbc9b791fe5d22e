// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use souk::conversation::SyncOptions;
use souk::http::HttpTransport;
use souk::storage::FileStore;
use souk::Souk;
use souk_mock::state::MockState;
use souk_mock::MockServer;

pub const POLL_MS: u64 = 50;

/// A running mock backend with two seeded users.
pub struct Backend {
    pub server: MockServer,
    pub alice: u64,
    pub bob: u64,
}

impl Backend {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(MockState::new());
        let alice = state.add_user("alice", "alice-pw");
        let bob = state.add_user("bob", "bob-pw");
        let server = MockServer::start(state).await?;
        Ok(Self { server, alice, bob })
    }

    pub fn state(&self) -> &MockState {
        self.server.state()
    }

    /// A client with its own state directory.
    pub fn client(&self) -> anyhow::Result<Client> {
        self.client_with_timeout(Duration::from_secs(5))
    }

    /// A client whose requests give up after `timeout`.
    pub fn client_with_timeout(&self, timeout: Duration) -> anyhow::Result<Client> {
        let dir = tempfile::tempdir()?;
        let store = Arc::new(FileStore::open(dir.path())?);
        let transport = Arc::new(HttpTransport::new(&self.server.url(), timeout));
        let souk = Souk::with_parts(
            transport,
            store,
            SyncOptions { poll_interval: Duration::from_millis(POLL_MS), history_page_size: 20 },
        );
        Ok(Client { souk, dir })
    }

    /// A client already signed in as `username`.
    pub async fn signed_in(&self, username: &str) -> anyhow::Result<Client> {
        let client = self.client()?;
        client.souk.client().login(username, &format!("{username}-pw")).await?;
        Ok(client)
    }
}

pub struct Client {
    pub souk: Souk,
    pub dir: tempfile::TempDir,
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
