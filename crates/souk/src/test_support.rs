// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted transport and fixtures shared by unit tests.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;

use crate::credential::{AccessToken, Credential, CredentialStore};
use crate::error::ApiError;
use crate::http::{ApiRequest, ApiResponse, Method, Transport};
use crate::storage::{MemoryStore, Store};

/// Canned reply for one request.
pub struct Reply {
    pub delay: Duration,
    pub result: Result<ApiResponse, ApiError>,
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Self { delay: Duration::ZERO, result: Ok(ApiResponse { status, body: body.to_string() }) }
    }

    pub fn status(status: u16) -> Self {
        Self { delay: Duration::ZERO, result: Ok(ApiResponse { status, body: String::new() }) }
    }

    pub fn network() -> Self {
        Self { delay: Duration::ZERO, result: Err(ApiError::network("connection refused")) }
    }

    pub fn after(mut self, millis: u64) -> Self {
        self.delay = Duration::from_millis(millis);
        self
    }
}

type Handler = Box<dyn Fn(&ApiRequest) -> Reply + Send + Sync>;

/// Transport that answers from a closure and records every request.
pub struct FakeTransport {
    handler: Handler,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FakeTransport {
    pub fn new(handler: impl Fn(&ApiRequest) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { handler: Box::new(handler), requests: Mutex::new(Vec::new()) })
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    /// Count requests matching a method and path prefix.
    pub fn count(&self, method: Method, path_prefix: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method && r.path.starts_with(path_prefix))
            .count()
    }
}

impl Transport for FakeTransport {
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, ApiError>> {
        let reply = (self.handler)(&request);
        self.requests.lock().push(request);
        Box::pin(async move {
            if !reply.delay.is_zero() {
                tokio::time::sleep(reply.delay).await;
            }
            reply.result
        })
    }
}

/// Memory-backed credential store seeded with `access`/`refresh`.
pub fn seeded_credentials(
    access: Option<&str>,
    refresh: Option<&str>,
) -> anyhow::Result<(Arc<MemoryStore>, CredentialStore)> {
    let store = Arc::new(MemoryStore::new());
    let creds = CredentialStore::new(store.clone());
    creds.set(&Credential {
        access: access.map(|a| AccessToken::new(a, "Bearer")),
        refresh_token: refresh.map(str::to_owned),
    })?;
    Ok((store, creds))
}

pub fn bearer(req: &ApiRequest) -> Option<String> {
    req.header("authorization").map(str::to_owned)
}

/// Memory store whose writes to one key can be made to fail.
#[derive(Default)]
pub struct BrokenStore {
    inner: MemoryStore,
    broken_key: Mutex<Option<String>>,
}

impl BrokenStore {
    pub fn break_writes(&self, key: &str) {
        *self.broken_key.lock() = Some(key.to_owned());
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.keys()
    }
}

impl Store for BrokenStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if self.broken_key.lock().as_deref() == Some(key) {
            anyhow::bail!("disk full");
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.inner.remove(key)
    }
}
