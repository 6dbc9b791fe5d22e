// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredMessage {
    pub id: u64,
    pub sender_id: u64,
    pub receiver_id: u64,
    pub product_id: u64,
    pub content: String,
    pub created_at: u64,
    pub is_read: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatUserRow {
    pub user_id: u64,
    pub username: String,
    pub product_id: u64,
    pub last_message: String,
    pub last_message_at: u64,
    pub unread_count: u64,
}

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    access: HashMap<String, u64>,
    refresh: HashMap<String, u64>,
    messages: Vec<StoredMessage>,
    last_ms: u64,
}

/// In-memory backend state.
#[derive(Default)]
pub struct MockState {
    inner: Mutex<Inner>,
    refresh_calls: AtomicU32,
    fail_refresh: AtomicBool,
    refresh_delay_ms: AtomicU64,
}

impl MockState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, username: &str, password: &str) -> u64 {
        let mut inner = self.inner.lock();
        let id = inner.users.len() as u64 + 1;
        inner.users.push(User { id, username: username.to_owned(), password: password.to_owned() });
        id
    }

    pub fn user(&self, id: u64) -> Option<User> {
        self.inner.lock().users.iter().find(|u| u.id == id).cloned()
    }

    pub fn check_password(&self, username: &str, password: &str) -> Option<u64> {
        let inner = self.inner.lock();
        inner.users.iter().find(|u| u.username == username && u.password == password).map(|u| u.id)
    }

    /// Issue a fresh access/refresh pair for `user_id`.
    pub fn issue_tokens(&self, user_id: u64) -> TokenPair {
        let pair = TokenPair {
            access_token: format!("at-{}", uuid::Uuid::new_v4()),
            token_type: "bearer".to_owned(),
            refresh_token: format!("rt-{}", uuid::Uuid::new_v4()),
        };
        let mut inner = self.inner.lock();
        inner.access.insert(pair.access_token.clone(), user_id);
        inner.refresh.insert(pair.refresh_token.clone(), user_id);
        pair
    }

    pub fn user_for_access(&self, token: &str) -> Option<u64> {
        self.inner.lock().access.get(token).copied()
    }

    /// Consume a refresh token and issue a new pair. Refresh tokens are single-use.
    pub fn rotate(&self, refresh_token: &str) -> Option<TokenPair> {
        let user_id = self.inner.lock().refresh.remove(refresh_token)?;
        Some(self.issue_tokens(user_id))
    }

    /// Invalidate every access token, as if they all timed out.
    pub fn expire_access_tokens(&self) {
        self.inner.lock().access.clear();
    }

    pub fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::Relaxed)
    }

    pub(crate) fn record_refresh_call(&self) {
        self.refresh_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::Relaxed);
    }

    pub fn fail_refresh(&self) -> bool {
        self.fail_refresh.load(Ordering::Relaxed)
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.refresh_delay_ms.store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms.load(Ordering::Relaxed))
    }

    /// Store a message. `created_at` is strictly increasing across messages.
    pub fn insert_message(
        &self,
        sender_id: u64,
        receiver_id: u64,
        product_id: u64,
        content: &str,
    ) -> StoredMessage {
        let mut inner = self.inner.lock();
        let created_at = epoch_ms().max(inner.last_ms + 1);
        inner.last_ms = created_at;
        let msg = StoredMessage {
            id: inner.messages.len() as u64 + 1,
            sender_id,
            receiver_id,
            product_id,
            content: content.to_owned(),
            created_at,
            is_read: false,
        };
        inner.messages.push(msg.clone());
        msg
    }

    /// A page of the conversation between `a` and `b`, counted from the newest
    /// message and returned oldest first.
    pub fn conversation(&self, a: u64, b: u64, skip: usize, limit: usize) -> Vec<StoredMessage> {
        let inner = self.inner.lock();
        let mut page: Vec<StoredMessage> = inner
            .messages
            .iter()
            .rev()
            .filter(|m| {
                (m.sender_id == a && m.receiver_id == b) || (m.sender_id == b && m.receiver_id == a)
            })
            .skip(skip)
            .take(limit)
            .cloned()
            .collect();
        page.reverse();
        page
    }

    /// Messages sent or received by `user_id` created after `since`.
    pub fn messages_since(&self, user_id: u64, since: u64) -> Vec<StoredMessage> {
        let inner = self.inner.lock();
        inner
            .messages
            .iter()
            .filter(|m| m.created_at > since)
            .filter(|m| m.sender_id == user_id || m.receiver_id == user_id)
            .cloned()
            .collect()
    }

    /// Mark a message read. Only its receiver may do so.
    pub fn mark_read(&self, id: u64, reader: u64) -> Option<StoredMessage> {
        let mut inner = self.inner.lock();
        let msg = inner.messages.iter_mut().find(|m| m.id == id && m.receiver_id == reader)?;
        msg.is_read = true;
        Some(msg.clone())
    }

    pub fn unread_count(&self, user_id: u64) -> u64 {
        let inner = self.inner.lock();
        inner.messages.iter().filter(|m| m.receiver_id == user_id && !m.is_read).count() as u64
    }

    /// One row per counterpart of `user_id`, most recent first.
    pub fn chat_users(&self, user_id: u64) -> Vec<ChatUserRow> {
        let inner = self.inner.lock();
        let mut rows: Vec<ChatUserRow> = Vec::new();
        for m in inner.messages.iter().rev() {
            let other = if m.sender_id == user_id {
                m.receiver_id
            } else if m.receiver_id == user_id {
                m.sender_id
            } else {
                continue;
            };
            let unread = u64::from(m.receiver_id == user_id && !m.is_read);
            if let Some(row) = rows.iter_mut().find(|r| r.user_id == other) {
                row.unread_count += unread;
                continue;
            }
            let username =
                inner.users.iter().find(|u| u.id == other).map(|u| u.username.clone()).unwrap_or_default();
            rows.push(ChatUserRow {
                user_id: other,
                username,
                product_id: m.product_id,
                last_message: m.content.clone(),
                last_message_at: m.created_at,
                unread_count: unread,
            });
        }
        rows
    }
}

pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_strictly_increase() {
        let state = MockState::new();
        let a = state.insert_message(1, 2, 3, "a");
        let b = state.insert_message(1, 2, 3, "b");
        assert!(b.created_at > a.created_at);
        assert_eq!(b.id, a.id + 1);
    }

    #[test]
    fn conversation_pages_from_newest() {
        let state = MockState::new();
        for i in 0..5 {
            state.insert_message(1, 2, 3, &format!("m{i}"));
        }
        state.insert_message(1, 9, 3, "elsewhere");

        let newest: Vec<String> = state.conversation(2, 1, 0, 2).into_iter().map(|m| m.content).collect();
        assert_eq!(newest, vec!["m3", "m4"]);
        let older: Vec<String> = state.conversation(1, 2, 2, 2).into_iter().map(|m| m.content).collect();
        assert_eq!(older, vec!["m1", "m2"]);
    }

    #[test]
    fn refresh_tokens_are_single_use() {
        let state = MockState::new();
        let id = state.add_user("alice", "pw");
        let pair = state.issue_tokens(id);

        let rotated = state.rotate(&pair.refresh_token);
        assert!(rotated.is_some());
        assert!(state.rotate(&pair.refresh_token).is_none());
    }

    #[test]
    fn chat_users_groups_by_counterpart() {
        let state = MockState::new();
        let alice = state.add_user("alice", "pw");
        let bob = state.add_user("bob", "pw");
        let carol = state.add_user("carol", "pw");
        state.insert_message(bob, alice, 3, "hi alice");
        state.insert_message(carol, alice, 4, "offer");
        state.insert_message(bob, alice, 3, "still there?");

        let rows = state.chat_users(alice);
        let order: Vec<u64> = rows.iter().map(|r| r.user_id).collect();
        assert_eq!(order, vec![bob, carol]);
        assert_eq!(rows[0].unread_count, 2);
        assert_eq!(rows[0].username, "bob");
        assert_eq!(rows[0].last_message, "still there?");
    }
}
