// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;

use crate::conversation::Message;

/// Messages of one conversation, unique by id, ordered by `created_at`.
#[derive(Debug, Clone, Default)]
pub struct ConversationTimeline {
    messages: Vec<Message>,
}

impl ConversationTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an arbitrary list; later duplicates of an id are dropped.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let mut timeline = Self::new();
        timeline.merge(messages);
        timeline
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    pub fn confirmed_count(&self) -> usize {
        self.messages.iter().filter(|m| !m.is_provisional).count()
    }

    pub fn latest_confirmed_at(&self) -> Option<u64> {
        self.messages.iter().filter(|m| !m.is_provisional).map(|m| m.created_at).max()
    }

    /// Add every message whose id is not present yet. Returns the added ones.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = Message>) -> Vec<Message> {
        let mut seen: HashSet<String> = self.messages.iter().map(|m| m.id.clone()).collect();
        let added: Vec<Message> =
            incoming.into_iter().filter(|m| seen.insert(m.id.clone())).collect();
        if !added.is_empty() {
            self.messages.extend(added.iter().cloned());
            self.sort();
        }
        added
    }

    pub fn push_provisional(&mut self, mut message: Message) {
        message.is_provisional = true;
        self.merge([message]);
    }

    /// Supersede the provisional `temp_id` with its server-confirmed message.
    ///
    /// If the confirmed id already arrived through a poll, the provisional entry
    /// is only removed. Returns whether the timeline changed.
    pub fn confirm(&mut self, temp_id: &str, mut confirmed: Message) -> bool {
        confirmed.is_provisional = false;
        let provisional = self.messages.iter().position(|m| m.id == temp_id && m.is_provisional);
        let already_present = self.contains(&confirmed.id);
        match (provisional, already_present) {
            (Some(idx), false) => self.messages[idx] = confirmed,
            (Some(idx), true) => {
                self.messages.remove(idx);
            }
            (None, false) => self.messages.push(confirmed),
            (None, true) => return false,
        }
        self.sort();
        true
    }

    /// Remove a provisional message after its send failed.
    pub fn rollback(&mut self, temp_id: &str) -> Option<Message> {
        let idx = self.messages.iter().position(|m| m.id == temp_id && m.is_provisional)?;
        Some(self.messages.remove(idx))
    }

    /// Drop all provisional messages. Returns how many were removed.
    pub fn drop_provisional(&mut self) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| !m.is_provisional);
        before - self.messages.len()
    }

    fn sort(&mut self) {
        self.messages.sort_by_key(|m| m.created_at);
    }
}
