// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Poll loop and optimistic-send reconciliation for one open conversation.
//!
//! The engine owns its [`ConversationTimeline`]. A background task fetches the
//! newest history page, then polls `new-messages` on a fixed interval until the
//! conversation is closed. Sends insert a provisional message right away and
//! settle it (confirm or roll back) when the server answers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::conversation::{
    epoch_ms, ConversationCache, ConversationKey, ConversationSummary, ConversationTimeline,
    Message, OpenGuard, SyncOptions,
};
use crate::error::{ApiError, ErrorCode};
use crate::messages::{MessagesApi, NewMessage, WireMessage};

/// Change notifications for UI refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineEvent {
    Merged { count: usize },
    Provisional { id: String },
    Confirmed { temp_id: String, id: String },
    RolledBack { temp_id: String, error: ApiError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Number of messages added to the timeline.
    Merged(usize),
    /// A previous poll was still running.
    Skipped,
}

/// A send that has been shown locally and is waiting on the server.
#[derive(Debug)]
pub struct PendingSend {
    message: Message,
    outcome: oneshot::Receiver<Result<Message, ApiError>>,
}

impl PendingSend {
    /// The provisional message inserted into the timeline.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Wait for the server: the confirmed message, or the error that rolled
    /// the provisional one back.
    pub async fn confirmed(self) -> Result<Message, ApiError> {
        match self.outcome.await {
            Ok(result) => result,
            Err(_) => Err(ApiError::network("send ended before the server answered")),
        }
    }
}

struct SyncState {
    timeline: ConversationTimeline,
    last_sync_mark: u64,
}

struct Shared {
    key: ConversationKey,
    product_id: String,
    api: MessagesApi,
    cache: ConversationCache,
    options: SyncOptions,
    state: Mutex<SyncState>,
    poll_gate: tokio::sync::Mutex<()>,
    closed: CancellationToken,
    events: broadcast::Sender<TimelineEvent>,
}

/// Sync engine for one open conversation. Closing or dropping it stops the
/// poller and frees the conversation for another open.
pub struct ConversationSyncEngine {
    shared: Arc<Shared>,
    guard: Mutex<Option<OpenGuard>>,
}

impl ConversationSyncEngine {
    pub(crate) fn open(
        key: ConversationKey,
        product_id: String,
        api: MessagesApi,
        cache: ConversationCache,
        options: SyncOptions,
        closed: CancellationToken,
        guard: OpenGuard,
    ) -> Result<Self, ApiError> {
        let mut timeline = ConversationTimeline::from_messages(cache.load(&key)?);
        let dropped = timeline.drop_provisional();
        if dropped > 0 {
            tracing::debug!(conversation = %key, dropped, "discarding stale provisional messages");
            cache.save(&key, timeline.messages())?;
        }
        let last_sync_mark = timeline.latest_confirmed_at().unwrap_or(0);

        let (events, _) = broadcast::channel(64);
        let shared = Arc::new(Shared {
            key,
            product_id,
            api,
            cache,
            options,
            state: Mutex::new(SyncState { timeline, last_sync_mark }),
            poll_gate: tokio::sync::Mutex::new(()),
            closed,
            events,
        });
        spawn_poller(Arc::clone(&shared));
        tracing::debug!(conversation = %shared.key, last_sync_mark, "conversation opened");
        Ok(Self { shared, guard: Mutex::new(Some(guard)) })
    }

    pub fn key(&self) -> &ConversationKey {
        &self.shared.key
    }

    pub fn product_id(&self) -> &str {
        &self.shared.product_id
    }

    /// Snapshot of the timeline, oldest first.
    pub fn timeline(&self) -> Vec<Message> {
        self.shared.state.lock().timeline.messages().to_vec()
    }

    pub fn last_sync_mark(&self) -> u64 {
        self.shared.state.lock().last_sync_mark
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimelineEvent> {
        self.shared.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    /// Fetch and merge messages newer than the sync mark.
    pub async fn poll_once(&self) -> Result<PollOutcome, ApiError> {
        self.shared.poll_once().await
    }

    /// Fetch the page of history just before what the timeline holds.
    /// Returns how many messages were added.
    pub async fn load_older(&self) -> Result<usize, ApiError> {
        let skip = self.shared.state.lock().timeline.confirmed_count();
        self.shared.fetch_history(u32::try_from(skip).unwrap_or(u32::MAX)).await
    }

    /// Show `content` immediately as a provisional message and submit it in
    /// the background.
    pub fn send(&self, content: &str) -> Result<PendingSend, ApiError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::new(ErrorCode::Validation, "Message cannot be empty."));
        }
        let shared = &self.shared;
        let message = Message {
            id: format!("local-{}", Uuid::new_v4()),
            conversation_key: shared.key.to_string(),
            sender_id: shared.key.user_id.clone(),
            receiver_id: shared.key.counterpart_id.clone(),
            product_id: shared.product_id.clone(),
            content: content.to_owned(),
            created_at: epoch_ms(),
            is_provisional: true,
        };
        {
            let mut state = shared.state.lock();
            if shared.closed.is_cancelled() {
                return Err(ApiError::closed());
            }
            state.timeline.push_provisional(message.clone());
            shared.persist(&state.timeline);
        }
        shared.emit(TimelineEvent::Provisional { id: message.id.clone() });

        let body = NewMessage {
            content: message.content.clone(),
            product_id: shared.product_id.clone(),
            receiver_id: shared.key.counterpart_id.clone(),
        };
        let (tx, rx) = oneshot::channel();
        let task = Arc::clone(shared);
        let temp_id = message.id.clone();
        tokio::spawn(async move {
            let _ = tx.send(task.submit(temp_id, body).await);
        });
        Ok(PendingSend { message, outcome: rx })
    }

    /// Stop polling. The timeline is not mutated after this returns.
    pub fn close(&self) {
        self.shared.closed.cancel();
        if self.guard.lock().take().is_some() {
            tracing::debug!(conversation = %self.shared.key, "conversation closed");
        }
    }
}

impl Drop for ConversationSyncEngine {
    fn drop(&mut self) {
        self.close();
    }
}

/// Floor for the poll period; a zero period would stop the poller.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

fn spawn_poller(shared: Arc<Shared>) {
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = shared.closed.cancelled() => return,
            result = shared.fetch_history(0) => {
                if let Err(e) = result {
                    tracing::debug!(conversation = %shared.key, err = %e, "history fetch failed");
                }
            }
        }

        let period = shared.options.poll_interval.max(MIN_POLL_INTERVAL);
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = shared.closed.cancelled() => break,
                _ = interval.tick() => {}
            }
            match shared.poll_once().await {
                Ok(PollOutcome::Merged(0)) => {}
                Ok(PollOutcome::Merged(count)) => {
                    tracing::debug!(conversation = %shared.key, count, "merged new messages");
                }
                Ok(PollOutcome::Skipped) => {
                    tracing::debug!(conversation = %shared.key, "poll still running, tick skipped");
                }
                Err(e) if e.code == ErrorCode::Closed => break,
                Err(e) => tracing::debug!(conversation = %shared.key, err = %e, "poll failed"),
            }
        }
        tracing::debug!(conversation = %shared.key, "poller stopped");
    });
}

impl Shared {
    async fn poll_once(&self) -> Result<PollOutcome, ApiError> {
        if self.closed.is_cancelled() {
            return Err(ApiError::closed());
        }
        let Ok(_gate) = self.poll_gate.try_lock() else {
            return Ok(PollOutcome::Skipped);
        };
        let since = self.state.lock().last_sync_mark;
        let incoming = self.api.new_messages(&self.key.user_id, since).await?;
        let merged = self.ingest(incoming)?;
        Ok(PollOutcome::Merged(merged))
    }

    async fn fetch_history(&self, skip: u32) -> Result<usize, ApiError> {
        let page = self
            .api
            .conversation(
                &self.key.user_id,
                &self.key.counterpart_id,
                skip,
                self.options.history_page_size,
            )
            .await?;
        self.ingest(page)
    }

    /// Merge server messages, advance the sync mark, persist, and acknowledge
    /// incoming unread ones. Returns how many were added.
    fn ingest(&self, page: Vec<WireMessage>) -> Result<usize, ApiError> {
        let newest = page.iter().map(|m| m.created_at).max();
        let mut unread = Vec::new();
        let mut fresh = Vec::new();
        for wire in page.into_iter().filter(|m| self.key.includes(m)) {
            if wire.receiver_id == self.key.user_id && !wire.is_read {
                unread.push(wire.id.clone());
            }
            fresh.push(Message::from_wire(wire, &self.key));
        }

        let merged = {
            let mut state = self.state.lock();
            if self.closed.is_cancelled() {
                return Err(ApiError::closed());
            }
            if let Some(newest) = newest {
                state.last_sync_mark = state.last_sync_mark.max(newest);
            }
            let merged = state.timeline.merge(fresh);
            if !merged.is_empty() {
                self.persist(&state.timeline);
            }
            merged
        };
        if merged.is_empty() {
            return Ok(0);
        }

        unread.retain(|id| merged.iter().any(|m| &m.id == id));
        if let Some(latest) = merged.iter().max_by_key(|m| m.created_at) {
            self.promote(latest);
        }
        self.emit(TimelineEvent::Merged { count: merged.len() });
        if !unread.is_empty() {
            self.acknowledge(unread);
        }
        Ok(merged.len())
    }

    /// Mark incoming messages read without holding up the poll.
    fn acknowledge(&self, ids: Vec<String>) {
        let api = self.api.clone();
        let closed = self.closed.clone();
        let key = self.key.clone();
        tokio::spawn(async move {
            for id in ids {
                if closed.is_cancelled() {
                    break;
                }
                if let Err(e) = api.mark_read(&id).await {
                    tracing::debug!(conversation = %key, message_id = %id, err = %e, "mark read failed");
                }
            }
        });
    }

    async fn submit(&self, temp_id: String, body: NewMessage) -> Result<Message, ApiError> {
        match self.api.send(&body).await {
            Ok(wire) => {
                let confirmed = Message::from_wire(wire, &self.key);
                {
                    let mut state = self.state.lock();
                    if !self.closed.is_cancelled()
                        && state.timeline.confirm(&temp_id, confirmed.clone())
                    {
                        self.persist(&state.timeline);
                    }
                }
                self.promote(&confirmed);
                self.emit(TimelineEvent::Confirmed { temp_id, id: confirmed.id.clone() });
                Ok(confirmed)
            }
            Err(e) => {
                tracing::warn!(conversation = %self.key, err = %e, "send failed, rolling back");
                {
                    let mut state = self.state.lock();
                    if !self.closed.is_cancelled() && state.timeline.rollback(&temp_id).is_some() {
                        self.persist(&state.timeline);
                    }
                }
                self.emit(TimelineEvent::RolledBack { temp_id, error: e.clone() });
                Err(e)
            }
        }
    }

    fn persist(&self, timeline: &ConversationTimeline) {
        if let Err(e) = self.cache.save(&self.key, timeline.messages()) {
            tracing::warn!(conversation = %self.key, err = %e, "failed to persist timeline");
        }
    }

    fn promote(&self, latest: &Message) {
        let summary = ConversationSummary::for_message(&self.key, latest);
        if let Err(e) = self.cache.promote(summary) {
            tracing::warn!(conversation = %self.key, err = %e, "failed to update conversation list");
        }
    }

    fn emit(&self, event: TimelineEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
