//! Per-topic coalescing of rapid-fire messages.
//!
//! Users often send several short lines in a row; dispatching each one as
//! its own engine invocation wastes sessions and interleaves replies. The
//! debouncer holds messages per (chat, thread) topic inside a sliding
//! window and emits one combined batch per burst.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use courier_core::{ChatId, EngineId, MessageId, ResumeToken, RunContext, ThreadId};

/// Debounce grouping key: one chat thread, or the chat itself when the
/// transport has no threads.
pub type TopicKey = (ChatId, Option<ThreadId>);

/// One inbound message waiting to be batched.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub chat_id: ChatId,
    pub user_msg_id: MessageId,
    pub text: String,
    pub resume_token: Option<ResumeToken>,
    pub context: Option<RunContext>,
    pub thread_id: Option<ThreadId>,
    pub engine_override: Option<EngineId>,
    /// Monotonic arrival time.
    pub timestamp: Instant,
}

impl PendingMessage {
    pub fn topic_key(&self) -> TopicKey {
        (self.chat_id, self.thread_id)
    }
}

/// One dispatch unit: a finalized burst of messages for a single topic.
#[derive(Debug, Clone)]
pub struct MessageBatch {
    pub chat_id: ChatId,
    /// First/last contributing message ids by arrival order. Ids are
    /// opaque: "last" means last to arrive, not numerically largest.
    pub first_msg_id: MessageId,
    pub last_msg_id: MessageId,
    /// Texts joined by a single newline in arrival order.
    pub combined_text: String,
    /// Routing hints from the first contributing message. Later messages'
    /// hints are discarded once merged.
    pub resume_token: Option<ResumeToken>,
    pub context: Option<RunContext>,
    pub thread_id: Option<ThreadId>,
    pub engine_override: Option<EngineId>,
}

#[derive(Debug)]
struct PendingBatch {
    messages: Vec<PendingMessage>,
    deadline: Instant,
}

/// Groups messages by topic key within a sliding time window.
///
/// Owned state, value-in/value-out: pending batches are never exposed by
/// reference. Callers guard the whole debouncer with a mutex when more
/// than one thread ingests.
pub struct TopicDebouncer {
    window: Duration,
    pending: HashMap<TopicKey, PendingBatch>,
}

impl TopicDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Queue a message for its topic.
    ///
    /// With a zero window batching is disabled and the message comes
    /// straight back as a single-message batch. Otherwise the topic's
    /// deadline moves to `timestamp + window`: every arrival resets the
    /// window.
    pub fn add_message(&mut self, msg: PendingMessage) -> Option<MessageBatch> {
        if self.window.is_zero() {
            return Some(finalize(vec![msg]));
        }

        let deadline = msg.timestamp + self.window;
        let batch = self
            .pending
            .entry(msg.topic_key())
            .or_insert_with(|| PendingBatch {
                messages: Vec::new(),
                deadline,
            });
        batch.messages.push(msg);
        batch.deadline = deadline;
        None
    }

    /// Finalize and remove every batch whose deadline has passed.
    ///
    /// Order is unspecified; callers needing determinism sort the result.
    pub fn check_expired(&mut self, now: Instant) -> Vec<MessageBatch> {
        let expired_keys: Vec<TopicKey> = self
            .pending
            .iter()
            .filter(|(_, batch)| batch.deadline <= now && !batch.messages.is_empty())
            .map(|(key, _)| *key)
            .collect();

        expired_keys
            .into_iter()
            .filter_map(|key| self.pending.remove(&key))
            .map(|batch| finalize(batch.messages))
            .collect()
    }

    /// Earliest deadline among pending batches; sizes the scheduler's
    /// next wait.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .filter(|batch| !batch.messages.is_empty())
            .map(|batch| batch.deadline)
            .min()
    }

    /// Finalize everything immediately, regardless of deadlines. Used at
    /// shutdown.
    pub fn flush_all(&mut self) -> Vec<MessageBatch> {
        self.pending
            .drain()
            .filter(|(_, batch)| !batch.messages.is_empty())
            .map(|(_, batch)| finalize(batch.messages))
            .collect()
    }

    /// Finalize one topic immediately, if it has anything pending.
    pub fn flush_topic(&mut self, key: TopicKey) -> Option<MessageBatch> {
        let batch = self.pending.remove(&key)?;
        if batch.messages.is_empty() {
            return None;
        }
        Some(finalize(batch.messages))
    }
}

/// Collapse an accumulated burst into one dispatch unit.
///
/// Routing hints come from the first arrival; the reply target is the
/// last.
fn finalize(mut messages: Vec<PendingMessage>) -> MessageBatch {
    debug_assert!(!messages.is_empty());
    let combined_text = messages
        .iter()
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let last_msg_id = messages[messages.len() - 1].user_msg_id;
    let first = messages.swap_remove(0);
    MessageBatch {
        chat_id: first.chat_id,
        first_msg_id: first.user_msg_id,
        last_msg_id,
        combined_text,
        resume_token: first.resume_token,
        context: first.context,
        thread_id: first.thread_id,
        engine_override: first.engine_override,
    }
}
