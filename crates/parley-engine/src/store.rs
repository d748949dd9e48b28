//! Bounded, persisted conversation history.
//!
//! The store never fails outward: unreadable data loads as a fresh
//! conversation and failed writes are logged and dropped, leaving the
//! caller's in-memory copy authoritative.

use std::sync::Arc;

use parley_core::{ConversationId, Message};
use tracing::{debug, warn};

use crate::persistence::Persistence;

/// Number of most recent messages kept.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Assistant greeting that opens every new conversation.
pub const WELCOME_MESSAGE: &str = "Hi! I'm your sales assistant. I can find leads, draft \
emails and answer questions from your knowledge base. What would you like to do?";

const KEY_PREFIX: &str = "parley.conversation.";

/// Persisted history of one conversation scope.
#[derive(Clone)]
pub struct ConversationStore {
    persistence: Arc<dyn Persistence>,
    key: String,
    limit: usize,
}

impl ConversationStore {
    /// Create a store for `conversation_id` with the default retention.
    pub fn new(persistence: Arc<dyn Persistence>, conversation_id: &ConversationId) -> Self {
        Self {
            persistence,
            key: Self::storage_key(conversation_id),
            limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Keep at most `limit` messages (never fewer than one).
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Persistence key for a conversation scope.
    pub fn storage_key(conversation_id: &ConversationId) -> String {
        format!("{}{}", KEY_PREFIX, conversation_id)
    }

    /// Key this store reads and writes.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// A new conversation: just the welcome message.
    pub fn seeded() -> Vec<Message> {
        vec![Message::assistant(WELCOME_MESSAGE)]
    }

    /// Load the stored conversation, or a seeded one if nothing usable is stored.
    pub fn load(&self) -> Vec<Message> {
        let raw = match self.persistence.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %self.key, "No stored conversation, starting fresh");
                return Self::seeded();
            }
            Err(e) => {
                warn!(error = %e, key = %self.key, "Failed to read conversation, starting fresh");
                return Self::seeded();
            }
        };

        match serde_json::from_str::<Vec<Message>>(&raw) {
            Ok(messages) if !messages.is_empty() => {
                debug!(key = %self.key, count = messages.len(), "Loaded conversation");
                messages
            }
            Ok(_) => Self::seeded(),
            Err(e) => {
                warn!(error = %e, key = %self.key, "Stored conversation is corrupt, starting fresh");
                Self::seeded()
            }
        }
    }

    /// Persist the most recent `limit` messages.
    pub fn save(&self, messages: &[Message]) {
        let start = messages.len().saturating_sub(self.limit);
        let kept = &messages[start..];

        let encoded = match serde_json::to_string(kept) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, key = %self.key, "Failed to encode conversation");
                return;
            }
        };

        if let Err(e) = self.persistence.set(&self.key, &encoded) {
            warn!(error = %e, key = %self.key, "Failed to persist conversation");
        }
    }

    /// Load, append `message`, save, and return the updated conversation.
    pub fn append(&self, message: Message) -> Vec<Message> {
        let mut messages = self.load();
        messages.push(message);
        truncate_oldest(&mut messages, self.limit);
        self.save(&messages);
        messages
    }

    /// Drop the stored conversation and return a seeded one.
    pub fn clear(&self) -> Vec<Message> {
        if let Err(e) = self.persistence.remove(&self.key) {
            warn!(error = %e, key = %self.key, "Failed to clear conversation");
        }
        Self::seeded()
    }
}

/// Drop the oldest messages until at most `limit` remain.
pub(crate) fn truncate_oldest(messages: &mut Vec<Message>, limit: usize) {
    if messages.len() > limit {
        let excess = messages.len() - limit;
        messages.drain(..excess);
    }
}
