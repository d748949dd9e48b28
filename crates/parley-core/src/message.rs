//! Conversation messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::MessageId;

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    /// Message typed by the user.
    User,
    /// Reply produced by the assistant (live or fallback).
    Assistant,
}

/// A message in the conversation history.
///
/// Serialized as `{id, content, sender, timestamp}`, which is the persisted
/// layout of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique within the conversation.
    pub id: MessageId,
    /// Message text. Grows while an assistant reply is streaming.
    pub content: String,
    /// Author of the message.
    #[serde(rename = "sender")]
    pub author: Author,
    /// When the message was created.
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message with a fresh id.
    pub fn new(author: Author, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            content: content.into(),
            author,
            created_at: Utc::now(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Author::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Author::Assistant, content)
    }

    /// Create an empty assistant message to be filled by a stream.
    pub fn placeholder() -> Self {
        Self::new(Author::Assistant, String::new())
    }

    /// Returns true if this is an assistant message.
    pub fn is_assistant(&self) -> bool {
        self.author == Author::Assistant
    }

    /// Append streamed text to an assistant message.
    ///
    /// User messages are fixed at creation.
    pub fn append(&mut self, delta: &str) -> Result<(), CoreError> {
        if !self.is_assistant() {
            return Err(CoreError::ImmutableMessage(self.id.clone()));
        }
        self.content.push_str(delta);
        Ok(())
    }

    /// Replace the whole content of an assistant message.
    pub fn replace(&mut self, content: impl Into<String>) -> Result<(), CoreError> {
        if !self.is_assistant() {
            return Err(CoreError::ImmutableMessage(self.id.clone()));
        }
        self.content = content.into();
        Ok(())
    }
}
