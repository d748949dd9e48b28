//! Error types for the conversation engine.

use parley_core::{CoreError, MessageId};
use thiserror::Error;

/// Errors returned by [`ChatEngine`](crate::ChatEngine).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Blank input is never sent.
    #[error("Cannot send an empty message")]
    EmptyMessage,

    /// The in-flight assistant message disappeared from the conversation.
    #[error("Message {0} is no longer in the conversation")]
    MessageMissing(MessageId),

    /// Domain invariant violated.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Errors raised by a [`Persistence`](crate::Persistence) backend.
///
/// The conversation store logs and swallows these.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend-specific failure.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}
