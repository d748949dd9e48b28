//! Core domain errors.

use thiserror::Error;

use crate::ids::MessageId;

/// Core domain errors for Parley.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Attempted to mutate a message that is fixed at creation.
    #[error("Message {0} is immutable")]
    ImmutableMessage(MessageId),
}
