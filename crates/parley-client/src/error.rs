//! Error types for the streaming client.

use thiserror::Error;

/// Hard failures of the transport.
///
/// Any of these sends the engine down the offline fallback path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    /// The connection could not be established.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The service answered with a non-success status.
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// Reading the response body failed.
    #[error("Failed to read response body: {0}")]
    Read(String),

    /// The body ended before a `done` or `error` frame arrived.
    #[error("Stream closed without a terminal frame")]
    ClosedWithoutTerminal,
}

/// A well-formed `error` frame sent by the assistant service.
///
/// Surfaced to the caller as-is; it never triggers the fallback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Assistant reported an error: {message}")]
pub struct InBandError {
    /// Error text from the service.
    pub message: String,
}

impl InBandError {
    /// Create a new in-band error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
