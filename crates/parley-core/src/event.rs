//! Typed events decoded from the assistant's streaming response.

use serde::{Deserialize, Serialize};

/// One decoded frame of a streaming response, in wire order.
///
/// `Chunk` may repeat any number of times, `ModelSelected` occurs at most
/// once per request, and exactly one of `Done`/`Error` ends a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental text to append to the in-flight reply.
    Chunk { text: String },
    /// The service picked a model for this request.
    ModelSelected { model_id: String },
    /// The reply is complete.
    Done { full_text: String },
    /// The service reported an error in-band.
    Error { message: String },
}

impl StreamEvent {
    /// Returns true if no further events may follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ModelSelected { .. } => "model",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}
