//! Wire types for the assistant streaming endpoint.

use parley_core::{ConversationId, StreamEvent};
use serde::{Deserialize, Serialize};

/// Request body sent to the streaming endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The outgoing user message.
    pub message: String,
    /// Conversation scope on the service side.
    #[serde(rename = "conversationId")]
    pub conversation_id: ConversationId,
}

impl ChatRequest {
    /// Create a new request.
    pub fn new(message: impl Into<String>, conversation_id: impl Into<ConversationId>) -> Self {
        Self {
            message: message.into(),
            conversation_id: conversation_id.into(),
        }
    }
}

/// Payload of one `data: ` record, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireFrame {
    /// Incremental reply text.
    Chunk { content: String },

    /// Model chosen by the service.
    Model { model: String },

    /// Reply complete.
    Done {
        #[serde(rename = "fullResponse", default)]
        full_response: String,
    },

    /// In-band error.
    Error { error: String },
}

impl WireFrame {
    /// Encode as one wire record, prefix and line terminator included.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        Ok(format!(
            "{}{}\n",
            crate::decoder::FRAME_PREFIX,
            serde_json::to_string(self)?
        ))
    }
}

impl From<WireFrame> for StreamEvent {
    fn from(frame: WireFrame) -> Self {
        match frame {
            WireFrame::Chunk { content } => StreamEvent::Chunk { text: content },
            WireFrame::Model { model } => StreamEvent::ModelSelected { model_id: model },
            WireFrame::Done { full_response } => StreamEvent::Done {
                full_text: full_response,
            },
            WireFrame::Error { error } => StreamEvent::Error { message: error },
        }
    }
}
