//! Parley Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Storage
//! - Runtime specifics
//!
//! All types here represent the conversation model shared by the client,
//! the engine and any presentation layer.

pub mod error;
pub mod event;
pub mod ids;
pub mod message;

// Re-export commonly used types
pub use error::CoreError;
pub use event::StreamEvent;
pub use ids::{ConversationId, MessageId};
pub use message::{Author, Message};
