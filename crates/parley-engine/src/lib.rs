//! Conversation engine for Parley
//!
//! Wires the streaming client to a persisted conversation: a user message
//! goes in, an activity hint is published, the assistant reply is streamed
//! into a placeholder message, and a canned offline reply takes its place
//! when the transport fails outright.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parley_client::{HttpTransport, StreamClient};
//! use parley_engine::{ChatEngine, ConversationStore, EngineConfig, MemoryPersistence};
//!
//! async fn chat() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     let client = StreamClient::new(Arc::new(HttpTransport::new(
//!         "http://127.0.0.1:3000/api/chat/stream",
//!     )));
//!     let store = ConversationStore::new(
//!         Arc::new(MemoryPersistence::new()),
//!         &config.conversation_id,
//!     );
//!
//!     let mut engine = ChatEngine::new(client, store, config);
//!     let outcome = engine.send("Find me leads in Dubai").await?;
//!     println!("{}", outcome.message().content);
//!     Ok(())
//! }
//! ```

mod engine;
mod error;
mod fallback;
mod intent;
mod persistence;
mod settings;
mod store;

pub use engine::{ChatEngine, EngineConfig, EngineEvent, SendOutcome};
pub use error::{EngineError, PersistenceError};
pub use fallback::fallback_reply;
pub use intent::{classify, model_label, IntentHint};
pub use persistence::{FilePersistence, MemoryPersistence, Persistence};
pub use settings::{AssistantSettings, DEFAULT_DATA_DIR, DEFAULT_ENDPOINT};
pub use store::{ConversationStore, DEFAULT_HISTORY_LIMIT, WELCOME_MESSAGE};
