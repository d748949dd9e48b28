//! Streaming transport client for Parley
//!
//! This crate turns an outgoing user message into a typed, ordered sequence
//! of [`StreamEvent`](parley_core::StreamEvent)s read from the assistant
//! service's newline-delimited `data: ` stream.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parley_client::{ChatRequest, ClientEvent, HttpTransport, StreamClient};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn ask() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = HttpTransport::new("http://127.0.0.1:3000/api/chat/stream");
//!     let client = StreamClient::new(Arc::new(transport));
//!
//!     let request = ChatRequest::new("Find me leads in Dubai", "default");
//!     let mut events = client.open(request, CancellationToken::new());
//!
//!     while let Some(event) = events.next().await {
//!         if let ClientEvent::Chunk(text) = event {
//!             print!("{}", text);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod client;
mod decoder;
mod error;
mod transport;
mod types;

// Re-export main types
pub use client::{ClientEvent, EventStream, StreamClient, StreamHandler, StreamOutcome};
pub use decoder::{FrameDecoder, FRAME_PREFIX};
pub use error::{InBandError, TransportFailure};
pub use transport::{AssistantTransport, ByteStream, HttpTransport, ScriptedReply, ScriptedTransport};
pub use types::{ChatRequest, WireFrame};
