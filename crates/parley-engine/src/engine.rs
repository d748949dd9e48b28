//! Conversation orchestrator.
//!
//! One `send` walks Idle -> Sending -> Streaming -> terminal. Every update
//! during the request is addressed by the placeholder id captured when the
//! request started, so a message that has since left the conversation is
//! never touched by a late event.

use std::time::Duration;

use parley_client::{ChatRequest, ClientEvent, InBandError, StreamClient, TransportFailure};
use parley_core::{ConversationId, Message, MessageId};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::fallback::fallback_reply;
use crate::intent::{classify, model_label};
use crate::store::{truncate_oldest, ConversationStore, DEFAULT_HISTORY_LIMIT};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Conversation scope sent with every request.
    pub conversation_id: ConversationId,
    /// Simulated thinking time before the offline reply appears.
    pub fallback_delay: Duration,
    /// Number of messages kept in memory.
    pub history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            conversation_id: ConversationId::default(),
            fallback_delay: Duration::from_millis(1500),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Change notifications for a presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A message was added to the conversation.
    MessageAppended(Message),
    /// Streamed text was appended to a message.
    MessageUpdated { id: MessageId, delta: String },
    /// A message's content was replaced wholesale.
    MessageReplaced { id: MessageId, content: String },
    /// The activity hint changed. `None` clears it.
    HintChanged(Option<String>),
    /// The service reported an error for the reply in `id`.
    InBandError { id: MessageId, error: InBandError },
    /// The conversation was reset.
    Cleared,
}

/// How a `send` ended, with the final assistant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The reply streamed to completion.
    Completed(Message),
    /// The service sent an `error` frame. Partial content is left as-is.
    InBandError { message: Message, error: InBandError },
    /// The transport failed; the content is the offline reply.
    Fallback {
        message: Message,
        failure: TransportFailure,
    },
    /// The request was cancelled; the content is whatever had arrived.
    Cancelled(Message),
}

impl SendOutcome {
    /// The assistant message this request produced.
    pub fn message(&self) -> &Message {
        match self {
            Self::Completed(message)
            | Self::InBandError { message, .. }
            | Self::Fallback { message, .. }
            | Self::Cancelled(message) => message,
        }
    }
}

/// Drives one conversation.
///
/// `send` takes `&mut self`, so a single engine never has two requests in
/// flight. Cancel a running request through the token passed to
/// [`ChatEngine::send_with_cancel`].
pub struct ChatEngine {
    client: StreamClient,
    store: ConversationStore,
    config: EngineConfig,
    messages: Vec<Message>,
    hint_tx: watch::Sender<Option<String>>,
    observers: Vec<mpsc::UnboundedSender<EngineEvent>>,
}

impl ChatEngine {
    /// Create an engine, loading the stored conversation.
    ///
    /// A `history_limit` of zero is raised to one so the in-flight reply is
    /// never truncated away.
    pub fn new(client: StreamClient, store: ConversationStore, mut config: EngineConfig) -> Self {
        config.history_limit = config.history_limit.max(1);
        let store = store.with_limit(config.history_limit);
        let messages = store.load();
        let (hint_tx, _) = watch::channel(None);

        info!(
            conversation_id = %config.conversation_id,
            messages = messages.len(),
            "Chat engine ready"
        );

        Self {
            client,
            store,
            config,
            messages,
            hint_tx,
            observers: Vec::new(),
        }
    }

    /// Current conversation, oldest first.
    ///
    /// While a reply is streaming the last message may be incomplete.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Current activity hint.
    pub fn hint(&self) -> Option<String> {
        self.hint_tx.borrow().clone()
    }

    /// Watch the activity hint.
    pub fn watch_hint(&self) -> watch::Receiver<Option<String>> {
        self.hint_tx.subscribe()
    }

    /// Receive every change the engine makes.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<EngineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(tx);
        rx
    }

    /// Reset the conversation to the welcome message.
    pub fn clear(&mut self) {
        self.messages = self.store.clear();
        self.set_hint(None);
        self.emit(EngineEvent::Cleared);
        info!(conversation_id = %self.config.conversation_id, "Conversation cleared");
    }

    /// Send a user message and stream the reply.
    pub async fn send(&mut self, text: &str) -> Result<SendOutcome, EngineError> {
        self.send_with_cancel(text, CancellationToken::new()).await
    }

    /// Send a user message; cancelling `cancel` abandons the reply.
    pub async fn send_with_cancel(
        &mut self,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<SendOutcome, EngineError> {
        if text.trim().is_empty() {
            return Err(EngineError::EmptyMessage);
        }

        self.push_message(Message::user(text));

        let intent = classify(text);
        debug!(intent = ?intent, "Classified outgoing message");
        self.set_hint(Some(intent.label().to_string()));

        let placeholder = Message::placeholder();
        let reply_id = placeholder.id.clone();
        self.push_message(placeholder);
        self.persist();

        info!(message_id = %reply_id, "Sending message to assistant");

        let request = ChatRequest::new(text, self.config.conversation_id.clone());
        let mut events = self.client.open(request, cancel.clone());

        loop {
            let Some(event) = events.next().await else {
                info!(message_id = %reply_id, "Request cancelled");
                return self.finish_cancelled(&reply_id);
            };

            match event {
                ClientEvent::Chunk(delta) => {
                    self.apply_chunk(&reply_id, &delta)?;
                    self.persist();
                }
                ClientEvent::Model(model) => {
                    self.set_hint(Some(model_label(&model)));
                }
                ClientEvent::Done(full_text) => {
                    self.finalize(&reply_id, &full_text)?;
                    self.set_hint(None);
                    self.persist();
                    info!(message_id = %reply_id, "Reply completed");
                    return Ok(SendOutcome::Completed(self.message(&reply_id)?));
                }
                ClientEvent::Error(error) => {
                    self.set_hint(None);
                    self.emit(EngineEvent::InBandError {
                        id: reply_id.clone(),
                        error: error.clone(),
                    });
                    self.persist();
                    return Ok(SendOutcome::InBandError {
                        message: self.message(&reply_id)?,
                        error,
                    });
                }
                ClientEvent::Failed(failure) => {
                    warn!(message_id = %reply_id, error = %failure, "Falling back to offline reply");

                    tokio::select! {
                        _ = tokio::time::sleep(self.config.fallback_delay) => {}
                        _ = cancel.cancelled() => return self.finish_cancelled(&reply_id),
                    }

                    self.set_hint(None);
                    self.replace_content(&reply_id, fallback_reply(text))?;
                    self.persist();
                    return Ok(SendOutcome::Fallback {
                        message: self.message(&reply_id)?,
                        failure,
                    });
                }
            }
        }
    }

    fn finish_cancelled(&mut self, reply_id: &MessageId) -> Result<SendOutcome, EngineError> {
        self.set_hint(None);
        self.persist();
        Ok(SendOutcome::Cancelled(self.message(reply_id)?))
    }

    /// Append `delta` to the message with `id`; a no-op if it is gone.
    fn apply_chunk(&mut self, id: &MessageId, delta: &str) -> Result<(), EngineError> {
        let Some(message) = self.messages.iter_mut().find(|m| &m.id == id) else {
            debug!(message_id = %id, "Dropping chunk for a message no longer present");
            return Ok(());
        };
        message.append(delta)?;
        self.emit(EngineEvent::MessageUpdated {
            id: id.clone(),
            delta: delta.to_string(),
        });
        Ok(())
    }

    /// The accumulated chunks are authoritative; `full_text` only fills an
    /// empty reply.
    fn finalize(&mut self, id: &MessageId, full_text: &str) -> Result<(), EngineError> {
        let Some(message) = self.messages.iter().find(|m| &m.id == id) else {
            return Ok(());
        };
        if message.content.is_empty() {
            if !full_text.is_empty() {
                self.replace_content(id, full_text.to_string())?;
            }
        } else if message.content != full_text {
            debug!(
                message_id = %id,
                streamed_len = message.content.len(),
                full_len = full_text.len(),
                "Final text differs from streamed chunks, keeping chunks"
            );
        }
        Ok(())
    }

    fn replace_content(&mut self, id: &MessageId, content: String) -> Result<(), EngineError> {
        let Some(message) = self.messages.iter_mut().find(|m| &m.id == id) else {
            debug!(message_id = %id, "Dropping replacement for a message no longer present");
            return Ok(());
        };
        message.replace(content.clone())?;
        self.emit(EngineEvent::MessageReplaced {
            id: id.clone(),
            content,
        });
        Ok(())
    }

    fn push_message(&mut self, message: Message) {
        self.messages.push(message.clone());
        truncate_oldest(&mut self.messages, self.config.history_limit);
        self.emit(EngineEvent::MessageAppended(message));
    }

    fn message(&self, id: &MessageId) -> Result<Message, EngineError> {
        self.messages
            .iter()
            .find(|m| &m.id == id)
            .cloned()
            .ok_or_else(|| EngineError::MessageMissing(id.clone()))
    }

    fn set_hint(&mut self, hint: Option<String>) {
        if *self.hint_tx.borrow() == hint {
            return;
        }
        self.hint_tx.send_replace(hint.clone());
        self.emit(EngineEvent::HintChanged(hint));
    }

    fn persist(&self) {
        self.store.save(&self.messages);
    }

    fn emit(&mut self, event: EngineEvent) {
        self.observers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parley_client::{ScriptedReply, ScriptedTransport, WireFrame};
    use parley_core::{Author, CoreError};

    use crate::persistence::{MemoryPersistence, Persistence};
    use crate::store::WELCOME_MESSAGE;

    struct Harness {
        engine: ChatEngine,
        transport: Arc<ScriptedTransport>,
        persistence: Arc<MemoryPersistence>,
        events: mpsc::UnboundedReceiver<EngineEvent>,
    }

    fn harness_with_delay(fallback_delay: Duration) -> Harness {
        let transport = Arc::new(ScriptedTransport::new());
        let persistence = Arc::new(MemoryPersistence::new());
        let config = EngineConfig {
            fallback_delay,
            ..Default::default()
        };
        let store = ConversationStore::new(persistence.clone(), &config.conversation_id);
        let mut engine = ChatEngine::new(StreamClient::new(transport.clone()), store, config);
        let events = engine.subscribe();

        Harness {
            engine,
            transport,
            persistence,
            events,
        }
    }

    fn harness() -> Harness {
        harness_with_delay(Duration::ZERO)
    }

    fn chunk(text: &str) -> WireFrame {
        WireFrame::Chunk {
            content: text.to_string(),
        }
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    fn hints(events: &[EngineEvent]) -> Vec<Option<String>> {
        events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::HintChanged(hint) => Some(hint.clone()),
                _ => None,
            })
            .collect()
    }

    fn stored(h: &Harness) -> Vec<Message> {
        let key = ConversationStore::storage_key(&ConversationId::default());
        let raw = h.persistence.get(&key).unwrap().unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_streamed_reply_completes() {
        let mut h = harness();
        h.transport
            .push_frames(&[
                WireFrame::Model {
                    model: "gpt-4o".to_string(),
                },
                chunk("Found "),
                chunk("5 "),
                chunk("leads."),
                WireFrame::Done {
                    full_response: "Found 5 leads.".to_string(),
                },
            ])
            .unwrap();

        let outcome = h.engine.send("Find me leads in Dubai").await.unwrap();

        assert!(matches!(outcome, SendOutcome::Completed(_)));
        assert_eq!(outcome.message().content, "Found 5 leads.");
        assert_eq!(h.engine.hint(), None);

        let events = drain(&mut h.events);
        assert_eq!(
            hints(&events),
            vec![
                Some("Searching for leads".to_string()),
                Some("Answering with gpt-4o".to_string()),
                None,
            ]
        );
        let deltas: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::MessageUpdated { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, vec!["Found ", "5 ", "leads."]);

        let messages = h.engine.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, WELCOME_MESSAGE);
        assert_eq!(messages[1].author, Author::User);
        assert_eq!(messages[1].content, "Find me leads in Dubai");
        assert_eq!(stored(&h), messages.to_vec());

        let requests = h.transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].message, "Find me leads in Dubai");
        assert_eq!(requests[0].conversation_id.as_str(), "default");
    }

    #[tokio::test]
    async fn test_connection_refused_uses_fallback() {
        let mut h = harness();
        h.transport
            .push_failure(TransportFailure::Connect("connection refused".to_string()));

        let outcome = h.engine.send("hello").await.unwrap();

        match &outcome {
            SendOutcome::Fallback { failure, .. } => {
                assert!(matches!(failure, TransportFailure::Connect(_)));
            }
            other => panic!("Expected Fallback, got {:?}", other),
        }
        assert_eq!(outcome.message().content, fallback_reply("hello"));
        assert_eq!(h.engine.hint(), None);

        let events = drain(&mut h.events);
        assert!(!events
            .iter()
            .any(|e| matches!(e, EngineEvent::MessageUpdated { .. })));
        let replacements = events
            .iter()
            .filter(|e| matches!(e, EngineEvent::MessageReplaced { .. }))
            .count();
        assert_eq!(replacements, 1);
        assert_eq!(stored(&h).last().unwrap().content, fallback_reply("hello"));
    }

    #[tokio::test]
    async fn test_close_without_done_discards_partial_content() {
        let mut h = harness();
        h.transport.push_frames(&[chunk("Hi"), chunk(" there")]).unwrap();

        let outcome = h.engine.send("what can you do").await.unwrap();

        assert!(matches!(
            outcome,
            SendOutcome::Fallback {
                failure: TransportFailure::ClosedWithoutTerminal,
                ..
            }
        ));
        assert_eq!(outcome.message().content, fallback_reply("what can you do"));
        assert!(!outcome.message().content.contains("Hi there"));
    }

    #[tokio::test]
    async fn test_in_band_error_keeps_partial_content() {
        let mut h = harness();
        h.transport
            .push_frames(&[
                chunk("Searching"),
                chunk("..."),
                WireFrame::Error {
                    error: "model overloaded".to_string(),
                },
            ])
            .unwrap();

        let outcome = h.engine.send("Find me leads in Dubai").await.unwrap();

        match &outcome {
            SendOutcome::InBandError { message, error } => {
                assert_eq!(message.content, "Searching...");
                assert_eq!(error.message, "model overloaded");
            }
            other => panic!("Expected InBandError, got {:?}", other),
        }
        assert_eq!(h.engine.hint(), None);

        let events = drain(&mut h.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::InBandError { .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, EngineEvent::MessageReplaced { .. })));
    }

    #[tokio::test]
    async fn test_done_text_fills_empty_reply() {
        let mut h = harness();
        h.transport
            .push_frames(&[WireFrame::Done {
                full_response: "All set.".to_string(),
            }])
            .unwrap();

        let outcome = h.engine.send("hello").await.unwrap();
        assert_eq!(outcome.message().content, "All set.");
    }

    #[tokio::test]
    async fn test_chunks_win_over_done_text() {
        let mut h = harness();
        h.transport
            .push_frames(&[
                chunk("streamed"),
                WireFrame::Done {
                    full_response: "something else".to_string(),
                },
            ])
            .unwrap();

        let outcome = h.engine.send("hello").await.unwrap();
        assert_eq!(outcome.message().content, "streamed");
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let mut h = harness();
        let result = h.engine.send("   ").await;

        assert!(matches!(result, Err(EngineError::EmptyMessage)));
        assert_eq!(h.engine.messages().len(), 1);
        assert!(h.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_keeps_partial_and_skips_fallback() {
        let mut h = harness();
        h.transport.push(ScriptedReply::Stall(vec![chunk("Partial")
            .to_line()
            .unwrap()
            .into_bytes()]));

        let cancel = CancellationToken::new();
        let timer = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            timer.cancel();
        });

        let outcome = h.engine.send_with_cancel("hello", cancel).await.unwrap();

        match &outcome {
            SendOutcome::Cancelled(message) => assert_eq!(message.content, "Partial"),
            other => panic!("Expected Cancelled, got {:?}", other),
        }
        assert_eq!(h.engine.hint(), None);
        assert_eq!(stored(&h).last().unwrap().content, "Partial");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_waits_before_replacing() {
        let mut h = harness_with_delay(Duration::from_millis(1500));
        h.transport.push_failure(TransportFailure::Status(503));

        let started = tokio::time::Instant::now();
        let outcome = h.engine.send("hello").await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(1500));
        assert_eq!(outcome.message().content, fallback_reply("hello"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_fallback_delay() {
        let mut h = harness_with_delay(Duration::from_secs(10));
        h.transport.push_failure(TransportFailure::Status(503));

        let cancel = CancellationToken::new();
        let timer = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            timer.cancel();
        });

        let outcome = h.engine.send_with_cancel("hello", cancel).await.unwrap();

        assert!(matches!(outcome, SendOutcome::Cancelled(_)));
        assert_eq!(outcome.message().content, "");
        assert_eq!(h.engine.hint(), None);
    }

    #[tokio::test]
    async fn test_updates_scoped_to_placeholder_id() {
        let mut h = harness();
        h.transport
            .push_frames(&[
                chunk("first"),
                WireFrame::Done {
                    full_response: "first".to_string(),
                },
            ])
            .unwrap();
        let first = h.engine.send("hello").await.unwrap();
        let first_id = first.message().id.clone();

        h.engine.clear();
        h.engine.apply_chunk(&first_id, "stray").unwrap();
        h.engine
            .replace_content(&first_id, "stray replacement".to_string())
            .unwrap();

        assert_eq!(h.engine.messages().len(), 1);
        assert_eq!(h.engine.messages()[0].content, WELCOME_MESSAGE);

        h.transport.push_failure(TransportFailure::Status(500));
        h.engine.send("hey").await.unwrap();
        let user_id = h.engine.messages()[1].id.clone();
        let result = h.engine.apply_chunk(&user_id, "tamper");
        assert!(matches!(
            result,
            Err(EngineError::Core(CoreError::ImmutableMessage(_)))
        ));
        assert_eq!(h.engine.messages()[1].content, "hey");
    }

    #[tokio::test]
    async fn test_zero_history_limit_keeps_reply() {
        let transport = Arc::new(ScriptedTransport::new());
        let persistence = Arc::new(MemoryPersistence::new());
        let config = EngineConfig {
            history_limit: 0,
            ..Default::default()
        };
        let store = ConversationStore::new(persistence, &config.conversation_id);
        let mut engine = ChatEngine::new(StreamClient::new(transport.clone()), store, config);
        transport
            .push_frames(&[
                chunk("Hi"),
                WireFrame::Done {
                    full_response: "Hi".to_string(),
                },
            ])
            .unwrap();

        let outcome = engine.send("hello").await.unwrap();

        assert_eq!(outcome.message().content, "Hi");
        assert_eq!(engine.messages().len(), 1);
        assert_eq!(engine.messages()[0].author, Author::Assistant);
    }

    #[tokio::test]
    async fn test_user_text_kept_verbatim() {
        let mut h = harness();
        h.transport.push_failure(TransportFailure::Status(500));

        h.engine.send("  Find me leads in Dubai\n").await.unwrap();

        assert_eq!(h.engine.messages()[1].content, "  Find me leads in Dubai\n");
        assert_eq!(
            h.transport.requests()[0].message,
            "  Find me leads in Dubai\n"
        );
    }

    #[tokio::test]
    async fn test_history_bounded_in_memory() {
        let transport = Arc::new(ScriptedTransport::new());
        let persistence = Arc::new(MemoryPersistence::new());
        let config = EngineConfig {
            fallback_delay: Duration::ZERO,
            history_limit: 4,
            ..Default::default()
        };
        let store = ConversationStore::new(persistence, &config.conversation_id);
        let mut engine = ChatEngine::new(StreamClient::new(transport.clone()), store, config);

        for i in 0..3 {
            transport.push_failure(TransportFailure::Status(500));
            engine.send(&format!("message {}", i)).await.unwrap();
        }

        let messages = engine.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].content, "message 2");
        assert_eq!(messages[3].author, Author::Assistant);
    }

    #[tokio::test]
    async fn test_history_reloaded_by_new_engine() {
        let transport = Arc::new(ScriptedTransport::new());
        let persistence = Arc::new(MemoryPersistence::new());
        let config = EngineConfig {
            fallback_delay: Duration::ZERO,
            ..Default::default()
        };

        transport.push_failure(TransportFailure::Status(500));
        let store = ConversationStore::new(persistence.clone(), &config.conversation_id);
        let mut engine =
            ChatEngine::new(StreamClient::new(transport.clone()), store, config.clone());
        engine.send("hello").await.unwrap();
        let before = engine.messages().to_vec();

        let store = ConversationStore::new(persistence, &config.conversation_id);
        let reloaded = ChatEngine::new(StreamClient::new(transport), store, config);
        assert_eq!(reloaded.messages(), before.as_slice());
    }
}
