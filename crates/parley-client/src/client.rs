//! Transport client: opens a request and yields typed events as they decode.
//!
//! [`EventStream`] is pull-based: nothing is read from the body until the
//! caller asks for the next event, and dropping it (or cancelling its token)
//! stops the read loop. [`StreamClient::stream`] layers the callback form on
//! top of it.

use std::collections::VecDeque;
use std::sync::Arc;

use parley_core::StreamEvent;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::decoder::FrameDecoder;
use crate::error::{InBandError, TransportFailure};
use crate::transport::{AssistantTransport, ByteStream};
use crate::types::ChatRequest;

/// Item yielded by an [`EventStream`].
///
/// `Done`, `Error` and `Failed` are terminal: the stream yields nothing after
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Incremental reply text.
    Chunk(String),
    /// The service picked a model. At most once per request.
    Model(String),
    /// Reply complete, with the service's full text.
    Done(String),
    /// In-band error frame from the service.
    Error(InBandError),
    /// Hard transport failure.
    Failed(TransportFailure),
}

impl ClientEvent {
    /// Returns true if this event ends the request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Error(_) | Self::Failed(_))
    }
}

/// How a request driven by [`StreamClient::stream`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// `on_done` was called.
    Done,
    /// `on_error` was called.
    InBandError,
    /// `on_fallback` was called.
    Fallback,
    /// The request was cancelled; no terminal callback fired.
    Cancelled,
}

/// Callbacks for [`StreamClient::stream`].
pub trait StreamHandler: Send {
    /// Called for every `chunk` frame, in wire order.
    fn on_chunk(&mut self, delta: &str);

    /// Called at most once when the service reports its model.
    fn on_model(&mut self, _model_id: &str) {}

    /// Called once when the reply is complete.
    fn on_done(&mut self, full_text: &str);

    /// Called once for an in-band `error` frame.
    fn on_error(&mut self, error: &InBandError) {
        warn!(error = %error, "Unhandled in-band error");
    }

    /// Called once on a hard transport failure.
    fn on_fallback(&mut self, failure: &TransportFailure);
}

/// Client for the assistant's streaming endpoint.
#[derive(Clone)]
pub struct StreamClient {
    transport: Arc<dyn AssistantTransport>,
}

impl StreamClient {
    /// Create a new client over the given transport.
    pub fn new(transport: Arc<dyn AssistantTransport>) -> Self {
        Self { transport }
    }

    /// Prepare a request. The connection opens on the first `next()`.
    pub fn open(&self, request: ChatRequest, cancel: CancellationToken) -> EventStream {
        EventStream {
            transport: Arc::clone(&self.transport),
            request,
            cancel,
            state: ReadState::NotStarted,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            model_seen: false,
        }
    }

    /// Run a request to completion, dispatching each event to `handler`.
    ///
    /// Exactly one of `on_done`, `on_error` or `on_fallback` fires unless the
    /// request is cancelled, in which case none does.
    pub async fn stream<H>(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
        handler: &mut H,
    ) -> StreamOutcome
    where
        H: StreamHandler + ?Sized,
    {
        let mut events = self.open(request, cancel);

        while let Some(event) = events.next().await {
            match event {
                ClientEvent::Chunk(delta) => handler.on_chunk(&delta),
                ClientEvent::Model(model) => handler.on_model(&model),
                ClientEvent::Done(full_text) => {
                    handler.on_done(&full_text);
                    return StreamOutcome::Done;
                }
                ClientEvent::Error(error) => {
                    handler.on_error(&error);
                    return StreamOutcome::InBandError;
                }
                ClientEvent::Failed(failure) => {
                    handler.on_fallback(&failure);
                    return StreamOutcome::Fallback;
                }
            }
        }

        StreamOutcome::Cancelled
    }
}

enum ReadState {
    NotStarted,
    Reading(ByteStream),
    /// Body ended; only decoded leftovers remain.
    Drained,
    Finished,
}

/// Lazy, ordered sequence of events for one request.
pub struct EventStream {
    transport: Arc<dyn AssistantTransport>,
    request: ChatRequest,
    cancel: CancellationToken,
    state: ReadState,
    decoder: FrameDecoder,
    pending: VecDeque<StreamEvent>,
    model_seen: bool,
}

impl EventStream {
    /// Next event, or `None` once the request is over or cancelled.
    pub async fn next(&mut self) -> Option<ClientEvent> {
        loop {
            if matches!(self.state, ReadState::Finished) {
                return None;
            }
            if self.cancel.is_cancelled() {
                debug!("Stream cancelled, dropping remaining events");
                self.state = ReadState::Finished;
                return None;
            }

            if let Some(event) = self.pending.pop_front() {
                if let Some(event) = self.accept(event) {
                    if event.is_terminal() {
                        self.state = ReadState::Finished;
                    }
                    return Some(event);
                }
                continue;
            }

            match std::mem::replace(&mut self.state, ReadState::Finished) {
                ReadState::NotStarted => {
                    info!(
                        conversation_id = %self.request.conversation_id,
                        message_len = self.request.message.len(),
                        "Opening assistant stream"
                    );
                    let opened = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return None,
                        opened = self.transport.open(&self.request) => opened,
                    };
                    match opened {
                        Ok(body) => self.state = ReadState::Reading(body),
                        Err(failure) => {
                            warn!(error = %failure, "Assistant stream could not be opened");
                            return Some(ClientEvent::Failed(failure));
                        }
                    }
                }
                ReadState::Reading(mut body) => {
                    let next = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return None,
                        next = body.next() => next,
                    };
                    match next {
                        Some(Ok(bytes)) => {
                            debug!(bytes = bytes.len(), "Received body fragment");
                            self.pending.extend(self.decoder.feed(&bytes));
                            self.state = ReadState::Reading(body);
                        }
                        Some(Err(failure)) => {
                            warn!(error = %failure, "Assistant stream broke while reading");
                            return Some(ClientEvent::Failed(failure));
                        }
                        None => {
                            self.pending.extend(self.decoder.finish());
                            self.state = ReadState::Drained;
                        }
                    }
                }
                ReadState::Drained => {
                    warn!(
                        frames = self.decoder.frames_accepted(),
                        "Assistant stream closed without a terminal frame"
                    );
                    return Some(ClientEvent::Failed(TransportFailure::ClosedWithoutTerminal));
                }
                ReadState::Finished => return None,
            }
        }
    }

    /// Map a decoded event, dropping repeated model selections.
    fn accept(&mut self, event: StreamEvent) -> Option<ClientEvent> {
        match event {
            StreamEvent::Chunk { text } => Some(ClientEvent::Chunk(text)),
            StreamEvent::ModelSelected { model_id } => {
                if self.model_seen {
                    debug!(model = %model_id, "Ignoring repeated model frame");
                    return None;
                }
                self.model_seen = true;
                Some(ClientEvent::Model(model_id))
            }
            StreamEvent::Done { full_text } => {
                info!(
                    frames = self.decoder.frames_accepted(),
                    discarded = self.decoder.lines_discarded(),
                    "Assistant stream completed"
                );
                Some(ClientEvent::Done(full_text))
            }
            StreamEvent::Error { message } => {
                warn!(error = %message, "Assistant reported an in-band error");
                Some(ClientEvent::Error(InBandError::new(message)))
            }
        }
    }
}
