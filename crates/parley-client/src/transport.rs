//! Assistant transports.
//!
//! A transport opens one request and hands back the raw response body as a
//! stream of byte fragments. It knows nothing about frames.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::error::TransportFailure;
use crate::types::{ChatRequest, WireFrame};

/// Raw response body, fragment by fragment.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportFailure>> + Send>>;

/// Opens streaming requests against the assistant service.
#[async_trait]
pub trait AssistantTransport: Send + Sync {
    /// Send `request` and return the response body.
    ///
    /// Fails with [`TransportFailure::Connect`] or [`TransportFailure::Status`]
    /// before any body byte is available.
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportFailure>;
}

/// HTTP transport that POSTs JSON to the streaming endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    inner: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Create a new HTTP transport with default client settings.
    pub fn new(endpoint: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
        }
    }

    /// Create a transport whose requests give up after `timeout`.
    pub fn with_timeout(endpoint: &str, timeout: Duration) -> Result<Self, TransportFailure> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportFailure::Connect(e.to_string()))?;
        Ok(Self {
            inner,
            endpoint: endpoint.to_string(),
        })
    }

    /// Endpoint this transport posts to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AssistantTransport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportFailure> {
        debug!(url = %self.endpoint, "POST streaming request");

        let response = self
            .inner
            .post(&self.endpoint)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, url = %self.endpoint, "Assistant endpoint unreachable");
                TransportFailure::Connect(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Assistant endpoint returned error status");
            return Err(TransportFailure::Status(status.as_u16()));
        }

        info!(status = status.as_u16(), "Streaming response opened");

        let body = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| TransportFailure::Read(e.to_string()))
        });
        Ok(Box::pin(body))
    }
}

/// One canned reply for [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Fail before any body is returned.
    Refuse(TransportFailure),
    /// Return these fragments, then end the body.
    Body(Vec<Result<Vec<u8>, TransportFailure>>),
    /// Return these fragments, then never produce another one.
    Stall(Vec<Vec<u8>>),
}

/// In-memory transport that replays scripted replies in order.
///
/// Useful for offline sessions and for driving the engine in tests. Requests
/// with no reply left are refused.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    /// Create a transport with no scripted replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply.
    pub fn push(&self, reply: ScriptedReply) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }

    /// Queue a body made of raw text fragments.
    pub fn push_fragments<I, S>(&self, fragments: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let body = fragments
            .into_iter()
            .map(|f| Ok(f.as_ref().to_vec()))
            .collect();
        self.push(ScriptedReply::Body(body));
    }

    /// Queue a body with one fragment per frame.
    pub fn push_frames(&self, frames: &[WireFrame]) -> Result<(), serde_json::Error> {
        let lines = frames
            .iter()
            .map(WireFrame::to_line)
            .collect::<Result<Vec<_>, _>>()?;
        self.push_fragments(lines);
        Ok(())
    }

    /// Queue a refusal.
    pub fn push_failure(&self, failure: TransportFailure) {
        self.push(ScriptedReply::Refuse(failure));
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl AssistantTransport for ScriptedTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportFailure> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match reply {
            None => Err(TransportFailure::Connect("no scripted reply".to_string())),
            Some(ScriptedReply::Refuse(failure)) => Err(failure),
            Some(ScriptedReply::Body(fragments)) => Ok(Box::pin(tokio_stream::iter(fragments))),
            Some(ScriptedReply::Stall(fragments)) => {
                let head =
                    tokio_stream::iter(fragments.into_iter().map(Ok::<_, TransportFailure>));
                Ok(Box::pin(head.chain(tokio_stream::pending())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/api/chat/stream", addr)
    }

    async fn collect(mut body: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend(chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_http_transport_streams_body() {
        let router = Router::new().route(
            "/api/chat/stream",
            post(|Json(body): Json<Value>| async move {
                let echo = format!(
                    "{}|{}",
                    body["message"].as_str().unwrap_or_default(),
                    body["conversationId"].as_str().unwrap_or_default()
                );
                WireFrame::Chunk { content: echo }.to_line().unwrap()
            }),
        );
        let url = serve(router).await;

        let transport = HttpTransport::new(&url);
        let body = transport
            .open(&ChatRequest::new("hello", "conv-9"))
            .await
            .unwrap();
        let text = String::from_utf8(collect(body).await).unwrap();

        assert_eq!(text, "data: {\"type\":\"chunk\",\"content\":\"hello|conv-9\"}\n");
    }

    #[tokio::test]
    async fn test_http_transport_non_success_status() {
        let router = Router::new().route(
            "/api/chat/stream",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let url = serve(router).await;

        let transport = HttpTransport::new(&url);
        let result = transport.open(&ChatRequest::new("hello", "default")).await;

        assert!(matches!(result, Err(TransportFailure::Status(500))));
    }

    #[tokio::test]
    async fn test_http_transport_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::with_timeout(
            &format!("http://{}/api/chat/stream", addr),
            Duration::from_secs(5),
        )
        .unwrap();
        let result = transport.open(&ChatRequest::new("hello", "default")).await;

        assert!(matches!(result, Err(TransportFailure::Connect(_))));
    }

    #[tokio::test]
    async fn test_scripted_transport_replays_in_order() {
        let transport = ScriptedTransport::new();
        transport.push_failure(TransportFailure::Status(503));
        transport.push_fragments(["ab", "c"]);

        let first = transport.open(&ChatRequest::new("one", "default")).await;
        assert!(matches!(first, Err(TransportFailure::Status(503))));

        let second = transport
            .open(&ChatRequest::new("two", "default"))
            .await
            .unwrap();
        assert_eq!(collect(second).await, b"abc");

        let third = transport.open(&ChatRequest::new("three", "default")).await;
        assert!(matches!(third, Err(TransportFailure::Connect(_))));

        let messages: Vec<_> = transport
            .requests()
            .into_iter()
            .map(|r| r.message)
            .collect();
        assert_eq!(messages, vec!["one", "two", "three"]);
    }
}
