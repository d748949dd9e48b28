//! Assistant settings and the adapter that normalizes their key names.
//!
//! Settings reach the engine from config files and from other integrations
//! that do not agree on key names (`apiUrl`, `api_url`, `endpoint`, ...).
//! [`AssistantSettings::from_value`] maps every known spelling onto one
//! canonical field, so the rest of the engine sees a single shape.

use std::path::PathBuf;
use std::time::Duration;

use parley_core::ConversationId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::engine::EngineConfig;
use crate::store::DEFAULT_HISTORY_LIMIT;

/// Default streaming endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:3000/api/chat/stream";

/// Default data directory for persisted conversations.
pub const DEFAULT_DATA_DIR: &str = ".parley";

const DEFAULT_FALLBACK_DELAY_MS: u64 = 1500;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

const ENDPOINT_KEYS: &[&str] = &["endpoint", "apiUrl", "api_url", "url", "baseUrl", "streamUrl"];
const CONVERSATION_KEYS: &[&str] = &["conversation_id", "conversationId", "chatId", "chat_id"];
const DATA_DIR_KEYS: &[&str] = &["data_dir", "dataDir", "storageDir", "storage_dir"];
const FALLBACK_DELAY_KEYS: &[&str] = &["fallback_delay_ms", "fallbackDelayMs", "fallbackDelay"];
const HISTORY_LIMIT_KEYS: &[&str] = &["history_limit", "historyLimit", "maxMessages", "max_messages"];
const TIMEOUT_KEYS: &[&str] = &[
    "request_timeout_secs",
    "requestTimeoutSecs",
    "timeout",
    "timeoutSecs",
];

/// Canonical assistant settings. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantSettings {
    /// Streaming endpoint URL.
    pub endpoint: Option<String>,
    /// Conversation scope.
    pub conversation_id: Option<String>,
    /// Where conversations are stored.
    pub data_dir: Option<PathBuf>,
    /// Delay before the offline reply is shown.
    pub fallback_delay_ms: Option<u64>,
    /// Number of messages kept.
    pub history_limit: Option<usize>,
    /// Whole-request timeout.
    pub request_timeout_secs: Option<u64>,
}

impl AssistantSettings {
    /// Parse a JSON settings document, accepting any known key spelling.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::from_value(&value))
    }

    /// Normalize a loosely shaped settings object.
    ///
    /// The first present spelling in each key list wins. Values of the wrong
    /// type are logged and ignored; non-object input yields empty settings.
    pub fn from_value(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            warn!("Settings payload is not an object, ignoring");
            return Self::default();
        };

        Self {
            endpoint: pick(map, ENDPOINT_KEYS),
            conversation_id: pick(map, CONVERSATION_KEYS),
            data_dir: pick(map, DATA_DIR_KEYS),
            fallback_delay_ms: pick(map, FALLBACK_DELAY_KEYS),
            history_limit: pick(map, HISTORY_LIMIT_KEYS),
            request_timeout_secs: pick(map, TIMEOUT_KEYS),
        }
    }

    /// Overlay `other` on top of `self`; fields set in `other` win.
    pub fn merge(self, other: AssistantSettings) -> Self {
        Self {
            endpoint: other.endpoint.or(self.endpoint),
            conversation_id: other.conversation_id.or(self.conversation_id),
            data_dir: other.data_dir.or(self.data_dir),
            fallback_delay_ms: other.fallback_delay_ms.or(self.fallback_delay_ms),
            history_limit: other.history_limit.or(self.history_limit),
            request_timeout_secs: other.request_timeout_secs.or(self.request_timeout_secs),
        }
    }

    /// Endpoint, or the default.
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    /// Data directory, or the default.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    /// Request timeout, or the default.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    /// Engine configuration with defaults filled in.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            conversation_id: self
                .conversation_id
                .clone()
                .map(ConversationId::from)
                .unwrap_or_default(),
            fallback_delay: Duration::from_millis(
                self.fallback_delay_ms.unwrap_or(DEFAULT_FALLBACK_DELAY_MS),
            ),
            history_limit: self
                .history_limit
                .unwrap_or(DEFAULT_HISTORY_LIMIT)
                .max(1),
        }
    }
}

fn pick<T: DeserializeOwned>(map: &Map<String, Value>, keys: &[&str]) -> Option<T> {
    let (key, value) = keys
        .iter()
        .find_map(|k| map.get(*k).filter(|v| !v.is_null()).map(|v| (*k, v)))?;

    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(key = %key, error = %e, "Ignoring settings value of the wrong type");
            None
        }
    }
}
