use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Message type used for keep-alive frames.
pub const HEARTBEAT_TYPE: &str = "heartbeat";

/// The unit of wire communication.
///
/// Envelopes are serialized as a single JSON object:
/// `{ "id"?: string, "type": string, "timestamp": integer(ms), "data"?: any }`.
/// The `id` field is present when the sender expects a correlated response;
/// `data` carries an opaque application payload. Envelopes are immutable
/// after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation id; required when a response is expected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Message type tag
    #[serde(rename = "type")]
    pub kind: String,
    /// Creation time in unix milliseconds
    pub timestamp: u64,
    /// Opaque application payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Envelope {
    /// Create a fire-and-forget envelope (no correlation id).
    pub fn event(kind: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            timestamp: now_ms(),
            data,
        }
    }

    /// Create a request envelope with a fresh uuid correlation id.
    pub fn request(kind: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            id: Some(uuid::Uuid::new_v4().to_string()),
            kind: kind.into(),
            timestamp: now_ms(),
            data,
        }
    }

    /// Create a keep-alive envelope.
    pub fn heartbeat() -> Self {
        Self::event(HEARTBEAT_TYPE, None)
    }

    /// Return this envelope with a correlation id, generating one if absent.
    pub fn ensure_id(mut self) -> Self {
        if self.id.is_none() {
            self.id = Some(uuid::Uuid::new_v4().to_string());
        }
        self
    }

    /// Serialize to the wire text representation.
    pub fn encode(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::Protocol(format!("encode failed: {}", e)))
    }

    /// Decode an inbound text frame into an envelope.
    pub fn decode(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Protocol(format!("decode failed: {}", e)))
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
