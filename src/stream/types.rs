// Common types for the live feed

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Result type for live feed operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors that can occur on the live feed
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Credential error: {0}")]
    Credentials(#[from] crate::auth::AuthError),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),
}

/// A classified event record pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamRecord(Map<String, Value>);

impl StreamRecord {
    /// Decode one text frame; anything but a JSON object is rejected
    pub fn from_frame(text: &str) -> StreamResult<Self> {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(fields)) => Ok(Self(fields)),
            Ok(other) => Err(StreamError::Parse(format!(
                "expected JSON object, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(StreamError::Parse(format!("Invalid JSON: {}", e))),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Anomaly indicator; the analysis service emits either casing
    pub fn anomaly_flag(&self) -> Option<&Value> {
        self.0.get("anomaly").or_else(|| self.0.get("Anomaly"))
    }

    pub fn is_anomaly(&self) -> bool {
        match self.anomaly_flag() {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|v| v == 1.0).unwrap_or(false),
            Some(Value::String(s)) => matches!(s.trim(), "1" | "true" | "anomaly"),
            _ => false,
        }
    }
}

impl From<Map<String, Value>> for StreamRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Connection lifecycle of a live feed consumer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum ConnectionState {
    /// Fetching credentials and opening the transport
    Connecting,

    /// Transport open, records flowing
    Connected,

    /// Waiting for the reconnect timer
    Reconnecting { attempt: u64 },

    /// Closed by the owner; terminal
    Closed,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Connecting
    }
}

/// Counters for a live feed consumer
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StreamStats {
    pub records_received: u64,
    pub records_dispatched: u64,
    pub malformed_frames: u64,
    pub connection_attempts: u64,
    pub reconnects_scheduled: u64,
}

/// Anomaly breakdown over the most recent records
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveSummary {
    pub considered: usize,
    pub anomalies: usize,
    pub normal: usize,
}
