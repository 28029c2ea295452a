// Session capture types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Event kind reserved for full-state snapshots
pub const FULL_SNAPSHOT_KIND: u32 = 2;

pub type CaptureResult<T> = Result<T, CaptureError>;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Session is not replayable: {0}")]
    NotReplayable(String),
}

/// One event emitted by the instrumentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedEvent {
    #[serde(rename = "type")]
    pub kind: u32,

    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl CapturedEvent {
    pub fn new(kind: u32, payload: Map<String, Value>) -> Self {
        Self { kind, payload }
    }

    pub fn full_snapshot(payload: Map<String, Value>) -> Self {
        Self::new(FULL_SNAPSHOT_KIND, payload)
    }

    pub fn is_full_snapshot(&self) -> bool {
        self.kind == FULL_SNAPSHOT_KIND
    }
}

/// A batch is replayable iff it holds at least one full-state snapshot
pub fn is_replayable(events: &[CapturedEvent]) -> bool {
    events.iter().any(CapturedEvent::is_full_snapshot)
}

/// Wire body shared by the capture sink and the session endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPayload {
    #[serde(default)]
    pub events: Vec<CapturedEvent>,
}

impl SessionPayload {
    pub fn is_replayable(&self) -> bool {
        is_replayable(&self.events)
    }

    /// Reject sessions a replay engine could not start from
    pub fn ensure_replayable(&self) -> CaptureResult<()> {
        if self.events.is_empty() {
            return Err(CaptureError::NotReplayable("no session events".to_string()));
        }
        if !self.is_replayable() {
            return Err(CaptureError::NotReplayable(
                "session has no full snapshot".to_string(),
            ));
        }
        Ok(())
    }
}

/// Borrowed form of `SessionPayload` used when flushing
#[derive(Serialize)]
pub(crate) struct SessionPayloadRef<'a> {
    pub events: &'a [CapturedEvent],
}

/// Events accumulated since the last successful flush
#[derive(Debug)]
pub struct RecordingSession {
    events: Vec<CapturedEvent>,
    started_at: DateTime<Utc>,
    total_captured: u64,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            started_at: Utc::now(),
            total_captured: 0,
        }
    }

    pub fn push(&mut self, event: CapturedEvent) {
        self.events.push(event);
        self.total_captured += 1;
    }

    pub fn events(&self) -> &[CapturedEvent] {
        &self.events
    }

    pub fn has_full_snapshot(&self) -> bool {
        is_replayable(&self.events)
    }

    /// Remove and return every buffered event
    pub fn take(&mut self) -> Vec<CapturedEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn total_captured(&self) -> u64 {
        self.total_captured
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a flush was attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlushReason {
    Periodic,
    Manual,
    Stop,
    Teardown,
}

/// Result of one flush attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome")]
pub enum FlushOutcome {
    /// Nothing buffered
    Empty,

    /// No full snapshot yet; buffer retained for a later attempt
    MissingSnapshot { buffered: usize },

    /// Buffer could not be encoded; retained
    Unserializable { buffered: usize },

    /// Handed to the sink and cleared
    Delivered { events: usize },
}

/// Lifecycle of a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureState {
    Recording,
    Stopped,
    TornDown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureStats {
    pub events_captured: u64,
    pub events_delivered: u64,
    pub flushes_delivered: u64,
    pub flushes_skipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format_keeps_extra_fields() {
        let event: CapturedEvent =
            serde_json::from_value(json!({"type": 3, "timestamp": 1700, "data": {"source": 2}}))
                .unwrap();

        assert_eq!(event.kind, 3);
        assert_eq!(event.payload["timestamp"], json!(1700));

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["type"], json!(3));
        assert_eq!(back["data"]["source"], json!(2));
    }

    #[test]
    fn test_replayable_requires_snapshot() {
        let incremental = CapturedEvent::new(3, Map::new());
        let snapshot = CapturedEvent::full_snapshot(Map::new());

        assert!(!is_replayable(&[]));
        assert!(!is_replayable(&[incremental.clone()]));
        assert!(is_replayable(&[incremental, snapshot]));
    }

    #[test]
    fn test_ensure_replayable_reasons() {
        let empty = SessionPayload::default();
        assert!(matches!(
            empty.ensure_replayable(),
            Err(CaptureError::NotReplayable(msg)) if msg.contains("no session events")
        ));

        let no_snapshot = SessionPayload {
            events: vec![CapturedEvent::new(4, Map::new())],
        };
        assert!(matches!(
            no_snapshot.ensure_replayable(),
            Err(CaptureError::NotReplayable(msg)) if msg.contains("full snapshot")
        ));
    }

    #[test]
    fn test_session_take_clears() {
        let mut session = RecordingSession::new();
        session.push(CapturedEvent::new(3, Map::new()));
        session.push(CapturedEvent::full_snapshot(Map::new()));

        assert!(session.has_full_snapshot());
        assert_eq!(session.take().len(), 2);
        assert!(session.is_empty());
        assert_eq!(session.total_captured(), 2);
    }
}
