// Session capture
//
// Architecture:
// - `source`: instrumentation event sources and the in-process hub
// - `recorder`: buffering, periodic flush and shutdown paths
// - `sink`: fire-and-forget delivery of serialized sessions
// - `types`: events, payloads and flush outcomes

pub mod recorder;
pub mod sink;
pub mod source;
pub mod types;

pub use recorder::{CaptureConfig, CaptureHandle, RecordingCapture, DEFAULT_FLUSH_INTERVAL};
pub use sink::{CaptureSink, HttpBeacon};
pub use source::{CaptureHub, InstrumentationSource};
pub use types::{
    is_replayable, CaptureError, CaptureResult, CaptureState, CaptureStats, CapturedEvent,
    FlushOutcome, FlushReason, RecordingSession, SessionPayload, FULL_SNAPSHOT_KIND,
};
