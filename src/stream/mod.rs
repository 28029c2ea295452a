// Live feed of classified records
//
// Architecture:
// - `transport`: pluggable connection layer (websocket in production)
// - `debounce`: burst collapsing for consumer notifications
// - `consumer`: connection lifecycle, reconnect scheduling and the rolling window
// - `types`: records, state and errors

pub mod consumer;
pub mod debounce;
pub mod transport;
pub mod types;

pub use consumer::{StreamConsumer, StreamConsumerConfig, StreamHandle};
pub use debounce::{DebounceState, Debouncer};
pub use transport::{feed_url, FeedEvent, FeedTransport, WebSocketTransport};
pub use types::{ConnectionState, LiveSummary, StreamError, StreamRecord, StreamResult, StreamStats};
