//! Client-side telemetry and replay pipeline for the User Pattern Analyzer.
//!
//! - [`stream`]: resilient live feed consumer with debounced notifications
//! - [`capture`]: session recording with a replayability gate on every flush
//! - [`reveal`]: progressive reveal of large analysis results
//! - [`heatmap`]: time-bounded interaction density aggregation
//! - [`api`]: HTTP client for analysis, click logs and recorded sessions

pub mod api;
pub mod auth;
pub mod capture;
pub mod config;
pub mod heatmap;
pub mod reveal;
pub mod stream;
pub mod window;

pub use api::{ApiClient, ApiError, ApiResult};
pub use auth::{AuthContext, AuthError, CredentialProvider};
pub use capture::{CaptureHandle, CaptureHub, CapturedEvent, FlushOutcome, RecordingCapture};
pub use config::{ClientConfig, ConfigError};
pub use heatmap::{ClickPoint, DensityField, HeatmapAggregator};
pub use reveal::{BatchRevealer, RevealCancel, RevealProgress};
pub use stream::{ConnectionState, StreamConsumer, StreamHandle, StreamRecord};
pub use window::RollingWindow;
