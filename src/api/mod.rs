// Analysis service HTTP API
//
// Batch analysis, anomaly downloads, results history, click logs, navigation
// paths, behaviour profiles and recorded sessions.

pub mod client;
pub mod error;
pub mod models;

pub use client::{ApiClient, DEFAULT_TIMEOUT};
pub use error::{ApiError, ApiResult};
pub use models::{
    AnalysisResponse, AnalysisSummary, BehaviorProfile, FlowLink, FlowNode, HistoryFilter,
    PathFlow, PathVisit, ResultRecord, SessionStored, SessionSummary, Transition, UploadSummary,
};
