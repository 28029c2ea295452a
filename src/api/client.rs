use super::error::{ApiError, ApiResult};
use super::models::{
    AnalysisResponse, BehaviorProfile, HistoryFilter, PathFlow, PathVisit, ResultRecord,
    SessionStored, SessionSummary, UploadSummary,
};
use crate::auth::CredentialProvider;
use crate::capture::SessionPayload;
use reqwest::{multipart, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default request timeout, sized for large uploads
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// HTTP client for the analysis service
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: Arc<dyn CredentialProvider>,
    ) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Underlying connection pool, shared with the session beacon
    pub fn http(&self) -> &Client {
        &self.client
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn authorized(&self, request: RequestBuilder) -> ApiResult<RequestBuilder> {
        Ok(match self.credentials.bearer_token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                error!("Request timed out: {}", e);
            } else if e.is_connect() {
                error!("Failed to connect to analysis service: {}", e);
            }
            ApiError::Request(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!("Request failed: {} - {}", status, body);
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn file_form(path: &Path) -> ApiResult<multipart::Form> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ApiError::InvalidPath(path.display().to_string()))?
            .to_string();

        let bytes = tokio::fs::read(path).await.map_err(|source| ApiError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("Prepared upload {} ({} bytes)", file_name, bytes.len());
        let part = multipart::Part::bytes(bytes).file_name(file_name);
        Ok(multipart::Form::new().part("file", part))
    }

    /// Upload a log for batch analysis
    pub async fn analyze(&self, path: &Path) -> ApiResult<AnalysisResponse> {
        info!("Uploading {} for analysis", path.display());

        let form = Self::file_form(path).await?;
        let request = self.authorized(self.client.post(self.url("/analyze"))).await?;
        let response = self.send(request.multipart(form)).await?;
        let analysis: AnalysisResponse = Self::decode(response).await?;

        info!(
            "Analysis {}: {} records, {} anomalies",
            analysis.file_id, analysis.summary.total, analysis.summary.anomalies
        );
        Ok(analysis)
    }

    /// Save the anomalous rows of an analysis to `dest`. Returns bytes written.
    pub async fn download_anomalies(&self, file_id: &str, dest: &Path) -> ApiResult<u64> {
        let written = self
            .download_to(&format!("/download/{}", file_id), dest)
            .await?;
        info!("Saved anomalies of {} to {}", file_id, dest.display());
        Ok(written)
    }

    /// Past analysis runs, newest first
    pub async fn results_history(&self, filter: &HistoryFilter) -> ApiResult<Vec<ResultRecord>> {
        if !filter.is_ordered() {
            return Err(ApiError::InvalidFilter(
                "start date is after end date".to_string(),
            ));
        }

        let request = self
            .authorized(self.client.get(self.url("/results/history")))
            .await?;
        let response = self.send(request.query(&filter.query())).await?;
        let records: Vec<ResultRecord> = Self::decode(response).await?;

        debug!("History returned {} runs", records.len());
        Ok(records)
    }

    /// Save the anomaly CSV of a past run to `dest`. Returns bytes written.
    pub async fn download_result(&self, file_id: &str, dest: &Path) -> ApiResult<u64> {
        let written = self
            .download_to(&format!("/results/download/{}", file_id), dest)
            .await?;
        info!("Saved result {} to {}", file_id, dest.display());
        Ok(written)
    }

    async fn download_to(&self, path: &str, dest: &Path) -> ApiResult<u64> {
        let request = self.authorized(self.client.get(self.url(path))).await?;
        let bytes = self.send(request).await?.bytes().await?;

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ApiError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|source| ApiError::Io {
                path: dest.to_path_buf(),
                source,
            })?;

        Ok(bytes.len() as u64)
    }

    /// Raw click log entries. A non-array body yields no entries.
    pub async fn fetch_clicks(&self) -> ApiResult<Vec<Value>> {
        let response = self.send(self.client.get(self.url("/heatmap/clicks"))).await?;
        match Self::decode::<Value>(response).await? {
            Value::Array(entries) => Ok(entries),
            other => {
                warn!("Expected a click array, got {}", json_kind(&other));
                Ok(Vec::new())
            }
        }
    }

    /// Upload a click log file
    pub async fn upload_click_log(&self, path: &Path) -> ApiResult<UploadSummary> {
        let form = Self::file_form(path).await?;
        let request = self
            .authorized(self.client.post(self.url("/upload-click-logs")))
            .await?;
        let summary: UploadSummary = Self::decode(self.send(request.multipart(form)).await?).await?;

        info!("Uploaded {} click records", summary.count);
        Ok(summary)
    }

    /// Record a single click entry
    pub async fn track_click(&self, click: &Value) -> ApiResult<()> {
        self.send(self.client.post(self.url("/clicks")).json(click))
            .await?;
        Ok(())
    }

    /// Record a page visit for the navigation flow
    pub async fn track_path(&self, visit: &PathVisit) -> ApiResult<()> {
        self.send(self.client.post(self.url("/path")).json(visit))
            .await?;
        Ok(())
    }

    pub async fn path_flow(&self) -> ApiResult<PathFlow> {
        let response = self.send(self.client.get(self.url("/paths/flow"))).await?;
        Self::decode(response).await
    }

    /// Behaviour baseline of the signed-in user. `None` until one is learned.
    pub async fn behavior_profile(&self) -> ApiResult<Option<BehaviorProfile>> {
        let request = self.authorized(self.client.get(self.url("/profile/"))).await?;
        match self.send(request).await {
            Ok(response) => Ok(Some(Self::decode(response).await?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Recorded sessions, newest first
    pub async fn list_sessions(&self) -> ApiResult<Vec<SessionSummary>> {
        let response = self.send(self.client.get(self.url("/session"))).await?;
        Self::decode(response).await
    }

    pub async fn fetch_session(&self, id: &str) -> ApiResult<SessionPayload> {
        let response = self
            .send(self.client.get(self.url(&format!("/session/{}", id))))
            .await?;
        Self::decode(response).await
    }

    pub async fn latest_session(&self) -> ApiResult<SessionPayload> {
        let response = self.send(self.client.get(self.url("/session/latest"))).await?;
        Self::decode(response).await
    }

    /// Fetch a session and reject it unless a replay could start from it
    pub async fn fetch_replayable_session(&self, id: &str) -> ApiResult<SessionPayload> {
        let session = self.fetch_session(id).await?;
        session
            .ensure_replayable()
            .map_err(|e| ApiError::NotReplayable {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        debug!("Session {} has {} events", id, session.events.len());
        Ok(session)
    }

    /// Store a session and wait for the server's verdict
    pub async fn post_session(&self, payload: &SessionPayload) -> ApiResult<SessionStored> {
        let response = self
            .send(self.client.post(self.url("/session")).json(payload))
            .await?;
        let stored: SessionStored = Self::decode(response).await?;

        if !stored.is_saved() {
            warn!(
                "Session not stored: {}",
                stored.reason.as_deref().unwrap_or(&stored.status)
            );
        }
        Ok(stored)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
