use crate::stream::StreamRecord;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Day format of the history filters
pub const HISTORY_DATE_FORMAT: &str = "%d-%m-%Y";

/// Timestamp format of history entries
pub const HISTORY_TIMESTAMP_FORMAT: &str = "%d/%m/%Y, %H:%M:%S";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total: u64,
    pub anomalies: u64,
    pub normal: u64,
}

/// Response of `POST /analyze`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub summary: AnalysisSummary,
    #[serde(default)]
    pub rows: Vec<Value>,
    pub file_id: String,
}

impl AnalysisResponse {
    /// Rows that are JSON objects, as records. Other rows are skipped.
    pub fn records(&self) -> Vec<StreamRecord> {
        self.rows
            .iter()
            .filter_map(|row| row.as_object().cloned().map(StreamRecord::from))
            .collect()
    }
}

/// Response of `POST /upload-click-logs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSummary {
    pub count: u64,
    #[serde(default)]
    pub status: Option<String>,
}

/// One entry of `GET /session`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: String,
}

/// Response of `POST /session`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStored {
    pub status: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub events: Option<u64>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl SessionStored {
    /// The server drops sessions without a full snapshot instead of failing
    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }
}

/// Filters of `GET /results/history`. Both days are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Case-insensitive file name substring
    pub filename: Option<String>,
}

impl HistoryFilter {
    /// Parse a `DD-MM-YYYY` day
    pub fn parse_day(text: &str) -> Result<NaiveDate, String> {
        NaiveDate::parse_from_str(text.trim(), HISTORY_DATE_FORMAT)
            .map_err(|_| format!("'{}' is not a DD-MM-YYYY date", text))
    }

    pub fn is_ordered(&self) -> bool {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        }
    }

    /// Query parameters; unset filters are omitted
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(start) = self.start_date {
            query.push(("start_date", start.format(HISTORY_DATE_FORMAT).to_string()));
        }
        if let Some(end) = self.end_date {
            query.push(("end_date", end.format(HISTORY_DATE_FORMAT).to_string()));
        }
        if let Some(filename) = self.filename.as_deref().filter(|f| !f.is_empty()) {
            query.push(("filename", filename.to_string()));
        }
        query
    }
}

/// One past analysis run from `GET /results/history`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub file_id: String,
    pub file_name: String,
    pub timestamp: String,
    pub total_records: u64,
    pub anomaly_count: u64,
}

impl ResultRecord {
    pub fn analyzed_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.timestamp, HISTORY_TIMESTAMP_FORMAT).ok()
    }

    /// Share of anomalous records, 0 for an empty run
    pub fn anomaly_rate(&self) -> f64 {
        if self.total_records == 0 {
            0.0
        } else {
            self.anomaly_count as f64 / self.total_records as f64
        }
    }
}

/// Body of `POST /path`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathVisit {
    pub pathname: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl PathVisit {
    pub fn now(pathname: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    /// Visits recorded without a pathname produce an unnamed node
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowLink {
    pub source: usize,
    pub target: usize,
    pub value: u64,
}

/// Page-to-page transition counts from `GET /paths/flow`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathFlow {
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub links: Vec<FlowLink>,
}

/// A resolved flow link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition<'a> {
    pub from: Option<&'a str>,
    pub to: Option<&'a str>,
    pub count: u64,
}

impl PathFlow {
    /// Links resolved to node names, busiest first. Links pointing outside
    /// the node list are skipped.
    pub fn transitions(&self) -> Vec<Transition<'_>> {
        let name = |idx: usize| self.nodes.get(idx).map(|n| n.name.as_deref());
        let mut transitions: Vec<Transition<'_>> = self
            .links
            .iter()
            .filter_map(|link| {
                Some(Transition {
                    from: name(link.source)?,
                    to: name(link.target)?,
                    count: link.value,
                })
            })
            .collect();
        transitions.sort_by(|a, b| b.count.cmp(&a.count));
        transitions
    }
}

/// Learned behaviour baseline from `GET /profile/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorProfile {
    pub avg_login_hour: f64,
    pub avg_files_accessed: f64,
    pub avg_session_duration: f64,
    /// Comma-separated
    #[serde(default)]
    pub common_file_types: String,
    /// Comma-separated
    #[serde(default)]
    pub frequent_regions: String,
    /// Comma-separated weekday numbers, Monday is 0
    #[serde(default)]
    pub weekdays_active: String,
}

impl BehaviorProfile {
    pub fn file_types(&self) -> Vec<&str> {
        split_list(&self.common_file_types)
    }

    pub fn regions(&self) -> Vec<&str> {
        split_list(&self.frequent_regions)
    }

    /// Active weekdays as `chrono::Weekday`; unknown entries are skipped
    pub fn weekdays(&self) -> Vec<chrono::Weekday> {
        split_list(&self.weekdays_active)
            .into_iter()
            .filter_map(|day| day.parse::<u8>().ok())
            .filter_map(|day| chrono::Weekday::try_from(day).ok())
            .collect()
    }
}

fn split_list(list: &str) -> Vec<&str> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}
