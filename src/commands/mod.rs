pub mod analyze;
pub mod heatmap;
pub mod history;
pub mod paths;
pub mod profile;
pub mod record;
pub mod sessions;
pub mod watch;

use crate::exit_codes;
use pattern_client::api::{ApiClient, ApiError};
use pattern_client::auth::AuthContext;
use pattern_client::config::{ClientConfig, ConfigError};
use pattern_client::stream::StreamRecord;
use serde_json::Value;
use std::sync::Arc;

/// Print a command failure and pick the matching exit code
pub fn report(err: anyhow::Error) -> i32 {
    eprintln!("Error: {:#}", err);

    if err.downcast_ref::<ConfigError>().is_some() {
        return exit_codes::CONFIG_ERROR;
    }
    if let Some(api) = err.downcast_ref::<ApiError>() {
        return match api {
            ApiError::NotReplayable { .. } => exit_codes::NOT_REPLAYABLE,
            ApiError::Io { .. } | ApiError::InvalidPath(_) | ApiError::InvalidFilter(_) => {
                exit_codes::INPUT_ERROR
            }
            _ => exit_codes::SERVICE_ERROR,
        };
    }
    if err.downcast_ref::<std::io::Error>().is_some()
        || err.downcast_ref::<serde_json::Error>().is_some()
    {
        return exit_codes::INPUT_ERROR;
    }

    exit_codes::EXECUTION_ERROR
}

pub fn api_client(config: &ClientConfig, auth: &AuthContext) -> anyhow::Result<ApiClient> {
    Ok(ApiClient::new(
        &config.api_base,
        config.http_timeout(),
        Arc::new(auth.clone()),
    )?)
}

/// One-line rendering of a classified record
pub fn format_record(record: &StreamRecord) -> String {
    let label = if record.is_anomaly() { "ANOMALY" } else { "normal " };
    let fields: Vec<String> = record
        .fields()
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "anomaly" | "Anomaly"))
        .map(|(key, value)| match value {
            Value::String(s) => format!("{}={}", key, s),
            other => format!("{}={}", key, other),
        })
        .collect();

    format!("[{}] {}", label, fields.join(" "))
}
