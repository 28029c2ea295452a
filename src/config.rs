use crate::auth::{AuthContext, FileTokenSource, StaticTokenSource};
use crate::capture::CaptureConfig;
use crate::heatmap::HeatmapConfig;
use crate::reveal::RevealConfig;
use crate::stream::StreamConsumerConfig;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Client configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// HTTP base of the analysis service
    pub api_base: String,
    /// Websocket base of the live feed
    pub ws_base: String,
    /// Static bearer token
    pub auth_token: Option<String>,
    /// File holding the bearer token, re-read for every request
    pub auth_token_file: Option<PathBuf>,
    pub stream_debounce_ms: u64,
    pub stream_reconnect_ms: u64,
    pub stream_window_capacity: usize,
    pub capture_flush_secs: u64,
    pub reveal_chunk_size: usize,
    pub reveal_interval_ms: u64,
    pub heatmap_radius: f64,
    pub heatmap_max_intensity: f64,
    pub heatmap_cell_size: f64,
    pub http_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000".to_string(),
            ws_base: "ws://localhost:8000".to_string(),
            auth_token: None,
            auth_token_file: None,
            stream_debounce_ms: 50,
            stream_reconnect_ms: 5000,
            stream_window_capacity: 100,
            capture_flush_secs: 10,
            reveal_chunk_size: 50,
            reveal_interval_ms: 100,
            heatmap_radius: 40.0,
            heatmap_max_intensity: 5.0,
            heatmap_cell_size: 10.0,
            http_timeout_secs: 300,
        }
    }
}

impl ClientConfig {
    /// Load configuration from `.env` and the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            api_base: non_empty("API_BASE").unwrap_or(defaults.api_base),
            ws_base: non_empty("WS_BASE").unwrap_or(defaults.ws_base),
            auth_token: non_empty("AUTH_TOKEN"),
            auth_token_file: non_empty("AUTH_TOKEN_FILE").map(PathBuf::from),
            stream_debounce_ms: parse_var(&lookup, "STREAM_DEBOUNCE_MS", defaults.stream_debounce_ms)?,
            stream_reconnect_ms: parse_var(&lookup, "STREAM_RECONNECT_MS", defaults.stream_reconnect_ms)?,
            stream_window_capacity: parse_var(
                &lookup,
                "STREAM_WINDOW_CAPACITY",
                defaults.stream_window_capacity,
            )?,
            capture_flush_secs: parse_var(&lookup, "CAPTURE_FLUSH_SECS", defaults.capture_flush_secs)?,
            reveal_chunk_size: parse_var(&lookup, "REVEAL_CHUNK_SIZE", defaults.reveal_chunk_size)?,
            reveal_interval_ms: parse_var(&lookup, "REVEAL_INTERVAL_MS", defaults.reveal_interval_ms)?,
            heatmap_radius: parse_var(&lookup, "HEATMAP_RADIUS", defaults.heatmap_radius)?,
            heatmap_max_intensity: parse_var(
                &lookup,
                "HEATMAP_MAX_INTENSITY",
                defaults.heatmap_max_intensity,
            )?,
            heatmap_cell_size: parse_var(&lookup, "HEATMAP_CELL_SIZE", defaults.heatmap_cell_size)?,
            http_timeout_secs: parse_var(&lookup, "HTTP_TIMEOUT_SECS", defaults.http_timeout_secs)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall timers or disable buffers
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero_checks = [
            ("STREAM_DEBOUNCE_MS", self.stream_debounce_ms == 0),
            ("STREAM_RECONNECT_MS", self.stream_reconnect_ms == 0),
            ("STREAM_WINDOW_CAPACITY", self.stream_window_capacity == 0),
            ("CAPTURE_FLUSH_SECS", self.capture_flush_secs == 0),
            ("REVEAL_CHUNK_SIZE", self.reveal_chunk_size == 0),
            ("REVEAL_INTERVAL_MS", self.reveal_interval_ms == 0),
            ("HTTP_TIMEOUT_SECS", self.http_timeout_secs == 0),
        ];
        if let Some((key, _)) = zero_checks.iter().find(|(_, is_zero)| *is_zero) {
            return Err(ConfigError::InvalidValue(format!("{} must be greater than 0", key)));
        }

        for (key, value) in [
            ("HEATMAP_RADIUS", self.heatmap_radius),
            ("HEATMAP_MAX_INTENSITY", self.heatmap_max_intensity),
            ("HEATMAP_CELL_SIZE", self.heatmap_cell_size),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be a positive number",
                    key
                )));
            }
        }

        Ok(())
    }

    /// Credential context for the configured token, anonymous if none.
    /// A token file takes precedence over a static token.
    pub fn auth_context(&self) -> AuthContext {
        if let Some(path) = &self.auth_token_file {
            return AuthContext::new(Arc::new(FileTokenSource::new(path.clone())));
        }
        match &self.auth_token {
            Some(token) => AuthContext::new(Arc::new(StaticTokenSource::new(token.clone()))),
            None => AuthContext::anonymous(),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn stream(&self) -> StreamConsumerConfig {
        StreamConsumerConfig {
            ws_base: self.ws_base.clone(),
            debounce: Duration::from_millis(self.stream_debounce_ms),
            reconnect_delay: Duration::from_millis(self.stream_reconnect_ms),
            window_capacity: self.stream_window_capacity,
        }
    }

    pub fn capture(&self) -> CaptureConfig {
        CaptureConfig {
            flush_interval: Duration::from_secs(self.capture_flush_secs),
        }
    }

    pub fn reveal(&self) -> RevealConfig {
        RevealConfig {
            chunk_size: self.reveal_chunk_size,
            interval: Duration::from_millis(self.reveal_interval_ms),
        }
    }

    pub fn heatmap(&self) -> HeatmapConfig {
        HeatmapConfig {
            radius: self.heatmap_radius,
            max_intensity: self.heatmap_max_intensity,
            cell_size: self.heatmap_cell_size,
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{}={:?} is not valid", key, raw))),
        _ => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());

        let stream = config.stream();
        assert_eq!(stream.debounce, Duration::from_millis(50));
        assert_eq!(stream.reconnect_delay, Duration::from_secs(5));
        assert_eq!(stream.window_capacity, 100);
        assert_eq!(config.capture().flush_interval, Duration::from_secs(10));
        assert_eq!(config.reveal().chunk_size, 50);
        assert_eq!(config.heatmap(), HeatmapConfig::default());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("API_BASE", "https://api.example.org"),
            ("WS_BASE", "wss://api.example.org"),
            ("STREAM_WINDOW_CAPACITY", " 25 "),
            ("HEATMAP_RADIUS", "12.5"),
        ]))
        .unwrap();

        assert_eq!(config.api_base, "https://api.example.org");
        assert_eq!(config.stream().ws_base, "wss://api.example.org");
        assert_eq!(config.stream_window_capacity, 25);
        assert_eq!(config.heatmap().radius, 12.5);
    }

    #[test]
    fn test_zero_values_are_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[("REVEAL_INTERVAL_MS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(msg) if msg.contains("REVEAL_INTERVAL_MS")));

        let err = ClientConfig::from_lookup(lookup(&[("HEATMAP_CELL_SIZE", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_unparsable_value_is_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[("STREAM_DEBOUNCE_MS", "fast")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(msg) if msg.contains("STREAM_DEBOUNCE_MS")));
    }

    #[test]
    fn test_auth_context_selection() {
        let anonymous = ClientConfig::default();
        assert!(anonymous.auth_context().is_anonymous());

        let with_token = ClientConfig {
            auth_token: Some("abc".to_string()),
            ..ClientConfig::default()
        };
        assert!(!with_token.auth_context().is_anonymous());
    }
}
