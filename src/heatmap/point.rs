use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One recorded interaction position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClickPoint {
    pub x: f64,
    pub y: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: f64,
}

impl ClickPoint {
    pub fn new(x: f64, y: f64, timestamp: f64) -> Self {
        Self { x, y, timestamp }
    }

    /// All coordinates and the timestamp are finite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.timestamp.is_finite()
    }

    /// Parse a raw click log entry.
    ///
    /// `x` and `y` must be finite JSON numbers. The timestamp may be a number
    /// of milliseconds or an RFC 3339 string. Anything else yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let x = finite(object.get("x")?.as_f64()?)?;
        let y = finite(object.get("y")?.as_f64()?)?;
        let timestamp = match object.get("timestamp")? {
            Value::Number(n) => finite(n.as_f64()?)?,
            Value::String(s) => DateTime::parse_from_rfc3339(s).ok()?.timestamp_millis() as f64,
            _ => return None,
        };

        Some(Self { x, y, timestamp })
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}
