// Interaction density heatmap
//
// Points are ingested once, sorted by timestamp, and re-aggregated on demand
// for any time bound. Aggregation is pure; the loaded set is never mutated by
// a query.

pub mod field;
pub mod point;

pub use field::{Cell, DensityField, HeatmapConfig};
pub use point::ClickPoint;

use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct HeatmapAggregator {
    config: HeatmapConfig,
    points: Vec<ClickPoint>,
    range: Option<(f64, f64)>,
}

impl HeatmapAggregator {
    /// Non-positive or non-finite geometry falls back to the defaults
    pub fn new(config: HeatmapConfig) -> Self {
        let defaults = HeatmapConfig::default();
        let positive = |v: f64, fallback: f64| {
            if v.is_finite() && v > 0.0 {
                v
            } else {
                fallback
            }
        };

        Self {
            config: HeatmapConfig {
                radius: positive(config.radius, defaults.radius),
                max_intensity: positive(config.max_intensity, defaults.max_intensity),
                cell_size: positive(config.cell_size, defaults.cell_size),
            },
            points: Vec::new(),
            range: None,
        }
    }

    pub fn config(&self) -> &HeatmapConfig {
        &self.config
    }

    /// Replace the point set. Points are stored in ascending timestamp order;
    /// equal timestamps keep their input order. Points with a non-finite
    /// coordinate or timestamp are dropped; returns how many.
    pub fn load(&mut self, mut points: Vec<ClickPoint>) -> usize {
        let received = points.len();
        points.retain(ClickPoint::is_finite);
        let dropped = received - points.len();
        if dropped > 0 {
            warn!("Dropped {} non-finite click points", dropped);
        }

        points.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        self.range = match (points.first(), points.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        };
        self.points = points;

        debug!("Loaded {} click points, range {:?}", self.points.len(), self.range);
        dropped
    }

    /// Load raw click log entries, dropping malformed ones.
    /// Returns how many entries were dropped.
    pub fn load_json(&mut self, values: &[Value]) -> usize {
        let points: Vec<ClickPoint> = values.iter().filter_map(ClickPoint::from_value).collect();
        let dropped = values.len() - points.len();
        if dropped > 0 {
            warn!("Dropped {} malformed click entries", dropped);
        }

        dropped + self.load(points)
    }

    /// `(min, max)` timestamp of the loaded set
    pub fn range(&self) -> Option<(f64, f64)> {
        self.range
    }

    pub fn points(&self) -> &[ClickPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points with `timestamp <= at`, in timestamp order
    pub fn visible(&self, at: f64) -> &[ClickPoint] {
        let end = self.points.partition_point(|p| p.timestamp <= at);
        &self.points[..end]
    }

    /// Density of every point recorded up to `at`
    pub fn density(&self, at: f64) -> DensityField {
        DensityField::build(&self.config, self.visible(at))
    }
}
