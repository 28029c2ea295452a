// Density grid
//
// The plane is split into square cells. Each visible point adds unit weight
// to every cell whose centre lies within the radius of the point. Stored
// intensities are capped at `max_intensity`.

use super::point::ClickPoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_RADIUS: f64 = 40.0;
pub const DEFAULT_MAX_INTENSITY: f64 = 5.0;
pub const DEFAULT_CELL_SIZE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapConfig {
    pub radius: f64,
    pub max_intensity: f64,
    pub cell_size: f64,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            radius: DEFAULT_RADIUS,
            max_intensity: DEFAULT_MAX_INTENSITY,
            cell_size: DEFAULT_CELL_SIZE,
        }
    }
}

/// Cell coordinate `(column, row)`
pub type Cell = (i64, i64);

#[derive(Debug, Clone, PartialEq)]
pub struct DensityField {
    pub cell_size: f64,
    pub radius: f64,
    pub max_intensity: f64,
    /// Raw points the field was built from
    pub points: Vec<ClickPoint>,
    cells: BTreeMap<Cell, f64>,
}

impl DensityField {
    pub fn empty(config: &HeatmapConfig) -> Self {
        Self {
            cell_size: config.cell_size,
            radius: config.radius,
            max_intensity: config.max_intensity,
            points: Vec::new(),
            cells: BTreeMap::new(),
        }
    }

    pub(crate) fn build(config: &HeatmapConfig, points: &[ClickPoint]) -> Self {
        let mut field = Self::empty(config);
        let cs = config.cell_size;
        let r = config.radius;
        let r2 = r * r;

        for p in points {
            let (col_lo, col_hi) = (((p.x - r) / cs).floor() as i64, ((p.x + r) / cs).floor() as i64);
            let (row_lo, row_hi) = (((p.y - r) / cs).floor() as i64, ((p.y + r) / cs).floor() as i64);

            for col in col_lo..=col_hi {
                let dx = (col as f64 + 0.5) * cs - p.x;
                for row in row_lo..=row_hi {
                    let dy = (row as f64 + 0.5) * cs - p.y;
                    if dx * dx + dy * dy <= r2 {
                        *field.cells.entry((col, row)).or_insert(0.0) += 1.0;
                    }
                }
            }
        }

        for value in field.cells.values_mut() {
            *value = value.min(config.max_intensity);
        }
        field.points = points.to_vec();
        field
    }

    /// Intensity of the cell containing `(x, y)`
    pub fn value_at(&self, x: f64, y: f64) -> f64 {
        let cell = (
            (x / self.cell_size).floor() as i64,
            (y / self.cell_size).floor() as i64,
        );
        self.cells.get(&cell).copied().unwrap_or(0.0)
    }

    /// `value_at` scaled into `[0, 1]`
    pub fn normalized_at(&self, x: f64, y: f64) -> f64 {
        if self.max_intensity <= 0.0 {
            return 0.0;
        }
        self.value_at(x, y) / self.max_intensity
    }

    /// Non-empty cells ordered by column, then row
    pub fn cells(&self) -> impl Iterator<Item = (Cell, f64)> + '_ {
        self.cells.iter().map(|(cell, value)| (*cell, *value))
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn peak(&self) -> f64 {
        self.cells.values().copied().fold(0.0, f64::max)
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_point_covers_radius() {
        let field = DensityField::build(&HeatmapConfig::default(), &[ClickPoint::new(100.0, 100.0, 0.0)]);

        assert_eq!(field.value_at(100.0, 100.0), 1.0);
        assert_eq!(field.value_at(130.0, 100.0), 1.0);
        assert_eq!(field.value_at(150.0, 100.0), 0.0);
        assert_eq!(field.value_at(130.0, 130.0), 0.0);
    }

    #[test]
    fn test_intensity_is_capped() {
        let points = vec![ClickPoint::new(50.0, 50.0, 0.0); 8];
        let field = DensityField::build(&HeatmapConfig::default(), &points);

        assert_eq!(field.value_at(50.0, 50.0), 5.0);
        assert_eq!(field.normalized_at(50.0, 50.0), 1.0);
        assert_eq!(field.peak(), 5.0);
        assert_eq!(field.point_count(), 8);
    }

    #[test]
    fn test_empty_field() {
        let field = DensityField::build(&HeatmapConfig::default(), &[]);
        assert!(field.is_empty());
        assert_eq!(field.cell_count(), 0);
        assert_eq!(field.peak(), 0.0);
    }
}
