//! Sampling interface shared by the spatial hazard readers.

use geo::{LineString, Point};
use netrisk_network_models::{Extent, HazardStat};

/// Statistics of the hazard values one element touches.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SampleStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    /// Share of the element's length lying in hazard-positive area, in
    /// `[0, 1]`.
    pub fraction: f64,
}

impl SampleStats {
    /// Stats of a set of valid values. Empty input yields no data.
    #[must_use]
    pub fn from_values(values: &[f64], fraction: f64) -> Self {
        if values.is_empty() {
            return Self {
                fraction,
                ..Self::default()
            };
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        #[allow(clippy::cast_precision_loss)]
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Self {
            min: Some(min),
            max: Some(max),
            mean: Some(mean),
            fraction,
        }
    }

    /// A single value, as produced by a point lookup or table join.
    #[must_use]
    pub fn constant(value: Option<f64>) -> Self {
        Self {
            min: value,
            max: value,
            mean: value,
            fraction: if value.is_some_and(|v| v > 0.0) { 1.0 } else { 0.0 },
        }
    }

    #[must_use]
    pub const fn get(&self, stat: HazardStat) -> Option<f64> {
        match stat {
            HazardStat::Min => self.min,
            HazardStat::Max => self.max,
            HazardStat::Mean => self.mean,
            HazardStat::Fraction => Some(self.fraction),
        }
    }
}

/// A hazard map that can be sampled along lines and at points.
///
/// Geometries passed in are already in the source's CRS.
pub trait HazardSampler: Send + Sync {
    /// Bounding box of the map, `None` if it holds no features.
    fn extent(&self) -> Option<Extent>;

    /// Stats over every cell or polygon the line touches.
    fn sample_line(&self, line: &LineString<f64>) -> SampleStats;

    /// Value at a point.
    fn sample_point(&self, point: Point<f64>) -> SampleStats;
}
