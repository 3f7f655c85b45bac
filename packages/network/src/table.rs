//! A flat table of features used as an overlay target when hazard
//! statistics are wanted per feature rather than on a graph.

use std::collections::BTreeMap;
use std::path::Path;

use geo::{LineString, Point};
use netrisk_network_models::{AttributeValue, Crs, HazardKey};

use crate::NetworkError;
use crate::loader::{line_from, parse_features};

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureGeometry {
    Line(LineString<f64>),
    Point(Point<f64>),
}

#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: FeatureGeometry,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub hazard: BTreeMap<HazardKey, Option<f64>>,
}

impl Feature {
    #[must_use]
    pub const fn new(geometry: FeatureGeometry) -> Self {
        Self {
            geometry,
            attributes: BTreeMap::new(),
            hazard: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub crs: Crs,
    pub features: Vec<Feature>,
}

impl FeatureTable {
    #[must_use]
    pub const fn new(crs: Crs, features: Vec<Feature>) -> Self {
        Self { crs, features }
    }

    /// Reads line and point features from a `GeoJSON` file. Other
    /// geometry types are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path, crs: Crs) -> Result<Self, NetworkError> {
        let text = std::fs::read_to_string(path)?;
        let mut features = Vec::new();
        let mut skipped = 0usize;

        for (geometry, attributes) in parse_features(&text)? {
            let geometry = match geometry {
                geo::Geometry::Point(p) => FeatureGeometry::Point(p),
                other => match line_from(other) {
                    Some(line) => FeatureGeometry::Line(line),
                    None => {
                        skipped += 1;
                        continue;
                    }
                },
            };
            features.push(Feature {
                geometry,
                attributes,
                hazard: BTreeMap::new(),
            });
        }

        if skipped > 0 {
            log::warn!(
                "Skipped {skipped} features in {} with unsupported geometry",
                path.display()
            );
        }
        log::info!("Loaded {} features from {}", features.len(), path.display());

        Ok(Self { crs, features })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
