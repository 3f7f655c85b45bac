//! Polygon hazard maps.
//!
//! Polygons are exploded out of multipolygons and indexed in an R-tree.
//! Polygons with a hazard value of zero are kept in the index but never
//! contribute to a sample.

use std::path::Path;

use geo::{BooleanOps, BoundingRect, Contains, Euclidean, Intersects, Length};
use geo::{LineString, MultiLineString, MultiPolygon, Point, Polygon};
use netrisk_network::loader::parse_features;
use netrisk_network_models::{AttributeValue, Extent};
use rstar::{AABB, RTree, RTreeObject};

use crate::HazardError;
use crate::sampler::{HazardSampler, SampleStats};

struct PolygonEntry {
    value: f64,
    polygon: Polygon<f64>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for PolygonEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Hazard polygons with one numeric value each.
pub struct VectorLayer {
    tree: RTree<PolygonEntry>,
    extent: Option<Extent>,
}

impl VectorLayer {
    #[must_use]
    pub fn from_polygons(polygons: Vec<(Polygon<f64>, f64)>) -> Self {
        let mut extent: Option<Extent> = None;
        let entries: Vec<PolygonEntry> = polygons
            .into_iter()
            .filter_map(|(polygon, value)| {
                let rect = polygon.bounding_rect()?;
                let bounds = Extent::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y);
                extent = Some(extent.map_or(bounds, |e| e.union(bounds)));
                Some(PolygonEntry {
                    value,
                    envelope: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                    polygon,
                })
            })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
            extent,
        }
    }

    /// Reads polygons from a `GeoJSON` file, taking each polygon's value
    /// from `field`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn read(path: &Path, field: &str) -> Result<Self, HazardError> {
        let text = std::fs::read_to_string(path)?;
        let mut polygons = Vec::new();
        let mut skipped = 0usize;

        for (geometry, properties) in parse_features(&text)? {
            let Some(value) = properties.get(field).and_then(AttributeValue::as_f64) else {
                skipped += 1;
                continue;
            };
            match geometry {
                geo::Geometry::Polygon(p) => polygons.push((p, value)),
                geo::Geometry::MultiPolygon(mp) => {
                    polygons.extend(mp.0.into_iter().map(|p| (p, value)));
                }
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            log::warn!(
                "Skipped {skipped} features in {} without polygon geometry or numeric {field}",
                path.display()
            );
        }
        log::info!("Read {} hazard polygons from {}", polygons.len(), path.display());

        Ok(Self::from_polygons(polygons))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl HazardSampler for VectorLayer {
    fn extent(&self) -> Option<Extent> {
        self.extent
    }

    fn sample_line(&self, line: &LineString<f64>) -> SampleStats {
        let Some(rect) = line.bounding_rect() else {
            return SampleStats::default();
        };
        let query = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);
        let total = Euclidean.length(line);
        let lines = MultiLineString::new(vec![line.clone()]);

        let hits: Vec<&PolygonEntry> = self
            .tree
            .locate_in_envelope_intersecting(&query)
            .filter(|entry| entry.value != 0.0 && entry.polygon.intersects(line))
            .collect();
        if hits.is_empty() {
            return SampleStats::constant(Some(0.0));
        }
        let values: Vec<f64> = hits.iter().map(|entry| entry.value).collect();

        // Overlapping polygons must not count the shared stretch twice.
        let area = hits
            .iter()
            .fold(MultiPolygon::new(Vec::new()), |area, entry| {
                area.union(&entry.polygon)
            });
        let inside = Euclidean.length(&area.clip(&lines, false));

        let fraction = if total > 0.0 {
            (inside / total).min(1.0)
        } else {
            1.0
        };
        SampleStats::from_values(&values, fraction)
    }

    fn sample_point(&self, point: Point<f64>) -> SampleStats {
        let query = AABB::from_point([point.x(), point.y()]);
        let values: Vec<f64> = self
            .tree
            .locate_in_envelope_intersecting(&query)
            .filter(|e| e.value != 0.0 && e.polygon.contains(&point))
            .map(|e| e.value)
            .collect();
        if values.is_empty() {
            return SampleStats::constant(Some(0.0));
        }
        SampleStats::from_values(&values, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ]
    }

    fn layer() -> VectorLayer {
        VectorLayer::from_polygons(vec![
            (square(0.0, 0.0, 10.0), 2.0),
            (square(5.0, 0.0, 10.0), 4.0),
            (square(20.0, 0.0, 10.0), 0.0),
        ])
    }

    #[test]
    fn extent_covers_all_polygons() {
        assert_eq!(layer().extent(), Some(Extent::new(0.0, 0.0, 30.0, 10.0)));
        assert_eq!(layer().len(), 3);
    }

    #[test]
    fn aggregates_overlapping_polygons() {
        let line = LineString::from(vec![(-10.0, 5.0), (30.0, 5.0)]);
        let stats = layer().sample_line(&line);
        assert_eq!(stats.max, Some(4.0));
        assert_eq!(stats.min, Some(2.0));
        assert!((stats.mean.unwrap() - 3.0).abs() < 1e-12);
        // The squares overlap between x = 5 and 10, so 15 m of 40 m is inside.
        assert!((stats.fraction - 0.375).abs() < 1e-9);
    }

    #[test]
    fn nested_polygons_count_length_once() {
        let layer = VectorLayer::from_polygons(vec![
            (square(0.0, 0.0, 10.0), 1.0),
            (square(2.0, 2.0, 6.0), 3.0),
        ]);
        let line = LineString::from(vec![(0.0, 5.0), (20.0, 5.0)]);
        let stats = layer.sample_line(&line);
        assert_eq!(stats.max, Some(3.0));
        assert!((stats.fraction - 0.5).abs() < 1e-9);
    }

    #[test]
    fn zero_valued_polygons_are_ignored() {
        let line = LineString::from(vec![(21.0, 5.0), (29.0, 5.0)]);
        let stats = layer().sample_line(&line);
        assert_eq!(stats.max, Some(0.0));
        assert!(stats.fraction.abs() < f64::EPSILON);
    }

    #[test]
    fn point_inside_polygon() {
        assert_eq!(layer().sample_point(Point::new(2.0, 2.0)).max, Some(2.0));
        assert_eq!(layer().sample_point(Point::new(7.0, 2.0)).max, Some(4.0));
        assert_eq!(layer().sample_point(Point::new(50.0, 2.0)).max, Some(0.0));
    }

    #[test]
    fn reads_geojson_and_explodes_multipolygons() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("landslide.geojson");
        std::fs::write(
            &path,
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"class": 3},
                 "geometry": {"type": "MultiPolygon", "coordinates": [
                    [[[0, 0], [1, 0], [1, 1], [0, 0]]],
                    [[[5, 5], [6, 5], [6, 6], [5, 5]]]
                 ]}},
                {"type": "Feature", "properties": {"class": "n/a"},
                 "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}}
            ]}"#,
        )
        .unwrap();
        let layer = VectorLayer::read(&path, "class").unwrap();
        assert_eq!(layer.len(), 2);
    }
}
