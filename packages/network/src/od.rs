//! Origin and destination points and their attachment to network nodes.
//!
//! Each point snaps to the nearest network node through an R-tree.
//! Several points may land on one node; labels accumulate and origin
//! counts are summed into the node's count attribute.
//!
//! Categorised locations (schools, clinics) instead attach to the nearest
//! edge within a buffer distance, see [`nearest_edges`].

use std::path::PathBuf;

use geo::Point;
use netrisk_network_models::{AttributeValue, Crs};
use petgraph::stable_graph::EdgeIndex;
use rstar::RTree;
use rstar::primitives::{GeomWithData, Line};
use serde::{Deserialize, Serialize};

use crate::NetworkError;
use crate::graph::Network;
use crate::loader::parse_features;
use crate::reproject::{point_distance, reproject_point};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OdKind {
    Origin,
    Destination,
}

/// An origin or destination location before snapping.
#[derive(Debug, Clone, PartialEq)]
pub struct OdPoint {
    pub label: String,
    pub kind: OdKind,
    /// Location in the network CRS.
    pub point: Point<f64>,
    /// Number of people (or other units) starting here. Origins only.
    pub count: Option<f64>,
}

/// A `GeoJSON` file of origin or destination points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OdSource {
    pub path: PathBuf,
    pub kind: OdKind,
    #[serde(default)]
    pub crs: Crs,
    /// Property used as the point label.
    pub id_field: String,
    /// Property holding the origin count.
    #[serde(default)]
    pub count_field: Option<String>,
}

/// Options for [`snap_od_points`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapOptions {
    /// Node attribute receiving summed origin counts.
    pub count_field: String,
    /// Points farther than this many metres from any node are dropped.
    #[serde(default)]
    pub max_distance: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapReport {
    pub snapped: usize,
    pub too_far: usize,
}

/// Reads OD points from a `GeoJSON` file and reprojects them into `target`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_od_points(source: &OdSource, target: Crs) -> Result<Vec<OdPoint>, NetworkError> {
    let text = std::fs::read_to_string(&source.path)?;
    let points = parse_od_points(&text, source, target)?;
    log::info!(
        "Loaded {} {:?} points from {}",
        points.len(),
        source.kind,
        source.path.display()
    );
    Ok(points)
}

/// Parses OD points from `GeoJSON` text. Non-point features are skipped.
///
/// # Errors
///
/// Returns an error if the text is not a `FeatureCollection`.
pub fn parse_od_points(
    text: &str,
    source: &OdSource,
    target: Crs,
) -> Result<Vec<OdPoint>, NetworkError> {
    let mut points = Vec::new();
    for (index, (geometry, properties)) in parse_features(text)?.into_iter().enumerate() {
        let geo::Geometry::Point(point) = geometry else {
            continue;
        };
        let label = properties
            .get(&source.id_field)
            .filter(|v| !v.is_null())
            .map_or_else(|| format!("{index}"), ToString::to_string);
        let count = source
            .count_field
            .as_ref()
            .and_then(|f| properties.get(f))
            .and_then(AttributeValue::as_f64);
        points.push(OdPoint {
            label,
            kind: source.kind,
            point: reproject_point(point, source.crs, target),
            count,
        });
    }
    Ok(points)
}

/// Snaps points to their nearest node, updating roles, labels and counts.
pub fn snap_od_points(
    network: &mut Network,
    points: &[OdPoint],
    options: &SnapOptions,
) -> SnapReport {
    let tree = RTree::bulk_load(
        network
            .nodes()
            .map(|(i, n)| GeomWithData::new([n.point.x(), n.point.y()], i))
            .collect(),
    );
    let crs = network.crs();
    let mut report = SnapReport::default();

    for od in points {
        let Some(nearest) = tree.nearest_neighbor(&[od.point.x(), od.point.y()]) else {
            break;
        };
        let index = nearest.data;
        let Some(node) = network.node_mut(index) else {
            continue;
        };

        let distance = point_distance(od.point, node.point, crs);
        if let Some(max) = options.max_distance.filter(|max| distance > *max) {
            log::warn!(
                "{:?} {} is more than {max} m from the network, skipping",
                od.kind,
                od.label
            );
            report.too_far += 1;
            continue;
        }

        node.od_labels.push(od.label.clone());
        match od.kind {
            OdKind::Origin => {
                node.role = node.role.with_origin();
                let total = node.value(&options.count_field).unwrap_or(0.0)
                    + od.count.unwrap_or(0.0);
                node.attributes
                    .insert(options.count_field.clone(), AttributeValue::Number(total));
            }
            OdKind::Destination => node.role = node.role.with_destination(),
        }
        report.snapped += 1;
    }

    log::info!(
        "Snapped {} OD points to the network ({} too far)",
        report.snapped,
        report.too_far
    );
    report
}

/// A `GeoJSON` file of categorised point locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSource {
    pub path: PathBuf,
    #[serde(default)]
    pub crs: Crs,
    /// Property used as the location label.
    pub id_field: String,
    /// Property holding the location category.
    pub category_field: String,
}

/// A categorised location in the network CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub label: String,
    pub category: String,
    pub point: Point<f64>,
}

/// Reads locations from a `GeoJSON` file and reprojects them into `target`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_locations(
    source: &LocationSource,
    target: Crs,
) -> Result<Vec<Location>, NetworkError> {
    let text = std::fs::read_to_string(&source.path)?;
    let locations = parse_locations(&text, source, target)?;
    log::info!(
        "Loaded {} locations from {}",
        locations.len(),
        source.path.display()
    );
    Ok(locations)
}

/// Parses locations from `GeoJSON` text. Non-point features and points
/// without a category are skipped.
///
/// # Errors
///
/// Returns an error if the text is not a `FeatureCollection`.
pub fn parse_locations(
    text: &str,
    source: &LocationSource,
    target: Crs,
) -> Result<Vec<Location>, NetworkError> {
    let mut locations = Vec::new();
    let mut uncategorised = 0usize;
    for (index, (geometry, properties)) in parse_features(text)?.into_iter().enumerate() {
        let geo::Geometry::Point(point) = geometry else {
            continue;
        };
        let Some(category) = properties
            .get(&source.category_field)
            .filter(|v| !v.is_null())
            .map(ToString::to_string)
        else {
            uncategorised += 1;
            continue;
        };
        let label = properties
            .get(&source.id_field)
            .filter(|v| !v.is_null())
            .map_or_else(|| format!("{index}"), ToString::to_string);
        locations.push(Location {
            label,
            category,
            point: reproject_point(point, source.crs, target),
        });
    }
    if uncategorised > 0 {
        log::warn!(
            "Skipped {uncategorised} locations without a {} value",
            source.category_field
        );
    }
    Ok(locations)
}

/// Nearest edge to each point, or `None` when every edge is farther than
/// `max_distance` metres. Edges are indexed segment by segment.
#[must_use]
pub fn nearest_edges(
    network: &Network,
    points: &[Point<f64>],
    max_distance: f64,
) -> Vec<Option<EdgeIndex>> {
    let tree = RTree::bulk_load(
        network
            .edges()
            .flat_map(|(index, edge)| {
                edge.geometry().lines().map(move |segment| {
                    GeomWithData::new(
                        Line::new(
                            [segment.start.x, segment.start.y],
                            [segment.end.x, segment.end.y],
                        ),
                        index,
                    )
                })
            })
            .collect(),
    );
    let crs = network.crs();

    points
        .iter()
        .map(|point| {
            let query = [point.x(), point.y()];
            let nearest = tree.nearest_neighbor(&query)?;
            let [x, y] = nearest.geom().nearest_point(&query);
            let distance = point_distance(*point, Point::new(x, y), crs);
            (distance <= max_distance).then_some(nearest.data)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use netrisk_network_models::{EdgeId, NodeId, NodeRole};

    use super::*;
    use crate::builder::{NetworkBuilder, NewEdge};
    use crate::graph::Node;

    fn line_network() -> Network {
        let mut b = NetworkBuilder::new(Crs::WebMercator);
        for (i, x) in [0.0, 100.0, 200.0].into_iter().enumerate() {
            b.add_node(Node::new(NodeId(i as u64), Point::new(x, 0.0)));
        }
        b.add_edge(NewEdge::new(EdgeId(0), NodeId(0), NodeId(1)))
            .add_edge(NewEdge::new(EdgeId(1), NodeId(1), NodeId(2)));
        b.build().unwrap()
    }

    fn options() -> SnapOptions {
        SnapOptions {
            count_field: "population".to_string(),
            max_distance: Some(50.0),
        }
    }

    fn origin(label: &str, x: f64, count: f64) -> OdPoint {
        OdPoint {
            label: label.to_string(),
            kind: OdKind::Origin,
            point: Point::new(x, 5.0),
            count: Some(count),
        }
    }

    #[test]
    fn sums_counts_of_points_on_the_same_node() {
        let mut network = line_network();
        let points = vec![origin("a", 2.0, 10.0), origin("b", -3.0, 5.0)];
        let report = snap_od_points(&mut network, &points, &options());
        assert_eq!(report.snapped, 2);

        let node = network.node_by_id(NodeId(0)).unwrap();
        assert_eq!(node.role, NodeRole::Origin);
        assert_eq!(node.od_labels, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(node.value("population"), Some(15.0));
    }

    #[test]
    fn node_can_be_origin_and_destination() {
        let mut network = line_network();
        let points = vec![
            origin("o", 198.0, 1.0),
            OdPoint {
                label: "hospital".to_string(),
                kind: OdKind::Destination,
                point: Point::new(201.0, 0.0),
                count: None,
            },
        ];
        snap_od_points(&mut network, &points, &options());
        assert_eq!(network.node_by_id(NodeId(2)).unwrap().role, NodeRole::Both);
        assert_eq!(network.destinations().len(), 1);
    }

    #[test]
    fn drops_points_beyond_max_distance() {
        let mut network = line_network();
        let report = snap_od_points(&mut network, &[origin("far", 50.0, 1.0)], &SnapOptions {
            max_distance: Some(10.0),
            ..options()
        });
        assert_eq!(report.too_far, 1);
        assert!(network.origins().is_empty());
    }

    #[test]
    fn parses_points_with_labels_and_counts() {
        let source = OdSource {
            path: PathBuf::from("origins.geojson"),
            kind: OdKind::Origin,
            crs: Crs::WebMercator,
            id_field: "name".to_string(),
            count_field: Some("pop".to_string()),
        };
        let text = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"name": "village", "pop": 120},
             "geometry": {"type": "Point", "coordinates": [10, 20]}}
        ]}"#;
        let points = parse_od_points(text, &source, Crs::WebMercator).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].label, "village");
        assert_eq!(points[0].count, Some(120.0));
    }

    #[test]
    fn locations_attach_to_nearest_edge_within_buffer() {
        let network = line_network();
        let points = [
            Point::new(150.0, 8.0),
            Point::new(40.0, -3.0),
            Point::new(100.0, 90.0),
        ];
        let nearest = nearest_edges(&network, &points, 20.0);
        let ids: Vec<Option<EdgeId>> = nearest
            .iter()
            .map(|index| index.and_then(|i| network.edge(i)).map(|e| e.id))
            .collect();
        assert_eq!(ids, vec![Some(EdgeId(1)), Some(EdgeId(0)), None]);
    }

    #[test]
    fn parses_locations_and_skips_uncategorised() {
        let source = LocationSource {
            path: PathBuf::from("schools.geojson"),
            crs: Crs::WebMercator,
            id_field: "name".to_string(),
            category_field: "amenity".to_string(),
        };
        let text = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"name": "north", "amenity": "school"},
             "geometry": {"type": "Point", "coordinates": [10, 20]}},
            {"type": "Feature", "properties": {"name": "unknown"},
             "geometry": {"type": "Point", "coordinates": [30, 20]}}
        ]}"#;
        let locations = parse_locations(text, &source, Crs::WebMercator).unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].label, "north");
        assert_eq!(locations[0].category, "school");
        assert_eq!(locations[0].point, Point::new(10.0, 20.0));
    }
}
