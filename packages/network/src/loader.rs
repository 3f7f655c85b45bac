//! Loads a road network from a `GeoJSON` `FeatureCollection` of lines.
//!
//! Topology is derived from line endpoints: endpoints with identical
//! coordinates become the same node. `MultiLineString` features are
//! split into one edge per part.
//!
//! A legacy `crs` member on the collection overrides the configured CRS.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use geo::{Coord, LineString, Point};
use geojson::GeoJson;
use netrisk_network_models::{AttributeValue, Crs, EdgeId, NodeId, ProtectionRule};
use serde::{Deserialize, Serialize};

use crate::NetworkError;
use crate::builder::{NetworkBuilder, NewEdge};
use crate::graph::{Network, Node};

/// Options for reading a network file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkOptions {
    /// CRS of the input coordinates.
    #[serde(default)]
    pub crs: Crs,
    /// Feature property copied into [`crate::Edge::external_id`].
    #[serde(default)]
    pub id_field: Option<String>,
    /// Feature property holding the road class.
    #[serde(default = "default_road_class_field")]
    pub road_class_field: String,
    /// Which edges are exempt from removal.
    #[serde(default)]
    pub protection: ProtectionRule,
}

fn default_road_class_field() -> String {
    "highway".to_string()
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            crs: Crs::default(),
            id_field: None,
            road_class_field: default_road_class_field(),
            protection: ProtectionRule::default(),
        }
    }
}

/// Reads a network `GeoJSON` file from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid line
/// `FeatureCollection`.
pub fn load_network(path: &Path, options: &NetworkOptions) -> Result<Network, NetworkError> {
    let text = std::fs::read_to_string(path)?;
    let network = parse_network(&text, options)?;
    log::info!(
        "Loaded network from {}: {} nodes, {} edges",
        path.display(),
        network.node_count(),
        network.edge_count()
    );
    Ok(network)
}

/// Parses a network from `GeoJSON` text.
///
/// # Errors
///
/// Returns an error if the text is not a `FeatureCollection` or the
/// resulting network fails validation.
pub fn parse_network(text: &str, options: &NetworkOptions) -> Result<Network, NetworkError> {
    let (declared, features) = parse_collection(text)?;
    let crs = match declared {
        Some(crs) if crs != options.crs => {
            log::warn!(
                "Network declares {crs} but {} was configured, using {crs}",
                options.crs
            );
            crs
        }
        Some(crs) => crs,
        None => options.crs,
    };

    let mut builder = NetworkBuilder::new(crs).protection(options.protection.clone());
    let mut endpoints: HashMap<(u64, u64), NodeId> = HashMap::new();
    let mut next_edge = 0u64;
    let mut skipped = 0usize;

    for (geometry, properties) in features {
        let lines = match geometry {
            geo::Geometry::LineString(line) => vec![line],
            geo::Geometry::MultiLineString(mls) => mls.0,
            _ => {
                skipped += 1;
                continue;
            }
        };

        let external_id = options
            .id_field
            .as_ref()
            .and_then(|f| properties.get(f))
            .filter(|v| !v.is_null())
            .map(ToString::to_string);
        let road_class = properties
            .get(&options.road_class_field)
            .and_then(AttributeValue::as_text)
            .map(str::to_string);

        for line in lines {
            let (Some(first), Some(last)) = (line.0.first().copied(), line.0.last().copied())
            else {
                skipped += 1;
                continue;
            };
            let from = endpoint_node(&mut builder, &mut endpoints, first);
            let to = endpoint_node(&mut builder, &mut endpoints, last);

            let mut edge = NewEdge::new(EdgeId(next_edge), from, to).with_geometry(line);
            edge.road_class.clone_from(&road_class);
            edge.external_id.clone_from(&external_id);
            edge.attributes.clone_from(&properties);
            builder.add_edge(edge);
            next_edge += 1;
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} network features without line geometry");
    }

    builder.build()
}

fn endpoint_node(
    builder: &mut NetworkBuilder,
    endpoints: &mut HashMap<(u64, u64), NodeId>,
    coord: Coord<f64>,
) -> NodeId {
    let key = (coord.x.to_bits(), coord.y.to_bits());
    let next = NodeId(endpoints.len() as u64);
    *endpoints.entry(key).or_insert_with(|| {
        builder.add_node(Node::new(next, Point::from(coord)));
        next
    })
}

/// Parses a `FeatureCollection` into geometry/property pairs, dropping
/// features without geometry.
///
/// # Errors
///
/// Returns an error if the text is not valid `GeoJSON` or not a
/// `FeatureCollection`.
pub fn parse_features(
    text: &str,
) -> Result<Vec<(geo::Geometry<f64>, BTreeMap<String, AttributeValue>)>, NetworkError> {
    parse_collection(text).map(|(_, features)| features)
}

type ParsedFeatures = Vec<(geo::Geometry<f64>, BTreeMap<String, AttributeValue>)>;

fn parse_collection(text: &str) -> Result<(Option<Crs>, ParsedFeatures), NetworkError> {
    let geojson: GeoJson = text.parse()?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(NetworkError::Parse {
            message: "expected a GeoJSON FeatureCollection".to_string(),
        });
    };

    let declared = collection
        .foreign_members
        .as_ref()
        .and_then(|members| members.get("crs"))
        .and_then(|crs| crs.pointer("/properties/name"))
        .and_then(serde_json::Value::as_str)
        .map(crs_from_name)
        .transpose()?;

    let mut out = Vec::with_capacity(collection.features.len());
    for feature in collection.features {
        let properties = feature
            .properties
            .as_ref()
            .map(convert_properties)
            .unwrap_or_default();
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let geometry: geo::Geometry<f64> =
            geometry.try_into().map_err(|e: geojson::Error| NetworkError::Parse {
                message: format!("unsupported geometry: {e}"),
            })?;
        out.push((geometry, properties));
    }
    Ok((declared, out))
}

/// Resolves a CRS name such as `EPSG:3857`, `urn:ogc:def:crs:EPSG::4326`
/// or `urn:ogc:def:crs:OGC:1.3:CRS84`.
///
/// # Errors
///
/// Returns [`NetworkError::UnsupportedCrs`] for anything other than
/// WGS84 or Web Mercator.
pub fn crs_from_name(name: &str) -> Result<Crs, NetworkError> {
    let unsupported = || NetworkError::UnsupportedCrs {
        code: name.to_string(),
    };
    if name.ends_with("CRS84") {
        return Ok(Crs::Wgs84);
    }
    let code = name.rsplit(':').next().ok_or_else(unsupported)?;
    match code {
        "4326" => Ok(Crs::Wgs84),
        "3857" | "900913" => Ok(Crs::WebMercator),
        _ => Err(unsupported()),
    }
}

fn convert_properties(
    properties: &serde_json::Map<String, serde_json::Value>,
) -> BTreeMap<String, AttributeValue> {
    properties
        .iter()
        .map(|(k, v)| (k.clone(), convert_value(v)))
        .collect()
}

fn convert_value(value: &serde_json::Value) -> AttributeValue {
    match value {
        serde_json::Value::Null => AttributeValue::Null,
        serde_json::Value::Bool(b) => AttributeValue::Bool(*b),
        serde_json::Value::Number(n) => n
            .as_f64()
            .map_or_else(|| AttributeValue::Text(n.to_string()), AttributeValue::Number),
        serde_json::Value::String(s) => AttributeValue::Text(s.clone()),
        other => AttributeValue::Text(other.to_string()),
    }
}

/// Extracts a single line from a parsed geometry.
pub(crate) fn line_from(geometry: geo::Geometry<f64>) -> Option<LineString<f64>> {
    match geometry {
        geo::Geometry::LineString(line) => Some(line),
        geo::Geometry::Line(line) => Some(line.into()),
        _ => None,
    }
}
