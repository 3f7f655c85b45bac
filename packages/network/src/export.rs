//! Writes a network's edges back out as a `GeoJSON` `FeatureCollection`,
//! with hazard and analysis attributes as feature properties.

use std::path::Path;

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue};
use netrisk_network_models::AttributeValue;

use crate::NetworkError;
use crate::graph::{Edge, Network};

fn json_value(value: &AttributeValue) -> JsonValue {
    match value {
        AttributeValue::Null => JsonValue::Null,
        AttributeValue::Bool(b) => JsonValue::Bool(*b),
        AttributeValue::Number(n) => JsonValue::from(*n),
        AttributeValue::Text(s) => JsonValue::String(s.clone()),
    }
}

fn edge_properties(edge: &Edge) -> JsonObject {
    let mut properties = JsonObject::new();
    for (name, value) in &edge.attributes {
        properties.insert(name.clone(), json_value(value));
    }
    properties.insert("edge_id".to_string(), JsonValue::from(edge.id.0));
    properties.insert("from".to_string(), JsonValue::from(edge.from.0));
    properties.insert("to".to_string(), JsonValue::from(edge.to.0));
    properties.insert("length".to_string(), JsonValue::from(edge.length()));
    properties.insert("protected".to_string(), JsonValue::Bool(edge.protected));
    if let Some(id) = &edge.external_id {
        properties.insert("external_id".to_string(), JsonValue::String(id.clone()));
    }
    for (key, value) in &edge.hazard {
        properties.insert(key.to_string(), value.map_or(JsonValue::Null, JsonValue::from));
    }
    properties
}

/// Every edge as a line feature, in edge id order and in the network CRS.
#[must_use]
pub fn edges_to_geojson(network: &Network) -> FeatureCollection {
    let mut edges: Vec<&Edge> = network.edges().map(|(_, edge)| edge).collect();
    edges.sort_unstable_by_key(|edge| edge.id);

    FeatureCollection {
        bbox: None,
        features: edges
            .into_iter()
            .map(|edge| Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(edge.geometry()))),
                id: None,
                properties: Some(edge_properties(edge)),
                foreign_members: None,
            })
            .collect(),
        foreign_members: None,
    }
}

/// Writes [`edges_to_geojson`] to `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_edges(network: &Network, path: &Path) -> Result<(), NetworkError> {
    std::fs::write(path, GeoJson::from(edges_to_geojson(network)).to_string())?;
    log::info!(
        "Wrote {} edges to {}",
        network.edge_count(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use netrisk_network_models::{Crs, HazardKey, HazardStat};

    use super::*;
    use crate::loader::{NetworkOptions, parse_network};

    const ROADS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"osm_id": "a", "bridge": "yes"},
             "geometry": {"type": "LineString", "coordinates": [[0, 0], [100, 0]]}},
            {"type": "Feature", "properties": {"osm_id": "b"},
             "geometry": {"type": "LineString", "coordinates": [[100, 0], [100, 50]]}}
        ]
    }"#;

    fn network() -> Network {
        let options = NetworkOptions {
            crs: Crs::WebMercator,
            id_field: Some("osm_id".to_string()),
            ..NetworkOptions::default()
        };
        parse_network(ROADS, &options).unwrap()
    }

    #[test]
    fn exports_edges_with_hazard_properties() {
        let mut network = network();
        let key = HazardKey::new("RP10", HazardStat::Max);
        let indices: Vec<_> = network.edges().map(|(i, _)| i).collect();
        for (value, index) in [Some(0.4), None].into_iter().zip(indices) {
            network.edge_mut(index).unwrap().hazard.insert(key.clone(), value);
        }

        let collection = edges_to_geojson(&network);
        assert_eq!(collection.features.len(), 2);

        let first = collection.features[0].properties.as_ref().unwrap();
        assert_eq!(first["external_id"], JsonValue::from("a"));
        assert_eq!(first["protected"], JsonValue::Bool(true));
        assert_eq!(first["length"], JsonValue::from(100.0));
        assert_eq!(first["osm_id"], JsonValue::from("a"));

        let with_hazard: Vec<&JsonValue> = collection
            .features
            .iter()
            .map(|f| &f.properties.as_ref().unwrap()["RP10_ma"])
            .collect();
        assert!(with_hazard.contains(&&JsonValue::from(0.4)));
        assert!(with_hazard.contains(&&JsonValue::Null));
    }

    #[test]
    fn written_file_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edges.geojson");
        write_edges(&network(), &path).unwrap();

        let options = NetworkOptions {
            crs: Crs::WebMercator,
            ..NetworkOptions::default()
        };
        let reloaded = crate::loader::load_network(&path, &options).unwrap();
        assert_eq!(reloaded.edge_count(), 2);
        assert_eq!(reloaded.node_count(), 3);
    }
}
