//! Small fixture network shared by the analysis tests.
//!
//! ```text
//! 4 --e2-- 3
//! |        |
//! e3       e1
//! |        |
//! 1 --e0-- 2 --e4-- 5
//! ```
//!
//! Web mercator, every edge 100 m long. `e4` is a bridge. Edge `time` is
//! its id plus one.

use geo::Point;
use netrisk_network::{Network, NetworkBuilder, NewEdge, Node};
use netrisk_network_models::{AttributeValue, Crs, EdgeId, HazardKey, HazardStat, NodeId};

pub fn flood_key() -> HazardKey {
    HazardKey::new("RP100", HazardStat::Max)
}

pub fn network() -> Network {
    let mut builder = NetworkBuilder::new(Crs::WebMercator);
    for (id, x, y) in [
        (1, 0.0, 0.0),
        (2, 100.0, 0.0),
        (3, 100.0, 100.0),
        (4, 0.0, 100.0),
        (5, 200.0, 0.0),
    ] {
        builder.add_node(Node::new(NodeId(id), Point::new(x, y)));
    }
    for (id, from, to, time) in [(0, 1, 2, 1.0), (1, 2, 3, 2.0), (2, 3, 4, 3.0), (3, 4, 1, 4.0)] {
        builder.add_edge(
            NewEdge::new(EdgeId(id), NodeId(from), NodeId(to))
                .with_attribute("time", AttributeValue::from(time)),
        );
    }
    builder.add_edge(
        NewEdge::new(EdgeId(4), NodeId(2), NodeId(5))
            .with_attribute("bridge", AttributeValue::from("yes"))
            .with_attribute("time", AttributeValue::from(5.0)),
    );
    builder.build().unwrap()
}

/// Writes `RP100_ma` onto every edge and node: the listed edges get the
/// given value, everything else 0.
pub fn flood(network: &mut Network, edges: &[(u64, f64)]) {
    let key = flood_key();
    let indices: Vec<_> = network.edges().map(|(i, _)| i).collect();
    for index in indices {
        let edge = network.edge_mut(index).unwrap();
        let value = edges
            .iter()
            .find(|(id, _)| EdgeId(*id) == edge.id)
            .map_or(0.0, |(_, v)| *v);
        edge.hazard.insert(key.clone(), Some(value));
    }
    let nodes: Vec<_> = network.nodes().map(|(i, _)| i).collect();
    for index in nodes {
        network
            .node_mut(index)
            .unwrap()
            .hazard
            .insert(key.clone(), Some(0.0));
    }
}
