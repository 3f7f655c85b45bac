//! Assembles a validated [`Network`] from node and edge drafts.

use std::collections::{BTreeMap, HashMap};

use geo::{Coord, LineString};
use netrisk_network_models::{AttributeValue, Crs, EdgeId, NodeId, ProtectionRule};
use petgraph::stable_graph::StableUnGraph;

use crate::NetworkError;
use crate::graph::{Edge, Network, Node};
use crate::reproject::line_length;

/// Edge draft handed to [`NetworkBuilder::add_edge`].
#[derive(Debug, Clone)]
pub struct NewEdge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    /// Straight segment between the endpoints when `None`.
    pub geometry: Option<LineString<f64>>,
    pub road_class: Option<String>,
    pub external_id: Option<String>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl NewEdge {
    #[must_use]
    pub const fn new(id: EdgeId, from: NodeId, to: NodeId) -> Self {
        Self {
            id,
            from,
            to,
            geometry: None,
            road_class: None,
            external_id: None,
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_geometry(mut self, geometry: LineString<f64>) -> Self {
        self.geometry = Some(geometry);
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

/// Collects nodes and edges, then validates them into a [`Network`].
#[derive(Debug, Default)]
pub struct NetworkBuilder {
    crs: Crs,
    protection: ProtectionRule,
    nodes: Vec<Node>,
    edges: Vec<NewEdge>,
}

impl NetworkBuilder {
    #[must_use]
    pub fn new(crs: Crs) -> Self {
        Self {
            crs,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn protection(mut self, rule: ProtectionRule) -> Self {
        self.protection = rule;
        self
    }

    pub fn add_node(&mut self, node: Node) -> &mut Self {
        self.nodes.push(node);
        self
    }

    pub fn add_edge(&mut self, edge: NewEdge) -> &mut Self {
        self.edges.push(edge);
        self
    }

    /// Validates ids, endpoints and geometries and builds the graph.
    ///
    /// # Errors
    ///
    /// * [`NetworkError::DuplicateNode`] / [`NetworkError::DuplicateEdge`]
    ///   if an id is used twice
    /// * [`NetworkError::DanglingEdge`] if an edge references an unknown node
    /// * [`NetworkError::InvalidGeometry`] if an edge geometry has fewer than
    ///   two vertices, non-finite coordinates or zero length
    pub fn build(self) -> Result<Network, NetworkError> {
        let mut graph = StableUnGraph::with_capacity(self.nodes.len(), self.edges.len());
        let mut nodes = HashMap::with_capacity(self.nodes.len());
        let mut edges = HashMap::with_capacity(self.edges.len());

        for node in self.nodes {
            if !(node.point.x().is_finite() && node.point.y().is_finite()) {
                return Err(NetworkError::InvalidGeometry {
                    message: format!("node {} has non-finite coordinates", node.id),
                });
            }
            let id = node.id;
            if nodes.contains_key(&id) {
                return Err(NetworkError::DuplicateNode { id });
            }
            nodes.insert(id, graph.add_node(node));
        }

        for draft in self.edges {
            if edges.contains_key(&draft.id) {
                return Err(NetworkError::DuplicateEdge { id: draft.id });
            }
            let dangling = |node| NetworkError::DanglingEdge {
                edge: draft.id,
                node,
            };
            let a = *nodes.get(&draft.from).ok_or_else(|| dangling(draft.from))?;
            let b = *nodes.get(&draft.to).ok_or_else(|| dangling(draft.to))?;

            let geometry = match draft.geometry {
                Some(line) => line,
                None => LineString::new(vec![
                    Coord::from(graph[a].point),
                    Coord::from(graph[b].point),
                ]),
            };
            validate_geometry(draft.id, &geometry)?;
            let length_m = line_length(&geometry, self.crs);
            if length_m <= 0.0 {
                return Err(NetworkError::InvalidGeometry {
                    message: format!("edge {} has zero length", draft.id),
                });
            }

            let edge = Edge {
                id: draft.id,
                from: draft.from,
                to: draft.to,
                length_m,
                geometry,
                road_class: draft.road_class,
                protected: self.protection.matches(&draft.attributes),
                external_id: draft.external_id,
                attributes: draft.attributes,
                hazard: BTreeMap::new(),
            };
            edges.insert(edge.id, graph.add_edge(a, b, edge));
        }

        log::debug!(
            "Built network with {} nodes and {} edges",
            graph.node_count(),
            graph.edge_count()
        );

        Ok(Network {
            crs: self.crs,
            graph,
            nodes,
            edges,
        })
    }
}

fn validate_geometry(id: EdgeId, line: &LineString<f64>) -> Result<(), NetworkError> {
    if line.0.len() < 2 {
        return Err(NetworkError::InvalidGeometry {
            message: format!("edge {id} has fewer than two vertices"),
        });
    }
    if line.coords().any(|c| !(c.x.is_finite() && c.y.is_finite())) {
        return Err(NetworkError::InvalidGeometry {
            message: format!("edge {id} has non-finite coordinates"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use geo::Point;
    use netrisk_network_models::NodeRole;

    use super::*;

    fn square() -> NetworkBuilder {
        let mut b = NetworkBuilder::new(Crs::WebMercator);
        b.add_node(Node::new(NodeId(1), Point::new(0.0, 0.0)))
            .add_node(Node::new(NodeId(2), Point::new(100.0, 0.0)).with_role(NodeRole::Origin))
            .add_node(Node::new(NodeId(3), Point::new(100.0, 100.0)));
        b.add_edge(NewEdge::new(EdgeId(10), NodeId(1), NodeId(2)))
            .add_edge(
                NewEdge::new(EdgeId(11), NodeId(2), NodeId(3))
                    .with_attribute("bridge", AttributeValue::from("yes")),
            );
        b
    }

    #[test]
    fn builds_lengths_and_protection() {
        let network = square().build().unwrap();
        assert_eq!(network.node_count(), 3);
        assert_eq!(network.edge_count(), 2);

        let e10 = network.edge_by_id(EdgeId(10)).unwrap();
        assert!((e10.length() - 100.0).abs() < 1e-9);
        assert!(!e10.protected);
        assert!(network.edge_by_id(EdgeId(11)).unwrap().protected);
        assert_eq!(network.origins().len(), 1);
    }

    #[test]
    fn rejects_dangling_edge() {
        let mut b = square();
        b.add_edge(NewEdge::new(EdgeId(12), NodeId(3), NodeId(99)));
        match b.build() {
            Err(NetworkError::DanglingEdge { edge, node }) => {
                assert_eq!(edge, EdgeId(12));
                assert_eq!(node, NodeId(99));
            }
            other => panic!("expected dangling edge, got {other:?}"),
        }
    }

    #[test]
    fn rejects_degenerate_geometry() {
        let mut b = square();
        b.add_edge(
            NewEdge::new(EdgeId(12), NodeId(1), NodeId(3))
                .with_geometry(LineString::from(vec![(0.0, 0.0)])),
        );
        assert!(matches!(b.build(), Err(NetworkError::InvalidGeometry { .. })));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut b = square();
        b.add_edge(NewEdge::new(EdgeId(10), NodeId(1), NodeId(3)));
        assert!(matches!(b.build(), Err(NetworkError::DuplicateEdge { .. })));
    }

    #[test]
    fn keeps_parallel_edges() {
        let mut b = square();
        b.add_edge(NewEdge::new(EdgeId(12), NodeId(1), NodeId(2)));
        let network = b.build().unwrap();
        let (a, c) = network
            .endpoints(network.edge_index(EdgeId(12)).unwrap())
            .unwrap();
        assert_eq!(network.graph().edges_connecting(a, c).count(), 2);
    }
}
