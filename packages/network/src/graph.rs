//! The in-memory network: an undirected multigraph of [`Node`]s and
//! [`Edge`]s on top of a petgraph `StableUnGraph`.
//!
//! Indices are stable for the lifetime of a [`Network`]; nodes and edges
//! are never removed from it. Disruption scenarios work on routing
//! copies instead.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use geo::{LineString, Point};
use netrisk_network_models::{
    AttributeValue, Crs, EdgeId, Extent, HazardKey, NodeId, NodeRole,
};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableUnGraph};

/// Name of the weighing that uses geometric edge length.
pub const LENGTH_WEIGHING: &str = "length";

/// A network node.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub point: Point<f64>,
    pub role: NodeRole,
    /// Ids of the origin/destination points snapped onto this node.
    pub od_labels: Vec<String>,
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Hazard values written by the overlay. `None` means no data.
    pub hazard: BTreeMap<HazardKey, Option<f64>>,
}

impl Node {
    #[must_use]
    pub fn new(id: NodeId, point: Point<f64>) -> Self {
        Self {
            id,
            point,
            role: NodeRole::Neither,
            od_labels: Vec::new(),
            attributes: BTreeMap::new(),
            hazard: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn with_role(mut self, role: NodeRole) -> Self {
        self.role = role;
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Numeric attribute value, if present and numeric.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).and_then(AttributeValue::as_f64)
    }
}

/// A network edge (road segment).
#[derive(Debug, Clone)]
pub struct Edge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub(crate) geometry: LineString<f64>,
    pub(crate) length_m: f64,
    pub road_class: Option<String>,
    /// Protected edges are never removed by a disruption scenario.
    pub protected: bool,
    /// Identifier carried over from the input data, used for table joins.
    pub external_id: Option<String>,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub hazard: BTreeMap<HazardKey, Option<f64>>,
}

impl Edge {
    #[must_use]
    pub const fn geometry(&self) -> &LineString<f64> {
        &self.geometry
    }

    /// Length in metres, computed from the geometry at build time.
    #[must_use]
    pub const fn length(&self) -> f64 {
        self.length_m
    }

    /// Value of a weighing attribute. `length` resolves to [`Self::length`].
    #[must_use]
    pub fn value(&self, name: &str) -> Option<f64> {
        if name == LENGTH_WEIGHING {
            return Some(self.length_m);
        }
        self.attributes.get(name).and_then(AttributeValue::as_f64)
    }

    /// Hazard entry for a key: `None` if the attribute was never written,
    /// `Some(None)` if it was written as no data.
    #[must_use]
    pub fn hazard_value(&self, key: &HazardKey) -> Option<Option<f64>> {
        self.hazard.get(key).copied()
    }
}

/// Undirected multigraph of nodes and edges in one CRS.
#[derive(Debug, Clone)]
pub struct Network {
    pub(crate) crs: Crs,
    pub(crate) graph: StableUnGraph<Node, Edge>,
    pub(crate) nodes: HashMap<NodeId, NodeIndex>,
    pub(crate) edges: HashMap<EdgeId, EdgeIndex>,
}

impl Network {
    #[must_use]
    pub const fn crs(&self) -> Crs {
        self.crs
    }

    #[must_use]
    pub const fn graph(&self) -> &StableUnGraph<Node, Edge> {
        &self.graph
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    #[must_use]
    pub fn node_index(&self, id: NodeId) -> Option<NodeIndex> {
        self.nodes.get(&id).copied()
    }

    #[must_use]
    pub fn edge_index(&self, id: EdgeId) -> Option<EdgeIndex> {
        self.edges.get(&id).copied()
    }

    #[must_use]
    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.graph.node_weight(index)
    }

    #[must_use]
    pub fn edge(&self, index: EdgeIndex) -> Option<&Edge> {
        self.graph.edge_weight(index)
    }

    pub fn node_mut(&mut self, index: NodeIndex) -> Option<&mut Node> {
        self.graph.node_weight_mut(index)
    }

    pub fn edge_mut(&mut self, index: EdgeIndex) -> Option<&mut Edge> {
        self.graph.edge_weight_mut(index)
    }

    #[must_use]
    pub fn node_by_id(&self, id: NodeId) -> Option<&Node> {
        self.node_index(id).and_then(|i| self.node(i))
    }

    #[must_use]
    pub fn edge_by_id(&self, id: EdgeId) -> Option<&Edge> {
        self.edge_index(id).and_then(|i| self.edge(i))
    }

    /// Endpoint node indices of an edge.
    #[must_use]
    pub fn endpoints(&self, index: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(index)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.graph.node_indices().map(|i| (i, &self.graph[i]))
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeIndex, &Edge)> {
        self.graph.edge_indices().map(|i| (i, &self.graph[i]))
    }

    /// Origin nodes, in node id order.
    #[must_use]
    pub fn origins(&self) -> Vec<NodeIndex> {
        self.nodes_where(|n| n.role.is_origin())
    }

    /// Destination nodes, in node id order.
    #[must_use]
    pub fn destinations(&self) -> Vec<NodeIndex> {
        self.nodes_where(|n| n.role.is_destination())
    }

    fn nodes_where(&self, predicate: impl Fn(&Node) -> bool) -> Vec<NodeIndex> {
        let mut found: Vec<(NodeId, NodeIndex)> = self
            .nodes()
            .filter(|(_, n)| predicate(n))
            .map(|(i, n)| (n.id, i))
            .collect();
        found.sort_unstable_by_key(|(id, _)| *id);
        found.into_iter().map(|(_, i)| i).collect()
    }

    /// Hazard attribute names present on any edge.
    #[must_use]
    pub fn edge_hazard_keys(&self) -> BTreeSet<HazardKey> {
        self.edges()
            .flat_map(|(_, e)| e.hazard.keys().cloned())
            .collect()
    }

    /// Bounding box of all node points and edge vertices.
    #[must_use]
    pub fn extent(&self) -> Option<Extent> {
        let node_coords = self.nodes().map(|(_, n)| (n.point.x(), n.point.y()));
        let edge_coords = self
            .edges()
            .flat_map(|(_, e)| e.geometry.coords().map(|c| (c.x, c.y)));
        Extent::from_points(node_coords.chain(edge_coords))
    }
}
