//! Weighted routing graph derived from a [`Network`].
//!
//! The routing graph mirrors the network's node and edge indices, so a
//! network [`EdgeIndex`] can be removed from a routing copy directly.
//! Virtual nodes (the closest-destination sink) are only ever added to
//! scenario copies.

use netrisk_network::Network;
use netrisk_network_models::NodeId;
use petgraph::algo::astar;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableUnGraph};
use petgraph::visit::{EdgeRef, IntoEdges, Visitable};

use crate::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteNode {
    Network(NodeId),
    /// Virtual node joined to every destination by zero-weight edges.
    Sink,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteEdge {
    /// Network edge this routing edge stands for, `None` for virtual edges.
    pub edge: Option<EdgeIndex>,
    pub weight: f64,
}

pub type RouteGraph = StableUnGraph<RouteNode, RouteEdge>;

/// Cheapest route between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub cost: f64,
    pub nodes: Vec<NodeIndex>,
}

/// Builds the routing graph for a weighing.
///
/// # Errors
///
/// * [`AnalysisError::MissingAttribute`] if an edge has no numeric value
///   for `weighing`
/// * [`AnalysisError::InvalidWeight`] if a weight is negative or not finite
pub fn route_graph(network: &Network, weighing: &str) -> Result<RouteGraph, AnalysisError> {
    for (_, edge) in network.edges() {
        let value = edge
            .value(weighing)
            .ok_or_else(|| AnalysisError::MissingAttribute {
                attribute: weighing.to_string(),
                element: format!("edge {}", edge.id),
            })?;
        if !value.is_finite() || value < 0.0 {
            return Err(AnalysisError::InvalidWeight {
                edge: edge.id,
                value,
            });
        }
    }

    Ok(network.graph().map(
        |_, node| RouteNode::Network(node.id),
        |index, edge| RouteEdge {
            edge: Some(index),
            weight: edge.value(weighing).unwrap_or_default(),
        },
    ))
}

/// Cheapest route from `from` to `to`, or `None` if they are not
/// connected.
pub fn shortest_path<G>(graph: G, from: NodeIndex, to: NodeIndex) -> Option<Route>
where
    G: IntoEdges<NodeId = NodeIndex, EdgeWeight = RouteEdge> + Visitable,
{
    astar(graph, from, |n| n == to, |e| e.weight().weight, |_| 0.0)
        .map(|(cost, nodes)| Route { cost, nodes })
}

/// Cheapest of the parallel edges between two adjacent nodes.
#[must_use]
pub fn canonical_edge(graph: &RouteGraph, a: NodeIndex, b: NodeIndex) -> Option<&RouteEdge> {
    graph
        .edges_connecting(a, b)
        .map(|e| e.weight())
        .min_by(|x, y| x.weight.total_cmp(&y.weight))
}

/// Network node ids along a route, skipping virtual nodes.
#[must_use]
pub fn node_ids(graph: &RouteGraph, nodes: &[NodeIndex]) -> Vec<NodeId> {
    nodes
        .iter()
        .filter_map(|&n| match graph.node_weight(n) {
            Some(RouteNode::Network(id)) => Some(*id),
            _ => None,
        })
        .collect()
}

/// Rounds to three decimals.
#[must_use]
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
