//! Disruption scenarios: the routing graph with every edge removed that a
//! hazard scenario takes out.

use netrisk_analysis_models::DisruptionCriteria;
use netrisk_network::Network;
use netrisk_network_models::EdgeId;
use petgraph::stable_graph::EdgeIndex;

use crate::AnalysisError;
use crate::routing::RouteGraph;

/// A routing graph reduced by one hazard scenario.
#[derive(Debug, Clone)]
pub struct DisruptionScenario {
    criteria: DisruptionCriteria,
    removed: Vec<EdgeIndex>,
    graph: RouteGraph,
}

impl DisruptionScenario {
    /// Copies `base` and removes the disrupted edges from the copy.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::MissingAttribute`] if an edge has no value
    /// for the scenario's hazard attribute.
    pub fn new(
        network: &Network,
        base: &RouteGraph,
        criteria: &DisruptionCriteria,
    ) -> Result<Self, AnalysisError> {
        let removed = disrupted_edges(network, criteria)?;
        let mut graph = base.clone();
        for &index in &removed {
            graph.remove_edge(index);
        }
        log::debug!(
            "Scenario {}: removed {} of {} edges",
            criteria.hazard,
            removed.len(),
            base.edge_count()
        );
        Ok(Self {
            criteria: criteria.clone(),
            removed,
            graph,
        })
    }

    #[must_use]
    pub const fn criteria(&self) -> &DisruptionCriteria {
        &self.criteria
    }

    #[must_use]
    pub fn scenario(&self) -> &str {
        self.criteria.scenario()
    }

    /// Removed network edges, in edge id order.
    #[must_use]
    pub fn removed(&self) -> &[EdgeIndex] {
        &self.removed
    }

    #[must_use]
    pub const fn graph(&self) -> &RouteGraph {
        &self.graph
    }
}

/// Edges whose hazard value exceeds the threshold, excluding protected
/// edges, in edge id order. No data never disrupts.
///
/// # Errors
///
/// Returns [`AnalysisError::MissingAttribute`] if an edge has no value for
/// the hazard attribute at all.
pub fn disrupted_edges(
    network: &Network,
    criteria: &DisruptionCriteria,
) -> Result<Vec<EdgeIndex>, AnalysisError> {
    let mut removed: Vec<(EdgeId, EdgeIndex)> = Vec::new();
    for (index, edge) in network.edges() {
        let value = edge
            .hazard_value(&criteria.hazard)
            .ok_or_else(|| AnalysisError::MissingAttribute {
                attribute: criteria.hazard.to_string(),
                element: format!("edge {}", edge.id),
            })?;
        if edge.protected {
            continue;
        }
        if value.is_some_and(|v| v > criteria.threshold) {
            removed.push((edge.id, index));
        }
    }
    removed.sort_unstable_by_key(|(id, _)| *id);
    Ok(removed.into_iter().map(|(_, index)| index).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::route_graph;
    use crate::test_network::{flood, flood_key, network};

    fn ids(network: &Network, removed: &[EdgeIndex]) -> Vec<EdgeId> {
        removed
            .iter()
            .map(|&i| network.edge(i).unwrap().id)
            .collect()
    }

    #[test]
    fn removes_edges_above_threshold() {
        let mut network = network();
        flood(&mut network, &[(0, 0.8), (2, 0.5), (3, 1.2)]);
        let base = route_graph(&network, "length").unwrap();
        let scenario =
            DisruptionScenario::new(&network, &base, &DisruptionCriteria::new(flood_key(), 0.5))
                .unwrap();

        assert_eq!(ids(&network, scenario.removed()), vec![EdgeId(0), EdgeId(3)]);
        assert_eq!(scenario.graph().edge_count(), 3);
        assert_eq!(base.edge_count(), 5);
        assert_eq!(scenario.scenario(), "RP100");
    }

    #[test]
    fn protected_edges_are_never_removed() {
        let mut network = network();
        flood(&mut network, &[(4, 100.0)]);
        let criteria = DisruptionCriteria::new(flood_key(), 0.0);
        assert!(disrupted_edges(&network, &criteria).unwrap().is_empty());
    }

    #[test]
    fn no_data_does_not_disrupt() {
        let mut network = network();
        flood(&mut network, &[]);
        let e0 = network.edge_index(EdgeId(0)).unwrap();
        network.edge_mut(e0).unwrap().hazard.insert(flood_key(), None);
        let criteria = DisruptionCriteria::new(flood_key(), -1.0);
        assert_eq!(
            ids(&network, &disrupted_edges(&network, &criteria).unwrap()),
            vec![EdgeId(1), EdgeId(2), EdgeId(3)]
        );
    }

    #[test]
    fn missing_hazard_attribute_is_an_error() {
        let network = network();
        let criteria = DisruptionCriteria::new(flood_key(), 0.5);
        assert!(matches!(
            disrupted_edges(&network, &criteria),
            Err(AnalysisError::MissingAttribute { attribute, .. }) if attribute == "RP100_ma"
        ));
    }
}
