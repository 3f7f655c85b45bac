//! Locations cut off from the network by a hazard scenario.
//!
//! Per scenario every road is either flooded (removed by the scenario),
//! isolated (still passable but outside the largest connected part of what
//! remains) or unaffected. Each location attaches to its nearest road
//! within a buffer distance and takes that road's impact.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use netrisk_analysis_models::{
    DisruptionCriteria, IsolatedLocation, IsolatedLocationCount, LocationImpact, RoadImpact,
};
use netrisk_network::Network;
use netrisk_network::od::{Location, nearest_edges};
use netrisk_network::progress::ProgressCallback;
use petgraph::stable_graph::EdgeIndex;
use petgraph::unionfind::UnionFind;
use petgraph::visit::NodeIndexable;
use rayon::prelude::*;

use crate::AnalysisError;
use crate::disruption::DisruptionScenario;
use crate::routing::{RouteGraph, route_graph};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IsolatedLocationAnalysis {
    /// Flooded and isolated roads, per scenario in edge id order.
    pub roads: Vec<RoadImpact>,
    /// Cut-off locations, per scenario in input order.
    pub locations: Vec<IsolatedLocation>,
    /// Cut-off locations per scenario, category and impact.
    pub counts: Vec<IsolatedLocationCount>,
}

/// Edges outside the largest connected component of `graph`. Of several
/// equally large components the one holding the lowest node index is
/// kept.
#[must_use]
pub fn isolated_edges(graph: &RouteGraph) -> HashSet<EdgeIndex> {
    let mut components = UnionFind::<usize>::new(graph.node_bound());
    for edge in graph.edge_indices() {
        if let Some((a, b)) = graph.edge_endpoints(edge) {
            components.union(a.index(), b.index());
        }
    }

    let mut sizes: HashMap<usize, usize> = HashMap::new();
    for node in graph.node_indices() {
        *sizes.entry(components.find(node.index())).or_default() += 1;
    }
    let largest = graph
        .node_indices()
        .map(|node| components.find(node.index()))
        .min_by_key(|root| std::cmp::Reverse(sizes.get(root).copied().unwrap_or_default()));

    graph
        .edge_indices()
        .filter(|&edge| {
            graph
                .edge_endpoints(edge)
                .is_some_and(|(a, _)| Some(components.find(a.index())) != largest)
        })
        .filter_map(|edge| graph.edge_weight(edge).and_then(|w| w.edge))
        .collect()
}

/// Classifies roads and locations for every scenario.
///
/// # Errors
///
/// * [`AnalysisError::InvalidOption`] if `buffer` is negative or not finite
/// * [`AnalysisError::MissingAttribute`] if the weighing or a scenario's
///   hazard attribute is missing
pub fn isolated_locations(
    network: &Network,
    weighing: &str,
    scenarios: &[DisruptionCriteria],
    locations: &[Location],
    buffer: f64,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<IsolatedLocationAnalysis, AnalysisError> {
    if !(buffer.is_finite() && buffer >= 0.0) {
        return Err(AnalysisError::InvalidOption {
            message: format!("buffer {buffer} is not a distance"),
        });
    }

    let points: Vec<_> = locations.iter().map(|l| l.point).collect();
    let nearest = nearest_edges(network, &points, buffer);
    let unmatched = nearest.iter().filter(|n| n.is_none()).count();
    if unmatched > 0 {
        log::warn!(
            "{unmatched} of {} locations are more than {buffer} m from every road",
            locations.len()
        );
    }

    let base = route_graph(network, weighing)?;

    progress.start("Isolated locations", scenarios.len() as u64);

    let per_scenario = scenarios
        .par_iter()
        .map(|criteria| {
            let scenario = DisruptionScenario::new(network, &base, criteria)?;
            let result = classify(network, &scenario, locations, &nearest);
            progress.scenario_done(scenario.scenario());
            Ok(result)
        })
        .collect::<Result<Vec<_>, AnalysisError>>()?;

    progress.finish("Isolated locations done".to_string());

    let mut analysis = IsolatedLocationAnalysis::default();
    for result in per_scenario {
        analysis.roads.extend(result.roads);
        analysis.locations.extend(result.locations);
        analysis.counts.extend(result.counts);
    }
    Ok(analysis)
}

fn classify(
    network: &Network,
    scenario: &DisruptionScenario,
    locations: &[Location],
    nearest: &[Option<EdgeIndex>],
) -> IsolatedLocationAnalysis {
    let name = scenario.scenario();
    let flooded: HashSet<EdgeIndex> = scenario.removed().iter().copied().collect();
    let isolated = isolated_edges(scenario.graph());

    let impact_of = |edge: EdgeIndex| {
        if flooded.contains(&edge) {
            Some(LocationImpact::Flooded)
        } else if isolated.contains(&edge) {
            Some(LocationImpact::Isolated)
        } else {
            None
        }
    };

    let mut roads: Vec<RoadImpact> = network
        .edges()
        .filter_map(|(index, edge)| {
            Some(RoadImpact {
                scenario: name.to_string(),
                edge: edge.id,
                external_id: edge.external_id.clone(),
                impact: impact_of(index)?,
            })
        })
        .collect();
    roads.sort_unstable_by_key(|road| road.edge);

    let cut_off: Vec<IsolatedLocation> = locations
        .iter()
        .zip(nearest)
        .filter_map(|(location, &edge)| {
            let edge = edge?;
            Some(IsolatedLocation {
                scenario: name.to_string(),
                label: location.label.clone(),
                category: location.category.clone(),
                edge: network.edge(edge)?.id,
                impact: impact_of(edge)?,
            })
        })
        .collect();

    let mut grouped: BTreeMap<(&str, LocationImpact), usize> = BTreeMap::new();
    for location in &cut_off {
        *grouped
            .entry((location.category.as_str(), location.impact))
            .or_default() += 1;
    }
    let counts = grouped
        .into_iter()
        .map(|((category, impact), count)| IsolatedLocationCount {
            scenario: name.to_string(),
            category: category.to_string(),
            impact,
            count,
        })
        .collect();

    log::info!(
        "Scenario {name}: {} flooded and {} isolated roads, {} locations cut off",
        flooded.len(),
        isolated.len(),
        cut_off.len()
    );

    IsolatedLocationAnalysis {
        roads,
        locations: cut_off,
        counts,
    }
}

#[cfg(test)]
mod tests {
    use geo::Point;
    use netrisk_network::progress::null_progress;
    use netrisk_network_models::EdgeId;

    use super::*;
    use crate::test_network::{flood, flood_key, network};

    fn location(label: &str, category: &str, x: f64, y: f64) -> Location {
        Location {
            label: label.to_string(),
            category: category.to_string(),
            point: Point::new(x, y),
        }
    }

    fn locations() -> Vec<Location> {
        vec![
            location("north", "school", 105.0, 50.0),
            location("clinic", "health", 50.0, 104.0),
            location("east", "school", 150.0, 3.0),
            location("farm", "school", 500.0, 500.0),
        ]
    }

    fn run(network: &Network, threshold: f64) -> IsolatedLocationAnalysis {
        isolated_locations(
            network,
            "length",
            &[DisruptionCriteria::new(flood_key(), threshold)],
            &locations(),
            20.0,
            &null_progress(),
        )
        .unwrap()
    }

    #[test]
    fn flooded_and_isolated_locations_are_counted_per_category() {
        let mut network = network();
        flood(&mut network, &[(1, 1.0), (3, 1.0)]);
        let analysis = run(&network, 0.5);

        let roads: Vec<(EdgeId, LocationImpact)> =
            analysis.roads.iter().map(|r| (r.edge, r.impact)).collect();
        assert_eq!(
            roads,
            vec![
                (EdgeId(1), LocationImpact::Flooded),
                (EdgeId(2), LocationImpact::Isolated),
                (EdgeId(3), LocationImpact::Flooded),
            ]
        );

        let cut_off: Vec<(&str, EdgeId, LocationImpact)> = analysis
            .locations
            .iter()
            .map(|l| (l.label.as_str(), l.edge, l.impact))
            .collect();
        assert_eq!(
            cut_off,
            vec![
                ("north", EdgeId(1), LocationImpact::Flooded),
                ("clinic", EdgeId(2), LocationImpact::Isolated),
            ]
        );

        assert_eq!(
            analysis.counts,
            vec![
                IsolatedLocationCount {
                    scenario: "RP100".to_string(),
                    category: "health".to_string(),
                    impact: LocationImpact::Isolated,
                    count: 1,
                },
                IsolatedLocationCount {
                    scenario: "RP100".to_string(),
                    category: "school".to_string(),
                    impact: LocationImpact::Flooded,
                    count: 1,
                },
            ]
        );
    }

    #[test]
    fn flooded_bridge_stays_open() {
        let mut network = network();
        flood(&mut network, &[(4, 3.0)]);
        let analysis = run(&network, 0.5);
        assert!(analysis.roads.is_empty());
        assert!(analysis.counts.is_empty());
    }

    #[test]
    fn dry_network_has_no_impact() {
        let mut network = network();
        flood(&mut network, &[(0, 0.2)]);
        assert_eq!(run(&network, 0.5), IsolatedLocationAnalysis::default());
    }

    #[test]
    fn equal_components_keep_the_one_with_the_lowest_node() {
        let network = network();
        let mut graph = route_graph(&network, "length").unwrap();
        for id in [1, 3] {
            let index = network.edge_index(EdgeId(id)).unwrap();
            graph.remove_edge(index);
        }
        let e2 = network.edge_index(EdgeId(2)).unwrap();
        // {1, 2, 5} outnumbers {3, 4}.
        assert_eq!(isolated_edges(&graph), HashSet::from([e2]));

        let e4 = network.edge_index(EdgeId(4)).unwrap();
        graph.remove_edge(e4);
        // {1, 2} ties with {3, 4} and holds the lowest node.
        assert_eq!(isolated_edges(&graph), HashSet::from([e2]));
    }

    #[test]
    fn rejects_negative_buffer() {
        let network = network();
        assert!(matches!(
            isolated_locations(&network, "length", &[], &locations(), -1.0, &null_progress()),
            Err(AnalysisError::InvalidOption { .. })
        ));
    }
}
