//! Connectivity between every origin and every destination, with and
//! without hazard.

use std::collections::HashMap;
use std::sync::Arc;

use netrisk_analysis_models::{DisruptionCriteria, OdPairResult, OdPairSummary};
use netrisk_network::Network;
use netrisk_network::progress::ProgressCallback;
use petgraph::stable_graph::NodeIndex;
use rayon::prelude::*;

use crate::AnalysisError;
use crate::disruption::DisruptionScenario;
use crate::routing::{node_ids, round3, route_graph, shortest_path};

#[derive(Debug, Clone, PartialEq)]
pub struct OdPairAnalysis {
    pub results: Vec<OdPairResult>,
    pub summaries: Vec<OdPairSummary>,
}

/// Routes every origin to every other destination node, once without
/// hazard and once per scenario.
///
/// # Errors
///
/// * [`AnalysisError::NoOdNodes`] if there are no origins or destinations
/// * [`AnalysisError::MissingAttribute`] if the weighing or a scenario's
///   hazard attribute is missing
pub fn od_pairs(
    network: &Network,
    weighing: &str,
    scenarios: &[DisruptionCriteria],
    progress: &Arc<dyn ProgressCallback>,
) -> Result<OdPairAnalysis, AnalysisError> {
    let origins = network.origins();
    if origins.is_empty() {
        return Err(AnalysisError::NoOdNodes { role: "origin" });
    }
    let destinations = network.destinations();
    if destinations.is_empty() {
        return Err(AnalysisError::NoOdNodes {
            role: "destination",
        });
    }

    let pairs: Vec<(NodeIndex, NodeIndex)> = origins
        .iter()
        .flat_map(|&o| destinations.iter().map(move |&d| (o, d)))
        .filter(|(o, d)| o != d)
        .collect();

    let base = route_graph(network, weighing)?;
    let baseline: Vec<Option<f64>> = pairs
        .par_iter()
        .map(|&(o, d)| shortest_path(&base, o, d).map(|r| r.cost))
        .collect();
    log::info!(
        "{} origin/destination pairs, {} connected without hazard",
        pairs.len(),
        baseline.iter().filter(|c| c.is_some()).count()
    );

    progress.start("Origin/destination pairs", scenarios.len() as u64);

    let per_scenario = scenarios
        .par_iter()
        .map(|criteria| {
            let scenario = DisruptionScenario::new(network, &base, criteria)?;
            let results: Vec<OdPairResult> = pairs
                .iter()
                .zip(&baseline)
                .map(|(&(o, d), &baseline_cost)| {
                    let route = shortest_path(scenario.graph(), o, d);
                    let scenario_cost = route.as_ref().map(|r| r.cost);
                    OdPairResult {
                        scenario: scenario.scenario().to_string(),
                        origin: network.graph()[o].id,
                        destination: network.graph()[d].id,
                        baseline_cost,
                        scenario_cost,
                        diff_cost: scenario_cost
                            .zip(baseline_cost)
                            .map(|(s, b)| round3(s - b)),
                        path: route.as_ref().map(|r| node_ids(&base, &r.nodes)),
                        connected: route.is_some(),
                    }
                })
                .collect();
            let summary = summarize(scenario.scenario(), &pairs, &results);
            log::info!(
                "Scenario {}: {} of {} pairs disconnected",
                summary.scenario,
                summary.disconnected_pairs,
                summary.pairs
            );
            progress.scenario_done(scenario.scenario());
            Ok((results, summary))
        })
        .collect::<Result<Vec<_>, AnalysisError>>()?;

    progress.finish("Origin/destination pairs done".to_string());

    let mut analysis = OdPairAnalysis {
        results: Vec::with_capacity(pairs.len() * scenarios.len()),
        summaries: Vec::with_capacity(scenarios.len()),
    };
    for (results, summary) in per_scenario {
        analysis.results.extend(results);
        analysis.summaries.push(summary);
    }
    Ok(analysis)
}

fn summarize(
    scenario: &str,
    pairs: &[(NodeIndex, NodeIndex)],
    results: &[OdPairResult],
) -> OdPairSummary {
    let lost = |r: &OdPairResult| r.baseline_cost.is_some() && !r.connected;

    // Per node: reachable without hazard, reachable in the scenario.
    let disconnected = |side: fn(&(NodeIndex, NodeIndex)) -> NodeIndex| {
        let mut reach: HashMap<NodeIndex, (bool, bool)> = HashMap::new();
        for (pair, result) in pairs.iter().zip(results) {
            let entry = reach.entry(side(pair)).or_default();
            entry.0 |= result.baseline_cost.is_some();
            entry.1 |= result.connected;
        }
        reach
            .values()
            .filter(|&&(before, after)| before && !after)
            .count()
    };

    let mut increases: Vec<f64> = results.iter().filter_map(|r| r.diff_cost).collect();
    increases.sort_unstable_by(f64::total_cmp);

    OdPairSummary {
        scenario: scenario.to_string(),
        pairs: results.len(),
        disconnected_pairs: results.iter().filter(|&r| lost(r)).count(),
        disconnected_origins: disconnected(|p| p.0),
        disconnected_destinations: disconnected(|p| p.1),
        max_increase: increases.last().copied(),
        mean_increase: mean(&increases),
        median_increase: median(&increases),
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Median of sorted values.
fn median(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    Some(if n % 2 == 1 {
        sorted[n / 2]
    } else {
        f64::midpoint(sorted[n / 2 - 1], sorted[n / 2])
    })
}

#[cfg(test)]
mod tests {
    use netrisk_network::progress::null_progress;
    use netrisk_network_models::{NodeId, NodeRole};

    use super::*;
    use crate::test_network::{flood, flood_key, network};

    fn od_network(edges: &[(u64, f64)]) -> Network {
        let mut network = network();
        flood(&mut network, edges);
        for (id, role) in [
            (1, NodeRole::Origin),
            (3, NodeRole::Destination),
            (5, NodeRole::Destination),
        ] {
            let index = network.node_index(NodeId(id)).unwrap();
            network.node_mut(index).unwrap().role = role;
        }
        network
    }

    fn run(network: &Network) -> OdPairAnalysis {
        od_pairs(
            network,
            "time",
            &[DisruptionCriteria::new(flood_key(), 0.5)],
            &null_progress(),
        )
        .unwrap()
    }

    #[test]
    fn cost_increase_per_pair() {
        let analysis = run(&od_network(&[(1, 1.0)]));
        assert_eq!(analysis.results.len(), 2);

        let to_three = &analysis.results[0];
        assert_eq!(to_three.destination, NodeId(3));
        assert_eq!(to_three.baseline_cost, Some(3.0));
        assert_eq!(to_three.scenario_cost, Some(7.0));
        assert_eq!(to_three.diff_cost, Some(4.0));
        assert_eq!(
            to_three.path,
            Some(vec![NodeId(1), NodeId(4), NodeId(3)])
        );

        let summary = &analysis.summaries[0];
        assert_eq!(summary.pairs, 2);
        assert_eq!(summary.disconnected_pairs, 0);
        assert_eq!(summary.max_increase, Some(4.0));
        assert_eq!(summary.mean_increase, Some(2.0));
        assert_eq!(summary.median_increase, Some(2.0));
    }

    #[test]
    fn isolated_origin_loses_every_pair() {
        let analysis = run(&od_network(&[(0, 1.0), (3, 1.0)]));
        for result in &analysis.results {
            assert!(!result.connected);
            assert_eq!(result.scenario_cost, None);
            assert_eq!(result.diff_cost, None);
            assert_eq!(result.path, None);
        }
        let summary = &analysis.summaries[0];
        assert_eq!(summary.disconnected_pairs, 2);
        assert_eq!(summary.disconnected_origins, 1);
        assert_eq!(summary.disconnected_destinations, 2);
        assert_eq!(summary.max_increase, None);
        assert_eq!(summary.median_increase, None);
    }

    #[test]
    fn node_counts_as_disconnected_only_when_every_pair_is_lost() {
        let pairs = [
            (NodeIndex::new(0), NodeIndex::new(2)),
            (NodeIndex::new(0), NodeIndex::new(3)),
            (NodeIndex::new(1), NodeIndex::new(3)),
        ];
        let result = |baseline: Option<f64>, connected: bool| OdPairResult {
            scenario: "RP10".to_string(),
            origin: NodeId(0),
            destination: NodeId(0),
            baseline_cost: baseline,
            scenario_cost: connected.then_some(1.0),
            diff_cost: None,
            path: None,
            connected,
        };
        let results = [
            result(Some(1.0), false),
            result(Some(1.0), true),
            result(None, false),
        ];
        let summary = summarize("RP10", &pairs, &results);
        // Origin 0 keeps one destination; origin 1 never reached any.
        assert_eq!(summary.disconnected_origins, 0);
        // Destination 2 lost its only origin; 3 is still reached from 0.
        assert_eq!(summary.disconnected_destinations, 1);
        assert_eq!(summary.disconnected_pairs, 1);
    }

    #[test]
    fn median_of_even_count() {
        assert_eq!(median(&[1.0, 2.0, 4.0, 10.0]), Some(3.0));
        assert_eq!(median(&[1.0, 2.0, 4.0]), Some(2.0));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn needs_destinations() {
        let mut network = network();
        let one = network.node_index(NodeId(1)).unwrap();
        network.node_mut(one).unwrap().role = NodeRole::Origin;
        assert!(matches!(
            od_pairs(&network, "time", &[], &null_progress()),
            Err(AnalysisError::NoOdNodes { role: "destination" })
        ));
    }
}
