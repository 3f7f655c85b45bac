//! Redundancy of network links: the cheapest alternate route between the
//! endpoints of a removed edge.
//!
//! Single-link analysis removes each edge on its own, without hazard.
//! Every removal is evaluated against an edge-filtered view of one shared
//! routing graph, so removals are independent and run in parallel.
//!
//! Multi-link analysis removes every edge a hazard scenario disrupts at
//! once and routes around each of them on that reduced graph.

use std::sync::Arc;

use netrisk_analysis_models::{DisruptionCriteria, RedundancyResult};
use netrisk_network::Network;
use netrisk_network::progress::ProgressCallback;
use netrisk_network_models::EdgeId;
use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use petgraph::visit::{EdgeFiltered, EdgeRef};
use rayon::prelude::*;

use crate::AnalysisError;
use crate::disruption::DisruptionScenario;
use crate::routing::{Route, RouteGraph, node_ids, round3, route_graph, shortest_path};

/// Removes every edge on its own and routes around it.
///
/// Results are in edge id order.
///
/// # Errors
///
/// Returns an error if the weighing is missing or invalid on any edge.
pub fn single_link(
    network: &Network,
    weighing: &str,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Vec<RedundancyResult>, AnalysisError> {
    let graph = route_graph(network, weighing)?;
    let edges = edges_by_id(network);

    progress.start("Single-link redundancy", edges.len() as u64);

    let results: Vec<RedundancyResult> = edges
        .par_iter()
        .map(|&index| {
            let without = EdgeFiltered::from_fn(&graph, move |e| e.id() != index);
            let result = redundancy(network, &graph, index, None, |from, to| {
                shortest_path(&without, from, to)
            });
            progress.inc(1);
            result
        })
        .collect();

    let disconnected = results.iter().filter(|r| !r.connected).count();
    progress.finish(format!(
        "Single-link redundancy: {} edges, {disconnected} without alternate route",
        results.len()
    ));
    log::info!(
        "Single-link redundancy on {} edges: {disconnected} without alternate route",
        results.len()
    );
    Ok(results)
}

/// Removes all edges each scenario disrupts and routes around every one
/// of them. Scenarios run in parallel.
///
/// Results are grouped by scenario in the given order, then by edge id.
///
/// # Errors
///
/// Returns an error if the weighing is missing or invalid, or if an edge
/// lacks a scenario's hazard attribute.
pub fn multi_link(
    network: &Network,
    weighing: &str,
    scenarios: &[DisruptionCriteria],
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Vec<RedundancyResult>, AnalysisError> {
    let base = route_graph(network, weighing)?;

    progress.start("Multi-link redundancy", scenarios.len() as u64);

    let per_scenario = scenarios
        .par_iter()
        .map(|criteria| {
            let scenario = DisruptionScenario::new(network, &base, criteria)?;
            let results: Vec<RedundancyResult> = scenario
                .removed()
                .iter()
                .map(|&index| {
                    redundancy(
                        network,
                        &base,
                        index,
                        Some(scenario.scenario()),
                        |from, to| shortest_path(scenario.graph(), from, to),
                    )
                })
                .collect();
            log::info!(
                "Scenario {}: {} edges disrupted, {} without alternate route",
                scenario.scenario(),
                results.len(),
                results.iter().filter(|r| !r.connected).count()
            );
            progress.scenario_done(scenario.scenario());
            Ok(results)
        })
        .collect::<Result<Vec<_>, AnalysisError>>()?;

    progress.finish("Multi-link redundancy done".to_string());
    Ok(per_scenario.into_iter().flatten().collect())
}

fn edges_by_id(network: &Network) -> Vec<EdgeIndex> {
    let mut edges: Vec<(EdgeId, EdgeIndex)> =
        network.edges().map(|(index, edge)| (edge.id, index)).collect();
    edges.sort_unstable_by_key(|(id, _)| *id);
    edges.into_iter().map(|(_, index)| index).collect()
}

fn redundancy(
    network: &Network,
    base: &RouteGraph,
    index: EdgeIndex,
    scenario: Option<&str>,
    route: impl Fn(NodeIndex, NodeIndex) -> Option<Route>,
) -> RedundancyResult {
    let edge = &network.graph()[index];
    let current_weight = base[index].weight;
    let alternate = network
        .endpoints(index)
        .and_then(|(from, to)| route(from, to));

    RedundancyResult {
        scenario: scenario.map(str::to_string),
        edge: edge.id,
        external_id: edge.external_id.clone(),
        from: edge.from,
        to: edge.to,
        current_weight,
        alt_weight: alternate.as_ref().map(|r| r.cost),
        diff_weight: alternate.as_ref().map(|r| round3(r.cost - current_weight)),
        alt_path: alternate.as_ref().map(|r| node_ids(base, &r.nodes)),
        connected: alternate.is_some(),
    }
}
