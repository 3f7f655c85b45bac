//! Origins routed to their closest destination.
//!
//! A virtual sink is joined to every destination with zero-weight edges,
//! so one shortest path from an origin to the sink finds its closest
//! destination. Routes are computed once without hazard (the baseline)
//! and once per disruption scenario; a scenario route is *no-delay* if it
//! reaches the baseline destination at no extra cost, *delayed*
//! otherwise. Origins that reach no destination are *no-access*, and an
//! origin whose closest destination is itself flooded is
//! *destination-disrupted*.
//!
//! Counts are in people: the origin's count attribute times the outflow
//! fraction.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use netrisk_analysis_models::{
    DestinationLoad, DisruptionCriteria, EdgeLoad, OdRoute, OdSummary, RouteStatus,
};
use netrisk_network::progress::ProgressCallback;
use netrisk_network::{Network, Node};
use netrisk_network_models::EdgeId;
use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use rayon::prelude::*;

use crate::AnalysisError;
use crate::disruption::DisruptionScenario;
use crate::routing::{
    Route, RouteEdge, RouteGraph, RouteNode, canonical_edge, node_ids, route_graph, shortest_path,
};

/// Scenario costs within this margin of the baseline count as no delay.
const COST_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct OdOptions {
    /// Origin node attribute holding the number of people. Every origin
    /// counts as one when `None`.
    pub count_field: Option<String>,
    /// Share of an origin's people that travel.
    pub outflow_fraction: f64,
    /// Hazard value above which a destination is disrupted. Defaults to the
    /// scenario's disruption threshold.
    pub destination_threshold: Option<f64>,
}

impl Default for OdOptions {
    fn default() -> Self {
        Self {
            count_field: None,
            outflow_fraction: 1.0,
            destination_threshold: None,
        }
    }
}

/// People assigned to edges and destinations by a set of routes.
#[derive(Debug, Clone, Default)]
pub struct LoadAccumulator {
    edges: HashMap<EdgeIndex, f64>,
    destinations: HashMap<NodeIndex, f64>,
}

impl LoadAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `people` to every edge along `route` and to its destination.
    /// Between parallel edges the cheapest one carries the load.
    pub fn add_route(
        &mut self,
        graph: &RouteGraph,
        route: &[NodeIndex],
        destination: NodeIndex,
        people: f64,
    ) {
        for pair in route.windows(2) {
            if let Some(&RouteEdge {
                edge: Some(edge), ..
            }) = canonical_edge(graph, pair[0], pair[1])
            {
                *self.edges.entry(edge).or_default() += people;
            }
        }
        *self.destinations.entry(destination).or_default() += people;
    }

    pub fn merge(&mut self, other: Self) {
        for (edge, load) in other.edges {
            *self.edges.entry(edge).or_default() += load;
        }
        for (node, people) in other.destinations {
            *self.destinations.entry(node).or_default() += people;
        }
    }

    #[must_use]
    pub fn edge_load(&self, edge: EdgeIndex) -> f64 {
        self.edges.get(&edge).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn destination_load(&self, node: NodeIndex) -> f64 {
        self.destinations.get(&node).copied().unwrap_or_default()
    }

    /// Edge loads in edge id order.
    #[must_use]
    pub fn edge_loads(&self, network: &Network, scenario: Option<&str>) -> Vec<EdgeLoad> {
        let mut loads: Vec<EdgeLoad> = self
            .edges
            .iter()
            .filter_map(|(&index, &load)| {
                let edge = network.edge(index)?;
                Some(EdgeLoad {
                    scenario: scenario.map(str::to_string),
                    edge: edge.id,
                    external_id: edge.external_id.clone(),
                    load,
                })
            })
            .collect();
        loads.sort_unstable_by_key(|l| l.edge);
        loads
    }

    /// Destination loads in node id order.
    #[must_use]
    pub fn destination_loads(
        &self,
        network: &Network,
        scenario: Option<&str>,
    ) -> Vec<DestinationLoad> {
        let mut loads: Vec<DestinationLoad> = self
            .destinations
            .iter()
            .filter_map(|(&index, &people)| {
                let node = network.node(index)?;
                Some(DestinationLoad {
                    scenario: scenario.map(str::to_string),
                    destination: node.id,
                    labels: labels(node),
                    people,
                })
            })
            .collect();
        loads.sort_unstable_by_key(|l| l.destination);
        loads
    }
}

/// Routes, totals and loads of one scenario (or the baseline).
#[derive(Debug, Clone, PartialEq)]
pub struct OdOutcome {
    pub summary: OdSummary,
    pub routes: Vec<OdRoute>,
    pub edge_loads: Vec<EdgeLoad>,
    pub destination_loads: Vec<DestinationLoad>,
}

/// Baseline and per-scenario outcomes.
#[derive(Debug, Clone, PartialEq)]
pub struct OdAnalysis {
    pub baseline: OdOutcome,
    pub scenarios: Vec<OdOutcome>,
}

#[derive(Debug, Clone)]
struct Closest {
    destination: NodeIndex,
    route: Route,
}

/// Closest-destination routing on one network and weighing.
pub struct ClosestDestination<'a> {
    network: &'a Network,
    graph: RouteGraph,
    origins: Vec<NodeIndex>,
    destinations: Vec<NodeIndex>,
    people: Vec<f64>,
    options: OdOptions,
    baseline: Vec<Option<Closest>>,
}

impl<'a> ClosestDestination<'a> {
    /// Validates the inputs and routes the baseline.
    ///
    /// # Errors
    ///
    /// * [`AnalysisError::InvalidOption`] if the outflow fraction is not in
    ///   `[0, 1]`
    /// * [`AnalysisError::NoOdNodes`] if there are no origins or no
    ///   destinations
    /// * [`AnalysisError::MissingAttribute`] if the weighing or an origin's
    ///   count attribute is missing
    pub fn new(
        network: &'a Network,
        weighing: &str,
        options: OdOptions,
    ) -> Result<Self, AnalysisError> {
        if !(0.0..=1.0).contains(&options.outflow_fraction) {
            return Err(AnalysisError::InvalidOption {
                message: format!(
                    "outflow fraction {} is not between 0 and 1",
                    options.outflow_fraction
                ),
            });
        }

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

        let people = origins
            .iter()
            .map(|&index| {
                let node = &network.graph()[index];
                let count = match &options.count_field {
                    Some(field) => {
                        node.value(field)
                            .ok_or_else(|| AnalysisError::MissingAttribute {
                                attribute: field.clone(),
                                element: format!("origin node {}", node.id),
                            })?
                    }
                    None => 1.0,
                };
                Ok(count * options.outflow_fraction)
            })
            .collect::<Result<Vec<f64>, AnalysisError>>()?;

        let graph = route_graph(network, weighing)?;
        let baseline = closest_destinations(&graph, &origins, &destinations);
        log::info!(
            "Routed {} origins to {} destinations, {} without access",
            origins.len(),
            destinations.len(),
            baseline.iter().filter(|c| c.is_none()).count()
        );

        Ok(Self {
            network,
            graph,
            origins,
            destinations,
            people,
            options,
            baseline,
        })
    }

    #[must_use]
    pub fn origins(&self) -> &[NodeIndex] {
        &self.origins
    }

    #[must_use]
    pub fn destinations(&self) -> &[NodeIndex] {
        &self.destinations
    }

    /// Routes and loads without hazard.
    #[must_use]
    pub fn baseline(&self) -> OdOutcome {
        let mut summary = OdSummary::default();
        let mut routes = Vec::with_capacity(self.origins.len());
        let mut loads = LoadAccumulator::new();

        for (i, closest) in self.baseline.iter().enumerate() {
            let people = self.people[i];
            let status = match closest {
                Some(closest) => {
                    loads.add_route(
                        &self.graph,
                        &closest.route.nodes,
                        closest.destination,
                        people,
                    );
                    summary.no_delay += people;
                    RouteStatus::NoDelay
                }
                None => {
                    summary.no_access += people;
                    RouteStatus::NoAccess
                }
            };
            routes.push(self.route(None, i, &self.graph, closest.as_ref(), status));
        }
        summary.route_disrupted = summary.delayed + summary.no_access;

        OdOutcome {
            summary,
            routes,
            edge_loads: loads.edge_loads(self.network, None),
            destination_loads: loads.destination_loads(self.network, None),
        }
    }

    /// Routes one disruption scenario and compares it with the baseline.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::MissingAttribute`] if an edge or destination
    /// node has no value for the scenario's hazard attribute.
    pub fn analyze(&self, criteria: &DisruptionCriteria) -> Result<OdOutcome, AnalysisError> {
        let scenario = DisruptionScenario::new(self.network, &self.graph, criteria)?;
        let name = scenario.scenario();
        let threshold = self
            .options
            .destination_threshold
            .unwrap_or(criteria.threshold);

        let mut flooded = HashSet::new();
        for &index in &self.destinations {
            let node = &self.network.graph()[index];
            let value = node.hazard.get(&criteria.hazard).copied().ok_or_else(|| {
                AnalysisError::MissingAttribute {
                    attribute: criteria.hazard.to_string(),
                    element: format!("destination node {}", node.id),
                }
            })?;
            if value.is_some_and(|v| v > threshold) {
                flooded.insert(index);
            }
        }

        let closest = closest_destinations(scenario.graph(), &self.origins, &self.destinations);

        let mut summary = OdSummary {
            scenario: Some(name.to_string()),
            ..OdSummary::default()
        };
        let mut routes = Vec::with_capacity(self.origins.len());
        let mut loads = LoadAccumulator::new();

        for (i, found) in closest.iter().enumerate() {
            let people = self.people[i];
            let status = match found {
                None => {
                    summary.no_access += people;
                    RouteStatus::NoAccess
                }
                Some(found) if flooded.contains(&found.destination) => {
                    summary.destination_disrupted += people;
                    RouteStatus::DestinationDisrupted
                }
                Some(found) => {
                    loads.add_route(
                        scenario.graph(),
                        &found.route.nodes,
                        found.destination,
                        people,
                    );
                    match &self.baseline[i] {
                        Some(base)
                            if base.destination == found.destination
                                && found.route.cost <= base.route.cost + COST_TOLERANCE =>
                        {
                            summary.no_delay += people;
                            RouteStatus::NoDelay
                        }
                        base => {
                            if let Some(base) = base {
                                summary.extra_detour +=
                                    (found.route.cost - base.route.cost).max(0.0) * people;
                            }
                            summary.delayed += people;
                            RouteStatus::Delayed
                        }
                    }
                }
            };
            routes.push(self.route(Some(name), i, scenario.graph(), found.as_ref(), status));
        }
        summary.route_disrupted = summary.delayed + summary.no_access;

        log::info!(
            "Scenario {name}: {} no delay, {} delayed, {} no access, {} destination disrupted",
            summary.no_delay,
            summary.delayed,
            summary.no_access,
            summary.destination_disrupted
        );

        Ok(OdOutcome {
            summary,
            routes,
            edge_loads: loads.edge_loads(self.network, Some(name)),
            destination_loads: loads.destination_loads(self.network, Some(name)),
        })
    }

    fn route(
        &self,
        scenario: Option<&str>,
        i: usize,
        graph: &RouteGraph,
        closest: Option<&Closest>,
        status: RouteStatus,
    ) -> OdRoute {
        let origin = &self.network.graph()[self.origins[i]];
        let destination = closest.and_then(|c| self.network.node(c.destination));
        OdRoute {
            scenario: scenario.map(str::to_string),
            origin: origin.id,
            origin_labels: labels(origin),
            destination: destination.map(|n| n.id),
            destination_labels: destination.map(labels),
            cost: closest.map(|c| c.route.cost),
            path: closest.map(|c| node_ids(graph, &c.route.nodes)),
            people: self.people[i],
            status,
        }
    }
}

/// Baseline plus every scenario. Scenarios run in parallel.
///
/// # Errors
///
/// Returns an error if the inputs are invalid or a scenario's hazard
/// attribute is missing.
pub fn analyze_od(
    network: &Network,
    weighing: &str,
    scenarios: &[DisruptionCriteria],
    options: OdOptions,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<OdAnalysis, AnalysisError> {
    let analysis = ClosestDestination::new(network, weighing, options)?;

    progress.start("Closest destination", scenarios.len() as u64);

    let outcomes = scenarios
        .par_iter()
        .map(|criteria| {
            let outcome = analysis.analyze(criteria);
            progress.scenario_done(criteria.scenario());
            outcome
        })
        .collect::<Result<Vec<_>, AnalysisError>>()?;

    progress.finish("Closest destination done".to_string());
    Ok(OdAnalysis {
        baseline: analysis.baseline(),
        scenarios: outcomes,
    })
}

fn closest_destinations(
    graph: &RouteGraph,
    origins: &[NodeIndex],
    destinations: &[NodeIndex],
) -> Vec<Option<Closest>> {
    let mut with_sink = graph.clone();
    let sink = with_sink.add_node(RouteNode::Sink);
    for &destination in destinations {
        with_sink.add_edge(
            destination,
            sink,
            RouteEdge {
                edge: None,
                weight: 0.0,
            },
        );
    }

    origins
        .par_iter()
        .map(|&origin| {
            let mut route = shortest_path(&with_sink, origin, sink)?;
            route.nodes.pop();
            let destination = *route.nodes.last()?;
            Some(Closest { destination, route })
        })
        .collect()
}

fn labels(node: &Node) -> String {
    node.od_labels.join(",")
}

/// Loads keyed by edge id, for callers that attach them to edges.
#[must_use]
pub fn loads_by_edge(loads: &[EdgeLoad]) -> HashMap<EdgeId, f64> {
    loads.iter().map(|l| (l.edge, l.load)).collect()
}
