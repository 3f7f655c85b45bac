//! Writes hazard statistics from every source of a hazard set onto a
//! network or a feature table.
//!
//! Each source is processed in three steps: snapshot the target geometry
//! in the source's CRS, compute every value into a buffer, then write the
//! buffer. Nothing is written for a source that fails, and a failing
//! source does not stop the others. Re-running an overlay overwrites the
//! same attributes with the same values.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use geo::{LineString, Point};
use netrisk_hazard_models::{AggregationStat, HazardSetConfig};
use netrisk_network::progress::ProgressCallback;
use netrisk_network::reproject::{reproject_line, reproject_point};
use netrisk_network::{FeatureGeometry, FeatureTable, Network};
use netrisk_network_models::{AttributeValue, Crs, Extent, HazardKey, HazardStat};
use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use rayon::prelude::*;

use crate::HazardError;
use crate::names::{HazardName, scenario_names};
use crate::sampler::{HazardSampler, SampleStats};
use crate::source::{Capability, HazardSource};
use crate::table::JoinTable;

const ALL_STATS: [HazardStat; 4] = [
    HazardStat::Min,
    HazardStat::Max,
    HazardStat::Mean,
    HazardStat::Fraction,
];

/// An opened source together with its scenario name and CRS.
pub struct HazardMember {
    pub name: HazardName,
    pub crs: Crs,
    pub source: HazardSource,
}

/// A source that could not be opened or overlaid.
#[derive(Debug)]
pub struct SourceFailure {
    pub scenario: String,
    pub error: HazardError,
}

/// Outcome of [`HazardSet::overlay`].
#[derive(Debug, Default)]
pub struct OverlayReport {
    /// Scenarios whose attributes were written.
    pub applied: Vec<String>,
    pub failed: Vec<SourceFailure>,
}

impl OverlayReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Where overlay results are written.
pub enum OverlayTarget<'a> {
    /// Edges get `<scenario>_<stat>` and `<scenario>_fr`; nodes get
    /// `<scenario>_<stat>`.
    Graph(&'a mut Network),
    /// Every feature gets `mi`, `ma`, `me` and `fr`.
    Table(&'a mut FeatureTable),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Edge(EdgeIndex),
    Node(NodeIndex),
    Feature(usize),
}

type Values = Vec<(HazardKey, Option<f64>)>;

/// Target geometries in one CRS.
#[derive(Clone)]
struct Snapshot {
    crs: Crs,
    lines: Vec<(Slot, LineString<f64>)>,
    points: Vec<(Slot, Point<f64>)>,
}

impl Snapshot {
    fn take(target: &OverlayTarget<'_>, with_nodes: bool) -> Self {
        match target {
            OverlayTarget::Graph(network) => Self {
                crs: network.crs(),
                lines: network
                    .edges()
                    .map(|(i, e)| (Slot::Edge(i), e.geometry().clone()))
                    .collect(),
                points: if with_nodes {
                    network.nodes().map(|(i, n)| (Slot::Node(i), n.point)).collect()
                } else {
                    Vec::new()
                },
            },
            OverlayTarget::Table(table) => {
                let mut lines = Vec::new();
                let mut points = Vec::new();
                for (i, feature) in table.features.iter().enumerate() {
                    match &feature.geometry {
                        FeatureGeometry::Line(line) => lines.push((Slot::Feature(i), line.clone())),
                        FeatureGeometry::Point(p) => points.push((Slot::Feature(i), *p)),
                    }
                }
                Self {
                    crs: table.crs,
                    lines,
                    points,
                }
            }
        }
    }

    /// The snapshot in `crs`, reprojecting a copy if needed.
    fn in_crs(&self, crs: Crs) -> Cow<'_, Self> {
        if self.crs == crs {
            return Cow::Borrowed(self);
        }
        Cow::Owned(Self {
            crs,
            lines: self
                .lines
                .iter()
                .map(|(slot, line)| (*slot, reproject_line(line, self.crs, crs)))
                .collect(),
            points: self
                .points
                .iter()
                .map(|(slot, p)| (*slot, reproject_point(*p, self.crs, crs)))
                .collect(),
        })
    }

    fn extent(&self) -> Option<Extent> {
        let line_coords = self
            .lines
            .iter()
            .flat_map(|(_, l)| l.coords().map(|c| (c.x, c.y)));
        let point_coords = self.points.iter().map(|(_, p)| (p.x(), p.y()));
        Extent::from_points(line_coords.chain(point_coords))
    }

    fn len(&self) -> usize {
        self.lines.len() + self.points.len()
    }
}

/// The opened sources of a hazard set.
pub struct HazardSet {
    aggregate: Option<AggregationStat>,
    overlay_nodes: bool,
    names: Vec<HazardName>,
    members: Vec<HazardMember>,
    failures: Vec<SourceFailure>,
}

impl HazardSet {
    /// Assembles a set from already opened sources.
    #[must_use]
    pub fn new(
        aggregate: Option<AggregationStat>,
        overlay_nodes: bool,
        members: Vec<HazardMember>,
    ) -> Self {
        Self {
            aggregate,
            overlay_nodes,
            names: members.iter().map(|m| m.name.clone()).collect(),
            members,
            failures: Vec::new(),
        }
    }

    /// Names every source and opens it. Sources that fail to open are
    /// recorded in [`Self::failures`] and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the scenario names collide.
    pub fn open(config: &HazardSetConfig) -> Result<Self, HazardError> {
        let names = scenario_names(&config.sources)?;
        let mut members = Vec::new();
        let mut failures = Vec::new();

        for (source, name) in config.sources.iter().zip(&names) {
            match HazardSource::open(source) {
                Ok(opened) => members.push(HazardMember {
                    name: name.clone(),
                    crs: source.crs,
                    source: opened,
                }),
                Err(error) => {
                    log::error!(
                        "Failed to open hazard source {} ({}): {error}",
                        name.scenario,
                        source.path.display()
                    );
                    failures.push(SourceFailure {
                        scenario: name.scenario.clone(),
                        error,
                    });
                }
            }
        }

        Ok(Self {
            aggregate: config.aggregate,
            overlay_nodes: config.overlay_nodes,
            names,
            members,
            failures,
        })
    }

    /// Scenario names of every configured source, opened or not.
    #[must_use]
    pub fn names(&self) -> &[HazardName] {
        &self.names
    }

    #[must_use]
    pub fn members(&self) -> &[HazardMember] {
        &self.members
    }

    /// Sources that could not be opened.
    #[must_use]
    pub fn failures(&self) -> &[SourceFailure] {
        &self.failures
    }

    /// Statistic written as the per-element hazard value.
    ///
    /// # Errors
    ///
    /// Returns [`HazardError::AggregationAmbiguity`] if no aggregation is
    /// configured and a source can give an element several values.
    pub fn stat(&self) -> Result<HazardStat, HazardError> {
        if let Some(aggregate) = self.aggregate {
            return Ok(aggregate.stat());
        }
        match self.members.iter().find(|m| m.source.needs_aggregation()) {
            Some(member) => Err(HazardError::AggregationAmbiguity {
                scenario: member.name.scenario.clone(),
            }),
            None => Ok(HazardStat::Max),
        }
    }

    /// Overlays every source onto the target.
    ///
    /// # Errors
    ///
    /// Returns [`HazardError::AggregationAmbiguity`] before anything is
    /// written if the set needs an aggregation and has none. Per-source
    /// failures are reported in the returned [`OverlayReport`].
    pub fn overlay(
        &self,
        mut target: OverlayTarget<'_>,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<OverlayReport, HazardError> {
        let stat = self.stat()?;
        let snapshot = Snapshot::take(&target, self.overlay_nodes);
        let mut report = OverlayReport::default();

        for member in &self.members {
            let scenario = member.name.scenario.as_str();
            let computed = match member.source.capability() {
                Capability::Spatial(sampler) => {
                    if member.crs != snapshot.crs {
                        log::warn!(
                            "Hazard map {scenario} is in {}, reprojecting target from {}",
                            member.crs,
                            snapshot.crs
                        );
                    }
                    let working = snapshot.in_crs(member.crs);
                    sample(scenario, sampler, &working, &target, stat, progress)
                }
                Capability::Join(table) => Ok(join(scenario, table, &target, stat)),
            };

            match computed {
                Ok(writes) => {
                    apply(&mut target, writes);
                    log::info!("Overlaid hazard map {scenario}");
                    report.applied.push(scenario.to_string());
                }
                Err(error) => {
                    log::error!("Hazard map {scenario} skipped: {error}");
                    report.failed.push(SourceFailure {
                        scenario: scenario.to_string(),
                        error,
                    });
                }
            }
        }

        progress.finish(format!(
            "Overlaid {} of {} hazard maps",
            report.applied.len(),
            self.members.len()
        ));
        Ok(report)
    }
}

fn sample(
    scenario: &str,
    sampler: &dyn HazardSampler,
    snapshot: &Snapshot,
    target: &OverlayTarget<'_>,
    stat: HazardStat,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Vec<(Slot, Values)>, HazardError> {
    let network_extent = snapshot.extent();
    let hazard_extent = sampler.extent();
    match (network_extent, hazard_extent) {
        (Some(n), Some(h)) if n.intersects(&h) => {}
        _ => {
            return Err(HazardError::ExtentMismatch {
                scenario: scenario.to_string(),
                network: network_extent,
                hazard: hazard_extent,
            });
        }
    }

    let table = matches!(target, OverlayTarget::Table(_));
    let key = |s: HazardStat| HazardKey::new(scenario, s);
    let keys_for = |slot: Slot, sampled: &SampleStats| -> Values {
        match (table, slot) {
            (true, _) => ALL_STATS.iter().map(|s| (key(*s), sampled.get(*s))).collect(),
            (false, Slot::Edge(_)) => vec![
                (key(stat), sampled.get(stat)),
                (key(HazardStat::Fraction), Some(sampled.fraction)),
            ],
            (false, _) => vec![(key(stat), sampled.get(stat))],
        }
    };

    progress.start(scenario, snapshot.len() as u64);

    let mut writes: Vec<(Slot, Values)> = snapshot
        .lines
        .par_iter()
        .map(|(slot, line)| {
            let sampled = sampler.sample_line(line);
            progress.inc(1);
            (*slot, keys_for(*slot, &sampled))
        })
        .collect();
    writes.par_extend(snapshot.points.par_iter().map(|(slot, point)| {
        let sampled = sampler.sample_point(*point);
        progress.inc(1);
        (*slot, keys_for(*slot, &sampled))
    }));

    Ok(writes)
}

fn join(
    scenario: &str,
    table: &JoinTable,
    target: &OverlayTarget<'_>,
    stat: HazardStat,
) -> Vec<(Slot, Values)> {
    let lookup = |attributes: &BTreeMap<String, AttributeValue>| {
        attributes
            .get(table.network_id_field())
            .filter(|v| !v.is_null())
            .and_then(|id| table.lookup(&id.to_string()))
    };

    let mut matched = 0usize;
    let mut record = |found: Option<Option<f64>>| {
        if found.is_some() {
            matched += 1;
        }
        found.flatten()
    };

    let writes: Vec<(Slot, Values)> = match target {
        OverlayTarget::Graph(network) => network
            .edges()
            .map(|(i, e)| {
                let value = record(lookup(&e.attributes));
                (Slot::Edge(i), vec![(HazardKey::new(scenario, stat), value)])
            })
            .collect(),
        OverlayTarget::Table(features) => features
            .features
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let value = record(lookup(&f.attributes));
                let values = [HazardStat::Min, HazardStat::Max, HazardStat::Mean]
                    .into_iter()
                    .map(|s| (HazardKey::new(scenario, s), value))
                    .collect();
                (Slot::Feature(i), values)
            })
            .collect(),
    };

    if matched == 0 {
        log::warn!(
            "Hazard table {scenario} matched no element on {}",
            table.network_id_field()
        );
    } else {
        log::info!("Hazard table {scenario} matched {matched} elements");
    }
    writes
}

fn apply(target: &mut OverlayTarget<'_>, writes: Vec<(Slot, Values)>) {
    for (slot, values) in writes {
        let hazard = match (&mut *target, slot) {
            (OverlayTarget::Graph(network), Slot::Edge(i)) => {
                network.edge_mut(i).map(|e| &mut e.hazard)
            }
            (OverlayTarget::Graph(network), Slot::Node(i)) => {
                network.node_mut(i).map(|n| &mut n.hazard)
            }
            (OverlayTarget::Table(table), Slot::Feature(i)) => {
                table.features.get_mut(i).map(|f| &mut f.hazard)
            }
            _ => None,
        };
        if let Some(hazard) = hazard {
            hazard.extend(values);
        }
    }
}

#[cfg(test)]
mod tests {
    use netrisk_network::progress::null_progress;
    use netrisk_network::reproject::reproject_point;
    use netrisk_network::{Feature, NetworkBuilder, NewEdge, Node};
    use netrisk_network_models::{EdgeId, NodeId};

    use super::*;
    use crate::raster::RasterGrid;

    const ND: f64 = -9999.0;

    /// 3 x 3 grid, lower-left at the origin; only the middle row is wet and
    /// its right cell is no data.
    fn grid(left: f64, top: f64, cell: f64) -> RasterGrid {
        RasterGrid::new(
            left,
            top,
            cell,
            cell,
            3,
            3,
            vec![0.0, 0.0, 0.0, 1.5, 2.0, ND, 0.0, 0.0, 0.0],
            Some(ND),
        )
        .unwrap()
    }

    fn member(scenario: &str, crs: Crs, source: HazardSource) -> HazardMember {
        HazardMember {
            name: HazardName {
                file_name: format!("{scenario}.asc"),
                scenario: scenario.to_string(),
            },
            crs,
            source,
        }
    }

    fn raster_set(members: Vec<HazardMember>) -> HazardSet {
        HazardSet::new(Some(AggregationStat::Max), true, members)
    }

    /// n0 (0,15) -- e0 -- n1 (29,15) -- e1 -- n2 (29,25) -- e2 -- n3 (0,25)
    fn network() -> Network {
        let mut b = NetworkBuilder::new(Crs::WebMercator);
        for (id, x, y) in [(0, 0.0, 15.0), (1, 29.0, 15.0), (2, 29.0, 25.0), (3, 0.0, 25.0)] {
            b.add_node(Node::new(NodeId(id), Point::new(x, y)));
        }
        b.add_edge(
            NewEdge::new(EdgeId(0), NodeId(0), NodeId(1))
                .with_attribute("osm_id", AttributeValue::from("a")),
        )
        .add_edge(
            NewEdge::new(EdgeId(1), NodeId(1), NodeId(2))
                .with_attribute("osm_id", AttributeValue::from("b")),
        )
        .add_edge(NewEdge::new(EdgeId(2), NodeId(2), NodeId(3)));
        b.build().unwrap()
    }

    fn edge_value(network: &Network, edge: u64, key: &str) -> Option<Option<f64>> {
        network
            .edge_by_id(EdgeId(edge))
            .unwrap()
            .hazard_value(&key.parse().unwrap())
    }

    fn node_value(network: &Network, node: u64, key: &str) -> Option<Option<f64>> {
        network
            .node_by_id(NodeId(node))
            .unwrap()
            .hazard
            .get(&key.parse::<HazardKey>().unwrap())
            .copied()
    }

    #[test]
    fn writes_stat_and_fraction_onto_graph() {
        let set = raster_set(vec![member(
            "RP10",
            Crs::WebMercator,
            HazardSource::Raster(grid(0.0, 30.0, 10.0)),
        )]);
        let mut network = network();
        let report = set
            .overlay(OverlayTarget::Graph(&mut network), &null_progress())
            .unwrap();
        assert!(report.is_complete());

        assert_eq!(edge_value(&network, 0, "RP10_ma"), Some(Some(2.0)));
        let fr = edge_value(&network, 0, "RP10_fr").unwrap().unwrap();
        assert!((fr - 20.0 / 29.0).abs() < 1e-12);
        assert_eq!(edge_value(&network, 1, "RP10_ma"), Some(Some(0.0)));
        assert_eq!(edge_value(&network, 2, "RP10_ma"), Some(Some(0.0)));
        assert_eq!(edge_value(&network, 0, "RP10_me"), None);

        assert_eq!(node_value(&network, 0, "RP10_ma"), Some(Some(1.5)));
        assert_eq!(node_value(&network, 1, "RP10_ma"), Some(None));
        assert_eq!(node_value(&network, 0, "RP10_fr"), None);
    }

    #[test]
    fn extent_mismatch_writes_nothing_and_others_continue() {
        let set = raster_set(vec![
            member(
                "RP10",
                Crs::WebMercator,
                HazardSource::Raster(grid(10_000.0, 10_030.0, 10.0)),
            ),
            member(
                "RP100",
                Crs::WebMercator,
                HazardSource::Raster(grid(0.0, 30.0, 10.0)),
            ),
        ]);
        let mut network = network();
        let report = set
            .overlay(OverlayTarget::Graph(&mut network), &null_progress())
            .unwrap();

        assert_eq!(report.applied, vec!["RP100".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(
            report.failed[0].error,
            HazardError::ExtentMismatch { .. }
        ));
        for edge in 0..3 {
            assert_eq!(edge_value(&network, edge, "RP10_ma"), None);
            assert_eq!(edge_value(&network, edge, "RP10_fr"), None);
            assert!(edge_value(&network, edge, "RP100_ma").is_some());
        }
    }

    #[test]
    fn missing_aggregation_is_rejected_before_writing() {
        let set = HazardSet::new(
            None,
            true,
            vec![member(
                "RP10",
                Crs::WebMercator,
                HazardSource::Raster(grid(0.0, 30.0, 10.0)),
            )],
        );
        let mut network = network();
        let result = set.overlay(OverlayTarget::Graph(&mut network), &null_progress());
        assert!(matches!(
            result,
            Err(HazardError::AggregationAmbiguity { .. })
        ));
        assert!(network.edge_hazard_keys().is_empty());
    }

    #[test]
    fn overlay_is_idempotent() {
        let set = raster_set(vec![member(
            "RP10",
            Crs::WebMercator,
            HazardSource::Raster(grid(0.0, 30.0, 10.0)),
        )]);
        let mut network = network();
        set.overlay(OverlayTarget::Graph(&mut network), &null_progress())
            .unwrap();
        let first: Vec<_> = network.edges().map(|(_, e)| e.hazard.clone()).collect();

        set.overlay(OverlayTarget::Graph(&mut network), &null_progress())
            .unwrap();
        let second: Vec<_> = network.edges().map(|(_, e)| e.hazard.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn reprojects_working_copy_only() {
        // Same layout as the metric grid, in degrees near the equator.
        let to_mercator = |x: f64, y: f64| {
            reproject_point(Point::new(x, y), Crs::Wgs84, Crs::WebMercator)
        };
        let mut b = NetworkBuilder::new(Crs::WebMercator);
        b.add_node(Node::new(NodeId(0), to_mercator(0.0, 0.00015)))
            .add_node(Node::new(NodeId(1), to_mercator(0.00029, 0.00015)));
        b.add_edge(NewEdge::new(EdgeId(0), NodeId(0), NodeId(1)));
        let mut network = b.build().unwrap();
        let before = network.edge_by_id(EdgeId(0)).unwrap().geometry().clone();

        let set = raster_set(vec![member(
            "EV1",
            Crs::Wgs84,
            HazardSource::Raster(grid(0.0, 0.0003, 0.0001)),
        )]);
        let report = set
            .overlay(OverlayTarget::Graph(&mut network), &null_progress())
            .unwrap();
        assert!(report.is_complete());

        let edge = network.edge_by_id(EdgeId(0)).unwrap();
        assert_eq!(edge.geometry(), &before);
        assert_eq!(edge_value(&network, 0, "EV1_ma"), Some(Some(2.0)));
    }

    #[test]
    fn table_target_gets_every_statistic() {
        let mut table = FeatureTable::new(
            Crs::WebMercator,
            vec![
                Feature::new(FeatureGeometry::Line(LineString::from(vec![
                    (0.0, 15.0),
                    (29.0, 15.0),
                ]))),
                Feature::new(FeatureGeometry::Point(Point::new(5.0, 15.0))),
            ],
        );
        let set = raster_set(vec![member(
            "RP10",
            Crs::WebMercator,
            HazardSource::Raster(grid(0.0, 30.0, 10.0)),
        )]);
        set.overlay(OverlayTarget::Table(&mut table), &null_progress())
            .unwrap();

        let line = &table.features[0].hazard;
        let get = |h: &BTreeMap<HazardKey, Option<f64>>, k: &str| {
            h.get(&k.parse::<HazardKey>().unwrap()).copied()
        };
        assert_eq!(get(line, "RP10_mi"), Some(Some(1.5)));
        assert_eq!(get(line, "RP10_ma"), Some(Some(2.0)));
        assert_eq!(get(line, "RP10_me"), Some(Some(1.75)));
        assert!(get(line, "RP10_fr").unwrap().is_some());

        let point = &table.features[1].hazard;
        assert_eq!(get(point, "RP10_ma"), Some(Some(1.5)));
        assert_eq!(get(point, "RP10_fr"), Some(Some(1.0)));
    }

    #[test]
    fn table_source_joins_by_id() {
        let csv = "link,depth\na,0.4\nb,\n";
        let table = JoinTable::from_reader(csv.as_bytes(), "link", "depth", "osm_id").unwrap();
        let set = HazardSet::new(None, true, vec![member("EV1", Crs::WebMercator, HazardSource::Table(table))]);
        let mut network = network();
        let report = set
            .overlay(OverlayTarget::Graph(&mut network), &null_progress())
            .unwrap();
        assert!(report.is_complete());

        assert_eq!(edge_value(&network, 0, "EV1_ma"), Some(Some(0.4)));
        assert_eq!(edge_value(&network, 1, "EV1_ma"), Some(None));
        assert_eq!(edge_value(&network, 2, "EV1_ma"), Some(None));
        assert_eq!(edge_value(&network, 0, "EV1_fr"), None);
    }

    #[test]
    fn unreadable_source_is_recorded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("flood_RP_10.asc");
        std::fs::write(
            &good,
            "ncols 3\nnrows 3\nxllcorner 0\nyllcorner 0\ncellsize 10\n0 0 0\n1 1 1\n0 0 0\n",
        )
        .unwrap();
        let config = HazardSetConfig {
            aggregate: Some(AggregationStat::Max),
            overlay_nodes: false,
            sources: vec![
                netrisk_hazard_models::HazardSourceConfig {
                    path: good,
                    name: None,
                    crs: Crs::WebMercator,
                    kind: netrisk_hazard_models::HazardSourceKind::Raster,
                },
                netrisk_hazard_models::HazardSourceConfig {
                    path: dir.path().join("flood_RP_100.asc"),
                    name: None,
                    crs: Crs::WebMercator,
                    kind: netrisk_hazard_models::HazardSourceKind::Raster,
                },
            ],
        };

        let set = HazardSet::open(&config).unwrap();
        assert_eq!(set.names().len(), 2);
        assert_eq!(set.members().len(), 1);
        assert_eq!(set.failures()[0].scenario, "RP100");

        let mut network = network();
        set.overlay(OverlayTarget::Graph(&mut network), &null_progress())
            .unwrap();
        assert_eq!(edge_value(&network, 0, "RP10_ma"), Some(Some(1.0)));
        assert_eq!(node_value(&network, 0, "RP10_ma"), None);
    }
}
