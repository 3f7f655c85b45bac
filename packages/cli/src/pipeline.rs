//! Runs a project: load the network, overlay the hazard maps, run every
//! configured analysis and integrate risk. Every stage writes its results
//! into the output directory before the next one starts.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;

use netrisk_analysis::AnalysisError;
use netrisk_analysis::isolated_locations::isolated_locations;
use netrisk_analysis::od::{OdAnalysis, OdOptions, analyze_od};
use netrisk_analysis::od_pairs::od_pairs;
use netrisk_analysis::redundancy::{multi_link, single_link};
use netrisk_analysis::risk::{ReturnPeriodTable, attach_risk, edge_hazard_table, read_table};
use netrisk_analysis_models::{
    AnalysisConfig, AnalysisKind, DisruptionCriteria, MissingDamage, RedundancyResult, RiskMode,
};
use netrisk_cli_utils::{IndicatifProgress, MultiProgress};
use netrisk_hazard::names::{name_rows, write_names};
use netrisk_hazard::{HazardError, HazardSet, OverlayTarget};
use netrisk_network::export::write_edges;
use netrisk_network::loader::load_network;
use netrisk_network::od::{OdKind, SnapOptions, load_locations, load_od_points, snap_od_points};
use netrisk_network::{Network, NetworkError};
use netrisk_network_models::{EdgeId, HazardKey, HazardStat, return_period_of};
use serde::Serialize;
use thiserror::Error;

use crate::config::{ConfigError, NetworkSection, ProjectConfig, RiskConfig};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Hazard(#[from] HazardError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Some hazard maps could not be opened or overlaid.
    #[error("Hazard maps failed: {scenarios}")]
    HazardFailed {
        /// Comma-separated scenario names.
        scenarios: String,
    },
}

/// One row of a risk output table.
#[derive(Debug, Serialize)]
struct RiskRow<'a, K: Serialize> {
    id: K,
    external_id: Option<&'a str>,
    risk: Option<f64>,
}

/// Writes rows to a CSV file with a header taken from the row fields.
fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), PipelineError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    log::info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Loads a project file and runs it.
///
/// # Errors
///
/// Returns an error if the project file is invalid or any stage fails.
pub fn run_project(path: &Path, multi: &MultiProgress) -> Result<(), PipelineError> {
    let config = ProjectConfig::load(path)?;
    run(&config, multi)
}

/// Runs every stage of a project.
///
/// # Errors
///
/// Returns the first error any stage hits. Nothing after that stage runs.
pub fn run(config: &ProjectConfig, multi: &MultiProgress) -> Result<(), PipelineError> {
    let output = config.output_dir.as_path();
    std::fs::create_dir_all(output)?;

    let steps = IndicatifProgress::steps_bar(multi, "netrisk", 3 + config.analyses.len() as u64);

    let mut network = load_network(&config.network.path, &config.network.options)?;
    snap_od_layers(&mut network, &config.network)?;
    steps.inc(1);

    let (scenarios, stat) = overlay(&mut network, config, multi)?;
    write_edges(&network, &output.join("network_hazard.geojson"))?;
    steps.inc(1);

    let mut multi_link_results = HashMap::new();
    for analysis in &config.analyses {
        log::info!("Running analysis {}", analysis.name);
        if let Some(results) = run_analysis(&network, analysis, &scenarios, stat, config, multi)? {
            multi_link_results.insert(analysis.name.as_str(), results);
        }
        steps.inc(1);
    }

    if let Some(risk) = &config.risk {
        let detours = risk
            .analysis
            .as_deref()
            .and_then(|name| multi_link_results.get(name));
        run_risk(&network, risk, stat, &scenarios, detours.map(Vec::as_slice), output)?;
    }
    steps.inc(1);
    steps.finish(format!("Results written to {}", output.display()));
    Ok(())
}

fn snap_od_layers(network: &mut Network, section: &NetworkSection) -> Result<(), PipelineError> {
    let options = SnapOptions {
        count_field: section.count_attribute(),
        max_distance: section.max_snap_distance,
    };
    for (layer, kind) in [
        (&section.origins, OdKind::Origin),
        (&section.destinations, OdKind::Destination),
    ] {
        let Some(layer) = layer else {
            continue;
        };
        let points = load_od_points(&layer.source(kind), network.crs())?;
        let report = snap_od_points(network, &points, &options);
        if report.too_far > 0 {
            log::warn!(
                "{} of {} {kind:?} points were too far from the network",
                report.too_far,
                points.len()
            );
        }
    }
    Ok(())
}

/// Overlays the hazard set and writes the scenario name table. Returns
/// the overlaid scenarios in source order and the statistic written.
fn overlay(
    network: &mut Network,
    config: &ProjectConfig,
    multi: &MultiProgress,
) -> Result<(Vec<String>, HazardStat), PipelineError> {
    let hazard = HazardSet::open(&config.hazard)?;
    let stat = hazard.stat()?;

    let names = File::create(config.output_dir.join("hazard_names.csv"))?;
    write_names(&name_rows(hazard.names(), stat), names)?;

    let progress = IndicatifProgress::elements_bar(multi, "Hazard overlay");
    let report = hazard.overlay(OverlayTarget::Graph(network), &progress)?;

    let failed: Vec<&str> = hazard
        .failures()
        .iter()
        .chain(&report.failed)
        .map(|f| f.scenario.as_str())
        .collect();
    if !failed.is_empty() {
        return Err(PipelineError::HazardFailed {
            scenarios: failed.join(", "),
        });
    }
    Ok((report.applied, stat))
}

fn criteria(scenarios: &[String], stat: HazardStat, threshold: f64) -> Vec<DisruptionCriteria> {
    scenarios
        .iter()
        .map(|s| DisruptionCriteria::new(HazardKey::new(s.clone(), stat), threshold))
        .collect()
}

/// Runs one analysis and writes its tables. Multi-link results are
/// returned for risk integration.
fn run_analysis(
    network: &Network,
    analysis: &AnalysisConfig,
    scenarios: &[String],
    stat: HazardStat,
    config: &ProjectConfig,
    multi: &MultiProgress,
) -> Result<Option<Vec<RedundancyResult>>, PipelineError> {
    let output = config.output_dir.as_path();
    let name = analysis.name.as_str();
    let weighing = analysis.weighing.as_str();
    let progress = IndicatifProgress::elements_bar(multi, name);

    match &analysis.kind {
        AnalysisKind::SingleLink => {
            let results = single_link(network, weighing, &progress)?;
            write_csv(&output.join(format!("{name}.csv")), &results)?;
        }
        AnalysisKind::MultiLink { threshold } => {
            let results = multi_link(
                network,
                weighing,
                &criteria(scenarios, stat, *threshold),
                &progress,
            )?;
            write_csv(&output.join(format!("{name}.csv")), &results)?;
            return Ok(Some(results));
        }
        AnalysisKind::OdPairs { threshold } => {
            let analysis = od_pairs(
                network,
                weighing,
                &criteria(scenarios, stat, *threshold),
                &progress,
            )?;
            write_csv(&output.join(format!("{name}.csv")), &analysis.results)?;
            write_csv(
                &output.join(format!("{name}_summary.csv")),
                &analysis.summaries,
            )?;
        }
        AnalysisKind::ClosestDestination {
            threshold,
            destination_threshold,
            count_field,
            outflow_fraction,
        } => {
            let options = OdOptions {
                count_field: count_field.clone().or_else(|| {
                    config
                        .network
                        .origins
                        .as_ref()
                        .and_then(|o| o.count_field.clone())
                }),
                outflow_fraction: *outflow_fraction,
                destination_threshold: *destination_threshold,
            };
            let analysis = analyze_od(
                network,
                weighing,
                &criteria(scenarios, stat, *threshold),
                options,
                &progress,
            )?;
            write_od(output, name, &analysis)?;
        }
        AnalysisKind::IsolatedLocations {
            threshold,
            category_field,
            buffer,
        } => {
            let layer = config.network.locations.as_ref().ok_or_else(|| {
                ConfigError::Invalid {
                    message: format!("analysis {name} needs [network.locations]"),
                }
            })?;
            let locations = load_locations(&layer.source(category_field), network.crs())?;
            let analysis = isolated_locations(
                network,
                weighing,
                &criteria(scenarios, stat, *threshold),
                &locations,
                *buffer,
                &progress,
            )?;
            write_csv(&output.join(format!("{name}.csv")), &analysis.counts)?;
            write_csv(
                &output.join(format!("{name}_locations.csv")),
                &analysis.locations,
            )?;
            write_csv(&output.join(format!("{name}_roads.csv")), &analysis.roads)?;
        }
    }
    Ok(None)
}

fn write_od(output: &Path, name: &str, analysis: &OdAnalysis) -> Result<(), PipelineError> {
    let outcomes = || std::iter::once(&analysis.baseline).chain(&analysis.scenarios);

    let summaries: Vec<_> = outcomes().map(|o| &o.summary).collect();
    write_csv(&output.join(format!("{name}_summary.csv")), &summaries)?;

    let routes: Vec<_> = outcomes().flat_map(|o| o.routes.iter()).collect();
    write_csv(&output.join(format!("{name}_routes.csv")), &routes)?;

    let edge_loads: Vec<_> = outcomes().flat_map(|o| o.edge_loads.iter()).collect();
    write_csv(&output.join(format!("{name}_edge_loads.csv")), &edge_loads)?;

    let destination_loads: Vec<_> = outcomes()
        .flat_map(|o| o.destination_loads.iter())
        .collect();
    write_csv(
        &output.join(format!("{name}_destination_loads.csv")),
        &destination_loads,
    )
}

/// Detour per edge and return period. Edges a scenario leaves in place
/// have no detour; disconnected edges are missing.
fn detour_table(
    network: &Network,
    scenarios: &[String],
    detours: &[RedundancyResult],
) -> Result<ReturnPeriodTable<EdgeId>, AnalysisError> {
    let by_edge: HashMap<(&str, EdgeId), Option<f64>> = detours
        .iter()
        .filter_map(|r| Some(((r.scenario.as_deref()?, r.edge), r.diff_weight)))
        .collect();

    let records = scenarios
        .iter()
        .filter(|s| return_period_of(s.as_str()).is_some())
        .flat_map(|scenario| {
            let by_edge = &by_edge;
            network.edges().map(move |(_, edge)| {
                let detour = by_edge
                    .get(&(scenario.as_str(), edge.id))
                    .copied()
                    .unwrap_or(Some(0.0));
                (scenario.as_str(), edge.id, detour)
            })
        });
    ReturnPeriodTable::from_records(records)
}

fn run_risk(
    network: &Network,
    risk: &RiskConfig,
    stat: HazardStat,
    scenarios: &[String],
    detours: Option<&[RedundancyResult]>,
    output: &Path,
) -> Result<(), PipelineError> {
    let table = match detours {
        Some(detours) => detour_table(network, scenarios, detours)?,
        None => edge_hazard_table(network, stat)?,
    };
    let values = table.integrate(risk.mode, risk.missing)?;

    let rows: Vec<RiskRow<'_, EdgeId>> = values
        .iter()
        .map(|(id, value)| RiskRow {
            id: *id,
            external_id: network.edge_by_id(*id).and_then(|e| e.external_id.as_deref()),
            risk: *value,
        })
        .collect();
    write_csv(&output.join("risk.csv"), &rows)?;

    let with_risk = attach_risk(network, &values);
    write_edges(&with_risk, &output.join("network_risk.geojson"))?;
    Ok(())
}

/// Integrates a CSV table of `RP<n>_<suffix>` columns and writes
/// `<id>,risk` rows to `output`, or to stdout.
///
/// # Errors
///
/// Returns an error if the table cannot be read or integrated, or if the
/// output cannot be written.
pub fn risk_table(
    input: &Path,
    id_column: &str,
    suffix: &str,
    mode: RiskMode,
    missing: MissingDamage,
    output: Option<&Path>,
) -> Result<(), PipelineError> {
    let table = read_table(File::open(input)?, id_column, suffix)?;
    let values: BTreeMap<String, Option<f64>> = table.integrate(mode, missing)?;
    let rows: Vec<RiskRow<'_, &str>> = values
        .iter()
        .map(|(id, value)| RiskRow {
            id: id.as_str(),
            external_id: None,
            risk: *value,
        })
        .collect();

    match output {
        Some(path) => write_csv(path, &rows),
        None => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            for row in &rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use geo::Point;
    use netrisk_network::{NetworkBuilder, NewEdge, Node};
    use netrisk_network_models::{Crs, NodeId};

    use super::*;

    fn triangle() -> Network {
        let mut builder = NetworkBuilder::new(Crs::WebMercator);
        for (id, x, y) in [(0, 0.0, 0.0), (1, 100.0, 0.0), (2, 0.0, 100.0)] {
            builder.add_node(Node::new(NodeId(id), Point::new(x, y)));
        }
        for (id, from, to) in [(0, 0, 1), (1, 1, 2), (2, 2, 0)] {
            builder.add_edge(NewEdge::new(EdgeId(id), NodeId(from), NodeId(to)));
        }
        builder.build().unwrap()
    }

    fn detour(scenario: &str, edge: u64, diff: Option<f64>) -> RedundancyResult {
        RedundancyResult {
            scenario: Some(scenario.to_string()),
            edge: EdgeId(edge),
            external_id: None,
            from: NodeId(0),
            to: NodeId(1),
            current_weight: 1.0,
            alt_weight: diff.map(|d| d + 1.0),
            diff_weight: diff,
            alt_path: None,
            connected: diff.is_some(),
        }
    }

    #[test]
    fn detour_table_fills_undisrupted_edges_with_zero() {
        let network = triangle();
        let scenarios = vec!["RP10".to_string(), "RP100".to_string(), "EV1".to_string()];
        let detours = vec![
            detour("RP10", 0, Some(5.0)),
            detour("RP100", 0, Some(8.0)),
            detour("RP100", 1, None),
        ];

        let table = detour_table(&network, &scenarios, &detours).unwrap();
        assert_eq!(table.return_periods(), &[10.0, 100.0]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.row(&EdgeId(0)), Some(&[Some(5.0), Some(8.0)][..]));
        assert_eq!(table.row(&EdgeId(1)), Some(&[Some(0.0), None][..]));
        assert_eq!(table.row(&EdgeId(2)), Some(&[Some(0.0), Some(0.0)][..]));
    }

    #[test]
    fn risk_table_integrates_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("damage.csv");
        let output = dir.path().join("risk.csv");
        std::fs::write(
            &input,
            "segment,RP10_damage,RP100_damage\na,10,100\nb,,100\n",
        )
        .unwrap();

        risk_table(
            &input,
            "segment",
            "damage",
            RiskMode::Default,
            MissingDamage::Propagate,
            Some(&output),
        )
        .unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "id,external_id,risk");
        assert!(lines[1].starts_with("a,,"));
        assert_eq!(lines[2], "b,,");
    }
}
