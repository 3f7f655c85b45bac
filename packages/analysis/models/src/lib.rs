#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Analysis configuration and result records.
//!
//! Records are flat so they serialize directly to CSV rows. Node paths are
//! written as dash-separated node ids (`4-7-12`). Numeric fields that have
//! no meaning for a disconnected result are `None`, never zero.

use std::fmt;
use std::str::FromStr;

use netrisk_network_models::{EdgeId, HazardKey, NodeId};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Name of the weighing that uses geometric edge length.
pub const DEFAULT_WEIGHING: &str = "length";

/// Which edges a disruption scenario removes: every unprotected edge whose
/// `hazard` value exceeds `threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisruptionCriteria {
    pub hazard: HazardKey,
    pub threshold: f64,
}

impl DisruptionCriteria {
    #[must_use]
    pub const fn new(hazard: HazardKey, threshold: f64) -> Self {
        Self { hazard, threshold }
    }

    #[must_use]
    pub fn scenario(&self) -> &str {
        self.hazard.scenario()
    }
}

/// Alternate route for one removed edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedundancyResult {
    /// Hazard scenario, `None` for single-link analysis.
    pub scenario: Option<String>,
    pub edge: EdgeId,
    pub external_id: Option<String>,
    pub from: NodeId,
    pub to: NodeId,
    /// Weight of the removed edge.
    pub current_weight: f64,
    /// Weight of the cheapest alternate route between the endpoints.
    pub alt_weight: Option<f64>,
    /// `alt_weight - current_weight`, rounded to three decimals.
    pub diff_weight: Option<f64>,
    #[serde(default, with = "node_path")]
    pub alt_path: Option<Vec<NodeId>>,
    /// `false` when no alternate route exists.
    pub connected: bool,
}

/// How one origin fares in a scenario of the closest-destination analysis.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RouteStatus {
    /// Same destination as without hazard, at no extra cost.
    NoDelay,
    /// Reaches a destination, but a different one or at a higher cost.
    Delayed,
    /// No destination can be reached.
    NoAccess,
    /// The nearest reachable destination is itself hit by the hazard.
    DestinationDisrupted,
}

/// Route from one origin to its closest destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdRoute {
    /// Hazard scenario, `None` for the no-hazard baseline.
    pub scenario: Option<String>,
    pub origin: NodeId,
    /// Origin point labels snapped onto the origin node, comma separated.
    pub origin_labels: String,
    pub destination: Option<NodeId>,
    pub destination_labels: Option<String>,
    pub cost: Option<f64>,
    #[serde(default, with = "node_path")]
    pub path: Option<Vec<NodeId>>,
    /// People travelling from the origin.
    pub people: f64,
    pub status: RouteStatus,
}

/// Per-scenario totals of the closest-destination analysis, in people.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OdSummary {
    /// Hazard scenario, `None` for the no-hazard baseline.
    pub scenario: Option<String>,
    pub no_delay: f64,
    pub delayed: f64,
    pub no_access: f64,
    /// `delayed + no_access`.
    pub route_disrupted: f64,
    pub destination_disrupted: f64,
    /// Extra cost of every delayed route over its baseline route, times the
    /// people on it.
    pub extra_detour: f64,
}

/// Load assigned to one edge by the routes that use it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeLoad {
    /// Hazard scenario, `None` for the no-hazard baseline.
    pub scenario: Option<String>,
    pub edge: EdgeId,
    pub external_id: Option<String>,
    pub load: f64,
}

/// People served by one destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationLoad {
    /// Hazard scenario, `None` for the no-hazard baseline.
    pub scenario: Option<String>,
    pub destination: NodeId,
    pub labels: String,
    pub people: f64,
}

/// Baseline and disrupted route for one origin/destination pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdPairResult {
    pub scenario: String,
    pub origin: NodeId,
    pub destination: NodeId,
    pub baseline_cost: Option<f64>,
    pub scenario_cost: Option<f64>,
    /// `scenario_cost - baseline_cost`, rounded to three decimals.
    pub diff_cost: Option<f64>,
    #[serde(default, with = "node_path")]
    pub path: Option<Vec<NodeId>>,
    pub connected: bool,
}

/// Per-scenario totals of the origin/destination pair analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OdPairSummary {
    pub scenario: String,
    pub pairs: usize,
    /// Pairs connected without hazard but not in the scenario.
    pub disconnected_pairs: usize,
    /// Origins that lost every destination they could reach before.
    pub disconnected_origins: usize,
    /// Destinations that lost every origin they could be reached from before.
    pub disconnected_destinations: usize,
    pub max_increase: Option<f64>,
    pub mean_increase: Option<f64>,
    pub median_increase: Option<f64>,
}

/// Why a road or location is cut off in a scenario.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LocationImpact {
    /// The road itself exceeds the threshold.
    Flooded,
    /// The road is dry but outside the largest connected part of the
    /// network that remains.
    Isolated,
}

/// A road that is flooded or isolated in a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadImpact {
    pub scenario: String,
    pub edge: EdgeId,
    pub external_id: Option<String>,
    pub impact: LocationImpact,
}

/// A location whose nearest road is flooded or isolated in a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolatedLocation {
    pub scenario: String,
    pub label: String,
    pub category: String,
    pub edge: EdgeId,
    pub impact: LocationImpact,
}

/// Number of cut-off locations of one category in a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolatedLocationCount {
    pub scenario: String,
    pub category: String,
    pub impact: LocationImpact,
    pub count: usize,
}

/// How return-period damages are integrated into risk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RiskMode {
    /// Worst observed damage extended to infinite return periods.
    #[default]
    Default,
    /// Protection standard at the given return period (`cut_from_<rp>`).
    CutFrom(f64),
    /// Damage ramps linearly to zero at the given return period below the
    /// smallest known one (`triangle_to_null_<rp>`).
    TriangleToNull(f64),
}

impl fmt::Display for RiskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::CutFrom(rp) => write!(f, "cut_from_{rp}"),
            Self::TriangleToNull(rp) => write!(f, "triangle_to_null_{rp}"),
        }
    }
}

/// Error returned for an unknown risk mode string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRiskModeError {
    pub value: String,
}

impl fmt::Display for InvalidRiskModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid risk mode {:?}, expected default, cut_from_<rp> or triangle_to_null_<rp>",
            self.value
        )
    }
}

impl std::error::Error for InvalidRiskModeError {}

impl FromStr for RiskMode {
    type Err = InvalidRiskModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidRiskModeError {
            value: s.to_string(),
        };
        let return_period = |rp: &str| {
            rp.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(invalid)
        };

        if s == "default" {
            Ok(Self::Default)
        } else if let Some(rp) = s.strip_prefix("cut_from_") {
            return_period(rp).map(Self::CutFrom)
        } else if let Some(rp) = s.strip_prefix("triangle_to_null_") {
            return_period(rp).map(Self::TriangleToNull)
        } else {
            Err(invalid())
        }
    }
}

impl TryFrom<String> for RiskMode {
    type Error = InvalidRiskModeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RiskMode> for String {
    fn from(mode: RiskMode) -> Self {
        mode.to_string()
    }
}

/// What integration does with a missing damage value.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MissingDamage {
    /// Treat it as no damage.
    #[default]
    Zero,
    /// The element's risk becomes missing too.
    Propagate,
}

fn default_weighing() -> String {
    DEFAULT_WEIGHING.to_string()
}

const fn default_outflow_fraction() -> f64 {
    1.0
}

const fn default_buffer() -> f64 {
    100.0
}

/// One analysis to run after the hazard overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Used in output file names.
    pub name: String,
    /// Edge attribute used as routing weight.
    #[serde(default = "default_weighing")]
    pub weighing: String,
    #[serde(flatten)]
    pub kind: AnalysisKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisKind {
    /// Remove every edge on its own, without hazard.
    SingleLink,
    /// Remove all edges above the threshold at once, per scenario.
    MultiLink { threshold: f64 },
    /// Route every origin to every destination, per scenario.
    OdPairs { threshold: f64 },
    /// Route every origin to its closest destination, per scenario.
    ClosestDestination {
        threshold: f64,
        /// Hazard value above which a destination itself is disrupted.
        /// Defaults to `threshold`.
        #[serde(default)]
        destination_threshold: Option<f64>,
        /// Origin node attribute holding the number of people.
        #[serde(default)]
        count_field: Option<String>,
        /// Share of an origin's people that travel.
        #[serde(default = "default_outflow_fraction")]
        outflow_fraction: f64,
    },
    /// Count locations cut off by flooded or isolated roads, per scenario.
    IsolatedLocations {
        threshold: f64,
        /// Location property the counts are grouped by.
        category_field: String,
        /// Locations farther than this many metres from every road are
        /// never counted.
        #[serde(default = "default_buffer")]
        buffer: f64,
    },
}

impl AnalysisKind {
    /// Disruption threshold, if the analysis uses hazard scenarios.
    #[must_use]
    pub const fn threshold(&self) -> Option<f64> {
        match self {
            Self::SingleLink => None,
            Self::MultiLink { threshold }
            | Self::OdPairs { threshold }
            | Self::ClosestDestination { threshold, .. }
            | Self::IsolatedLocations { threshold, .. } => Some(*threshold),
        }
    }
}

mod node_path {
    use netrisk_network_models::NodeId;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        path: &Option<Vec<NodeId>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match path {
            Some(nodes) => {
                let text = nodes
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("-");
                serializer.serialize_some(&text)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<NodeId>>, D::Error> {
        let text: Option<String> = Option::deserialize(deserializer)?;
        text.filter(|t| !t.is_empty())
            .map(|t| {
                t.split('-')
                    .map(|part| {
                        part.parse::<u64>()
                            .map(NodeId)
                            .map_err(serde::de::Error::custom)
                    })
                    .collect()
            })
            .transpose()
    }
}
