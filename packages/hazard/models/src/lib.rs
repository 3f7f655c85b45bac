#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hazard source definition types.
//!
//! Defines the TOML schema for a hazard set: which hazard maps to overlay
//! onto the network, how each is read and which statistic becomes the
//! per-element hazard value.

use std::path::PathBuf;

use netrisk_network_models::{Crs, HazardStat};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Statistic used to reduce the hazard values an element touches to one
/// value.
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
pub enum AggregationStat {
    Max,
    Min,
    Mean,
}

impl AggregationStat {
    /// The hazard attribute suffix written for this statistic.
    #[must_use]
    pub const fn stat(self) -> HazardStat {
        match self {
            Self::Max => HazardStat::Max,
            Self::Min => HazardStat::Min,
            Self::Mean => HazardStat::Mean,
        }
    }
}

/// How a hazard source is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HazardSourceKind {
    /// Gridded hazard map (ESRI ASCII grid or `GeoTIFF`).
    Raster,
    /// Polygon hazard map in `GeoJSON`.
    Vector {
        /// Polygon property holding the hazard value.
        field: String,
    },
    /// CSV table joined onto network elements by identifier.
    Table {
        /// CSV column holding the element identifier.
        id_field: String,
        /// CSV column holding the hazard value.
        value_field: String,
        /// Edge attribute matched against `id_field`.
        network_id_field: String,
    },
}

/// One hazard map in a hazard set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardSourceConfig {
    pub path: PathBuf,
    /// Explicit scenario name. Derived from the file name when absent.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub crs: Crs,
    #[serde(flatten)]
    pub kind: HazardSourceKind,
}

impl HazardSourceConfig {
    /// File stem of the source path, used for name derivation.
    #[must_use]
    pub fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A set of hazard maps overlaid together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardSetConfig {
    /// Required whenever a source can cover an element with more than one
    /// value.
    #[serde(default)]
    pub aggregate: Option<AggregationStat>,
    /// Also write point values onto nodes.
    #[serde(default = "default_true")]
    pub overlay_nodes: bool,
    pub sources: Vec<HazardSourceConfig>,
}

const fn default_true() -> bool {
    true
}
