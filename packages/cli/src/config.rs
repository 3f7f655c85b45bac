//! The TOML project file read by `netrisk run`.
//!
//! Relative paths in the file are resolved against the directory the file
//! lives in.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use netrisk_analysis_models::{AnalysisConfig, AnalysisKind, MissingDamage, RiskMode};
use netrisk_hazard::HazardError;
use netrisk_hazard::names::scenario_names;
use netrisk_hazard_models::HazardSetConfig;
use netrisk_network::loader::NetworkOptions;
use netrisk_network::od::{LocationSource, OdKind, OdSource};
use netrisk_network_models::Crs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Node attribute receiving snapped origin counts when the origin layer
/// names no count field.
pub const DEFAULT_COUNT_ATTRIBUTE: &str = "count";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Hazard(#[from] HazardError),

    /// The file parsed but describes a run that cannot work.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// Description of what went wrong.
        message: String,
    },
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}

/// A `GeoJSON` point layer of origins or destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OdLayer {
    pub path: PathBuf,
    #[serde(default)]
    pub crs: Crs,
    /// Property used as the point label.
    pub id_field: String,
    /// Property holding the number of people at an origin.
    #[serde(default)]
    pub count_field: Option<String>,
}

impl OdLayer {
    #[must_use]
    pub fn source(&self, kind: OdKind) -> OdSource {
        OdSource {
            path: self.path.clone(),
            kind,
            crs: self.crs,
            id_field: self.id_field.clone(),
            count_field: self.count_field.clone(),
        }
    }
}

/// A `GeoJSON` point layer of categorised locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationLayer {
    pub path: PathBuf,
    #[serde(default)]
    pub crs: Crs,
    /// Property used as the location label.
    pub id_field: String,
}

impl LocationLayer {
    #[must_use]
    pub fn source(&self, category_field: &str) -> LocationSource {
        LocationSource {
            path: self.path.clone(),
            crs: self.crs,
            id_field: self.id_field.clone(),
            category_field: category_field.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSection {
    /// `GeoJSON` file of road lines.
    pub path: PathBuf,
    #[serde(flatten)]
    pub options: NetworkOptions,
    #[serde(default)]
    pub origins: Option<OdLayer>,
    #[serde(default)]
    pub destinations: Option<OdLayer>,
    /// Locations counted by `isolated_locations` analyses.
    #[serde(default)]
    pub locations: Option<LocationLayer>,
    /// OD points farther than this many metres from every node are
    /// dropped.
    #[serde(default)]
    pub max_snap_distance: Option<f64>,
}

impl NetworkSection {
    /// Node attribute holding snapped origin counts.
    #[must_use]
    pub fn count_attribute(&self) -> String {
        self.origins
            .as_ref()
            .and_then(|o| o.count_field.clone())
            .unwrap_or_else(|| DEFAULT_COUNT_ATTRIBUTE.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// `default`, `cut_from_<RP>` or `triangle_to_null_<RP>`.
    pub mode: RiskMode,
    #[serde(default)]
    pub missing: MissingDamage,
    /// Multi-link analysis whose detours are integrated. Without it the
    /// overlaid hazard values themselves are integrated.
    #[serde(default)]
    pub analysis: Option<String>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    pub network: NetworkSection,
    pub hazard: HazardSetConfig,
    #[serde(default)]
    pub analyses: Vec<AnalysisConfig>,
    #[serde(default)]
    pub risk: Option<RiskConfig>,
}

impl ProjectConfig {
    /// Reads, resolves and validates a project file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// [`Self::validate`] rejects it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        log::info!(
            "Loaded {} with {} hazard maps and {} analyses",
            path.display(),
            config.hazard.sources.len(),
            config.analyses.len()
        );
        Ok(config)
    }

    /// Makes every relative path relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.output_dir);
        resolve(&mut self.network.path);
        for layer in [&mut self.network.origins, &mut self.network.destinations]
            .into_iter()
            .flatten()
        {
            resolve(&mut layer.path);
        }
        if let Some(layer) = &mut self.network.locations {
            resolve(&mut layer.path);
        }
        for source in &mut self.hazard.sources {
            resolve(&mut source.path);
        }
    }

    /// Checks everything that can be checked before any file is opened.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an empty hazard set, duplicate
    /// or empty analysis names, non-finite thresholds, an outflow fraction
    /// outside `[0, 1]`, an OD analysis without OD layers, a location
    /// analysis without a location layer or with a bad buffer, or a risk
    /// section naming an unknown analysis. Returns [`ConfigError::Hazard`] if the
    /// hazard scenario names collide.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hazard.sources.is_empty() {
            return Err(invalid("hazard set has no sources"));
        }
        scenario_names(&self.hazard.sources)?;

        if let Some(distance) = self
            .network
            .max_snap_distance
            .filter(|d| !(d.is_finite() && *d >= 0.0))
        {
            return Err(invalid(format!("max_snap_distance {distance} is not a distance")));
        }

        let mut names = BTreeSet::new();
        for analysis in &self.analyses {
            self.validate_analysis(analysis)?;
            if !names.insert(analysis.name.as_str()) {
                return Err(invalid(format!("analysis name {} is used twice", analysis.name)));
            }
        }

        if let Some(name) = self.risk.as_ref().and_then(|r| r.analysis.as_ref()) {
            let found = self.analyses.iter().find(|a| &a.name == name);
            if !matches!(found.map(|a| &a.kind), Some(AnalysisKind::MultiLink { .. })) {
                return Err(invalid(format!(
                    "risk analysis {name} is not a configured multi_link analysis"
                )));
            }
        }
        Ok(())
    }

    fn validate_analysis(&self, analysis: &AnalysisConfig) -> Result<(), ConfigError> {
        let name = &analysis.name;
        if name.trim().is_empty() {
            return Err(invalid("analysis without a name"));
        }
        if analysis.weighing.trim().is_empty() {
            return Err(invalid(format!("analysis {name} has an empty weighing")));
        }
        if let Some(threshold) = analysis.kind.threshold().filter(|t| !t.is_finite()) {
            return Err(invalid(format!("analysis {name} has threshold {threshold}")));
        }

        match &analysis.kind {
            AnalysisKind::SingleLink | AnalysisKind::MultiLink { .. } => {}
            AnalysisKind::OdPairs { .. } => self.require_od_layers(name)?,
            AnalysisKind::ClosestDestination {
                destination_threshold,
                outflow_fraction,
                ..
            } => {
                self.require_od_layers(name)?;
                if !(0.0..=1.0).contains(outflow_fraction) {
                    return Err(invalid(format!(
                        "analysis {name} has outflow_fraction {outflow_fraction}, expected a value in [0, 1]"
                    )));
                }
                if destination_threshold.is_some_and(|t| !t.is_finite()) {
                    return Err(invalid(format!(
                        "analysis {name} has a non-finite destination_threshold"
                    )));
                }
            }
            AnalysisKind::IsolatedLocations {
                category_field,
                buffer,
                ..
            } => {
                if self.network.locations.is_none() {
                    return Err(invalid(format!("analysis {name} needs [network.locations]")));
                }
                if category_field.trim().is_empty() {
                    return Err(invalid(format!("analysis {name} has an empty category_field")));
                }
                if !(buffer.is_finite() && *buffer >= 0.0) {
                    return Err(invalid(format!("analysis {name} has buffer {buffer}")));
                }
            }
        }
        Ok(())
    }

    fn require_od_layers(&self, name: &str) -> Result<(), ConfigError> {
        if self.network.origins.is_none() || self.network.destinations.is_none() {
            return Err(invalid(format!(
                "analysis {name} needs [network.origins] and [network.destinations]"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use netrisk_hazard_models::AggregationStat;

    use super::*;

    const PROJECT: &str = r#"
        output_dir = "results"

        [network]
        path = "roads.geojson"
        crs = "EPSG:3857"
        id_field = "osm_id"
        max_snap_distance = 250.0

        [network.protection]
        attribute = "bridge"
        value = "yes"

        [network.origins]
        path = "villages.geojson"
        id_field = "name"
        count_field = "population"

        [network.destinations]
        path = "hospitals.geojson"
        id_field = "name"

        [network.locations]
        path = "schools.geojson"
        id_field = "name"

        [hazard]
        aggregate = "max"

        [[hazard.sources]]
        type = "raster"
        path = "maps/flood_RP_10.tif"

        [[hazard.sources]]
        type = "raster"
        path = "maps/flood_RP_100.tif"

        [[analyses]]
        name = "redundancy"
        type = "single_link"

        [[analyses]]
        name = "detours"
        type = "multi_link"
        weighing = "time"
        threshold = 0.5

        [[analyses]]
        name = "hospitals"
        type = "closest_destination"
        threshold = 0.5
        outflow_fraction = 0.2

        [[analyses]]
        name = "schools"
        type = "isolated_locations"
        threshold = 1.0
        category_field = "amenity"
        buffer = 50.0

        [risk]
        mode = "cut_from_20"
        analysis = "detours"
    "#;

    fn project() -> ProjectConfig {
        toml::from_str(PROJECT).unwrap()
    }

    #[test]
    fn parses_full_project() {
        let config = project();
        assert_eq!(config.output_dir, PathBuf::from("results"));
        assert_eq!(config.network.options.crs, Crs::WebMercator);
        assert_eq!(config.network.options.id_field.as_deref(), Some("osm_id"));
        assert_eq!(config.network.options.road_class_field, "highway");
        assert_eq!(config.network.max_snap_distance, Some(250.0));
        assert_eq!(config.network.count_attribute(), "population");
        assert_eq!(config.hazard.aggregate, Some(AggregationStat::Max));
        assert_eq!(config.hazard.sources.len(), 2);
        assert_eq!(config.analyses.len(), 4);
        assert_eq!(config.analyses[0].weighing, "length");
        assert_eq!(config.analyses[1].kind, AnalysisKind::MultiLink { threshold: 0.5 });

        let risk = config.risk.as_ref().unwrap();
        assert_eq!(risk.mode, RiskMode::CutFrom(20.0));
        assert_eq!(risk.missing, MissingDamage::Zero);

        config.validate().unwrap();
    }

    #[test]
    fn resolves_paths_against_project_dir() {
        let mut config = project();
        config.resolve_paths(Path::new("/data/project"));
        assert_eq!(config.output_dir, PathBuf::from("/data/project/results"));
        assert_eq!(config.network.path, PathBuf::from("/data/project/roads.geojson"));
        assert_eq!(
            config.network.origins.as_ref().unwrap().path,
            PathBuf::from("/data/project/villages.geojson")
        );
        assert_eq!(
            config.network.locations.as_ref().unwrap().path,
            PathBuf::from("/data/project/schools.geojson")
        );
        assert_eq!(
            config.hazard.sources[1].path,
            PathBuf::from("/data/project/maps/flood_RP_100.tif")
        );
    }

    #[test]
    fn load_reads_and_validates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.toml");
        std::fs::write(&path, PROJECT).unwrap();

        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.network.path, dir.path().join("roads.geojson"));
        assert_eq!(config.output_dir, dir.path().join("results"));
    }

    #[test]
    fn rejects_outflow_fraction_above_one() {
        let mut config = project();
        if let AnalysisKind::ClosestDestination {
            outflow_fraction, ..
        } = &mut config.analyses[2].kind
        {
            *outflow_fraction = 1.5;
        }
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn rejects_non_finite_threshold() {
        let mut config = project();
        config.analyses[1].kind = AnalysisKind::MultiLink {
            threshold: f64::NAN,
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn rejects_duplicate_analysis_names() {
        let mut config = project();
        config.analyses[1].name = "redundancy".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn rejects_od_analysis_without_layers() {
        let mut config = project();
        config.network.destinations = None;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn location_analysis_needs_layer_and_distance_buffer() {
        let mut config = project();
        let source = config.network.locations.as_ref().unwrap().source("amenity");
        assert_eq!(source.category_field, "amenity");
        assert_eq!(source.id_field, "name");

        config.analyses[3].kind = AnalysisKind::IsolatedLocations {
            threshold: 1.0,
            category_field: "amenity".to_string(),
            buffer: -5.0,
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let mut config = project();
        config.network.locations = None;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn rejects_risk_on_non_multi_link_analysis() {
        let mut config = project();
        config.risk.as_mut().unwrap().analysis = Some("redundancy".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn rejects_empty_and_colliding_hazard_sets() {
        let mut config = project();
        let duplicate = config.hazard.sources[0].clone();
        config.hazard.sources.push(duplicate);
        assert!(matches!(config.validate(), Err(ConfigError::Hazard(_))));

        config.hazard.sources.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }
}
