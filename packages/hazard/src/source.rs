//! Opened hazard sources and how the overlay may use them.

use netrisk_hazard_models::{HazardSourceConfig, HazardSourceKind};

use crate::HazardError;
use crate::raster::RasterGrid;
use crate::sampler::HazardSampler;
use crate::table::JoinTable;
use crate::vector::VectorLayer;

pub enum HazardSource {
    Raster(RasterGrid),
    Vector(VectorLayer),
    Table(JoinTable),
}

/// What the overlay can do with a source.
pub enum Capability<'a> {
    /// Sample geometries spatially.
    Spatial(&'a dyn HazardSampler),
    /// Look values up by element identifier.
    Join(&'a JoinTable),
}

impl HazardSource {
    /// Opens the file named by a source definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn open(config: &HazardSourceConfig) -> Result<Self, HazardError> {
        Ok(match &config.kind {
            HazardSourceKind::Raster => Self::Raster(RasterGrid::read(&config.path)?),
            HazardSourceKind::Vector { field } => {
                Self::Vector(VectorLayer::read(&config.path, field)?)
            }
            HazardSourceKind::Table {
                id_field,
                value_field,
                network_id_field,
            } => Self::Table(JoinTable::read(
                &config.path,
                id_field,
                value_field,
                network_id_field,
            )?),
        })
    }

    #[must_use]
    pub fn capability(&self) -> Capability<'_> {
        match self {
            Self::Raster(grid) => Capability::Spatial(grid),
            Self::Vector(layer) => Capability::Spatial(layer),
            Self::Table(table) => Capability::Join(table),
        }
    }

    /// Whether one element can receive several values from this source.
    #[must_use]
    pub const fn needs_aggregation(&self) -> bool {
        matches!(self, Self::Raster(_) | Self::Vector(_))
    }
}
