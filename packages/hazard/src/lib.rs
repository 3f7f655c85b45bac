#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hazard map readers and the network hazard overlay.
//!
//! Reads raster (ESRI ASCII, `GeoTIFF`), polygon (`GeoJSON`) and tabular
//! (CSV) hazard maps and writes per-element hazard statistics onto a
//! [`netrisk_network::Network`] or [`netrisk_network::FeatureTable`].

pub mod names;
pub mod overlay;
pub mod raster;
pub mod sampler;
pub mod source;
pub mod table;
pub mod vector;

pub use overlay::{HazardMember, HazardSet, OverlayReport, OverlayTarget, SourceFailure};

use netrisk_network::NetworkError;
use netrisk_network_models::Extent;
use thiserror::Error;

/// Errors that can occur while reading or overlaying hazard maps.
#[derive(Debug, Error)]
pub enum HazardError {
    /// File could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `GeoTIFF` decoding failed.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// CSV reading or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// `GeoJSON` input could not be parsed.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Grid header, dimensions or values are invalid.
    #[error("Raster error: {message}")]
    Raster {
        /// Description of what went wrong.
        message: String,
    },

    /// File format is not supported.
    #[error("Unsupported: {message}")]
    Unsupported {
        /// Description of what went wrong.
        message: String,
    },

    /// The hazard map does not overlap the target.
    #[error(
        "Hazard map {scenario} does not overlap the network (network extent {network:?}, hazard extent {hazard:?})"
    )]
    ExtentMismatch {
        scenario: String,
        network: Option<Extent>,
        hazard: Option<Extent>,
    },

    /// A source can give one element several values but no aggregation
    /// statistic is configured.
    #[error("Hazard map {scenario} needs an aggregation statistic (max, min or mean)")]
    AggregationAmbiguity { scenario: String },

    /// A required column or attribute is absent.
    #[error("Missing attribute {attribute} on {element}")]
    MissingAttribute { attribute: String, element: String },

    /// Two sources resolve to the same scenario name.
    #[error("Duplicate hazard scenario name {scenario}")]
    DuplicateScenario { scenario: String },
}
