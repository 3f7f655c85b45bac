#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Transport network model for hazard-disruption analysis.
//!
//! Holds the road network as an undirected multigraph, loads it from
//! `GeoJSON`, attaches origin/destination points to nodes and provides
//! the CRS transforms and metric lengths used by the hazard overlay.

pub mod builder;
pub mod export;
pub mod graph;
pub mod loader;
pub mod od;
pub mod progress;
pub mod reproject;
pub mod table;

pub use builder::{NetworkBuilder, NewEdge};
pub use graph::{Edge, LENGTH_WEIGHING, Network, Node};
pub use table::{Feature, FeatureGeometry, FeatureTable};

use netrisk_network_models::{EdgeId, NodeId};
use thiserror::Error;

/// Errors that can occur while loading or building a network.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// File could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// Input parsed but did not have the expected shape.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of what went wrong.
        message: String,
    },

    /// Two nodes share an id.
    #[error("Duplicate node id {id}")]
    DuplicateNode { id: NodeId },

    /// Two edges share an id.
    #[error("Duplicate edge id {id}")]
    DuplicateEdge { id: EdgeId },

    /// An edge references a node that does not exist.
    #[error("Edge {edge} references unknown node {node}")]
    DanglingEdge { edge: EdgeId, node: NodeId },

    /// The input declares a coordinate reference system other than WGS84 or
    /// Web Mercator.
    #[error("Unsupported CRS {code}")]
    UnsupportedCrs { code: String },

    /// Geometry is empty, degenerate or not finite.
    #[error("Invalid geometry: {message}")]
    InvalidGeometry {
        /// Description of what went wrong.
        message: String,
    },
}
