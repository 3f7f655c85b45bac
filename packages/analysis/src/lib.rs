#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Criticality and risk analysis on a hazard-overlaid network.
//!
//! * [`redundancy`]: alternate routes around single removed edges and
//!   around every edge a hazard scenario takes out
//! * [`od`]: origins routed to their closest destination, with and
//!   without hazard
//! * [`od_pairs`]: connectivity loss between every origin/destination pair
//! * [`isolated_locations`]: locations on flooded roads or on roads cut
//!   off from the rest of the network
//! * [`risk`]: damage per return period integrated to expected annual
//!   damage
//!
//! Analyses never write onto the [`netrisk_network::Network`] they are
//! given; each scenario routes on its own reduced copy of the routing graph.

pub mod disruption;
pub mod isolated_locations;
pub mod od;
pub mod od_pairs;
pub mod redundancy;
pub mod risk;
pub mod routing;

#[cfg(test)]
pub(crate) mod test_network;

pub use disruption::DisruptionScenario;
pub use routing::{Route, RouteEdge, RouteGraph, RouteNode};

use netrisk_network_models::EdgeId;
use thiserror::Error;

/// Errors that can occur while running an analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// File could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A required attribute is absent.
    #[error("Missing attribute {attribute} on {element}")]
    MissingAttribute { attribute: String, element: String },

    /// A routing weight is negative or not finite.
    #[error("Edge {edge} has invalid weight {value}")]
    InvalidWeight { edge: EdgeId, value: f64 },

    /// The network has no origins or no destinations.
    #[error("Network has no {role} nodes")]
    NoOdNodes { role: &'static str },

    /// An option is out of range.
    #[error("Invalid option: {message}")]
    InvalidOption {
        /// Description of what went wrong.
        message: String,
    },

    /// A `cut_from` protection level below every known return period.
    #[error(
        "Protection level RP{return_period} is below the smallest known return period RP{smallest}"
    )]
    InvalidProtectionLevel { return_period: f64, smallest: f64 },

    /// A `triangle_to_null` end point that is not between zero and the
    /// smallest known return period.
    #[error(
        "Triangle end RP{return_period} must be above 0 and below the smallest known return period RP{smallest}"
    )]
    InvalidTriangleEnd { return_period: f64, smallest: f64 },

    /// A return period that is not a positive number, or appears twice.
    #[error("Invalid return period {value}")]
    InvalidReturnPeriod { value: String },

    /// No return periods to integrate over.
    #[error("No return periods to integrate")]
    EmptySeries,
}
