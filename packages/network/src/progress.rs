//! Progress reporting for overlay and analysis runs.
//!
//! Library code reports through [`ProgressCallback`] and never renders
//! anything itself. The CLI plugs in an `indicatif` bar; tests and
//! embedders use [`NullProgress`].
//!
//! A run is a sequence of stages. The hazard overlay and single-link
//! redundancy count network elements; scenario-based analyses count
//! hazard scenarios and name each one as it completes.

use std::sync::Arc;

/// Receives progress updates from long-running operations.
///
/// Implementations must be `Send + Sync`; overlay sampling and every
/// analysis report from rayon worker threads.
pub trait ProgressCallback: Send + Sync {
    /// Begins a stage of `total` units, resetting the position to zero.
    fn start(&self, stage: &str, total: u64);

    /// Advances by `delta` elements.
    fn inc(&self, delta: u64);

    /// One hazard scenario of the current stage completed. Counts as one
    /// unit.
    fn scenario_done(&self, scenario: &str);

    /// Marks the run complete with a summary line.
    fn finish(&self, summary: String);
}

/// Ignores all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn start(&self, _stage: &str, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn scenario_done(&self, _scenario: &str) {}
    fn finish(&self, _summary: String) {}
}

/// Returns a shared [`NullProgress`] instance.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
