#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the netrisk binaries.
//!
//! [`IndicatifProgress`] renders the overlay and analysis progress reported
//! through [`ProgressCallback`]. [`init_logger`] routes `log` output through
//! `indicatif-log-bridge` so log lines and progress bars don't tear each
//! other up.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use netrisk_network::progress::ProgressCallback;

pub use indicatif::MultiProgress;

/// An `indicatif` [`ProgressBar`] behind [`ProgressCallback`].
///
/// The bar prefix reads `<label>: <stage>`; the message names the last
/// hazard scenario that finished.
pub struct IndicatifProgress {
    bar: ProgressBar,
    label: String,
    /// Style used once a stage has started.
    bar_style: ProgressStyle,
}

impl IndicatifProgress {
    fn elements(multi: &MultiProgress, label: &str) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix(label.to_string());

        let bar_style = ProgressStyle::with_template(
            "  {prefix} {wide_bar:.cyan/dim} {pos}/{len} [{eta}] {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Self {
            bar,
            label: label.to_string(),
            bar_style,
        }
    }

    /// Progress of one overlay or analysis run labelled `label`. Spins
    /// until the first stage starts.
    #[must_use]
    pub fn elements_bar(multi: &MultiProgress, label: &str) -> Arc<dyn ProgressCallback> {
        Arc::new(Self::elements(multi, label))
    }

    /// Pipeline stages (load, overlay, each analysis, risk).
    #[must_use]
    pub fn steps_bar(multi: &MultiProgress, label: &str, total: u64) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new(total));
        bar.set_style(
            ProgressStyle::with_template(
                "{prefix} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}] {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        bar.set_prefix(label.to_string());

        let bar_style = bar.style();

        Arc::new(Self {
            bar,
            label: label.to_string(),
            bar_style,
        })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn start(&self, stage: &str, total: u64) {
        self.bar.set_style(self.bar_style.clone());
        self.bar.set_prefix(format!("{}: {stage}", self.label));
        self.bar.set_message("");
        self.bar.set_length(total);
        self.bar.set_position(0);
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn scenario_done(&self, scenario: &str) {
        self.bar.inc(1);
        self.bar.set_message(format!("{scenario} done"));
    }

    fn finish(&self, summary: String) {
        self.bar.set_prefix(self.label.clone());
        self.bar.finish_with_message(summary);
    }
}

/// Installs a `pretty_env_logger` logger (filtered by `RUST_LOG`) behind
/// `indicatif-log-bridge`.
///
/// Returns the [`MultiProgress`] every progress bar must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // A second call (tests, embedding) keeps the first logger.
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}
