#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `netrisk`: hazard overlay, network criticality and risk from the
//! command line.
//!
//! `run` executes a TOML project end to end. `risk` integrates an
//! existing return-period table. `names` prints the scenario names a
//! hazard set would get, and `check` validates a project without running
//! it.

mod config;
mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use netrisk_analysis_models::{MissingDamage, RiskMode};
use netrisk_hazard::names::{name_rows, scenario_names, write_names};
use netrisk_hazard_models::AggregationStat;
use netrisk_network_models::HazardStat;

use crate::config::ProjectConfig;

#[derive(Parser)]
#[command(
    name = "netrisk",
    about = "Hazard disruption and risk analysis for transport networks"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Overlay hazard maps, run the configured analyses and integrate risk
    Run {
        /// Project TOML file
        config: PathBuf,
    },
    /// Validate a project file without running it
    Check {
        /// Project TOML file
        config: PathBuf,
    },
    /// Print the scenario name table of a project's hazard set as CSV
    Names {
        /// Project TOML file
        config: PathBuf,
    },
    /// Integrate a CSV table of `RP<n>_<suffix>` columns into risk
    Risk {
        /// Input CSV file
        input: PathBuf,
        /// Column identifying each row
        #[arg(long, default_value = "id")]
        id_column: String,
        /// Suffix of the damage columns, e.g. `damage` for `RP100_damage`
        #[arg(long)]
        suffix: String,
        /// `default`, `cut_from_<RP>` or `triangle_to_null_<RP>`
        #[arg(long, default_value = "default")]
        mode: RiskMode,
        /// How missing damage values are treated: `zero` or `propagate`
        #[arg(long, default_value = "zero")]
        missing: MissingDamage,
        /// Output CSV file. Defaults to stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = netrisk_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => pipeline::run_project(&config, &multi)?,
        Commands::Check { config } => {
            let project = ProjectConfig::load(&config)?;
            log::info!(
                "{} is valid: {} hazard maps, {} analyses, risk {}",
                config.display(),
                project.hazard.sources.len(),
                project.analyses.len(),
                project
                    .risk
                    .as_ref()
                    .map_or_else(|| "off".to_string(), |r| r.mode.to_string())
            );
        }
        Commands::Names { config } => {
            let project = ProjectConfig::load(&config)?;
            let names = scenario_names(&project.hazard.sources)?;
            let stat = project
                .hazard
                .aggregate
                .map_or(HazardStat::Max, AggregationStat::stat);
            write_names(&name_rows(&names, stat), std::io::stdout())?;
        }
        Commands::Risk {
            input,
            id_column,
            suffix,
            mode,
            missing,
            output,
        } => pipeline::risk_table(&input, &id_column, &suffix, mode, missing, output.as_deref())?,
    }

    Ok(())
}
