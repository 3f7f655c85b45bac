//! Scenario names for the sources of a hazard set.
//!
//! An explicit name always wins. Otherwise, when every file name carries a
//! return period (`flood_RP_100.tif`, `RP50.asc`) the scenario becomes
//! `RP<n>`; if any does not, sources are numbered `EV1`, `EV2`, ... in
//! configuration order.
//!
//! The exported name table maps every written attribute back to its file.

use std::collections::BTreeSet;
use std::io::Write;

use netrisk_hazard_models::HazardSourceConfig;
use netrisk_network_models::{HazardKey, HazardStat};
use regex::Regex;
use serde::Serialize;

use crate::HazardError;

/// Scenario name assigned to one hazard file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HazardName {
    pub file_name: String,
    pub scenario: String,
}

/// One row of the exported name table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HazardNameRow {
    pub file_name: String,
    pub aggregation: String,
    pub attribute: String,
}

fn describe(stat: HazardStat) -> &'static str {
    match stat {
        HazardStat::Min => "minimum",
        HazardStat::Max => "maximum",
        HazardStat::Mean => "mean",
        HazardStat::Fraction => "fraction of length affected",
    }
}

/// Rows for the per-element statistic and the affected fraction of every
/// source.
#[must_use]
pub fn name_rows(names: &[HazardName], stat: HazardStat) -> Vec<HazardNameRow> {
    names
        .iter()
        .flat_map(|name| {
            [stat, HazardStat::Fraction].into_iter().map(|s| HazardNameRow {
                file_name: name.file_name.clone(),
                aggregation: describe(s).to_string(),
                attribute: HazardKey::new(name.scenario.clone(), s).to_string(),
            })
        })
        .collect()
}

fn return_period_token(stem: &str) -> Option<String> {
    let re = Regex::new(r"RP_?([0-9]+(?:\.[0-9]+)?)").unwrap_or_else(|_| unreachable!());
    re.captures_iter(stem)
        .last()
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Assigns a scenario name to every source.
///
/// # Errors
///
/// Returns [`HazardError::DuplicateScenario`] if two sources end up with
/// the same name.
pub fn scenario_names(sources: &[HazardSourceConfig]) -> Result<Vec<HazardName>, HazardError> {
    let return_periods: Option<Vec<String>> = sources
        .iter()
        .map(|s| return_period_token(&s.file_stem()))
        .collect();

    let mut seen = BTreeSet::new();
    let mut names = Vec::with_capacity(sources.len());
    for (i, source) in sources.iter().enumerate() {
        let scenario = match (&source.name, &return_periods) {
            (Some(name), _) => name.clone(),
            (None, Some(rps)) => format!("RP{}", rps[i]),
            (None, None) => format!("EV{}", i + 1),
        };
        if !seen.insert(scenario.clone()) {
            return Err(HazardError::DuplicateScenario { scenario });
        }
        names.push(HazardName {
            file_name: source.file_name(),
            scenario,
        });
    }
    Ok(names)
}

/// Writes the name table as CSV (`file_name,aggregation,attribute`).
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_names<W: Write>(rows: &[HazardNameRow], writer: W) -> Result<(), HazardError> {
    let mut csv = csv::Writer::from_writer(writer);
    for row in rows {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}
