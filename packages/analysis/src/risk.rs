//! Risk integration: damage per return period integrated over event
//! frequency into expected annual damage.
//!
//! Every mode builds a series of `(frequency, damage)` points, sorted by
//! ascending frequency, and hands it to [`trapezoid`]. Modes differ only in
//! how the series is built:
//!
//! * `default`: the damage of the largest known return period is extended
//!   to an infinite return period (frequency 0). Below the smallest known
//!   return period damage is zero.
//! * `cut_from_<rp>`: nothing below the protection level `rp` causes
//!   damage. Between known return periods the damage at `rp` is
//!   interpolated linearly in frequency. At or above the largest known
//!   return period risk is `damage / rp`.
//! * `triangle_to_null_<rp>`: damage ramps linearly from zero at `rp` up
//!   to the smallest known return period.

use std::collections::BTreeMap;
use std::io::Read;

use netrisk_analysis_models::{MissingDamage, RiskMode};
use netrisk_network::Network;
use netrisk_network_models::{AttributeValue, EdgeId, HazardStat};
use regex::Regex;

use crate::AnalysisError;

/// Edge attribute written by [`attach_risk`].
pub const RISK_ATTRIBUTE: &str = "risk";

/// Trapezoidal integral of `(frequency, damage)` points sorted by
/// ascending frequency.
#[must_use]
pub fn trapezoid(points: &[(f64, f64)]) -> f64 {
    points
        .windows(2)
        .map(|w| (w[1].0 - w[0].0) * (w[0].1 + w[1].1) / 2.0)
        .sum()
}

fn validate_return_period(rp: f64) -> Result<(), AnalysisError> {
    if rp.is_finite() && rp > 0.0 {
        Ok(())
    } else {
        Err(AnalysisError::InvalidReturnPeriod {
            value: rp.to_string(),
        })
    }
}

fn check_mode(smallest: f64, mode: RiskMode) -> Result<(), AnalysisError> {
    match mode {
        RiskMode::Default => Ok(()),
        RiskMode::CutFrom(rp) if rp < smallest => Err(AnalysisError::InvalidProtectionLevel {
            return_period: rp,
            smallest,
        }),
        RiskMode::CutFrom(_) => Ok(()),
        RiskMode::TriangleToNull(rp) if rp > 0.0 && rp < smallest => Ok(()),
        RiskMode::TriangleToNull(rp) => Err(AnalysisError::InvalidTriangleEnd {
            return_period: rp,
            smallest,
        }),
    }
}

/// Damage points with the infinite-return-period tail, as frequencies.
fn curve(points: &[(f64, f64)]) -> f64 {
    let Some(&(_, worst)) = points.last() else {
        return 0.0;
    };
    let mut series: Vec<(f64, f64)> = points.iter().map(|&(rp, d)| (1.0 / rp, d)).collect();
    series.push((0.0, worst));
    series.sort_by(|a, b| a.0.total_cmp(&b.0));
    trapezoid(&series)
}

/// Integrates `(return period, damage)` points sorted by ascending return
/// period. The mode must have passed [`check_mode`].
fn integrate_sorted(points: &[(f64, f64)], mode: RiskMode) -> f64 {
    let Some(&(largest, worst)) = points.last() else {
        return 0.0;
    };
    match mode {
        RiskMode::Default => curve(points),
        RiskMode::CutFrom(cut) if cut >= largest => worst / cut,
        RiskMode::CutFrom(cut) => {
            let mut kept = Vec::with_capacity(points.len() + 1);
            let bracket = points.windows(2).find(|w| w[0].0 < cut && cut < w[1].0);
            if let Some(w) = bracket {
                let (f, f_lo, f_hi) = (1.0 / cut, 1.0 / w[0].0, 1.0 / w[1].0);
                let damage = w[1].1 + (w[0].1 - w[1].1) * (f - f_hi) / (f_lo - f_hi);
                kept.push((cut, damage));
            }
            kept.extend(points.iter().filter(|p| p.0 >= cut));
            curve(&kept)
        }
        RiskMode::TriangleToNull(end) => {
            let mut ramped = Vec::with_capacity(points.len() + 1);
            ramped.push((end, 0.0));
            ramped.extend_from_slice(points);
            curve(&ramped)
        }
    }
}

/// Integrates one element's damage per return period.
///
/// Returns `None` when a damage is missing and `missing` is
/// [`MissingDamage::Propagate`].
///
/// # Errors
///
/// * [`AnalysisError::EmptySeries`] if `series` is empty
/// * [`AnalysisError::InvalidReturnPeriod`] for a non-positive or repeated
///   return period
/// * [`AnalysisError::InvalidProtectionLevel`] for a `cut_from` level below
///   the smallest return period
/// * [`AnalysisError::InvalidTriangleEnd`] for a `triangle_to_null` end not
///   between zero and the smallest return period
pub fn integrate(
    series: &[(f64, Option<f64>)],
    mode: RiskMode,
    missing: MissingDamage,
) -> Result<Option<f64>, AnalysisError> {
    let mut return_periods: Vec<f64> = series.iter().map(|(rp, _)| *rp).collect();
    let smallest = sorted_return_periods(&mut return_periods)?;
    check_mode(smallest, mode)?;

    let mut points = Vec::with_capacity(series.len());
    for &(rp, damage) in series {
        let damage = match (damage, missing) {
            (Some(d), _) => d,
            (None, MissingDamage::Zero) => 0.0,
            (None, MissingDamage::Propagate) => return Ok(None),
        };
        points.push((rp, damage));
    }
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(Some(integrate_sorted(&points, mode)))
}

/// Validates and sorts return periods, returning the smallest.
fn sorted_return_periods(return_periods: &mut [f64]) -> Result<f64, AnalysisError> {
    for &rp in return_periods.iter() {
        validate_return_period(rp)?;
    }
    return_periods.sort_by(f64::total_cmp);
    if let Some(w) = return_periods.windows(2).find(|w| w[0].total_cmp(&w[1]).is_eq()) {
        return Err(AnalysisError::InvalidReturnPeriod {
            value: format!("RP{} (repeated)", w[0]),
        });
    }
    return_periods.first().copied().ok_or(AnalysisError::EmptySeries)
}

/// Damage per return period for a set of elements.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnPeriodTable<K: Ord> {
    return_periods: Vec<f64>,
    rows: BTreeMap<K, Vec<Option<f64>>>,
}

impl<K: Ord + Clone> ReturnPeriodTable<K> {
    /// Empty table with the given return period columns.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no return periods or one is invalid or
    /// repeated.
    pub fn new(return_periods: impl IntoIterator<Item = f64>) -> Result<Self, AnalysisError> {
        let mut return_periods: Vec<f64> = return_periods.into_iter().collect();
        sorted_return_periods(&mut return_periods)?;
        Ok(Self {
            return_periods,
            rows: BTreeMap::new(),
        })
    }

    /// Builds a table from `(scenario, element, damage)` records, where each
    /// scenario is named `RP<n>`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidReturnPeriod`] for a scenario name
    /// without a return period, or [`AnalysisError::EmptySeries`] if there
    /// are no records.
    pub fn from_records<S: AsRef<str>>(
        records: impl IntoIterator<Item = (S, K, Option<f64>)>,
    ) -> Result<Self, AnalysisError> {
        let mut parsed = Vec::new();
        let mut return_periods = Vec::new();
        for (scenario, key, damage) in records {
            let scenario = scenario.as_ref();
            let rp = netrisk_network_models::return_period_of(scenario).ok_or_else(|| {
                AnalysisError::InvalidReturnPeriod {
                    value: scenario.to_string(),
                }
            })?;
            if !return_periods.iter().any(|r: &f64| r.total_cmp(&rp).is_eq()) {
                return_periods.push(rp);
            }
            parsed.push((rp, key, damage));
        }

        let mut table = Self::new(return_periods)?;
        for (rp, key, damage) in parsed {
            table.set(key, rp, damage)?;
        }
        Ok(table)
    }

    /// Return periods in ascending order.
    #[must_use]
    pub fn return_periods(&self) -> &[f64] {
        &self.return_periods
    }

    /// Sets one damage value. Cells never set are missing.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidReturnPeriod`] if `return_period` is
    /// not a column of the table.
    pub fn set(
        &mut self,
        key: K,
        return_period: f64,
        damage: Option<f64>,
    ) -> Result<(), AnalysisError> {
        let column = self
            .return_periods
            .iter()
            .position(|rp| rp.total_cmp(&return_period).is_eq())
            .ok_or_else(|| AnalysisError::InvalidReturnPeriod {
                value: return_period.to_string(),
            })?;
        let width = self.return_periods.len();
        self.rows.entry(key).or_insert_with(|| vec![None; width])[column] = damage;
        Ok(())
    }

    #[must_use]
    pub fn row(&self, key: &K) -> Option<&[Option<f64>]> {
        self.rows.get(key).map(Vec::as_slice)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Integrates every row.
    ///
    /// # Errors
    ///
    /// Returns an error if the mode does not fit the table's return periods.
    pub fn integrate(
        &self,
        mode: RiskMode,
        missing: MissingDamage,
    ) -> Result<BTreeMap<K, Option<f64>>, AnalysisError> {
        let smallest = self.return_periods.first().copied().ok_or(AnalysisError::EmptySeries)?;
        check_mode(smallest, mode)?;
        log_assumptions(&self.return_periods, mode);

        self.rows
            .iter()
            .map(|(key, row)| {
                let series: Vec<(f64, Option<f64>)> = self
                    .return_periods
                    .iter()
                    .copied()
                    .zip(row.iter().copied())
                    .collect();
                Ok((key.clone(), integrate(&series, mode, missing)?))
            })
            .collect()
    }
}

fn log_assumptions(return_periods: &[f64], mode: RiskMode) {
    let (Some(smallest), Some(largest)) = (return_periods.first(), return_periods.last()) else {
        return;
    };
    match mode {
        RiskMode::Default => log::info!(
            "Risk: damage of RP{largest} extended to infinite return periods, no damage below RP{smallest}"
        ),
        RiskMode::CutFrom(rp) if rp >= *largest => log::info!(
            "Risk: protected up to RP{rp}, at or above the largest return period RP{largest}"
        ),
        RiskMode::CutFrom(rp) => log::info!(
            "Risk: protected up to RP{rp}, damage of RP{largest} extended to infinite return periods"
        ),
        RiskMode::TriangleToNull(rp) => {
            log::info!("Risk: damage ramps to zero between RP{smallest} and RP{rp}");
        }
    }
}

/// Columns named `RP<n>_<suffix>`, as `(return period, column index)`.
pub fn return_period_columns<'a>(
    names: impl IntoIterator<Item = &'a str>,
    suffix: &str,
) -> Vec<(f64, usize)> {
    let re = Regex::new(r"^RP([0-9]+(?:\.[0-9]+)?)_(.+)$").unwrap_or_else(|_| unreachable!());
    names
        .into_iter()
        .enumerate()
        .filter_map(|(i, name)| {
            let caps = re.captures(name.trim())?;
            if &caps[2] != suffix {
                return None;
            }
            let rp: f64 = caps[1].parse().ok()?;
            (rp > 0.0).then_some((rp, i))
        })
        .collect()
}

/// Reads a CSV table with an id column and `RP<n>_<suffix>` damage
/// columns. Empty or non-numeric cells are missing.
///
/// # Errors
///
/// Returns an error on malformed CSV, a missing id column or when no
/// column matches the suffix.
pub fn read_table<R: Read>(
    reader: R,
    id_column: &str,
    suffix: &str,
) -> Result<ReturnPeriodTable<String>, AnalysisError> {
    let mut csv = csv::Reader::from_reader(reader);
    let headers = csv.headers()?.clone();
    let id = headers
        .iter()
        .position(|h| h.trim() == id_column)
        .ok_or_else(|| AnalysisError::MissingAttribute {
            attribute: id_column.to_string(),
            element: "risk table header".to_string(),
        })?;
    let columns = return_period_columns(headers.iter(), suffix);
    if columns.is_empty() {
        return Err(AnalysisError::EmptySeries);
    }

    let mut table = ReturnPeriodTable::new(columns.iter().map(|(rp, _)| *rp))?;
    for record in csv.records() {
        let record = record?;
        let Some(key) = record.get(id).map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        for &(rp, column) in &columns {
            let damage = record
                .get(column)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite());
            table.set(key.to_string(), rp, damage)?;
        }
    }
    log::info!(
        "Read {} rows with return periods {:?}",
        table.len(),
        table.return_periods()
    );
    Ok(table)
}

/// Hazard values of one statistic for every `RP<n>` scenario on the
/// network's edges. Edges without a value for a scenario get a missing
/// cell.
///
/// # Errors
///
/// Returns [`AnalysisError::EmptySeries`] if no return-period scenario has
/// been overlaid with `stat`.
pub fn edge_hazard_table(
    network: &Network,
    stat: HazardStat,
) -> Result<ReturnPeriodTable<EdgeId>, AnalysisError> {
    let keys: Vec<_> = network
        .edge_hazard_keys()
        .into_iter()
        .filter(|k| k.stat() == stat)
        .filter_map(|k| k.return_period().map(|rp| (rp, k)))
        .collect();
    if keys.is_empty() {
        return Err(AnalysisError::EmptySeries);
    }

    let mut table = ReturnPeriodTable::new(keys.iter().map(|(rp, _)| *rp))?;
    for (_, edge) in network.edges() {
        for (rp, key) in &keys {
            table.set(edge.id, *rp, edge.hazard_value(key).flatten())?;
        }
    }
    Ok(table)
}

/// Copy of the network with a `risk` attribute on every edge in `risk`.
#[must_use]
pub fn attach_risk(network: &Network, risk: &BTreeMap<EdgeId, Option<f64>>) -> Network {
    let mut with_risk = network.clone();
    let indices: Vec<_> = with_risk.edges().map(|(index, _)| index).collect();
    for index in indices {
        let Some(edge) = with_risk.edge_mut(index) else {
            continue;
        };
        if let Some(value) = risk.get(&edge.id) {
            edge.attributes
                .insert(RISK_ATTRIBUTE.to_string(), AttributeValue::from(*value));
        }
    }
    with_risk
}
