#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Core value types shared by every netrisk crate.
//!
//! Node and edge identifiers, origin/destination roles, free-form
//! attribute values, hazard attribute keys (`RP100_ma`, `EV1_fr`, ...),
//! the supported coordinate reference systems and 2D extents.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Stable identifier of a network node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier of a network edge.
///
/// Parallel edges between the same node pair carry distinct ids.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EdgeId(pub u64);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Origin/destination role of a node.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeRole {
    /// Node where trips start.
    Origin,
    /// Node where trips may end.
    Destination,
    /// Both an origin and a destination.
    Both,
    /// Plain network node.
    #[default]
    Neither,
}

impl NodeRole {
    #[must_use]
    pub const fn is_origin(self) -> bool {
        matches!(self, Self::Origin | Self::Both)
    }

    #[must_use]
    pub const fn is_destination(self) -> bool {
        matches!(self, Self::Destination | Self::Both)
    }

    /// Combines this role with the origin role.
    #[must_use]
    pub const fn with_origin(self) -> Self {
        match self {
            Self::Destination | Self::Both => Self::Both,
            Self::Origin | Self::Neither => Self::Origin,
        }
    }

    /// Combines this role with the destination role.
    #[must_use]
    pub const fn with_destination(self) -> Self {
        match self {
            Self::Origin | Self::Both => Self::Both,
            Self::Destination | Self::Neither => Self::Destination,
        }
    }
}

/// A free-form attribute value read from input data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AttributeValue {
    /// Numeric view of the value. Text is parsed when it holds a number.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Null | Self::Bool(_) => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Option<f64>> for AttributeValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Null, Self::Number)
    }
}

/// Statistic stored under a hazard attribute.
///
/// The string form is the two-letter suffix used in attribute names.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum HazardStat {
    #[serde(rename = "mi")]
    #[strum(serialize = "mi")]
    Min,
    #[serde(rename = "ma")]
    #[strum(serialize = "ma")]
    Max,
    #[serde(rename = "me")]
    #[strum(serialize = "me")]
    Mean,
    /// Fraction of the element's length inside hazard-positive area.
    #[serde(rename = "fr")]
    #[strum(serialize = "fr")]
    Fraction,
}

/// Marks edges whose attribute matches as exempt from hazard removal.
///
/// Defaults to `bridge = "yes"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionRule {
    pub attribute: String,
    pub value: String,
}

impl Default for ProtectionRule {
    fn default() -> Self {
        Self {
            attribute: "bridge".to_string(),
            value: "yes".to_string(),
        }
    }
}

impl ProtectionRule {
    /// Whether an edge with these attributes is protected.
    #[must_use]
    pub fn matches(&self, attributes: &BTreeMap<String, AttributeValue>) -> bool {
        match attributes.get(&self.attribute) {
            Some(AttributeValue::Text(s)) => s.trim().eq_ignore_ascii_case(&self.value),
            Some(AttributeValue::Bool(b)) => {
                *b && matches!(self.value.to_ascii_lowercase().as_str(), "yes" | "true")
            }
            Some(AttributeValue::Number(n)) => self.value.parse::<f64>().is_ok_and(|v| {
                (v - n).abs() < f64::EPSILON
            }),
            Some(AttributeValue::Null) | None => false,
        }
    }
}

/// Name of a hazard attribute: `<scenario>_<stat>`, e.g. `RP100_ma`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HazardKey {
    scenario: String,
    stat: HazardStat,
}

impl HazardKey {
    #[must_use]
    pub fn new(scenario: impl Into<String>, stat: HazardStat) -> Self {
        Self {
            scenario: scenario.into(),
            stat,
        }
    }

    #[must_use]
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    #[must_use]
    pub const fn stat(&self) -> HazardStat {
        self.stat
    }

    /// Key for another statistic of the same scenario.
    #[must_use]
    pub fn with_stat(&self, stat: HazardStat) -> Self {
        Self::new(self.scenario.clone(), stat)
    }

    /// Return period encoded in an `RP<n>` scenario name.
    #[must_use]
    pub fn return_period(&self) -> Option<f64> {
        return_period_of(&self.scenario)
    }
}

/// Parses the return period out of a scenario name such as `RP100`.
#[must_use]
pub fn return_period_of(scenario: &str) -> Option<f64> {
    let rp: f64 = scenario.strip_prefix("RP")?.parse().ok()?;
    (rp.is_finite() && rp > 0.0).then_some(rp)
}

impl fmt::Display for HazardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.scenario, self.stat)
    }
}

/// Error returned when a string is not a valid `<scenario>_<stat>` name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidHazardKeyError {
    /// The rejected input.
    pub value: String,
}

impl fmt::Display for InvalidHazardKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid hazard attribute name {:?}: expected <scenario>_<mi|ma|me|fr>",
            self.value
        )
    }
}

impl std::error::Error for InvalidHazardKeyError {}

impl FromStr for HazardKey {
    type Err = InvalidHazardKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidHazardKeyError {
            value: s.to_string(),
        };
        let (scenario, stat) = s.rsplit_once('_').ok_or_else(invalid)?;
        if scenario.is_empty() {
            return Err(invalid());
        }
        let stat = HazardStat::from_str(stat).map_err(|_| invalid())?;
        Ok(Self::new(scenario, stat))
    }
}

impl TryFrom<String> for HazardKey {
    type Error = InvalidHazardKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HazardKey> for String {
    fn from(value: HazardKey) -> Self {
        value.to_string()
    }
}

/// Coordinate reference systems the engine can reproject between.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Crs {
    /// Geographic longitude/latitude in degrees.
    #[default]
    #[serde(rename = "EPSG:4326", alias = "epsg:4326")]
    #[strum(serialize = "EPSG:4326")]
    Wgs84,
    /// Spherical web mercator in metres.
    #[serde(rename = "EPSG:3857", alias = "epsg:3857")]
    #[strum(serialize = "EPSG:3857")]
    WebMercator,
}

impl Crs {
    /// Whether coordinates are angular degrees rather than metres.
    #[must_use]
    pub const fn is_geographic(self) -> bool {
        matches!(self, Self::Wgs84)
    }
}

/// Axis-aligned 2D bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    #[must_use]
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Smallest extent covering all points, or `None` for no points.
    #[must_use]
    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        points.into_iter().fold(None, |acc: Option<Self>, (x, y)| {
            Some(acc.map_or_else(|| Self::new(x, y, x, y), |e| e.expanded(x, y)))
        })
    }

    #[must_use]
    pub fn expanded(self, x: f64, y: f64) -> Self {
        Self::new(
            self.min_x.min(x),
            self.min_y.min(y),
            self.max_x.max(x),
            self.max_y.max(y),
        )
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Whether the two boxes overlap. Touching edges count as overlap.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hazard_key_display_and_parse() {
        let key = HazardKey::new("RP100", HazardStat::Max);
        assert_eq!(key.to_string(), "RP100_ma");
        assert_eq!("RP100_ma".parse::<HazardKey>().unwrap(), key);

        let key: HazardKey = "flood_EV1_fr".parse().unwrap();
        assert_eq!(key.scenario(), "flood_EV1");
        assert_eq!(key.stat(), HazardStat::Fraction);
    }

    #[test]
    fn hazard_key_rejects_unknown_stat() {
        assert!("RP100_xx".parse::<HazardKey>().is_err());
        assert!("RP100".parse::<HazardKey>().is_err());
        assert!("_ma".parse::<HazardKey>().is_err());
    }

    #[test]
    fn hazard_key_serializes_as_string() {
        let key = HazardKey::new("EV2", HazardStat::Mean);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"EV2_me\"");
        let back: HazardKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn return_period_parsing() {
        assert_eq!(
            HazardKey::new("RP100", HazardStat::Max).return_period(),
            Some(100.0)
        );
        assert_eq!(return_period_of("RP2.5"), Some(2.5));
        assert_eq!(return_period_of("EV1"), None);
        assert_eq!(return_period_of("RP0"), None);
        assert_eq!(return_period_of("RP-5"), None);
    }

    #[test]
    fn role_combination() {
        assert_eq!(NodeRole::Neither.with_origin(), NodeRole::Origin);
        assert_eq!(NodeRole::Origin.with_destination(), NodeRole::Both);
        assert!(NodeRole::Both.is_origin());
        assert!(NodeRole::Both.is_destination());
        assert!(!NodeRole::Neither.is_destination());
    }

    #[test]
    fn crs_parses_case_insensitively() {
        assert_eq!("epsg:3857".parse::<Crs>().unwrap(), Crs::WebMercator);
        assert_eq!(Crs::Wgs84.to_string(), "EPSG:4326");
        assert!(Crs::Wgs84.is_geographic());
    }

    #[test]
    fn extent_intersection_includes_touching_edges() {
        let a = Extent::new(0.0, 0.0, 1.0, 1.0);
        let b = Extent::new(1.0, 1.0, 2.0, 2.0);
        let c = Extent::new(1.5, 0.0, 2.0, 0.5);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert_eq!(a.union(c), Extent::new(0.0, 0.0, 2.0, 1.0));
    }

    #[test]
    fn extent_from_points() {
        assert!(Extent::from_points(std::iter::empty()).is_none());
        let e = Extent::from_points([(1.0, 5.0), (-2.0, 3.0), (0.0, 7.0)]).unwrap();
        assert_eq!(e, Extent::new(-2.0, 3.0, 1.0, 7.0));
    }

    #[test]
    fn protection_rule_defaults_to_bridges() {
        let rule = ProtectionRule::default();
        let mut attrs = BTreeMap::new();
        assert!(!rule.matches(&attrs));
        attrs.insert("bridge".to_string(), AttributeValue::from("Yes"));
        assert!(rule.matches(&attrs));
        attrs.insert("bridge".to_string(), AttributeValue::from("no"));
        assert!(!rule.matches(&attrs));
        attrs.insert("bridge".to_string(), AttributeValue::Bool(true));
        assert!(rule.matches(&attrs));
    }

    #[test]
    fn attribute_value_numeric_view() {
        assert_eq!(AttributeValue::from(2.5).as_f64(), Some(2.5));
        assert_eq!(AttributeValue::from(" 12 ").as_f64(), Some(12.0));
        assert_eq!(AttributeValue::from("yes").as_f64(), None);
        assert!(AttributeValue::from(None).is_null());
    }
}
