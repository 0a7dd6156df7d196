//! Wire types and endpoint paths of the statistics backend.
//!
//! All endpoints are read-only JSON over HTTP:
//! - `GET /api/history?year=<int>` returns a feature collection.
//! - `GET /api/natural/{family}?lod=<tier>&limit=<int>` returns a feature collection.
//! - `GET /api/indicators/{slug}/latest` returns `code -> { value, year }`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Natural-feature dataset family.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NaturalFamily {
    Rivers,
    MountainRanges,
    Peaks,
}

impl NaturalFamily {
    pub const ALL: [NaturalFamily; 3] = [
        NaturalFamily::Rivers,
        NaturalFamily::MountainRanges,
        NaturalFamily::Peaks,
    ];

    pub fn path_segment(self) -> &'static str {
        match self {
            NaturalFamily::Rivers => "rivers",
            NaturalFamily::MountainRanges => "mountain-ranges",
            NaturalFamily::Peaks => "peaks",
        }
    }
}

impl fmt::Display for NaturalFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Level-of-detail tier, coarse to fine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LodTier {
    Low,
    Med,
    High,
}

impl LodTier {
    pub const ALL: [LodTier; 3] = [LodTier::Low, LodTier::Med, LodTier::High];

    pub fn as_str(self) -> &'static str {
        match self {
            LodTier::Low => "low",
            LodTier::Med => "med",
            LodTier::High => "high",
        }
    }

    pub fn index(self) -> usize {
        match self {
            LodTier::Low => 0,
            LodTier::Med => 1,
            LodTier::High => 2,
        }
    }
}

impl fmt::Display for LodTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest known value of one indicator for one country.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub year: Option<i32>,
}

/// Country code → latest indicator point.
pub type IndicatorTable = BTreeMap<String, IndicatorPoint>;

pub fn history_path(year: i32) -> String {
    format!("/api/history?year={year}")
}

pub fn natural_path(family: NaturalFamily, tier: LodTier, limit: u32) -> String {
    format!("/api/natural/{}?lod={}&limit={limit}", family.path_segment(), tier.as_str())
}

pub fn indicator_path(slug: &str) -> String {
    format!("/api/indicators/{slug}/latest")
}

#[cfg(test)]
mod tests {
    use super::{IndicatorTable, LodTier, NaturalFamily, history_path, indicator_path, natural_path};

    #[test]
    fn builds_endpoint_paths() {
        assert_eq!(history_path(-323), "/api/history?year=-323");
        assert_eq!(
            natural_path(NaturalFamily::MountainRanges, LodTier::Med, 400),
            "/api/natural/mountain-ranges?lod=med&limit=400"
        );
        assert_eq!(indicator_path("gdp-per-capita"), "/api/indicators/gdp-per-capita/latest");
    }

    #[test]
    fn parses_indicator_table_with_nulls() {
        let table: IndicatorTable = serde_json::from_str(
            r#"{"FRA": {"value": 2.5, "year": 2022}, "PRK": {"value": null}, "ATA": {}}"#,
        )
        .unwrap();
        assert_eq!(table["FRA"].value, Some(2.5));
        assert_eq!(table["FRA"].year, Some(2022));
        assert_eq!(table["PRK"].value, None);
        assert_eq!(table["ATA"].year, None);
    }

    #[test]
    fn tier_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&LodTier::High).unwrap(), r#""high""#);
        assert_eq!(
            serde_json::to_string(&NaturalFamily::MountainRanges).unwrap(),
            r#""mountain-ranges""#
        );
    }
}
