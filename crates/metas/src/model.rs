use serde::{Serialize, Serializer};

use crate::aggregate::{percentage, signed_gap};

// ---------------------------------------------------------------------------
// Hierarchy tiers
// ---------------------------------------------------------------------------

/// Tier of a goal line item. Ordering follows the tier: detail < subtotal < total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HierarchyLevel {
    Detail,
    Subtotal,
    Total,
}

impl HierarchyLevel {
    /// Level is fully determined by the flags: total wins over subtotal.
    pub fn from_flags(is_subtotal: bool, is_total: bool) -> Self {
        if is_total {
            Self::Total
        } else if is_subtotal {
            Self::Subtotal
        } else {
            Self::Detail
        }
    }

    /// Numeric level as published: 1 detail, 2 subtotal, 3 total.
    pub fn rank(self) -> u8 {
        match self {
            Self::Detail => 1,
            Self::Subtotal => 2,
            Self::Total => 3,
        }
    }
}

impl Serialize for HierarchyLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.rank())
    }
}

impl std::fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Detail => write!(f, "detail"),
            Self::Subtotal => write!(f, "subtotal"),
            Self::Total => write!(f, "total"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub is_subtotal: bool,
    pub is_total: bool,
    pub level: HierarchyLevel,
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One already-extracted row as handed over by the ingestion collaborator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub description: String,
    pub target: Option<i64>,
    pub actual: Option<i64>,
    pub region_code: Option<String>,
    pub region_name: Option<String>,
    /// 1-based data row in the source extract, when known.
    pub row: Option<usize>,
}

impl RawRecord {
    pub fn national(description: &str, target: i64, actual: i64) -> Self {
        Self {
            description: description.into(),
            target: Some(target),
            actual: Some(actual),
            region_code: None,
            region_name: None,
            row: None,
        }
    }

    pub fn regional(description: &str, region_code: &str, target: i64, actual: i64) -> Self {
        Self {
            description: description.into(),
            target: Some(target),
            actual: Some(actual),
            region_code: Some(region_code.into()),
            region_name: None,
            row: None,
        }
    }
}

/// Whether rows are disaggregated by region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionMode {
    /// Region columns are ignored; every row is a national figure.
    National,
    /// Every row must carry a region code.
    #[default]
    Regional,
}

// ---------------------------------------------------------------------------
// Normalized model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricDescription {
    pub id: u32,
    pub name: String,
    pub is_subtotal: bool,
    pub is_total: bool,
    pub level: HierarchyLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Region {
    pub id: u32,
    pub code: String,
    pub name: String,
}

/// Natural key of a [`MetricValue`]. Exactly one value per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    pub period: String,
    pub description: String,
    pub region_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricValue {
    pub id: u32,
    pub description_id: u32,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_code: Option<String>,
    pub target: u64,
    pub actual: u64,
    pub is_subtotal: bool,
    pub is_total: bool,
    pub level: HierarchyLevel,
    pub period: String,
}

impl MetricValue {
    pub fn key(&self) -> MetricKey {
        MetricKey {
            period: self.period.clone(),
            description: self.description.clone(),
            region_code: self.region_code.clone(),
        }
    }

    /// `round(100 * actual / target, 2)`, `None` when target is zero.
    pub fn percentage(&self) -> Option<f64> {
        percentage(self.target, self.actual)
    }

    /// Shortfall against target (negative when over-executed).
    pub fn gap(&self) -> i64 {
        signed_gap(self.target, self.actual)
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// National rollup of one description across regions. Always recomputed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedMetric {
    pub description_id: u32,
    pub description: String,
    pub region_count: usize,
    pub target: u64,
    pub actual: u64,
    pub percentage: Option<f64>,
    pub is_subtotal: bool,
    pub is_total: bool,
    pub level: HierarchyLevel,
}

impl AggregatedMetric {
    pub fn gap(&self) -> i64 {
        signed_gap(self.target, self.actual)
    }
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    #[default]
    Sum,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sum => write!(f, "sum"),
        }
    }
}

/// Directed parent → child sum relation between two existing descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyEdge {
    pub origin_table: String,
    pub parent_id: u32,
    pub parent_name: String,
    pub child_id: u32,
    pub child_name: String,
    pub child_table: String,
    pub operation: Operation,
}
