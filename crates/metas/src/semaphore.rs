//! Semaphore categorization: banding a percentage-of-target against
//! per-indicator, per-month threshold rows.
//!
//! Bands are inclusive on both bounds. Over-execution is open-ended above its
//! threshold. Values outside every band (including gaps between bands) are
//! `Unclassified`; the engine never picks the nearest band.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One row of the range sheet. Bounds may be missing in the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemaphoreRange {
    #[serde(default)]
    pub group: String,
    pub indicator: String,
    pub month: String,
    pub min_low: Option<f64>,
    pub max_low: Option<f64>,
    pub min_vulnerable: Option<f64>,
    pub max_vulnerable: Option<f64>,
    pub min_good: Option<f64>,
    pub max_good: Option<f64>,
    pub over_execution_above: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SemaphoreCategory {
    Low,
    Vulnerable,
    Good,
    OverExecution,
    Unclassified,
}

impl std::fmt::Display for SemaphoreCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Vulnerable => write!(f, "vulnerable"),
            Self::Good => write!(f, "good"),
            Self::OverExecution => write!(f, "over_execution"),
            Self::Unclassified => write!(f, "unclassified"),
        }
    }
}

impl SemaphoreRange {
    /// Band a percentage. Bands are checked in source order; they are not re-sorted.
    pub fn categorize(&self, pct: f64) -> SemaphoreCategory {
        if pct.is_nan() {
            return SemaphoreCategory::Unclassified;
        }
        if let Some(threshold) = self.over_execution_above {
            if pct > threshold {
                return SemaphoreCategory::OverExecution;
            }
        }

        let bands = [
            (self.min_low, self.max_low, SemaphoreCategory::Low),
            (self.min_vulnerable, self.max_vulnerable, SemaphoreCategory::Vulnerable),
            (self.min_good, self.max_good, SemaphoreCategory::Good),
        ];
        for (min, max, category) in bands {
            if let (Some(min), Some(max)) = (min, max) {
                if pct >= min && pct <= max {
                    return category;
                }
            }
        }
        SemaphoreCategory::Unclassified
    }
}

/// Ranges keyed by (indicator, month). Keys are trimmed and case-folded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SemaphoreTable {
    ranges: BTreeMap<(String, String), SemaphoreRange>,
}

fn range_key(indicator: &str, month: &str) -> (String, String) {
    (indicator.trim().to_lowercase(), month.trim().to_lowercase())
}

impl SemaphoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ranges(ranges: impl IntoIterator<Item = SemaphoreRange>) -> Self {
        let mut table = Self::new();
        for r in ranges {
            table.insert(r);
        }
        table
    }

    /// Insert or replace the range for its (indicator, month).
    pub fn insert(&mut self, range: SemaphoreRange) -> Option<SemaphoreRange> {
        self.ranges
            .insert(range_key(&range.indicator, &range.month), range)
    }

    pub fn get(&self, indicator: &str, month: &str) -> Option<&SemaphoreRange> {
        self.ranges.get(&range_key(indicator, month))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn categorize(&self, indicator: &str, month: &str, pct: f64) -> SemaphoreCategory {
        categorize(pct, self.get(indicator, month))
    }

    /// `None` percentages (zero target) are unclassified.
    pub fn categorize_percentage(
        &self,
        indicator: &str,
        month: &str,
        pct: Option<f64>,
    ) -> SemaphoreCategory {
        match pct {
            Some(p) => self.categorize(indicator, month, p),
            None => SemaphoreCategory::Unclassified,
        }
    }
}

/// Pure banding against an optional range row.
pub fn categorize(pct: f64, range: Option<&SemaphoreRange>) -> SemaphoreCategory {
    match range {
        Some(r) => r.categorize(pct),
        None => SemaphoreCategory::Unclassified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_range(indicator: &str, month: &str) -> SemaphoreRange {
        SemaphoreRange {
            group: "Formación".into(),
            indicator: indicator.into(),
            month: month.into(),
            min_low: Some(0.0),
            max_low: Some(69.99),
            min_vulnerable: Some(70.0),
            max_vulnerable: Some(89.99),
            min_good: Some(90.0),
            max_good: Some(100.0),
            over_execution_above: Some(100.0),
        }
    }

    #[test]
    fn band_boundaries() {
        let r = standard_range("Operarios", "septiembre");
        assert_eq!(r.categorize(0.0), SemaphoreCategory::Low);
        assert_eq!(r.categorize(69.99), SemaphoreCategory::Low);
        assert_eq!(r.categorize(70.0), SemaphoreCategory::Vulnerable);
        assert_eq!(r.categorize(89.99), SemaphoreCategory::Vulnerable);
        assert_eq!(r.categorize(90.0), SemaphoreCategory::Good);
        assert_eq!(r.categorize(100.0), SemaphoreCategory::Good);
        assert_eq!(r.categorize(100.01), SemaphoreCategory::OverExecution);
    }

    #[test]
    fn gaps_are_not_snapped() {
        let r = standard_range("Operarios", "septiembre");
        assert_eq!(r.categorize(69.995), SemaphoreCategory::Unclassified);
        assert_eq!(r.categorize(-1.0), SemaphoreCategory::Unclassified);
        assert_eq!(r.categorize(f64::NAN), SemaphoreCategory::Unclassified);
    }

    #[test]
    fn missing_row_is_unclassified() {
        let table = SemaphoreTable::from_ranges([standard_range("Operarios", "septiembre")]);
        assert_eq!(table.categorize("Operarios", "octubre", 95.0), SemaphoreCategory::Unclassified);
        assert_eq!(table.categorize("Auxiliares", "septiembre", 95.0), SemaphoreCategory::Unclassified);
        assert_eq!(categorize(95.0, None), SemaphoreCategory::Unclassified);
    }

    #[test]
    fn lookup_ignores_case_and_padding() {
        let table = SemaphoreTable::from_ranges([standard_range("Operarios", "Septiembre ")]);
        assert_eq!(table.categorize(" operarios", "SEPTIEMBRE", 95.0), SemaphoreCategory::Good);
    }

    #[test]
    fn same_key_replaces() {
        let mut table = SemaphoreTable::new();
        table.insert(standard_range("Operarios", "septiembre"));
        let mut stricter = standard_range("Operarios", "septiembre");
        stricter.min_good = Some(95.0);
        assert!(table.insert(stricter).is_some());
        assert_eq!(table.len(), 1);
        assert_eq!(table.categorize("Operarios", "septiembre", 92.0), SemaphoreCategory::Unclassified);
    }

    #[test]
    fn missing_bound_disables_band() {
        let mut r = standard_range("Operarios", "septiembre");
        r.max_vulnerable = None;
        r.over_execution_above = None;
        assert_eq!(r.categorize(75.0), SemaphoreCategory::Unclassified);
        assert_eq!(r.categorize(150.0), SemaphoreCategory::Unclassified);
    }

    #[test]
    fn null_percentage_is_unclassified() {
        let table = SemaphoreTable::from_ranges([standard_range("Operarios", "septiembre")]);
        assert_eq!(
            table.categorize_percentage("Operarios", "septiembre", None),
            SemaphoreCategory::Unclassified
        );
    }
}
