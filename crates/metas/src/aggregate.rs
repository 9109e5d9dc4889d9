//! Regional aggregation: per-description national sums, safe percentages and rankings.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::model::{AggregatedMetric, HierarchyLevel, MetricValue};

/// `round(100 * actual / target, 2)` with halves rounded up, or `None` when
/// `target` is zero. Computed on integers so the rounding is exact.
pub fn percentage(target: u64, actual: u64) -> Option<f64> {
    if target == 0 {
        return None;
    }
    let (t, a) = (u128::from(target), u128::from(actual));
    let hundredths = (a * 10_000 + t / 2) / t;
    Some(hundredths as f64 / 100.0)
}

/// `target - actual`, clamped to the `i64` range.
pub fn signed_gap(target: u64, actual: u64) -> i64 {
    let gap = i128::from(target) - i128::from(actual);
    gap.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// Sum one description across all regions.
///
/// Returns `None` when no value carries the description.
pub fn aggregate_description(description: &str, values: &[MetricValue]) -> Option<AggregatedMetric> {
    let mut matching = values.iter().filter(|v| v.description == description).peekable();
    let first = matching.peek().copied()?.clone();

    let mut target = 0u64;
    let mut actual = 0u64;
    let mut regions = BTreeSet::new();
    for v in matching {
        target = target.saturating_add(v.target);
        actual = actual.saturating_add(v.actual);
        if let Some(code) = &v.region_code {
            regions.insert(code.as_str());
        }
    }

    Some(AggregatedMetric {
        description_id: first.description_id,
        description: first.description,
        region_count: regions.len(),
        target,
        actual,
        percentage: percentage(target, actual),
        is_subtotal: first.is_subtotal,
        is_total: first.is_total,
        level: first.level,
    })
}

/// Aggregate every description, ordered by level ascending then description text.
pub fn aggregate_all(values: &[MetricValue]) -> Vec<AggregatedMetric> {
    let mut groups: BTreeMap<&str, (u64, u64, BTreeSet<&str>, &MetricValue)> = BTreeMap::new();

    for v in values {
        let entry = groups
            .entry(v.description.as_str())
            .or_insert_with(|| (0, 0, BTreeSet::new(), v));
        entry.0 = entry.0.saturating_add(v.target);
        entry.1 = entry.1.saturating_add(v.actual);
        if let Some(code) = &v.region_code {
            entry.2.insert(code.as_str());
        }
    }

    let mut out: Vec<AggregatedMetric> = groups
        .into_iter()
        .map(|(description, (target, actual, regions, first))| AggregatedMetric {
            description_id: first.description_id,
            description: description.to_string(),
            region_count: regions.len(),
            target,
            actual,
            percentage: percentage(target, actual),
            is_subtotal: first.is_subtotal,
            is_total: first.is_total,
            level: first.level,
        })
        .collect();

    sort_by_level(&mut out);
    out
}

pub fn sort_by_level(metrics: &mut [AggregatedMetric]) {
    metrics.sort_by(|a, b| {
        a.level
            .cmp(&b.level)
            .then_with(|| a.description.cmp(&b.description))
    });
}

// ---------------------------------------------------------------------------
// Named subsets (modalities)
// ---------------------------------------------------------------------------

/// Sum over a named subset of detail-level rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubsetAggregate {
    pub name: String,
    pub target: u64,
    pub actual: u64,
    pub percentage: Option<f64>,
    pub member_count: usize,
}

/// Sum all detail-level aggregates whose description contains any of
/// `patterns` (case-insensitive). Subtotal and total rows never contribute.
pub fn aggregate_subset(
    name: &str,
    patterns: &[String],
    metrics: &[AggregatedMetric],
) -> SubsetAggregate {
    let patterns: Vec<String> = patterns.iter().map(|p| p.to_lowercase()).collect();
    let mut target = 0u64;
    let mut actual = 0u64;
    let mut member_count = 0;

    for m in metrics {
        if m.level != HierarchyLevel::Detail {
            continue;
        }
        let lower = m.description.to_lowercase();
        if patterns.iter().any(|p| lower.contains(p.as_str())) {
            target = target.saturating_add(m.target);
            actual = actual.saturating_add(m.actual);
            member_count += 1;
        }
    }

    SubsetAggregate {
        name: name.to_string(),
        target,
        actual,
        percentage: percentage(target, actual),
        member_count,
    }
}

// ---------------------------------------------------------------------------
// Rankings
// ---------------------------------------------------------------------------

/// Detail-level rows with `target > min_target` and a defined percentage,
/// percentage descending, ties by description ascending.
pub fn top_by_percentage(
    metrics: &[AggregatedMetric],
    limit: usize,
    min_target: u64,
) -> Vec<AggregatedMetric> {
    let mut ranked: Vec<&AggregatedMetric> = metrics
        .iter()
        .filter(|m| m.level == HierarchyLevel::Detail && m.target > min_target)
        .filter(|m| m.percentage.is_some())
        .collect();

    ranked.sort_by(|a, b| {
        let pa = OrderedFloat(a.percentage.unwrap_or(f64::NEG_INFINITY));
        let pb = OrderedFloat(b.percentage.unwrap_or(f64::NEG_INFINITY));
        pb.cmp(&pa).then_with(|| a.description.cmp(&b.description))
    });

    ranked.into_iter().take(limit).cloned().collect()
}

/// Detail-level rows by `target - actual` descending, ties by description ascending.
pub fn top_by_gap(metrics: &[AggregatedMetric], limit: usize) -> Vec<AggregatedMetric> {
    let mut ranked: Vec<&AggregatedMetric> = metrics
        .iter()
        .filter(|m| m.level == HierarchyLevel::Detail)
        .collect();

    ranked.sort_by(|a, b| match b.gap().cmp(&a.gap()) {
        Ordering::Equal => a.description.cmp(&b.description),
        other => other,
    });

    ranked.into_iter().take(limit).cloned().collect()
}
