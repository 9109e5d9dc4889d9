//! Reconciliation snapshot: one immutable, point-in-time composition of the
//! resolved hierarchy, known formulas, aggregates and regions.
//!
//! The builder only reads. Rollup mismatches are exposed through
//! [`ReconciliationSnapshot::check_rollups`], never corrected.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::aggregate::{signed_gap, SubsetAggregate};
use crate::config::{CrossReference, MetasConfig};
use crate::families::{
    group_by_category, modality_breakdown, programs_by_kind, AdditionalMetric, LevelProgramRow,
    Modality, ModalityFigures, RelevantProgram,
};
use crate::hierarchy::Resolution;
use crate::model::{AggregatedMetric, HierarchyEdge, HierarchyLevel, MetricValue, Operation, Region};
use crate::semaphore::{SemaphoreCategory, SemaphoreTable};

pub const SNAPSHOT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyGroup {
    pub operation: Operation,
    pub components: Vec<String>,
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnownFormula {
    pub formula: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub components: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotTotal {
    #[serde(flatten)]
    pub metric: AggregatedMetric,
    pub category: SemaphoreCategory,
}

/// A subtotal or total row of one region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionalTotal {
    pub description: String,
    pub region_code: String,
    pub is_subtotal: bool,
    pub is_total: bool,
    pub level: HierarchyLevel,
    pub target: u64,
    pub actual: u64,
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionalBreakdown {
    pub total_regions: usize,
    pub table: String,
}

/// One modality column of a level total row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModalityComponent {
    pub target: Option<u64>,
    pub actual: Option<u64>,
    pub percentage: Option<f64>,
}

impl From<&ModalityFigures> for ModalityComponent {
    fn from(f: &ModalityFigures) -> Self {
        Self {
            target: f.target,
            actual: f.actual,
            percentage: f.percentage(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelProgramTotal {
    pub level: String,
    pub total_target: u64,
    /// Keyed by modality (`regular`, `campesena`, `full_popular`).
    pub components: BTreeMap<String, ModalityComponent>,
}

/// Totals of the companion families. Regional subtotal and total rows of
/// the goal lines live in [`ReconciliationSnapshot::regional_totals`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FamilyTotals {
    pub level_programs: Vec<LevelProgramTotal>,
    pub modality_breakdown: Vec<SubsetAggregate>,
    pub additional_metrics: BTreeMap<String, Vec<AdditionalMetric>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecialProgram {
    #[serde(flatten)]
    pub program: RelevantProgram,
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpecialPrograms {
    /// Ordered by kind then description.
    pub programs: Vec<SpecialProgram>,
    pub by_kind: Vec<SubsetAggregate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationSnapshot {
    pub version: String,
    pub period: String,
    pub description: String,
    pub generated_at: String,
    /// SHA-256 over every field except `generated_at` and the hash itself.
    pub content_hash: String,
    pub regions: Vec<Region>,
    pub hierarchy: BTreeMap<String, HierarchyGroup>,
    pub edges: Vec<HierarchyEdge>,
    pub known_formulas: BTreeMap<String, KnownFormula>,
    pub totals: Vec<SnapshotTotal>,
    pub regional_totals: Vec<RegionalTotal>,
    pub cross_references: BTreeMap<String, CrossReference>,
    pub regional_breakdown: RegionalBreakdown,
    pub family_totals: FamilyTotals,
    pub special_programs: SpecialPrograms,
}

/// Read-only inputs of the builder.
pub struct SnapshotSources<'a> {
    pub config: &'a MetasConfig,
    pub regions: &'a [Region],
    pub resolution: &'a Resolution,
    pub values: &'a [MetricValue],
    pub aggregates: &'a [AggregatedMetric],
    pub semaphores: &'a SemaphoreTable,
    pub level_programs: &'a [LevelProgramRow],
    pub programs: &'a [RelevantProgram],
    pub additional: &'a [AdditionalMetric],
}

pub fn build_snapshot(sources: &SnapshotSources<'_>) -> ReconciliationSnapshot {
    build_snapshot_at(sources, Utc::now())
}

pub fn build_snapshot_at(sources: &SnapshotSources<'_>, at: DateTime<Utc>) -> ReconciliationSnapshot {
    let config = sources.config;
    let table = config.formulas.table.clone();

    let mut hierarchy: BTreeMap<String, HierarchyGroup> = BTreeMap::new();
    for edge in &sources.resolution.edges {
        hierarchy
            .entry(edge.parent_name.clone())
            .or_insert_with(|| HierarchyGroup {
                operation: edge.operation,
                components: Vec::new(),
                table: edge.origin_table.clone(),
            })
            .components
            .push(edge.child_name.clone());
    }

    let known_formulas = config
        .formulas
        .entries
        .iter()
        .map(|f| {
            (
                f.parent.clone(),
                KnownFormula {
                    formula: f.display_formula(),
                    description: f.description.clone(),
                    components: f.children.clone(),
                },
            )
        })
        .collect();

    let totals = sources
        .aggregates
        .iter()
        .map(|m| SnapshotTotal {
            category: sources
                .semaphores
                .categorize_percentage(&m.description, &config.month, m.percentage),
            metric: m.clone(),
        })
        .collect();

    let mut regional_totals: Vec<RegionalTotal> = sources
        .values
        .iter()
        .filter(|v| v.is_subtotal || v.is_total)
        .filter_map(|v| {
            let region_code = v.region_code.clone()?;
            Some(RegionalTotal {
                description: v.description.clone(),
                region_code,
                is_subtotal: v.is_subtotal,
                is_total: v.is_total,
                level: v.level,
                target: v.target,
                actual: v.actual,
                percentage: v.percentage(),
            })
        })
        .collect();
    regional_totals.sort_by(|a, b| {
        a.level
            .cmp(&b.level)
            .then_with(|| a.description.cmp(&b.description))
            .then_with(|| a.region_code.cmp(&b.region_code))
    });

    let mut snapshot = ReconciliationSnapshot {
        version: SNAPSHOT_VERSION.into(),
        period: config.period.clone(),
        description: format!("Referencias de totales y agregaciones: {}", config.name),
        generated_at: String::new(),
        content_hash: String::new(),
        regions: sources.regions.to_vec(),
        hierarchy,
        edges: sources.resolution.edges.clone(),
        known_formulas,
        totals,
        regional_totals,
        cross_references: config.cross_references.clone(),
        regional_breakdown: RegionalBreakdown {
            total_regions: sources.regions.len(),
            table,
        },
        family_totals: family_totals(sources),
        special_programs: special_programs(sources.programs),
    };

    snapshot.content_hash = content_hash(&snapshot);
    snapshot.generated_at = at.to_rfc3339();

    log::info!(
        "snapshot {}: {} regions, {} hierarchy groups, {} totals",
        snapshot.period,
        snapshot.regions.len(),
        snapshot.hierarchy.len(),
        snapshot.totals.len()
    );
    snapshot
}

fn family_totals(sources: &SnapshotSources<'_>) -> FamilyTotals {
    let level_programs = sources
        .level_programs
        .iter()
        .filter(|r| r.is_total)
        .map(|r| LevelProgramTotal {
            level: r.level.clone(),
            total_target: r.total_target,
            components: Modality::ALL
                .iter()
                .map(|&m| (m.key().to_string(), ModalityComponent::from(r.figures(m))))
                .collect(),
        })
        .collect();

    FamilyTotals {
        level_programs,
        modality_breakdown: if sources.level_programs.is_empty() {
            Vec::new()
        } else {
            modality_breakdown(sources.level_programs)
        },
        additional_metrics: group_by_category(sources.additional),
    }
}

fn special_programs(programs: &[RelevantProgram]) -> SpecialPrograms {
    let mut entries: Vec<SpecialProgram> = programs
        .iter()
        .map(|p| SpecialProgram {
            percentage: p.percentage(),
            program: p.clone(),
        })
        .collect();
    entries.sort_by(|a, b| {
        a.program
            .kind
            .cmp(&b.program.kind)
            .then_with(|| a.program.description.cmp(&b.program.description))
    });
    SpecialPrograms {
        programs: entries,
        by_kind: programs_by_kind(programs),
    }
}

fn content_hash(snapshot: &ReconciliationSnapshot) -> String {
    match serde_json::to_vec(snapshot) {
        Ok(bytes) => format!("{:x}", Sha256::digest(&bytes)),
        Err(e) => {
            log::warn!("cannot hash snapshot: {e}");
            String::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Rollup checks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollupCheck {
    pub parent: String,
    pub parent_target: u64,
    pub parent_actual: u64,
    pub children_target: u64,
    pub children_actual: u64,
    /// Resolved children with no aggregate this period.
    pub missing_children: Vec<String>,
}

impl RollupCheck {
    pub fn actual_delta(&self) -> i64 {
        signed_gap(self.parent_actual, self.children_actual)
    }

    pub fn target_delta(&self) -> i64 {
        signed_gap(self.parent_target, self.children_target)
    }

    pub fn is_consistent(&self) -> bool {
        self.parent_actual == self.children_actual && self.parent_target == self.children_target
    }
}

impl ReconciliationSnapshot {
    pub fn total(&self, description: &str) -> Option<&SnapshotTotal> {
        self.totals.iter().find(|t| t.metric.description == description)
    }

    /// Compare every resolved parent with the sum of its children.
    pub fn check_rollups(&self) -> Vec<RollupCheck> {
        let mut checks = Vec::new();
        for (parent, group) in &self.hierarchy {
            let Some(parent_total) = self.total(parent) else {
                continue;
            };
            let mut check = RollupCheck {
                parent: parent.clone(),
                parent_target: parent_total.metric.target,
                parent_actual: parent_total.metric.actual,
                children_target: 0,
                children_actual: 0,
                missing_children: Vec::new(),
            };
            for child in &group.components {
                match self.total(child) {
                    Some(t) => {
                        check.children_target = check.children_target.saturating_add(t.metric.target);
                        check.children_actual = check.children_actual.saturating_add(t.metric.actual);
                    }
                    None => check.missing_children.push(child.clone()),
                }
            }
            if !check.is_consistent() {
                log::warn!(
                    "rollup mismatch for '{}': actual delta {}, target delta {}",
                    check.parent,
                    check.actual_delta(),
                    check.target_delta()
                );
            }
            checks.push(check);
        }
        checks
    }

    pub fn inconsistent_rollups(&self) -> Vec<RollupCheck> {
        self.check_rollups()
            .into_iter()
            .filter(|c| !c.is_consistent())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate_all;
    use crate::formula::{Formula, FormulaTable};
    use crate::hierarchy::resolve;
    use crate::ingest::MetricStore;
    use crate::model::{RawRecord, RegionMode};
    use chrono::TimeZone;

    fn config() -> MetasConfig {
        MetasConfig {
            formulas: FormulaTable {
                version: "t".into(),
                table: "t".into(),
                entries: vec![
                    Formula::sum("SubTotal X", &["A", "B"]),
                    Formula::sum("TOTAL Y", &["SubTotal X", "C", "Ghost"]),
                ],
            },
            ..MetasConfig::default()
        }
    }

    fn store(parent_actual: i64) -> MetricStore {
        let mut store = MetricStore::new();
        store.ingest(
            "2025_09",
            &[
                RawRecord::regional("A", "05", 100, 60),
                RawRecord::regional("B", "05", 50, 40),
                RawRecord::regional("SubTotal X", "05", 150, 100),
                RawRecord::regional("C", "11", 10, 10),
                RawRecord::regional("TOTAL Y", "05", 160, parent_actual),
            ],
            RegionMode::Regional,
        );
        store
    }

    fn snapshot_for(store: &MetricStore, config: &MetasConfig) -> ReconciliationSnapshot {
        let values = store.values_for_period(&config.period);
        let aggregates = aggregate_all(&values);
        let resolution = resolve(&config.formulas, store);
        let regions = store.regions();
        let semaphores = SemaphoreTable::new();
        let level_programs = store.level_programs_for_period(&config.period);
        let programs = store.programs_for_period(&config.period);
        let additional = store.additional_for_period(&config.period);
        let sources = SnapshotSources {
            config,
            regions: &regions,
            resolution: &resolution,
            values: &values,
            aggregates: &aggregates,
            semaphores: &semaphores,
            level_programs: &level_programs,
            programs: &programs,
            additional: &additional,
        };
        build_snapshot_at(&sources, Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn composes_hierarchy_and_formulas() {
        let config = config();
        let snap = snapshot_for(&store(110), &config);

        assert_eq!(snap.version, SNAPSHOT_VERSION);
        assert_eq!(snap.regions.len(), 2);
        assert_eq!(snap.regional_breakdown.total_regions, 2);
        assert_eq!(snap.hierarchy["TOTAL Y"].components, vec!["SubTotal X", "C"]);
        // Known formulas keep unresolved children.
        assert_eq!(snap.known_formulas["TOTAL Y"].components.len(), 3);
        assert_eq!(snap.known_formulas["SubTotal X"].formula, "A + B");
        assert_eq!(snap.generated_at, "2025-10-01T00:00:00+00:00");
        assert_eq!(snap.total("A").unwrap().category, SemaphoreCategory::Unclassified);
    }

    #[test]
    fn regional_totals_only_hold_rollup_rows() {
        let snap = snapshot_for(&store(110), &config());
        let names: Vec<&str> = snap.regional_totals.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(names, vec!["SubTotal X", "TOTAL Y"]);
    }

    #[test]
    fn consistent_rollups() {
        let snap = snapshot_for(&store(110), &config());
        let checks = snap.check_rollups();
        assert_eq!(checks.len(), 2);
        assert!(checks.iter().all(RollupCheck::is_consistent));
        assert!(snap.inconsistent_rollups().is_empty());
    }

    #[test]
    fn mismatch_is_reported_not_fixed() {
        let snap = snapshot_for(&store(125), &config());
        let bad = snap.inconsistent_rollups();
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].parent, "TOTAL Y");
        assert_eq!(bad[0].actual_delta(), 15);
        assert_eq!(snap.total("TOTAL Y").unwrap().metric.actual, 125);
    }

    #[test]
    fn hash_ignores_generation_time() {
        let config = config();
        let store = store(110);
        let a = snapshot_for(&store, &config);
        let mut b = snapshot_for(&store, &config);
        b.generated_at = "later".into();
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.content_hash.len(), 64);

        let c = snapshot_for(&self::store(125), &config);
        assert_ne!(a.content_hash, c.content_hash);
    }

    #[test]
    fn family_totals_and_special_programs() {
        let config = config();
        let mut store = store(110);
        let figures = |t, a| ModalityFigures::new(Some(t), Some(a));
        store.ingest_level_programs(
            &config.period,
            &[
                LevelProgramRow::new("Tecnólogo", figures(100, 80), figures(20, 5), ModalityFigures::default(), 120),
                LevelProgramRow::new(
                    "TOTAL FORMACION TITULADA",
                    figures(100, 80),
                    figures(20, 5),
                    ModalityFigures::new(Some(0), None),
                    120,
                ),
            ],
        );
        let program = |d: &str, t, a, k: &str| RelevantProgram {
            description: d.into(),
            target: t,
            actual: a,
            kind: k.into(),
        };
        store.ingest_programs(
            &config.period,
            &[
                program("Virtual", 10, 5, "virtual"),
                program("Bilingüismo", 10, 10, "virtual"),
                program("Rural", 4, 1, "estrategia"),
            ],
        );
        store.ingest_additional(
            &config.period,
            &[AdditionalMetric::new("Retención", "Tasa de retención", Some(0.9), Some(0.8))],
        );

        let snap = snapshot_for(&store, &config);
        let totals = &snap.family_totals;
        assert_eq!(totals.level_programs.len(), 1);
        let total = &totals.level_programs[0];
        assert_eq!(total.level, "TOTAL FORMACION TITULADA");
        assert_eq!(total.components["regular"].percentage, Some(80.0));
        assert_eq!(total.components["campesena"].percentage, Some(25.0));
        assert_eq!(total.components["full_popular"].percentage, None);

        assert_eq!(totals.modality_breakdown[0].target, 100);
        assert_eq!(totals.modality_breakdown[2].member_count, 0);
        assert_eq!(totals.additional_metrics["Retención"].len(), 1);

        let order: Vec<&str> = snap
            .special_programs
            .programs
            .iter()
            .map(|p| p.program.description.as_str())
            .collect();
        assert_eq!(order, vec!["Rural", "Bilingüismo", "Virtual"]);
        assert_eq!(snap.special_programs.programs[0].percentage, Some(25.0));
        assert_eq!(snap.special_programs.by_kind[1].target, 20);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["special_programs"]["programs"][0]["kind"], "estrategia");
        assert_ne!(snap.content_hash, snapshot_for(&self::store(110), &config).content_hash);
    }

    #[test]
    fn snapshot_without_families_is_empty() {
        let snap = snapshot_for(&store(110), &config());
        assert_eq!(snap.family_totals, FamilyTotals::default());
        assert!(snap.special_programs.programs.is_empty());
    }

    #[test]
    fn huge_rollups_clamp_deltas() {
        let big = i64::MAX;
        let mut store = MetricStore::new();
        store.ingest(
            "2025_09",
            &[
                RawRecord::regional("A", "05", big, 0),
                RawRecord::regional("A", "11", big, 0),
                RawRecord::regional("A", "76", big, 0),
                RawRecord::regional("SubTotal X", "05", 0, big),
            ],
            RegionMode::Regional,
        );
        let snap = snapshot_for(&store, &config());
        let check = snap
            .check_rollups()
            .into_iter()
            .find(|c| c.parent == "SubTotal X")
            .unwrap();
        assert_eq!(check.children_target, u64::MAX);
        assert_eq!(check.target_delta(), i64::MIN);
        assert_eq!(check.actual_delta(), i64::MAX);
        assert!(!check.is_consistent());
    }
}
