//! Companion record families reported next to the goal lines: the
//! level-by-modality table, relevant programs and additional metrics.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregate::{percentage, SubsetAggregate};
use crate::classify::classify;

pub const LEVEL_PROGRAM_TABLE: &str = "formacion_por_nivel_programa";
pub const RELEVANT_PROGRAM_TABLE: &str = "programa_relevante";
pub const ADDITIONAL_METRIC_TABLE: &str = "metrica_adicional";

// ---------------------------------------------------------------------------
// Level x modality table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Regular,
    Campesena,
    FullPopular,
}

impl Modality {
    pub const ALL: [Modality; 3] = [Self::Regular, Self::Campesena, Self::FullPopular];

    /// Column prefix in the level sheet and key in snapshot maps.
    pub fn key(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Campesena => "campesena",
            Self::FullPopular => "full_popular",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Regular => "Regular",
            Self::Campesena => "CampeSENA",
            Self::FullPopular => "Full Popular",
        }
    }
}

/// Target and actual of one modality. Either may be blank in the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModalityFigures {
    pub target: Option<u64>,
    pub actual: Option<u64>,
}

impl ModalityFigures {
    pub fn new(target: Option<u64>, actual: Option<u64>) -> Self {
        Self { target, actual }
    }

    /// Null when either side is blank or the target is zero.
    pub fn percentage(&self) -> Option<f64> {
        percentage(self.target?, self.actual?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelProgramRow {
    pub level: String,
    pub regular: ModalityFigures,
    pub campesena: ModalityFigures,
    pub full_popular: ModalityFigures,
    pub total_target: u64,
    pub is_total: bool,
}

impl LevelProgramRow {
    /// The total flag comes from the classifier, like goal lines.
    pub fn new(
        level: &str,
        regular: ModalityFigures,
        campesena: ModalityFigures,
        full_popular: ModalityFigures,
        total_target: u64,
    ) -> Self {
        let level = level.trim();
        Self {
            level: level.to_string(),
            regular,
            campesena,
            full_popular,
            total_target,
            is_total: classify(level).is_total,
        }
    }

    pub fn figures(&self, modality: Modality) -> &ModalityFigures {
        match modality {
            Modality::Regular => &self.regular,
            Modality::Campesena => &self.campesena,
            Modality::FullPopular => &self.full_popular,
        }
    }
}

/// Per-modality sums over the non-total rows that report a target.
pub fn modality_breakdown(rows: &[LevelProgramRow]) -> Vec<SubsetAggregate> {
    Modality::ALL
        .iter()
        .map(|&modality| {
            let mut target = 0u64;
            let mut actual = 0u64;
            let mut member_count = 0;
            for row in rows.iter().filter(|r| !r.is_total) {
                let f = row.figures(modality);
                let Some(t) = f.target else {
                    continue;
                };
                target = target.saturating_add(t);
                actual = actual.saturating_add(f.actual.unwrap_or(0));
                member_count += 1;
            }
            SubsetAggregate {
                name: modality.name().to_string(),
                target,
                actual,
                percentage: percentage(target, actual),
                member_count,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Relevant programs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelevantProgram {
    pub description: String,
    pub target: u64,
    pub actual: u64,
    pub kind: String,
}

impl RelevantProgram {
    pub fn percentage(&self) -> Option<f64> {
        percentage(self.target, self.actual)
    }
}

/// One aggregate per program kind, ordered by kind.
pub fn programs_by_kind(programs: &[RelevantProgram]) -> Vec<SubsetAggregate> {
    let mut kinds: BTreeMap<&str, (u64, u64, usize)> = BTreeMap::new();
    for p in programs {
        let entry = kinds.entry(p.kind.as_str()).or_default();
        entry.0 = entry.0.saturating_add(p.target);
        entry.1 = entry.1.saturating_add(p.actual);
        entry.2 += 1;
    }
    kinds
        .into_iter()
        .map(|(kind, (target, actual, member_count))| SubsetAggregate {
            name: kind.to_string(),
            target,
            actual,
            percentage: percentage(target, actual),
            member_count,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Additional metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Number,
    Percentage,
}

impl DataType {
    /// A target strictly between 0 and 1 is a rate written as a fraction.
    pub fn detect(target: Option<f64>) -> Self {
        match target {
            Some(t) if t > 0.0 && t < 1.0 => Self::Percentage,
            _ => Self::Number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdditionalMetric {
    pub category: String,
    pub name: String,
    pub target: Option<f64>,
    pub actual: Option<f64>,
    pub data_type: DataType,
    pub is_total: bool,
}

impl AdditionalMetric {
    pub fn new(category: &str, name: &str, target: Option<f64>, actual: Option<f64>) -> Self {
        let name = name.trim();
        Self {
            category: category.trim().to_string(),
            name: name.to_string(),
            target,
            actual,
            data_type: DataType::detect(target),
            is_total: classify(name).is_total,
        }
    }
}

/// Metrics grouped by category, totals first, then by name.
pub fn group_by_category(metrics: &[AdditionalMetric]) -> BTreeMap<String, Vec<AdditionalMetric>> {
    let mut groups: BTreeMap<String, Vec<AdditionalMetric>> = BTreeMap::new();
    for m in metrics {
        groups.entry(m.category.clone()).or_default().push(m.clone());
    }
    for list in groups.values_mut() {
        list.sort_by(|a, b| b.is_total.cmp(&a.is_total).then_with(|| a.name.cmp(&b.name)));
    }
    groups
}
