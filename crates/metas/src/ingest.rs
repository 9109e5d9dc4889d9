//! Normalization of raw rows into the metric model, with upsert semantics.
//!
//! The store is the in-memory stand-in for persisted facts: descriptions and
//! regions are created on first sight and never mutated, values are keyed by
//! (period, description, region) and replaced on conflict.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::classify::classify;
use crate::error::{DiagnosticReason, RowDiagnostic};
use crate::families::{AdditionalMetric, LevelProgramRow, RelevantProgram};
use crate::model::{MetricDescription, MetricKey, MetricValue, RawRecord, Region, RegionMode};

/// Outcome of one ingestion batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub inserted: usize,
    pub replaced: usize,
    pub diagnostics: Vec<RowDiagnostic>,
}

impl IngestReport {
    pub fn accepted(&self) -> usize {
        self.inserted + self.replaced
    }

    pub fn dropped(&self) -> usize {
        self.diagnostics.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricStore {
    descriptions: BTreeMap<String, MetricDescription>,
    regions: BTreeMap<String, Region>,
    values: BTreeMap<MetricKey, MetricValue>,
    next_value_id: u32,
    /// Keyed by (period, level).
    level_programs: BTreeMap<(String, String), LevelProgramRow>,
    /// Keyed by (period, description).
    programs: BTreeMap<(String, String), RelevantProgram>,
    /// Keyed by (period, category, name).
    additional: BTreeMap<(String, String, String), AdditionalMetric>,
}

/// Trim surrounding whitespace; interior text is part of the identity.
pub fn normalize_description(raw: &str) -> &str {
    raw.trim()
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize and upsert a batch. Bad rows are dropped with a diagnostic;
    /// the rest of the batch is still applied. Diagnostics carry the record's
    /// source row, or its 1-based batch position when the row is unknown.
    pub fn ingest(&mut self, period: &str, records: &[RawRecord], mode: RegionMode) -> IngestReport {
        let mut report = IngestReport::default();

        for (idx, record) in records.iter().enumerate() {
            match self.ingest_one(period, record, mode) {
                Ok(true) => report.replaced += 1,
                Ok(false) => report.inserted += 1,
                Err(reason) => {
                    let description = normalize_description(&record.description);
                    let diag = RowDiagnostic {
                        row: record.row.unwrap_or(idx + 1),
                        description: (!description.is_empty()).then(|| description.to_string()),
                        reason,
                    };
                    log::warn!("dropping row: {diag}");
                    report.diagnostics.push(diag);
                }
            }
        }

        log::info!(
            "ingested period {period}: {} inserted, {} replaced, {} dropped",
            report.inserted,
            report.replaced,
            report.dropped()
        );
        report
    }

    /// Returns whether an existing value was replaced.
    fn ingest_one(
        &mut self,
        period: &str,
        record: &RawRecord,
        mode: RegionMode,
    ) -> Result<bool, DiagnosticReason> {
        let name = normalize_description(&record.description);
        if name.is_empty() {
            return Err(DiagnosticReason::EmptyDescription);
        }
        let target = quantity("target", record.target)?;
        let actual = quantity("actual", record.actual)?;

        let region_code = match mode {
            RegionMode::National => None,
            RegionMode::Regional => {
                let code = record
                    .region_code
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .ok_or(DiagnosticReason::MissingRegion)?;
                self.ensure_region(code, record.region_name.as_deref());
                Some(code.to_string())
            }
        };

        let description = self.ensure_description(name).clone();
        let key = MetricKey {
            period: period.to_string(),
            description: description.name.clone(),
            region_code: region_code.clone(),
        };

        let id = match self.values.get(&key) {
            Some(existing) => {
                log::debug!("replacing value for '{}' ({:?})", key.description, key.region_code);
                existing.id
            }
            None => {
                self.next_value_id += 1;
                self.next_value_id
            }
        };

        let value = MetricValue {
            id,
            description_id: description.id,
            description: description.name,
            region_code,
            target,
            actual,
            is_subtotal: description.is_subtotal,
            is_total: description.is_total,
            level: description.level,
            period: period.to_string(),
        };

        Ok(self.values.insert(key, value).is_some())
    }

    fn ensure_description(&mut self, name: &str) -> &MetricDescription {
        let next_id = self.descriptions.len() as u32 + 1;
        self.descriptions.entry(name.to_string()).or_insert_with(|| {
            let c = classify(name);
            MetricDescription {
                id: next_id,
                name: name.to_string(),
                is_subtotal: c.is_subtotal,
                is_total: c.is_total,
                level: c.level,
            }
        })
    }

    fn ensure_region(&mut self, code: &str, name: Option<&str>) {
        let next_id = self.regions.len() as u32 + 1;
        self.regions.entry(code.to_string()).or_insert_with(|| Region {
            id: next_id,
            code: code.to_string(),
            name: name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(code)
                .to_string(),
        });
    }

    // -----------------------------------------------------------------------
    // Companion families
    // -----------------------------------------------------------------------

    /// Upsert level-by-modality rows; the level text is the row identity.
    pub fn ingest_level_programs(&mut self, period: &str, rows: &[LevelProgramRow]) -> IngestReport {
        let mut report = IngestReport::default();
        for row in rows {
            let key = (period.to_string(), row.level.clone());
            count_upsert(&mut report, self.level_programs.insert(key, row.clone()).is_some());
        }
        log::info!(
            "level programs {period}: {} inserted, {} replaced",
            report.inserted,
            report.replaced
        );
        report
    }

    /// Upsert relevant programs; the description is the row identity.
    pub fn ingest_programs(&mut self, period: &str, programs: &[RelevantProgram]) -> IngestReport {
        let mut report = IngestReport::default();
        for p in programs {
            let key = (period.to_string(), p.description.clone());
            count_upsert(&mut report, self.programs.insert(key, p.clone()).is_some());
        }
        log::info!(
            "relevant programs {period}: {} inserted, {} replaced",
            report.inserted,
            report.replaced
        );
        report
    }

    /// Upsert additional metrics; (category, name) is the row identity.
    pub fn ingest_additional(&mut self, period: &str, metrics: &[AdditionalMetric]) -> IngestReport {
        let mut report = IngestReport::default();
        for m in metrics {
            let key = (period.to_string(), m.category.clone(), m.name.clone());
            count_upsert(&mut report, self.additional.insert(key, m.clone()).is_some());
        }
        log::info!(
            "additional metrics {period}: {} inserted, {} replaced",
            report.inserted,
            report.replaced
        );
        report
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn description(&self, name: &str) -> Option<&MetricDescription> {
        self.descriptions.get(normalize_description(name))
    }

    /// Descriptions ordered by text.
    pub fn descriptions(&self) -> impl Iterator<Item = &MetricDescription> {
        self.descriptions.values()
    }

    /// Regions ordered by code.
    pub fn regions(&self) -> Vec<Region> {
        self.regions.values().cloned().collect()
    }

    /// Values of one period, ordered by description then region.
    pub fn values_for_period(&self, period: &str) -> Vec<MetricValue> {
        self.values
            .values()
            .filter(|v| v.period == period)
            .cloned()
            .collect()
    }

    /// Level rows of one period, ordered by level text.
    pub fn level_programs_for_period(&self, period: &str) -> Vec<LevelProgramRow> {
        self.level_programs
            .iter()
            .filter(|((p, _), _)| p == period)
            .map(|(_, row)| row.clone())
            .collect()
    }

    /// Relevant programs of one period, ordered by kind then description.
    pub fn programs_for_period(&self, period: &str) -> Vec<RelevantProgram> {
        let mut out: Vec<RelevantProgram> = self
            .programs
            .iter()
            .filter(|((p, _), _)| p == period)
            .map(|(_, program)| program.clone())
            .collect();
        out.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.description.cmp(&b.description)));
        out
    }

    /// Additional metrics of one period, ordered by category then name.
    pub fn additional_for_period(&self, period: &str) -> Vec<AdditionalMetric> {
        self.additional
            .iter()
            .filter(|((p, _, _), _)| p == period)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn count_upsert(report: &mut IngestReport, replaced: bool) {
    if replaced {
        report.replaced += 1;
    } else {
        report.inserted += 1;
    }
}

fn quantity(field: &str, value: Option<i64>) -> Result<u64, DiagnosticReason> {
    match value {
        None => Ok(0),
        Some(v) if v < 0 => Err(DiagnosticReason::NegativeQuantity {
            field: field.to_string(),
            value: v,
        }),
        Some(v) => Ok(v as u64),
    }
}
