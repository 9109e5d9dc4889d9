//! Tabular read views over the normalized model, one JSON object per row.

use serde::Serialize;
use serde_json::json;

use crate::families::{LevelProgramRow, Modality};
use crate::model::{AggregatedMetric, HierarchyEdge, MetricValue};
use crate::semaphore::SemaphoreTable;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewDataset {
    pub schema: String,
    pub version: u32,
    pub rows: Vec<serde_json::Value>,
}

impl ViewDataset {
    pub fn new(name: &str) -> Self {
        Self {
            schema: format!("{name}.v1"),
            version: 1,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One row per stored value, in the order given.
pub fn metric_rows_view(values: &[MetricValue]) -> ViewDataset {
    let mut dataset = ViewDataset::new("metric_rows");
    for v in values {
        dataset.rows.push(json!({
            "id": v.id,
            "description_id": v.description_id,
            "description": v.description,
            "region_code": v.region_code,
            "period": v.period,
            "target": v.target,
            "actual": v.actual,
            "percentage": v.percentage(),
            "is_subtotal": v.is_subtotal,
            "is_total": v.is_total,
            "level": v.level.rank(),
        }));
    }
    dataset
}

/// National aggregates with their semaphore category for `month`.
pub fn national_aggregates_view(
    aggregates: &[AggregatedMetric],
    semaphores: &SemaphoreTable,
    month: &str,
) -> ViewDataset {
    let mut dataset = ViewDataset::new("national_aggregates");
    for m in aggregates {
        let category = semaphores.categorize_percentage(&m.description, month, m.percentage);
        dataset.rows.push(json!({
            "description_id": m.description_id,
            "description": m.description,
            "region_count": m.region_count,
            "target": m.target,
            "actual": m.actual,
            "gap": m.gap(),
            "percentage": m.percentage,
            "is_subtotal": m.is_subtotal,
            "is_total": m.is_total,
            "level": m.level.rank(),
            "category": category.to_string(),
        }));
    }
    dataset
}

pub fn hierarchy_edges_view(edges: &[HierarchyEdge]) -> ViewDataset {
    let mut dataset = ViewDataset::new("hierarchy_edges");
    for e in edges {
        dataset.rows.push(json!({
            "origin_table": e.origin_table,
            "parent_id": e.parent_id,
            "parent": e.parent_name,
            "child_id": e.child_id,
            "child": e.child_name,
            "child_table": e.child_table,
            "operation": e.operation.to_string(),
        }));
    }
    dataset
}

/// Level-by-modality rows flattened to `<modality>_meta`, `_ejecucion` and
/// `_porcentaje` columns.
pub fn level_programs_view(rows: &[LevelProgramRow]) -> ViewDataset {
    let mut dataset = ViewDataset::new("level_programs");
    for r in rows {
        let mut row = json!({
            "level": r.level,
            "total_target": r.total_target,
            "is_total": r.is_total,
        });
        for m in Modality::ALL {
            let f = r.figures(m);
            row[format!("{}_meta", m.key())] = json!(f.target);
            row[format!("{}_ejecucion", m.key())] = json!(f.actual);
            row[format!("{}_porcentaje", m.key())] = json!(f.percentage());
        }
        dataset.rows.push(row);
    }
    dataset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate_all;
    use crate::families::ModalityFigures;
    use crate::ingest::MetricStore;
    use crate::model::{Operation, RawRecord, RegionMode};
    use crate::semaphore::SemaphoreRange;

    fn store() -> MetricStore {
        let mut store = MetricStore::new();
        store.ingest(
            "2025_09",
            &[
                RawRecord::regional("Operarios Regular", "05", 100, 95),
                RawRecord::regional("Operarios Regular", "11", 100, 85),
                RawRecord::regional("SubTotal Operarios (B)", "05", 0, 10),
            ],
            RegionMode::Regional,
        );
        store
    }

    #[test]
    fn metric_rows_carry_flags_and_percentage() {
        let values = store().values_for_period("2025_09");
        let view = metric_rows_view(&values);
        assert_eq!(view.schema, "metric_rows.v1");
        assert_eq!(view.len(), 3);

        let sub = view
            .rows
            .iter()
            .find(|r| r["description"] == "SubTotal Operarios (B)")
            .unwrap();
        assert_eq!(sub["is_subtotal"], true);
        assert_eq!(sub["level"], 2);
        assert!(sub["percentage"].is_null());
    }

    #[test]
    fn aggregates_are_categorized() {
        let values = store().values_for_period("2025_09");
        let aggregates = aggregate_all(&values);
        let semaphores = SemaphoreTable::from_ranges([SemaphoreRange {
            group: "Formación".into(),
            indicator: "Operarios Regular".into(),
            month: "septiembre".into(),
            min_low: Some(0.0),
            max_low: Some(69.99),
            min_vulnerable: Some(70.0),
            max_vulnerable: Some(89.99),
            min_good: Some(90.0),
            max_good: Some(100.0),
            over_execution_above: Some(100.0),
        }]);

        let view = national_aggregates_view(&aggregates, &semaphores, "septiembre");
        let regular = &view.rows[0];
        assert_eq!(regular["description"], "Operarios Regular");
        assert_eq!(regular["region_count"], 2);
        assert_eq!(regular["percentage"], 90.0);
        assert_eq!(regular["category"], "good");

        let sub = &view.rows[1];
        assert_eq!(sub["category"], "unclassified");
        assert_eq!(sub["gap"], -10);
    }

    #[test]
    fn edges_view() {
        let edge = HierarchyEdge {
            origin_table: "t".into(),
            parent_id: 2,
            parent_name: "P".into(),
            child_id: 1,
            child_name: "A".into(),
            child_table: "t".into(),
            operation: Operation::Sum,
        };
        let view = hierarchy_edges_view(&[edge]);
        assert_eq!(view.rows[0]["operation"], "sum");
        assert_eq!(view.rows[0]["parent"], "P");
        assert!(hierarchy_edges_view(&[]).is_empty());
    }

    #[test]
    fn level_rows_flatten_modalities() {
        let row = LevelProgramRow::new(
            "Tecnólogo",
            ModalityFigures::new(Some(200), Some(50)),
            ModalityFigures::new(Some(10), None),
            ModalityFigures::default(),
            210,
        );
        let view = level_programs_view(&[row]);
        let r = &view.rows[0];
        assert_eq!(view.schema, "level_programs.v1");
        assert_eq!(r["regular_porcentaje"], 25.0);
        assert_eq!(r["campesena_meta"], 10);
        assert!(r["campesena_porcentaje"].is_null());
        assert!(r["full_popular_meta"].is_null());
        assert_eq!(r["is_total"], false);
    }
}
