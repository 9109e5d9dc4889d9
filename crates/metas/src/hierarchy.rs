//! Hierarchy resolver: maps the formula table onto the live description set.
//!
//! A formula whose parent is unknown is skipped whole; an unknown child only
//! drops that one edge. Every call regenerates the full edge set from scratch.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::formula::FormulaTable;
use crate::ingest::MetricStore;
use crate::model::{HierarchyEdge, MetricDescription};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingEndpoint {
    Parent,
    Child,
}

/// A formula endpoint that did not resolve to an existing description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEndpoint {
    pub parent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child: Option<String>,
    pub missing: MissingEndpoint,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub edges: Vec<HierarchyEdge>,
    pub skipped: Vec<SkippedEndpoint>,
}

impl Resolution {
    /// Edges grouped by parent name, children in formula order.
    pub fn by_parent(&self) -> BTreeMap<&str, Vec<&HierarchyEdge>> {
        group_by_parent(&self.edges)
    }
}

/// Anything that can look a description up by its normalized text.
pub trait DescriptionLookup {
    fn lookup(&self, name: &str) -> Option<&MetricDescription>;
}

impl DescriptionLookup for MetricStore {
    fn lookup(&self, name: &str) -> Option<&MetricDescription> {
        self.description(name)
    }
}

/// Resolve every formula entry against `descriptions`.
pub fn resolve(table: &FormulaTable, descriptions: &impl DescriptionLookup) -> Resolution {
    let mut resolution = Resolution::default();

    for formula in &table.entries {
        let Some(parent) = descriptions.lookup(&formula.parent) else {
            log::debug!("formula parent '{}' not present, skipping entry", formula.parent);
            resolution.skipped.push(SkippedEndpoint {
                parent: formula.parent.clone(),
                child: None,
                missing: MissingEndpoint::Parent,
            });
            continue;
        };

        for child_name in &formula.children {
            let Some(child) = descriptions.lookup(child_name) else {
                log::debug!("child '{child_name}' of '{}' not present, skipping edge", parent.name);
                resolution.skipped.push(SkippedEndpoint {
                    parent: formula.parent.clone(),
                    child: Some(child_name.clone()),
                    missing: MissingEndpoint::Child,
                });
                continue;
            };

            resolution.edges.push(HierarchyEdge {
                origin_table: table.table.clone(),
                parent_id: parent.id,
                parent_name: parent.name.clone(),
                child_id: child.id,
                child_name: child.name.clone(),
                child_table: table.table.clone(),
                operation: formula.operation,
            });
        }
    }

    log::info!(
        "resolved {} hierarchy edges ({} endpoints skipped)",
        resolution.edges.len(),
        resolution.skipped.len()
    );
    resolution
}

pub fn group_by_parent(edges: &[HierarchyEdge]) -> BTreeMap<&str, Vec<&HierarchyEdge>> {
    let mut groups: BTreeMap<&str, Vec<&HierarchyEdge>> = BTreeMap::new();
    for e in edges {
        groups.entry(e.parent_name.as_str()).or_default().push(e);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Formula;
    use crate::model::{Operation, RawRecord, RegionMode};

    fn store(names: &[&str]) -> MetricStore {
        let records: Vec<RawRecord> = names.iter().map(|n| RawRecord::national(n, 1, 1)).collect();
        let mut store = MetricStore::new();
        store.ingest("2025_09", &records, RegionMode::National);
        store
    }

    fn table(entries: Vec<Formula>) -> FormulaTable {
        FormulaTable {
            version: "test".into(),
            table: "t".into(),
            entries,
        }
    }

    #[test]
    fn resolves_known_endpoints() {
        let s = store(&["A", "B", "C", "P"]);
        let r = resolve(&table(vec![Formula::sum("P", &["A", "B", "C"])]), &s);
        assert_eq!(r.edges.len(), 3);
        assert!(r.skipped.is_empty());
        let e = &r.edges[0];
        assert_eq!(e.parent_name, "P");
        assert_eq!(e.child_name, "A");
        assert_eq!(e.parent_id, s.description("P").unwrap().id);
        assert_eq!(e.operation, Operation::Sum);
        assert_eq!(e.origin_table, "t");
    }

    #[test]
    fn missing_parent_skips_whole_entry() {
        let s = store(&["A", "B"]);
        let r = resolve(&table(vec![Formula::sum("P", &["A", "B"])]), &s);
        assert!(r.edges.is_empty());
        assert_eq!(r.skipped.len(), 1);
        assert_eq!(r.skipped[0].missing, MissingEndpoint::Parent);
    }

    #[test]
    fn missing_child_drops_only_that_edge() {
        let s = store(&["A", "C", "P"]);
        let r = resolve(&table(vec![Formula::sum("P", &["A", "B", "C"])]), &s);
        let children: Vec<&str> = r.edges.iter().map(|e| e.child_name.as_str()).collect();
        assert_eq!(children, vec!["A", "C"]);
        assert_eq!(r.skipped[0].child.as_deref(), Some("B"));
    }

    #[test]
    fn regeneration_replaces_previous_edges() {
        let t = table(vec![Formula::sum("P", &["A"])]);
        let first = resolve(&t, &store(&["A", "P"]));
        let second = resolve(&t, &store(&["A", "P"]));
        assert_eq!(first, second);
        assert_eq!(second.edges.len(), 1);
    }

    #[test]
    fn builtin_table_against_partial_data() {
        let s = store(&[
            "SubTotal Operarios (B)",
            "Operarios Regular",
            "Operarios CampeSENA",
            "TOTAL FORMACIÓN LABORAL (D=A+B+C+T)",
            "Profundización Técnica (T)",
        ]);
        let r = resolve(&FormulaTable::builtin(), &s);
        let groups = r.by_parent();
        assert_eq!(groups["SubTotal Operarios (B)"].len(), 2);
        assert_eq!(groups["TOTAL FORMACIÓN LABORAL (D=A+B+C+T)"].len(), 2);
        for e in &r.edges {
            assert!(s.description(&e.parent_name).is_some());
            assert!(s.description(&e.child_name).is_some());
        }
    }
}
