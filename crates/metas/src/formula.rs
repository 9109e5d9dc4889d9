//! Known-formula table: the declarative parent → children sum graph.
//!
//! The table is data, not code: it can be loaded from config, validated on its
//! own, and handed to the hierarchy resolver.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::MetasError;
use crate::model::Operation;

pub const FPI_TABLE: &str = "meta_formacion_profesional_integral";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    pub parent: String,
    pub children: Vec<String>,
    #[serde(default)]
    pub operation: Operation,
    /// Human-readable formula text. Defaults to the children joined by `+`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Formula {
    pub fn sum(parent: &str, children: &[&str]) -> Self {
        Self {
            parent: parent.into(),
            children: children.iter().map(|c| c.to_string()).collect(),
            operation: Operation::Sum,
            formula: None,
            description: None,
        }
    }

    fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn display_formula(&self) -> String {
        match &self.formula {
            Some(text) => text.clone(),
            None => self.children.join(" + "),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaTable {
    #[serde(default = "default_version")]
    pub version: String,
    /// Source table tag stamped on every resolved edge.
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default)]
    pub entries: Vec<Formula>,
}

fn default_version() -> String {
    "1.0".into()
}

fn default_table() -> String {
    FPI_TABLE.into()
}

impl Default for FormulaTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FormulaTable {
    /// The reporting system's known formulas, tiered detail → subtotal → total → grand total.
    pub fn builtin() -> Self {
        let entries = vec![
            Formula::sum(
                "SubTotal Tecnólogos ( E)",
                &[
                    "Tecnólogos Regular - Presencial",
                    "Tecnólogos Regular - Virtual",
                    "Tecnólogos Regular - A Distancia",
                    "Tecnólogos CampeSENA",
                    "Tecnólogos Full Popular",
                ],
            ),
            Formula::sum("EDUCACION SUPERIOR (=E)", &["SubTotal Tecnólogos ( E)"])
                .with_description("Educación Superior es igual al Subtotal de Tecnólogos"),
            Formula::sum(
                "SubTotal Operarios (B)",
                &["Operarios Regular", "Operarios CampeSENA", "Operarios Full Popular"],
            ),
            Formula::sum(
                "SubTotal Auxiliares (A)",
                &["Auxiliares Regular", "Auxiliares CampeSENA", "Auxiliares Full Popular"],
            ),
            Formula::sum(
                "SubTotal Técnico Laboral (C)",
                &[
                    "Técnico Laboral Regular - Presencial",
                    "Técnico Laboral Regular - Virtual",
                    "Técnico Laboral CampeSENA",
                    "Técnico Laboral Full Popular",
                    "Técnico Laboral Articulación con la Media",
                ],
            ),
            Formula::sum(
                "TOTAL FORMACIÓN LABORAL (D=A+B+C+T)",
                &[
                    "SubTotal Auxiliares (A)",
                    "SubTotal Operarios (B)",
                    "SubTotal Técnico Laboral (C)",
                    "Profundización Técnica (T)",
                ],
            ),
            Formula::sum(
                "TOTAL FORMACION TITULADA (F = D+E)",
                &["TOTAL FORMACIÓN LABORAL (D=A+B+C+T)", "EDUCACION SUPERIOR (=E)"],
            ),
            Formula::sum(
                "SubTotal Programa de Bilingüismo (K = I + J)",
                &[
                    "Programa de Bilingüismo - Virtual (I)",
                    "Programa de Bilingüismo - Presencial (J)",
                ],
            ),
            Formula::sum(
                "TOTAL FORMACION COMPLEMENTARIA (N = G+H+K+L+M)",
                &[
                    "Formación Complementaria - Virtual  (Sin Bilingüismo) (G)",
                    "Formación Complementaria - Presencial (Sin Bilingüismo) (H)",
                    "SubTotal Programa de Bilingüismo (K = I + J)",
                    "Formación Complementaria CampeSENA (L)",
                    "Formación Complementaria Full Popular (M)",
                ],
            ),
            Formula::sum(
                "TOTAL FORMACION PROFESIONAL INTEGRAL (O=N+F)",
                &[
                    "TOTAL FORMACION TITULADA (F = D+E)",
                    "TOTAL FORMACION COMPLEMENTARIA (N = G+H+K+L+M)",
                ],
            ),
        ];

        Self {
            version: default_version(),
            table: default_table(),
            entries,
        }
    }

    pub fn get(&self, parent: &str) -> Option<&Formula> {
        self.entries.iter().find(|f| f.parent == parent)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reject empty names, duplicate parents, self-references and cycles.
    pub fn validate(&self) -> Result<(), MetasError> {
        let mut parents = BTreeSet::new();
        for f in &self.entries {
            if f.parent.trim().is_empty() {
                return Err(MetasError::ConfigValidation(
                    "formula with empty parent name".into(),
                ));
            }
            if f.children.is_empty() {
                return Err(MetasError::ConfigValidation(format!(
                    "formula '{}' has no children",
                    f.parent
                )));
            }
            if f.children.iter().any(|c| c.trim().is_empty()) {
                return Err(MetasError::ConfigValidation(format!(
                    "formula '{}' has an empty child name",
                    f.parent
                )));
            }
            if f.children.iter().any(|c| c == &f.parent) {
                return Err(MetasError::FormulaCycle {
                    parent: f.parent.clone(),
                });
            }
            if !parents.insert(f.parent.as_str()) {
                return Err(MetasError::DuplicateFormula {
                    parent: f.parent.clone(),
                });
            }
        }

        self.check_acyclic()
    }

    fn check_acyclic(&self) -> Result<(), MetasError> {
        let graph: BTreeMap<&str, Vec<&str>> = self
            .entries
            .iter()
            .map(|f| (f.parent.as_str(), f.children.iter().map(String::as_str).collect()))
            .collect();

        // 0 = unvisited, 1 = on stack, 2 = done
        let mut state: BTreeMap<&str, u8> = BTreeMap::new();
        for &start in graph.keys() {
            if state.get(start).copied().unwrap_or(0) != 0 {
                continue;
            }
            let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
            state.insert(start, 1);

            while let Some((node, next)) = stack.pop() {
                let children = graph.get(node).map(Vec::as_slice).unwrap_or(&[]);
                if let Some(&child) = children.get(next) {
                    stack.push((node, next + 1));
                    match state.get(child).copied().unwrap_or(0) {
                        1 => {
                            return Err(MetasError::FormulaCycle {
                                parent: child.to_string(),
                            })
                        }
                        0 => {
                            state.insert(child, 1);
                            stack.push((child, 0));
                        }
                        _ => {}
                    }
                } else {
                    state.insert(node, 2);
                }
            }
        }
        Ok(())
    }
}
