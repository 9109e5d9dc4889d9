use std::fmt;

use serde::Serialize;

#[derive(Debug)]
pub enum MetasError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad thresholds, empty period, etc.).
    ConfigValidation(String),
    /// The formula table contains a cycle reachable from `parent`.
    FormulaCycle { parent: String },
    /// A parent appears in more than one formula entry.
    DuplicateFormula { parent: String },
    /// Missing required column in an input extract.
    MissingColumn { source: String, column: String },
    /// CSV reader error.
    Csv(String),
    /// IO error (file read, etc.).
    Io(String),
}

impl fmt::Display for MetasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::FormulaCycle { parent } => {
                write!(f, "formula table has a cycle through '{parent}'")
            }
            Self::DuplicateFormula { parent } => {
                write!(f, "formula for '{parent}' is defined more than once")
            }
            Self::MissingColumn { source, column } => {
                write!(f, "{source}: missing column '{column}'")
            }
            Self::Csv(msg) => write!(f, "CSV error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for MetasError {}

impl From<csv::Error> for MetasError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Row diagnostics (skippable, never fatal)
// ---------------------------------------------------------------------------

/// Why a single input row was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticReason {
    EmptyDescription,
    UnparseableNumber { field: String, value: String },
    NegativeQuantity { field: String, value: i64 },
    MissingRegion,
}

impl fmt::Display for DiagnosticReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyDescription => write!(f, "empty description"),
            Self::UnparseableNumber { field, value } => {
                write!(f, "cannot parse {field} '{value}'")
            }
            Self::NegativeQuantity { field, value } => {
                write!(f, "negative {field} ({value})")
            }
            Self::MissingRegion => write!(f, "missing region code"),
        }
    }
}

/// A dropped row. `row` is 1-based within the batch that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowDiagnostic {
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub reason: DiagnosticReason,
}

impl fmt::Display for RowDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(d) => write!(f, "row {} ('{d}'): {}", self.row, self.reason),
            None => write!(f, "row {}: {}", self.row, self.reason),
        }
    }
}
