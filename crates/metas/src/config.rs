use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MetasError;
use crate::families::{ADDITIONAL_METRIC_TABLE, LEVEL_PROGRAM_TABLE, RELEVANT_PROGRAM_TABLE};
use crate::formula::{FormulaTable, FPI_TABLE};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetasConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Reporting period tag, e.g. `2025_09`.
    #[serde(default = "default_period")]
    pub period: String,
    /// Month key used to look up semaphore ranges.
    #[serde(default = "default_month")]
    pub month: String,
    #[serde(default)]
    pub formulas: FormulaTable,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default = "default_modalities")]
    pub modalities: Vec<ModalityConfig>,
    #[serde(default = "default_cross_references")]
    pub cross_references: BTreeMap<String, CrossReference>,
    #[serde(default)]
    pub extract: ExtractConfig,
}

fn default_name() -> String {
    "Seguimiento de metas".into()
}

fn default_period() -> String {
    "2025_09".into()
}

fn default_month() -> String {
    "septiembre".into()
}

impl Default for MetasConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            period: default_period(),
            month: default_month(),
            formulas: FormulaTable::builtin(),
            dashboard: DashboardConfig::default(),
            modalities: default_modalities(),
            cross_references: default_cross_references(),
            extract: ExtractConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DashboardConfig {
    /// Headline descriptions, in display order.
    #[serde(default = "default_kpis")]
    pub kpis: Vec<String>,
    #[serde(default = "default_success_at")]
    pub success_at: f64,
    #[serde(default = "default_warning_at")]
    pub warning_at: f64,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Rows must exceed this target to enter the percentage ranking.
    #[serde(default = "default_top_min_target")]
    pub top_min_target: u64,
}

fn default_kpis() -> Vec<String> {
    vec![
        "TOTAL FORMACION PROFESIONAL INTEGRAL (O=N+F)".into(),
        "TOTAL FORMACION TITULADA (F = D+E)".into(),
        "TOTAL FORMACION COMPLEMENTARIA (N = G+H+K+L+M)".into(),
        "EDUCACION SUPERIOR (=E)".into(),
    ]
}

fn default_success_at() -> f64 {
    90.0
}

fn default_warning_at() -> f64 {
    70.0
}

fn default_top_n() -> usize {
    5
}

fn default_top_min_target() -> u64 {
    1000
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            kpis: default_kpis(),
            success_at: default_success_at(),
            warning_at: default_warning_at(),
            top_n: default_top_n(),
            top_min_target: default_top_min_target(),
        }
    }
}

// ---------------------------------------------------------------------------
// Modalities + cross references
// ---------------------------------------------------------------------------

/// A named family of detail rows, matched by case-insensitive substrings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModalityConfig {
    pub name: String,
    pub patterns: Vec<String>,
}

fn default_modalities() -> Vec<ModalityConfig> {
    ["Regular", "CampeSENA", "Full Popular"]
        .iter()
        .map(|name| ModalityConfig {
            name: name.to_string(),
            patterns: vec![name.to_string()],
        })
        .collect()
}

/// Which source tables an indicator family shows up in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossReference {
    pub tables: Vec<String>,
    #[serde(default)]
    pub description: String,
}

fn default_cross_references() -> BTreeMap<String, CrossReference> {
    let all_tables = vec![
        FPI_TABLE.to_string(),
        LEVEL_PROGRAM_TABLE.to_string(),
        RELEVANT_PROGRAM_TABLE.to_string(),
        ADDITIONAL_METRIC_TABLE.to_string(),
    ];
    BTreeMap::from([
        (
            "CampeSENA".to_string(),
            CrossReference {
                tables: all_tables.clone(),
                description: "Indicadores de la estrategia CampeSENA aparecen en múltiples tablas".into(),
            },
        ),
        (
            "Full Popular".to_string(),
            CrossReference {
                tables: all_tables,
                description: "Indicadores de Full Popular aparecen en múltiples tablas".into(),
            },
        ),
        (
            "Virtual".to_string(),
            CrossReference {
                tables: vec![FPI_TABLE.to_string(), RELEVANT_PROGRAM_TABLE.to_string()],
                description: "Formación Virtual se reporta de manera agregada en programas relevantes".into(),
            },
        ),
    ])
}

// ---------------------------------------------------------------------------
// Extract column mapping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtractConfig {
    #[serde(default = "default_true")]
    pub regional: bool,
    #[serde(default)]
    pub columns: ColumnMapping,
}

fn default_true() -> bool {
    true
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            regional: true,
            columns: ColumnMapping::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub description: String,
    pub target: String,
    pub actual: String,
    pub region_code: String,
    pub region_name: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            description: "descripcion".into(),
            target: "meta".into(),
            actual: "ejecucion".into(),
            region_code: "codigo_regional".into(),
            region_name: "regional".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl MetasConfig {
    pub fn from_toml(input: &str) -> Result<Self, MetasError> {
        let config: MetasConfig =
            toml::from_str(input).map_err(|e| MetasError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, MetasError> {
        let input = std::fs::read_to_string(path)
            .map_err(|e| MetasError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&input)
    }

    pub fn validate(&self) -> Result<(), MetasError> {
        if self.period.trim().is_empty() {
            return Err(MetasError::ConfigValidation("period must not be empty".into()));
        }

        let d = &self.dashboard;
        if d.warning_at > d.success_at {
            return Err(MetasError::ConfigValidation(format!(
                "dashboard.warning_at ({}) must not exceed dashboard.success_at ({})",
                d.warning_at, d.success_at
            )));
        }
        if d.top_n == 0 {
            return Err(MetasError::ConfigValidation(
                "dashboard.top_n must be at least 1".into(),
            ));
        }

        for m in &self.modalities {
            if m.patterns.iter().all(|p| p.trim().is_empty()) {
                return Err(MetasError::ConfigValidation(format!(
                    "modality '{}' needs at least one pattern",
                    m.name
                )));
            }
        }

        self.formulas.validate()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
