//! CSV adapters at the ingestion boundary: metric extracts, the range sheet
//! and the companion family sheets.

use csv::StringRecord;

use crate::config::ExtractConfig;
use crate::error::{DiagnosticReason, MetasError, RowDiagnostic};
use crate::families::{AdditionalMetric, LevelProgramRow, ModalityFigures, RelevantProgram};
use crate::model::RawRecord;
use crate::semaphore::SemaphoreRange;

/// Parsed rows plus the rows that had to be dropped.
#[derive(Debug, Clone)]
pub struct ExtractOutput<T> {
    pub rows: Vec<T>,
    pub diagnostics: Vec<RowDiagnostic>,
}

impl<T> Default for ExtractOutput<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}

fn header_index(headers: &[String], source: &str, name: &str) -> Result<usize, MetasError> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| MetasError::MissingColumn {
            source: source.into(),
            column: name.into(),
        })
}

fn read_headers(reader: &mut csv::Reader<&[u8]>) -> Result<Vec<String>, MetasError> {
    Ok(reader.headers()?.iter().map(|h| h.to_string()).collect())
}

fn cell(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("").trim()
}

fn quantity_cell(
    record: &StringRecord,
    idx: usize,
    field: &str,
) -> Result<Option<i64>, DiagnosticReason> {
    let raw = cell(record, idx);
    parse_quantity(raw).map_err(|_| DiagnosticReason::UnparseableNumber {
        field: field.to_string(),
        value: raw.to_string(),
    })
}

/// Parse a quantity cell. Empty is absent. A `,` or `.` followed by exactly
/// three digits is a thousands group (`12.000`, `1,234,567`), a zero fraction
/// (`1200.0`) is accepted, and any other fraction is unparseable.
fn parse_quantity(raw: &str) -> Result<Option<i64>, ()> {
    let s = raw.trim();
    if s.is_empty() {
        return Ok(None);
    }
    if let Ok(v) = s.parse::<i64>() {
        return Ok(Some(v));
    }
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if let Some(v) = parse_grouped(body) {
        return Ok(Some(if negative { -v } else { v }));
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Some(f as i64)),
        _ => Err(()),
    }
}

/// `12.000`, `1.234.567` or `1,234,567`: a 1-3 digit head without a leading
/// zero, then 3-digit groups split by a single separator kind.
fn parse_grouped(s: &str) -> Option<i64> {
    let sep = s.chars().find(|c| *c == ',' || *c == '.')?;
    let mut groups = s.split(sep);
    let head = groups.next()?;
    let is_digits = |g: &str| !g.is_empty() && g.bytes().all(|b| b.is_ascii_digit());
    if !is_digits(head) || head.len() > 3 || head.starts_with('0') {
        return None;
    }
    let mut digits = head.to_string();
    for group in groups {
        if group.len() != 3 || !is_digits(group) {
            return None;
        }
        digits.push_str(group);
    }
    digits.parse().ok()
}

/// A quantity cell that must not be negative.
fn count_cell(record: &StringRecord, idx: usize, field: &str) -> Result<Option<u64>, DiagnosticReason> {
    match quantity_cell(record, idx, field)? {
        Some(v) if v < 0 => Err(DiagnosticReason::NegativeQuantity {
            field: field.to_string(),
            value: v,
        }),
        v => Ok(v.map(|v| v as u64)),
    }
}

fn drop_row<T>(out: &mut ExtractOutput<T>, source: &str, row: usize, description: &str, reason: DiagnosticReason) {
    let diag = RowDiagnostic {
        row,
        description: (!description.is_empty()).then(|| description.to_string()),
        reason,
    };
    log::warn!("{source}: dropping {diag}");
    out.diagnostics.push(diag);
}

/// Parse a threshold cell. Empty is absent; decimal comma accepted.
fn parse_threshold(raw: &str) -> Result<Option<f64>, ()> {
    let s = raw.trim();
    if s.is_empty() {
        return Ok(None);
    }
    s.replace(',', ".").parse::<f64>().map(Some).map_err(|_| ())
}

// ---------------------------------------------------------------------------
// Metric extract
// ---------------------------------------------------------------------------

/// Load metric rows from CSV using the configured column mapping.
///
/// Missing columns fail the whole load; an unparseable number only drops its row.
pub fn load_metric_csv(
    csv_data: &str,
    config: &ExtractConfig,
) -> Result<ExtractOutput<RawRecord>, MetasError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());
    let headers = read_headers(&mut reader)?;

    let col = &config.columns;
    let source = "metric extract";
    let description_idx = header_index(&headers, source, &col.description)?;
    let target_idx = header_index(&headers, source, &col.target)?;
    let actual_idx = header_index(&headers, source, &col.actual)?;
    let (region_code_idx, region_name_idx) = if config.regional {
        (
            Some(header_index(&headers, source, &col.region_code)?),
            headers.iter().position(|h| h.trim() == col.region_name),
        )
    } else {
        (None, None)
    };

    let mut out = ExtractOutput::default();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let description = cell(&record, description_idx).to_string();

        let target = quantity_cell(&record, target_idx, &col.target);
        let actual = quantity_cell(&record, actual_idx, &col.actual);

        match target.and_then(|t| actual.map(|a| (t, a))) {
            Ok((target, actual)) => out.rows.push(RawRecord {
                description,
                target,
                actual,
                region_code: region_code_idx
                    .map(|idx| cell(&record, idx).to_string())
                    .filter(|c| !c.is_empty()),
                region_name: region_name_idx
                    .map(|idx| cell(&record, idx).to_string())
                    .filter(|n| !n.is_empty()),
                row: Some(row),
            }),
            Err(reason) => {
                let diag = RowDiagnostic {
                    row,
                    description: (!description.is_empty()).then_some(description),
                    reason,
                };
                log::warn!("extract: dropping {diag}");
                out.diagnostics.push(diag);
            }
        }
    }

    Ok(out)
}

// ---------------------------------------------------------------------------
// Range sheet
// ---------------------------------------------------------------------------

const RANGE_COLUMNS: [&str; 7] = [
    "min_baja",
    "max_baja",
    "min_vulnerable",
    "max_vulnerable",
    "min_buena",
    "max_buena",
    "sobreejecucion_superior_a",
];

/// Load the semaphore range sheet. Rows without a month are skipped silently.
pub fn load_semaphore_csv(csv_data: &str) -> Result<ExtractOutput<SemaphoreRange>, MetasError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());
    let headers = read_headers(&mut reader)?;

    let source = "semaphore ranges";
    let group_idx = header_index(&headers, source, "agrupador")?;
    let indicator_idx = header_index(&headers, source, "nombre_de_indicador")?;
    let month_idx = header_index(&headers, source, "mes")?;
    let mut bound_idx = [0usize; 7];
    for (slot, name) in bound_idx.iter_mut().zip(RANGE_COLUMNS) {
        *slot = header_index(&headers, source, name)?;
    }

    let mut out = ExtractOutput::default();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let month = cell(&record, month_idx);
        if month.is_empty() {
            continue;
        }
        let indicator = cell(&record, indicator_idx).to_string();

        let mut bounds = [None; 7];
        let mut failed = None;
        for ((slot, idx), name) in bounds.iter_mut().zip(bound_idx).zip(RANGE_COLUMNS) {
            let raw = cell(&record, idx);
            match parse_threshold(raw) {
                Ok(v) => *slot = v,
                Err(()) => {
                    failed = Some(DiagnosticReason::UnparseableNumber {
                        field: name.to_string(),
                        value: raw.to_string(),
                    });
                    break;
                }
            }
        }

        if let Some(reason) = failed {
            let diag = RowDiagnostic {
                row: i + 1,
                description: Some(indicator),
                reason,
            };
            log::warn!("semaphore: dropping {diag}");
            out.diagnostics.push(diag);
            continue;
        }

        let [min_low, max_low, min_vulnerable, max_vulnerable, min_good, max_good, over] = bounds;
        out.rows.push(SemaphoreRange {
            group: cell(&record, group_idx).to_string(),
            indicator,
            month: month.to_string(),
            min_low,
            max_low,
            min_vulnerable,
            max_vulnerable,
            min_good,
            max_good,
            over_execution_above: over,
        });
    }

    Ok(out)
}

// ---------------------------------------------------------------------------
// Level x modality sheet
// ---------------------------------------------------------------------------

const MODALITY_COLUMNS: [(&str, &str); 3] = [
    ("regular_meta", "regular_ejecucion"),
    ("campesena_meta", "campesena_ejecucion"),
    ("full_popular_meta", "full_popular_ejecucion"),
];

/// Load the level-by-modality sheet. Modality columns are optional and a
/// blank cell stays blank; the level and total target columns are required.
pub fn load_level_program_csv(csv_data: &str) -> Result<ExtractOutput<LevelProgramRow>, MetasError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());
    let headers = read_headers(&mut reader)?;

    let source = "level programs";
    let level_idx = header_index(&headers, source, "nivel_formacion")?;
    let total_idx = header_index(&headers, source, "total_meta_formacion_profesional")?;
    let optional = |name: &str| headers.iter().position(|h| h.trim() == name);
    let modality_idx: Vec<(Option<usize>, Option<usize>)> = MODALITY_COLUMNS
        .iter()
        .map(|(t, a)| (optional(t), optional(a)))
        .collect();

    let mut out = ExtractOutput::default();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let level = cell(&record, level_idx);
        if level.is_empty() {
            drop_row(&mut out, source, row, level, DiagnosticReason::EmptyDescription);
            continue;
        }

        let parsed = (|| {
            let mut figures = [ModalityFigures::default(); 3];
            for (slot, ((t_idx, a_idx), (t_name, a_name))) in
                figures.iter_mut().zip(modality_idx.iter().zip(MODALITY_COLUMNS))
            {
                let target = match t_idx {
                    Some(idx) => count_cell(&record, *idx, t_name)?,
                    None => None,
                };
                let actual = match a_idx {
                    Some(idx) => count_cell(&record, *idx, a_name)?,
                    None => None,
                };
                *slot = ModalityFigures::new(target, actual);
            }
            let total = count_cell(&record, total_idx, "total_meta_formacion_profesional")?;
            Ok::<_, DiagnosticReason>((figures, total.unwrap_or(0)))
        })();

        match parsed {
            Ok(([regular, campesena, full_popular], total)) => out
                .rows
                .push(LevelProgramRow::new(level, regular, campesena, full_popular, total)),
            Err(reason) => drop_row(&mut out, source, row, level, reason),
        }
    }

    Ok(out)
}

// ---------------------------------------------------------------------------
// Relevant programs sheet
// ---------------------------------------------------------------------------

/// Load the relevant-programs sheet. Absent quantities are zero.
pub fn load_program_csv(csv_data: &str) -> Result<ExtractOutput<RelevantProgram>, MetasError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());
    let headers = read_headers(&mut reader)?;

    let source = "relevant programs";
    let description_idx = header_index(&headers, source, "Metas Programas Relevantes")?;
    let target_idx = header_index(&headers, source, "meta")?;
    let actual_idx = header_index(&headers, source, "ejecucion")?;
    let kind_idx = header_index(&headers, source, "tipo")?;

    let mut out = ExtractOutput::default();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let description = cell(&record, description_idx);
        if description.is_empty() {
            drop_row(&mut out, source, row, description, DiagnosticReason::EmptyDescription);
            continue;
        }
        let target = count_cell(&record, target_idx, "meta");
        let actual = count_cell(&record, actual_idx, "ejecucion");
        match target.and_then(|t| actual.map(|a| (t, a))) {
            Ok((target, actual)) => out.rows.push(RelevantProgram {
                description: description.to_string(),
                target: target.unwrap_or(0),
                actual: actual.unwrap_or(0),
                kind: cell(&record, kind_idx).to_string(),
            }),
            Err(reason) => drop_row(&mut out, source, row, description, reason),
        }
    }

    Ok(out)
}

// ---------------------------------------------------------------------------
// Additional metrics sheet
// ---------------------------------------------------------------------------

const CATEGORY_TARGET_MARKERS: [&str; 3] = ["META", "meta", "Cupos"];
const CATEGORY_ACTUAL_MARKERS: [&str; 3] = ["EJECUCIÓN", "EJECUCION", "ejecucion"];

/// Plain decimal, or absent for blank and `nan` cells.
fn parse_measure(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Load the headerless additional-metrics sheet.
///
/// A row whose second and third cells read like `META, EJECUCIÓN` opens a
/// category named by its first cell. Rows before the first category, rows
/// without a name and rows where neither value parses are skipped.
pub fn load_additional_csv(csv_data: &str) -> Result<ExtractOutput<AdditionalMetric>, MetasError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(csv_data.as_bytes());

    let mut out = ExtractOutput::default();
    let mut category: Option<String> = None;
    for record in reader.records() {
        let record = record?;
        let (name, target_raw, actual_raw) = (cell(&record, 0), cell(&record, 1), cell(&record, 2));

        if CATEGORY_TARGET_MARKERS.contains(&target_raw) && CATEGORY_ACTUAL_MARKERS.contains(&actual_raw) {
            category = Some(name.to_string());
            continue;
        }
        let Some(current) = category.as_deref() else {
            continue;
        };
        if name.is_empty() || name.eq_ignore_ascii_case("nan") {
            continue;
        }

        let (target, actual) = (parse_measure(target_raw), parse_measure(actual_raw));
        if target.is_none() && actual.is_none() {
            log::debug!("additional metrics: skipping '{name}' without values");
            continue;
        }
        out.rows.push(AdditionalMetric::new(current, name, target, actual));
    }

    Ok(out)
}
