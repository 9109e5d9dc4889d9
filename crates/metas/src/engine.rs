use serde::Serialize;

use crate::aggregate::aggregate_all;
use crate::config::MetasConfig;
use crate::dashboard::{build_dashboard, DashboardSummary};
use crate::error::MetasError;
use crate::extract::{
    load_additional_csv, load_level_program_csv, load_metric_csv, load_program_csv, ExtractOutput,
};
use crate::hierarchy::{resolve, Resolution};
use crate::ingest::{IngestReport, MetricStore};
use crate::model::{AggregatedMetric, RegionMode};
use crate::semaphore::SemaphoreTable;
use crate::snapshot::{build_snapshot, ReconciliationSnapshot, RollupCheck, SnapshotSources};
use crate::views::{
    hierarchy_edges_view, level_programs_view, metric_rows_view, national_aggregates_view, ViewDataset,
};

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub config_name: String,
    pub period: String,
    pub month: String,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunViews {
    pub metric_rows: ViewDataset,
    pub national_aggregates: ViewDataset,
    pub hierarchy_edges: ViewDataset,
    pub level_programs: ViewDataset,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub meta: RunMeta,
    pub aggregates: Vec<AggregatedMetric>,
    pub resolution: Resolution,
    pub dashboard: DashboardSummary,
    pub snapshot: ReconciliationSnapshot,
    pub rollups: Vec<RollupCheck>,
    pub views: RunViews,
}

/// Load a metric extract and upsert it into `store` under the configured period.
///
/// Extract-level drops and ingest-level drops land in the same report.
pub fn ingest_csv(
    store: &mut MetricStore,
    config: &MetasConfig,
    csv_data: &str,
) -> Result<IngestReport, MetasError> {
    let extract = load_metric_csv(csv_data, &config.extract)?;
    let mode = if config.extract.regional {
        RegionMode::Regional
    } else {
        RegionMode::National
    };
    let mut report = store.ingest(&config.period, &extract.rows, mode);
    report.diagnostics.extend(extract.diagnostics);
    report.diagnostics.sort_by_key(|d| d.row);
    Ok(report)
}

/// Upsert a family extract and fold its dropped rows into the report.
fn merge_family<T>(extract: ExtractOutput<T>, upsert: impl FnOnce(&[T]) -> IngestReport) -> IngestReport {
    let mut report = upsert(&extract.rows);
    report.diagnostics.extend(extract.diagnostics);
    report.diagnostics.sort_by_key(|d| d.row);
    report
}

/// Load the level-by-modality sheet into the configured period.
pub fn ingest_level_programs_csv(
    store: &mut MetricStore,
    config: &MetasConfig,
    csv_data: &str,
) -> Result<IngestReport, MetasError> {
    let extract = load_level_program_csv(csv_data)?;
    Ok(merge_family(extract, |rows| store.ingest_level_programs(&config.period, rows)))
}

/// Load the relevant-programs sheet into the configured period.
pub fn ingest_programs_csv(
    store: &mut MetricStore,
    config: &MetasConfig,
    csv_data: &str,
) -> Result<IngestReport, MetasError> {
    let extract = load_program_csv(csv_data)?;
    Ok(merge_family(extract, |rows| store.ingest_programs(&config.period, rows)))
}

/// Load the headerless additional-metrics sheet into the configured period.
pub fn ingest_additional_csv(
    store: &mut MetricStore,
    config: &MetasConfig,
    csv_data: &str,
) -> Result<IngestReport, MetasError> {
    let extract = load_additional_csv(csv_data)?;
    Ok(merge_family(extract, |rows| store.ingest_additional(&config.period, rows)))
}

/// Resolve, aggregate and summarize the configured period.
///
/// Reads the store only; running twice over the same inputs yields the same
/// output apart from timestamps.
pub fn run(
    config: &MetasConfig,
    store: &MetricStore,
    semaphores: &SemaphoreTable,
) -> Result<RunOutput, MetasError> {
    config.validate()?;

    let values = store.values_for_period(&config.period);
    log::info!("period {}: {} values", config.period, values.len());

    let resolution = resolve(&config.formulas, store);
    let aggregates = aggregate_all(&values);
    let dashboard = build_dashboard(&aggregates, &config.dashboard, &config.modalities);

    let regions = store.regions();
    let level_programs = store.level_programs_for_period(&config.period);
    let programs = store.programs_for_period(&config.period);
    let additional = store.additional_for_period(&config.period);
    let snapshot = build_snapshot(&SnapshotSources {
        config,
        regions: &regions,
        resolution: &resolution,
        values: &values,
        aggregates: &aggregates,
        semaphores,
        level_programs: &level_programs,
        programs: &programs,
        additional: &additional,
    });
    let rollups = snapshot.check_rollups();

    let views = RunViews {
        metric_rows: metric_rows_view(&values),
        national_aggregates: national_aggregates_view(&aggregates, semaphores, &config.month),
        hierarchy_edges: hierarchy_edges_view(&resolution.edges),
        level_programs: level_programs_view(&level_programs),
    };

    Ok(RunOutput {
        meta: RunMeta {
            config_name: config.name.clone(),
            period: config.period.clone(),
            month: config.month.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        aggregates,
        resolution,
        dashboard,
        snapshot,
        rollups,
        views,
    })
}
