//! Dashboard summary: headline KPIs, modality breakdown and top-N lists,
//! all computed from national aggregates.

use serde::Serialize;

use crate::aggregate::{aggregate_subset, top_by_gap, top_by_percentage, SubsetAggregate};
use crate::config::{DashboardConfig, ModalityConfig};
use crate::model::AggregatedMetric;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardState {
    Success,
    Warning,
    Danger,
}

impl std::fmt::Display for DashboardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Danger => write!(f, "danger"),
        }
    }
}

/// `>= success_at` success, `>= warning_at` warning, anything else danger.
/// An undefined percentage falls through to danger.
pub fn dashboard_state(pct: Option<f64>, config: &DashboardConfig) -> DashboardState {
    match pct {
        Some(p) if p >= config.success_at => DashboardState::Success,
        Some(p) if p >= config.warning_at => DashboardState::Warning,
        _ => DashboardState::Danger,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpi {
    pub title: String,
    pub target: u64,
    pub actual: u64,
    pub percentage: Option<f64>,
    pub state: DashboardState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedMetric {
    pub description: String,
    pub target: u64,
    pub actual: u64,
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapMetric {
    pub description: String,
    pub target: u64,
    pub actual: u64,
    pub gap: i64,
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub kpis: Vec<Kpi>,
    pub modalities: Vec<SubsetAggregate>,
    pub top_by_percentage: Vec<RankedMetric>,
    pub top_by_gap: Vec<GapMetric>,
}

pub fn build_dashboard(
    aggregates: &[AggregatedMetric],
    config: &DashboardConfig,
    modalities: &[ModalityConfig],
) -> DashboardSummary {
    let kpis = config
        .kpis
        .iter()
        .filter_map(|title| {
            let Some(m) = aggregates.iter().find(|a| &a.description == title) else {
                log::debug!("KPI '{title}' has no data this period");
                return None;
            };
            Some(Kpi {
                title: title.clone(),
                target: m.target,
                actual: m.actual,
                percentage: m.percentage,
                state: dashboard_state(m.percentage, config),
            })
        })
        .collect();

    let modalities = modalities
        .iter()
        .map(|m| aggregate_subset(&m.name, &m.patterns, aggregates))
        .collect();

    let top_by_percentage = top_by_percentage(aggregates, config.top_n, config.top_min_target)
        .into_iter()
        .map(|m| RankedMetric {
            description: m.description,
            target: m.target,
            actual: m.actual,
            percentage: m.percentage,
        })
        .collect();

    let top_by_gap = top_by_gap(aggregates, config.top_n)
        .into_iter()
        .map(|m| GapMetric {
            gap: m.gap(),
            description: m.description,
            target: m.target,
            actual: m.actual,
            percentage: m.percentage,
        })
        .collect();

    DashboardSummary {
        kpis,
        modalities,
        top_by_percentage,
        top_by_gap,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate_all;
    use crate::classify::classify;
    use crate::model::MetricValue;

    fn value(description: &str, target: u64, actual: u64) -> MetricValue {
        let c = classify(description);
        MetricValue {
            id: 0,
            description_id: 0,
            description: description.into(),
            region_code: Some("05".into()),
            target,
            actual,
            is_subtotal: c.is_subtotal,
            is_total: c.is_total,
            level: c.level,
            period: "2025_09".into(),
        }
    }

    #[test]
    fn state_thresholds() {
        let cfg = DashboardConfig::default();
        assert_eq!(dashboard_state(Some(90.0), &cfg), DashboardState::Success);
        assert_eq!(dashboard_state(Some(89.99), &cfg), DashboardState::Warning);
        assert_eq!(dashboard_state(Some(75.0), &cfg), DashboardState::Warning);
        assert_eq!(dashboard_state(Some(70.0), &cfg), DashboardState::Warning);
        assert_eq!(dashboard_state(Some(50.0), &cfg), DashboardState::Danger);
        assert_eq!(dashboard_state(None, &cfg), DashboardState::Danger);
    }

    #[test]
    fn kpis_follow_configured_order() {
        let aggregates = aggregate_all(&[
            value("TOTAL FORMACION TITULADA (F = D+E)", 1000, 750),
            value("TOTAL FORMACION PROFESIONAL INTEGRAL (O=N+F)", 1000, 900),
        ]);
        let d = build_dashboard(&aggregates, &DashboardConfig::default(), &[]);
        assert_eq!(d.kpis.len(), 2);
        assert_eq!(d.kpis[0].title, "TOTAL FORMACION PROFESIONAL INTEGRAL (O=N+F)");
        assert_eq!(d.kpis[0].percentage, Some(90.0));
        assert_eq!(d.kpis[0].state, DashboardState::Success);
        assert_eq!(d.kpis[1].state, DashboardState::Warning);
    }

    #[test]
    fn modalities_and_top_lists() {
        let aggregates = aggregate_all(&[
            value("Operarios Regular", 2000, 1900),
            value("Operarios CampeSENA", 1500, 600),
            value("Operarios Full Popular", 0, 50),
            value("SubTotal Operarios (B)", 3500, 2550),
        ]);
        let modalities = vec![
            ModalityConfig { name: "Regular".into(), patterns: vec!["regular".into()] },
            ModalityConfig { name: "Full Popular".into(), patterns: vec!["Full Popular".into()] },
        ];
        let d = build_dashboard(&aggregates, &DashboardConfig::default(), &modalities);

        assert_eq!(d.modalities[0].target, 2000);
        assert_eq!(d.modalities[0].percentage, Some(95.0));
        assert_eq!(d.modalities[1].percentage, None);

        let pct: Vec<&str> = d.top_by_percentage.iter().map(|m| m.description.as_str()).collect();
        assert_eq!(pct, vec!["Operarios Regular", "Operarios CampeSENA"]);

        assert_eq!(d.top_by_gap[0].description, "Operarios CampeSENA");
        assert_eq!(d.top_by_gap[0].gap, 900);
        assert_eq!(d.top_by_gap.last().unwrap().gap, -50);
    }
}
