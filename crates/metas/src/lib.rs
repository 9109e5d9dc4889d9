//! `metas-engine`: Hierarchical rollup engine for training-goal tracking.
//!
//! Pure engine crate: receives extract rows, classifies and stores them,
//! resolves the known-formula hierarchy and produces national aggregates,
//! semaphore categories, a dashboard summary and a reconciliation snapshot.

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod dashboard;
pub mod engine;
pub mod error;
pub mod extract;
pub mod families;
pub mod formula;
pub mod hierarchy;
pub mod ingest;
pub mod model;
pub mod semaphore;
pub mod snapshot;
pub mod views;

pub use config::MetasConfig;
pub use engine::{ingest_additional_csv, ingest_csv, ingest_level_programs_csv, ingest_programs_csv, run, RunOutput};
pub use error::MetasError;
pub use ingest::MetricStore;
pub use model::{AggregatedMetric, HierarchyLevel, RawRecord, RegionMode};
pub use semaphore::{SemaphoreCategory, SemaphoreTable};
