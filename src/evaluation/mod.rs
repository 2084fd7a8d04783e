//! Experiment evaluation: per-run metrics, cross-run statistics, export

pub mod export;
pub mod harness;
pub mod metrics;
pub mod stats;
pub mod types;

pub use export::{ExportedArtifacts, ResultsExporter};
pub use harness::{EvaluationHarness, EvaluationReport, ReportContext};
pub use metrics::{EnergyEstimate, MetricsEstimator};
pub use stats::{relative_improvement_percent, Improvement, PolicyStatistics, SeriesStats};
pub use types::{CompletionSummary, RunRecord};
