//! Per-run evaluation records

use crate::engine::WorkloadOutcome;
use serde::{Deserialize, Serialize};

/// Completion metrics derived from workload outcomes
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CompletionSummary {
    pub total: usize,
    pub finished: usize,
    /// finished / total × 100, 0 when nothing was submitted
    pub completion_rate: f64,
    /// Mean actual compute time over finished workloads (s)
    pub avg_cpu_time: f64,
    /// Latest finish time over finished workloads, 0 when none finished (s)
    pub makespan: f64,
}

impl CompletionSummary {
    pub fn from_outcomes(outcomes: &[WorkloadOutcome]) -> Self {
        let total = outcomes.len();
        let finished: Vec<&WorkloadOutcome> = outcomes.iter().filter(|o| o.finished).collect();

        let completion_rate = if total == 0 {
            0.0
        } else {
            finished.len() as f64 * 100.0 / total as f64
        };

        let avg_cpu_time = if finished.is_empty() {
            0.0
        } else {
            finished.iter().map(|o| o.actual_cpu_time).sum::<f64>() / finished.len() as f64
        };

        let makespan = finished
            .iter()
            .map(|o| o.finish_time)
            .fold(0.0, f64::max);

        Self {
            total,
            finished: finished.len(),
            completion_rate,
            avg_cpu_time,
            makespan,
        }
    }
}

/// Outcome of one policy in one experiment run
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RunRecord {
    /// RFC 3339 UTC timestamp of when the record was built
    pub timestamp: String,
    pub run_id: u32,
    pub policy: String,
    pub total_workloads: usize,
    pub finished_workloads: usize,
    pub completion_rate: f64,
    pub avg_cpu_time: f64,
    pub makespan: f64,
    pub energy_kwh: f64,
    pub carbon_kg: f64,
}
