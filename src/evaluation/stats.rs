//! Cross-run statistics

use crate::evaluation::types::RunRecord;
use serde::Serialize;

/// Mean and sample standard deviation of a series
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct SeriesStats {
    pub mean: f64,
    /// N−1 denominator; 0 for fewer than two values
    pub std_dev: f64,
}

impl SeriesStats {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std_dev = if values.len() > 1 {
            let squared: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (squared / (n - 1.0)).sqrt()
        } else {
            0.0
        };

        Self { mean, std_dev }
    }
}

/// Aggregate of all runs of one policy
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PolicyStatistics {
    pub policy: String,
    pub runs: usize,
    pub completion_rate: SeriesStats,
    pub makespan: SeriesStats,
    pub energy_kwh: SeriesStats,
    pub carbon_kg: SeriesStats,
}

impl PolicyStatistics {
    /// Compute statistics over every record of `policy`
    pub fn from_records<'a, I>(policy: &str, records: I) -> Self
    where
        I: IntoIterator<Item = &'a RunRecord>,
    {
        let series: Vec<&RunRecord> = records
            .into_iter()
            .filter(|r| r.policy == policy)
            .collect();
        let collect = |f: fn(&RunRecord) -> f64| -> SeriesStats {
            SeriesStats::from_values(&series.iter().map(|&r| f(r)).collect::<Vec<_>>())
        };

        Self {
            policy: policy.to_string(),
            runs: series.len(),
            completion_rate: collect(|r| r.completion_rate),
            makespan: collect(|r| r.makespan),
            energy_kwh: collect(|r| r.energy_kwh),
            carbon_kg: collect(|r| r.carbon_kg),
        }
    }

    /// One `PolicyStatistics` per policy, ordered by first appearance
    pub fn group(records: &[RunRecord]) -> Vec<Self> {
        let mut policies: Vec<&str> = Vec::new();
        for record in records {
            if !policies.contains(&record.policy.as_str()) {
                policies.push(&record.policy);
            }
        }

        policies
            .into_iter()
            .map(|policy| Self::from_records(policy, records))
            .collect()
    }
}

/// Percentage by which `candidate` improves on `baseline`
///
/// Returns 0 when the baseline is 0. That is a divide-by-zero guard, not a
/// claim that the two are equal.
pub fn relative_improvement_percent(baseline: f64, candidate: f64) -> f64 {
    if baseline == 0.0 {
        return 0.0;
    }
    (baseline - candidate) / baseline * 100.0
}

/// Improvement of a candidate policy over one baseline policy
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Improvement {
    pub baseline: String,
    pub candidate: String,
    pub energy_pct: f64,
    pub carbon_pct: f64,
    pub makespan_pct: f64,
}

impl Improvement {
    pub fn between(baseline: &PolicyStatistics, candidate: &PolicyStatistics) -> Self {
        Self {
            baseline: baseline.policy.clone(),
            candidate: candidate.policy.clone(),
            energy_pct: relative_improvement_percent(
                baseline.energy_kwh.mean,
                candidate.energy_kwh.mean,
            ),
            carbon_pct: relative_improvement_percent(
                baseline.carbon_kg.mean,
                candidate.carbon_kg.mean,
            ),
            makespan_pct: relative_improvement_percent(
                baseline.makespan.mean,
                candidate.makespan.mean,
            ),
        }
    }
}
