//! Repeated experiment runs across placement policies

use crate::carbon_aware::CarbonIntensityClient;
use crate::config::EvaluationConfig;
use crate::engine::{HostRegionMap, SimulationEngine};
use crate::error::Result;
use crate::evaluation::metrics::MetricsEstimator;
use crate::evaluation::stats::{Improvement, PolicyStatistics};
use crate::evaluation::types::{CompletionSummary, RunRecord};
use crate::scheduler::{PlacementPolicy, PolicyKind};
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::info;

/// Experiment shape echoed into the narrative report
#[derive(Clone, Debug, PartialEq)]
pub struct ReportContext {
    pub generated_at: DateTime<Utc>,
    pub runs: u32,
    pub host_count: usize,
    pub vm_count: usize,
    pub workload_count: usize,
}

impl ReportContext {
    pub fn from_config(config: &EvaluationConfig) -> Self {
        Self {
            generated_at: Utc::now(),
            runs: config.runs,
            host_count: config.host_count,
            vm_count: config.vm_count,
            workload_count: config.workload_count,
        }
    }
}

/// Everything a finished sweep produced
#[derive(Clone, Debug)]
pub struct EvaluationReport {
    pub context: ReportContext,
    pub records: Vec<RunRecord>,
    pub statistics: Vec<PolicyStatistics>,
}

impl EvaluationReport {
    pub fn new(context: ReportContext, records: Vec<RunRecord>) -> Self {
        let statistics = PolicyStatistics::group(&records);
        Self {
            context,
            records,
            statistics,
        }
    }

    pub fn statistics_for(&self, policy: &str) -> Option<&PolicyStatistics> {
        self.statistics.iter().find(|s| s.policy == policy)
    }

    /// Carbon-aware policy against every other evaluated policy
    pub fn improvements(&self) -> Vec<Improvement> {
        let Some(candidate) = self.statistics_for(PolicyKind::CarbonAware.name()) else {
            return Vec::new();
        };

        self.statistics
            .iter()
            .filter(|s| s.policy != candidate.policy)
            .map(|baseline| Improvement::between(baseline, candidate))
            .collect()
    }
}

/// Drives `runs × policies` experiments through a simulation engine
pub struct EvaluationHarness<F> {
    config: EvaluationConfig,
    policies: Vec<PolicyKind>,
    carbon: CarbonIntensityClient,
    estimator: MetricsEstimator,
    engine_factory: F,
}

impl<F, E> EvaluationHarness<F>
where
    F: Fn(u32, &EvaluationConfig) -> E,
    E: SimulationEngine,
{
    /// Validate the configuration and resolve policy names up front
    pub fn new(
        config: EvaluationConfig,
        carbon: CarbonIntensityClient,
        engine_factory: F,
    ) -> Result<Self> {
        config.validate()?;
        let policies = config.policy_kinds()?;
        let estimator = MetricsEstimator::new(config.power, carbon.clone());

        Ok(Self {
            config,
            policies,
            carbon,
            estimator,
            engine_factory,
        })
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    pub fn policies(&self) -> &[PolicyKind] {
        &self.policies
    }

    /// Run every repetition of every policy, sequentially
    pub async fn run(&self) -> Result<EvaluationReport> {
        info!(
            "Evaluating {} policies over {} runs ({} hosts, {} VMs, {} cloudlets)",
            self.policies.len(),
            self.config.runs,
            self.config.host_count,
            self.config.vm_count,
            self.config.workload_count
        );

        let mut records = Vec::with_capacity(self.config.runs as usize * self.policies.len());
        for run_id in 1..=self.config.runs {
            for kind in &self.policies {
                records.push(self.run_single(run_id, *kind).await?);
            }
        }

        Ok(EvaluationReport::new(
            ReportContext::from_config(&self.config),
            records,
        ))
    }

    /// One experiment: fresh engine, fresh region map, one policy
    pub async fn run_single(&self, run_id: u32, kind: PolicyKind) -> Result<RunRecord> {
        let mut engine = (self.engine_factory)(run_id, &self.config);
        let regions = Arc::new(HostRegionMap::round_robin(
            engine.hosts(),
            &self.config.zones,
            &self.config.carbon.default_region,
        ));

        let policy = PlacementPolicy::build(
            kind,
            self.config.power,
            self.config.weights,
            &self.carbon,
            regions.clone(),
        );
        engine.run_to_completion(&policy).await?;

        let outcomes = engine.workload_outcomes();
        let summary = CompletionSummary::from_outcomes(&outcomes);
        let estimate = self
            .estimator
            .estimate(engine.hosts(), &regions, &outcomes, summary.makespan)
            .await;

        info!(
            "Run {} | {} | finished cloudlets: {}",
            run_id, kind, summary.finished
        );

        Ok(RunRecord {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            run_id,
            policy: kind.name().to_string(),
            total_workloads: engine.total_workloads(),
            finished_workloads: summary.finished,
            completion_rate: summary.completion_rate,
            avg_cpu_time: summary.avg_cpu_time,
            makespan: summary.makespan,
            energy_kwh: estimate.energy_kwh,
            carbon_kg: estimate.carbon_kg,
        })
    }
}
