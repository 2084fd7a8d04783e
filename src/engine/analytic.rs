//! Closed-form experiment engine
//!
//! VMs are placed one at a time through the placement policy. Workloads are
//! bound round-robin to VMs and share their VM's MIPS under processor
//! sharing, so finish times follow directly from the workload lengths
//! without stepping simulated time.

use crate::config::EvaluationConfig;
use crate::engine::{Host, HostId, ResourceDemand, SimulationEngine, WorkloadOutcome};
use crate::error::Result;
use crate::scheduler::PlacementPolicy;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Workload (cloudlet) shape
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkloadSpec {
    /// Length in million instructions
    pub length_mi: f64,
    pub pes: u32,
    /// Relative length spread; each workload's length is drawn uniformly
    /// from `length_mi * (1 ± length_jitter)`
    pub length_jitter: f64,
}

impl Default for WorkloadSpec {
    fn default() -> Self {
        Self {
            length_mi: 10_000.0,
            pes: 1,
            length_jitter: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
struct VirtualMachine {
    demand: ResourceDemand,
    host: Option<HostId>,
}

#[derive(Clone, Debug)]
struct Workload {
    id: u32,
    vm: Option<usize>,
    length_mi: f64,
    pes: u32,
}

/// Built-in engine used by the `carbon-eval` binary
#[derive(Clone, Debug)]
pub struct AnalyticEngine {
    hosts: Vec<Host>,
    vms: Vec<VirtualMachine>,
    workloads: Vec<Workload>,
    outcomes: Vec<WorkloadOutcome>,
}

impl AnalyticEngine {
    /// Build a fresh experiment; `run_id` seeds workload length jitter
    pub fn new(run_id: u32, config: &EvaluationConfig) -> Self {
        let hosts = (0..config.host_count)
            .map(|i| Host::new(HostId(i as u32), config.host))
            .collect();

        let vms: Vec<VirtualMachine> = (0..config.vm_count)
            .map(|_| VirtualMachine {
                demand: config.vm,
                host: None,
            })
            .collect();

        let jitter = config.workload.length_jitter.clamp(0.0, 0.99);
        let mut rng = StdRng::seed_from_u64(u64::from(run_id));
        let workloads = (0..config.workload_count)
            .map(|i| {
                let length_mi = if jitter > 0.0 {
                    config.workload.length_mi * (1.0 + rng.gen_range(-jitter..=jitter))
                } else {
                    config.workload.length_mi
                };
                Workload {
                    id: i as u32,
                    vm: (!vms.is_empty()).then(|| i % vms.len()),
                    length_mi,
                    pes: config.workload.pes.max(1),
                }
            })
            .collect();

        Self {
            hosts,
            vms,
            workloads,
            outcomes: Vec::new(),
        }
    }

    /// Host each VM landed on, in VM order
    pub fn vm_placements(&self) -> Vec<Option<HostId>> {
        self.vms.iter().map(|vm| vm.host).collect()
    }

    fn execute(&self) -> Vec<WorkloadOutcome> {
        let mut outcomes: Vec<WorkloadOutcome> = self
            .workloads
            .iter()
            .map(|w| WorkloadOutcome {
                workload_id: w.id,
                host_id: None,
                finished: false,
                actual_cpu_time: 0.0,
                finish_time: 0.0,
            })
            .collect();

        let mut members: Vec<Vec<usize>> = vec![Vec::new(); self.vms.len()];
        for (idx, workload) in self.workloads.iter().enumerate() {
            if let Some(vm) = workload.vm {
                members[vm].push(idx);
            }
        }

        for (vm, mut indices) in self.vms.iter().zip(members) {
            let Some(host_id) = vm.host else {
                continue;
            };

            indices.sort_by(|a, b| {
                self.workloads[*a]
                    .length_mi
                    .total_cmp(&self.workloads[*b].length_mi)
            });

            let vm_mips = vm.demand.total_mips();
            let mut active = indices.len();
            let mut clock = 0.0;
            let mut progress = 0.0;

            for idx in indices {
                let workload = &self.workloads[idx];
                let rate = (workload.pes as f64 * vm.demand.mips_per_pe)
                    .min(vm_mips / active as f64);
                if rate <= 0.0 {
                    break;
                }

                clock += (workload.length_mi - progress).max(0.0) / rate;
                progress = workload.length_mi.max(progress);
                active -= 1;

                outcomes[idx] = WorkloadOutcome {
                    workload_id: workload.id,
                    host_id: Some(host_id),
                    finished: true,
                    actual_cpu_time: clock,
                    finish_time: clock,
                };
            }
        }

        outcomes
    }
}

#[async_trait]
impl SimulationEngine for AnalyticEngine {
    fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    fn total_workloads(&self) -> usize {
        self.workloads.len()
    }

    async fn run_to_completion(&mut self, policy: &PlacementPolicy) -> Result<()> {
        for vm_index in 0..self.vms.len() {
            let demand = self.vms[vm_index].demand;
            let chosen = policy
                .select_host(&self.hosts, |host| host.can_host(&demand))
                .await
                .map(|host| host.id);

            match chosen {
                Some(host_id) => {
                    if let Some(host) = self.hosts.iter_mut().find(|h| h.id == host_id) {
                        host.allocate(&demand);
                    }
                    self.vms[vm_index].host = Some(host_id);
                }
                None => debug!("No suitable host for VM {}, leaving it pending", vm_index),
            }
        }

        self.outcomes = self.execute();
        Ok(())
    }

    fn workload_outcomes(&self) -> Vec<WorkloadOutcome> {
        self.outcomes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(hosts: usize, vms: usize, workloads: usize) -> EvaluationConfig {
        EvaluationConfig {
            host_count: hosts,
            vm_count: vms,
            workload_count: workloads,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_fit_packs_first_host() {
        let mut engine = AnalyticEngine::new(1, &small_config(2, 3, 6));
        engine
            .run_to_completion(&PlacementPolicy::FirstFit)
            .await
            .unwrap();

        assert_eq!(engine.vm_placements(), vec![Some(HostId(0)); 3]);
        assert_eq!(engine.hosts()[0].used_pes, 3);
        assert_eq!(engine.hosts()[1].used_pes, 0);

        // two 10000 MI workloads share each 1000 MIPS VM
        let outcomes = engine.workload_outcomes();
        assert_eq!(outcomes.len(), 6);
        for outcome in outcomes {
            assert!(outcome.finished);
            assert_eq!(outcome.host_id, Some(HostId(0)));
            assert!((outcome.finish_time - 20.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_first_fit_overflows_to_next_host() {
        let mut engine = AnalyticEngine::new(1, &small_config(2, 5, 5));
        engine
            .run_to_completion(&PlacementPolicy::FirstFit)
            .await
            .unwrap();

        let placements = engine.vm_placements();
        assert_eq!(placements[3], Some(HostId(0)));
        assert_eq!(placements[4], Some(HostId(1)));
    }

    #[tokio::test]
    async fn test_unplaced_vms_leave_workloads_unfinished() {
        let mut engine = AnalyticEngine::new(1, &small_config(1, 6, 6));
        engine
            .run_to_completion(&PlacementPolicy::FirstFit)
            .await
            .unwrap();

        let outcomes = engine.workload_outcomes();
        assert_eq!(outcomes.iter().filter(|o| o.finished).count(), 4);
        assert!(outcomes[4].host_id.is_none());
        assert!(!outcomes[5].finished);
    }

    #[tokio::test]
    async fn test_no_hosts_finishes_nothing() {
        let mut engine = AnalyticEngine::new(1, &small_config(0, 2, 4));
        engine
            .run_to_completion(&PlacementPolicy::FirstFit)
            .await
            .unwrap();

        assert_eq!(engine.total_workloads(), 4);
        assert!(engine.workload_outcomes().iter().all(|o| !o.finished));
    }

    #[tokio::test]
    async fn test_processor_sharing_with_unequal_lengths() {
        let mut config = small_config(1, 1, 2);
        config.workload.length_jitter = 0.5;
        let mut engine = AnalyticEngine::new(7, &config);
        let lengths: Vec<f64> = engine.workloads.iter().map(|w| w.length_mi).collect();
        engine
            .run_to_completion(&PlacementPolicy::FirstFit)
            .await
            .unwrap();

        let short = lengths[0].min(lengths[1]);
        let long = lengths[0].max(lengths[1]);
        let mut finish: Vec<f64> = engine
            .workload_outcomes()
            .iter()
            .map(|o| o.finish_time)
            .collect();
        finish.sort_by(|a, b| a.total_cmp(b));

        // both share 1000 MIPS until the short one ends, then the long one runs alone
        assert!((finish[0] - short * 2.0 / 1000.0).abs() < 1e-9);
        assert!((finish[1] - (finish[0] + (long - short) / 1000.0)).abs() < 1e-9);
    }

    #[test]
    fn test_jitter_is_reproducible_per_run() {
        let mut config = small_config(1, 1, 8);
        config.workload.length_jitter = 0.2;

        let a: Vec<f64> = AnalyticEngine::new(3, &config)
            .workloads
            .iter()
            .map(|w| w.length_mi)
            .collect();
        let b: Vec<f64> = AnalyticEngine::new(3, &config)
            .workloads
            .iter()
            .map(|w| w.length_mi)
            .collect();

        assert_eq!(a, b);
        assert!(a.iter().all(|l| (8_000.0..=12_000.0).contains(l)));
    }
}
