//! Simulation engine boundary
//!
//! The evaluation core only needs a handful of things from whatever engine
//! executes the experiment: the host list with current allocation, a way to
//! run placement to completion under a policy, and the per-workload outcome
//! afterwards. `AnalyticEngine` is the built-in implementation.

pub mod analytic;

use crate::error::Result;
use crate::scheduler::PlacementPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub use analytic::AnalyticEngine;

/// Stable host identifier assigned at host creation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct HostId(pub u32);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host-{}", self.0)
    }
}

/// Physical host shape
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HostSpec {
    pub pes: u32,
    pub mips_per_pe: f64,
    pub ram_mb: u64,
    pub bandwidth: u64,
    pub storage: u64,
}

impl Default for HostSpec {
    fn default() -> Self {
        Self {
            pes: 4,
            mips_per_pe: 1000.0,
            ram_mb: 16_000,
            bandwidth: 10_000,
            storage: 1_000_000,
        }
    }
}

/// Resources a virtual machine asks of its host
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResourceDemand {
    pub pes: u32,
    pub mips_per_pe: f64,
    pub ram_mb: u64,
    pub bandwidth: u64,
    pub storage: u64,
}

impl Default for ResourceDemand {
    fn default() -> Self {
        Self {
            pes: 1,
            mips_per_pe: 1000.0,
            ram_mb: 1024,
            bandwidth: 1000,
            storage: 10_000,
        }
    }
}

impl ResourceDemand {
    pub fn total_mips(&self) -> f64 {
        self.pes as f64 * self.mips_per_pe
    }
}

/// Host state as seen by placement policies
#[derive(Clone, Debug, PartialEq)]
pub struct Host {
    pub id: HostId,
    pub spec: HostSpec,
    pub used_pes: u32,
    pub used_mips: f64,
    pub used_ram_mb: u64,
    pub used_bandwidth: u64,
    pub used_storage: u64,
}

impl Host {
    pub fn new(id: HostId, spec: HostSpec) -> Self {
        Self {
            id,
            spec,
            used_pes: 0,
            used_mips: 0.0,
            used_ram_mb: 0,
            used_bandwidth: 0,
            used_storage: 0,
        }
    }

    pub fn total_mips(&self) -> f64 {
        self.spec.pes as f64 * self.spec.mips_per_pe
    }

    /// Used over total MIPS; zero when the host has no capacity
    pub fn utilization(&self) -> f64 {
        let total = self.total_mips();
        if total > 0.0 {
            self.used_mips / total
        } else {
            0.0
        }
    }

    /// Whether the remaining capacity can hold `demand`
    pub fn can_host(&self, demand: &ResourceDemand) -> bool {
        self.spec.pes.saturating_sub(self.used_pes) >= demand.pes
            && demand.mips_per_pe <= self.spec.mips_per_pe
            && self.spec.ram_mb.saturating_sub(self.used_ram_mb) >= demand.ram_mb
            && self.spec.bandwidth.saturating_sub(self.used_bandwidth) >= demand.bandwidth
            && self.spec.storage.saturating_sub(self.used_storage) >= demand.storage
    }

    pub fn allocate(&mut self, demand: &ResourceDemand) {
        self.used_pes += demand.pes;
        self.used_mips += demand.total_mips();
        self.used_ram_mb += demand.ram_mb;
        self.used_bandwidth += demand.bandwidth;
        self.used_storage += demand.storage;
    }
}

/// Post-run state of one workload unit
#[derive(Clone, Debug, PartialEq)]
pub struct WorkloadOutcome {
    pub workload_id: u32,
    /// Host the workload executed on, if its VM was placed
    pub host_id: Option<HostId>,
    pub finished: bool,
    /// Compute time actually consumed (seconds)
    pub actual_cpu_time: f64,
    /// Simulation time at which the workload finished (seconds)
    pub finish_time: f64,
}

/// Explicit host → grid zone association
#[derive(Clone, Debug, Default)]
pub struct HostRegionMap {
    regions: HashMap<HostId, String>,
    default_region: String,
}

impl HostRegionMap {
    pub fn new(default_region: impl Into<String>) -> Self {
        Self {
            regions: HashMap::new(),
            default_region: default_region.into(),
        }
    }

    /// Assign `zones[i % zones.len()]` to the i-th host
    pub fn round_robin(hosts: &[Host], zones: &[String], default_region: &str) -> Self {
        let mut map = Self::new(default_region);
        if zones.is_empty() {
            return map;
        }
        for (i, host) in hosts.iter().enumerate() {
            map.assign(host.id, zones[i % zones.len()].clone());
        }
        map
    }

    pub fn assign(&mut self, host: HostId, region: impl Into<String>) {
        self.regions.insert(host, region.into());
    }

    /// Zone of a host, or the default zone for unmapped hosts
    pub fn region_of(&self, host: HostId) -> &str {
        self.regions
            .get(&host)
            .map(String::as_str)
            .unwrap_or(&self.default_region)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// What the evaluation harness needs from a simulation engine
#[async_trait]
pub trait SimulationEngine: Send {
    /// Hosts in engine order, reflecting current allocation
    fn hosts(&self) -> &[Host];

    /// Number of workload units submitted for the run
    fn total_workloads(&self) -> usize;

    /// Place every VM through `policy` and execute all workloads
    async fn run_to_completion(&mut self, policy: &PlacementPolicy) -> Result<()>;

    /// Outcome of every submitted workload, finished or not
    fn workload_outcomes(&self) -> Vec<WorkloadOutcome>;
}
