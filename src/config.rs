//! Evaluation configuration
//!
//! Built in layers: defaults, then an optional TOML file, then environment
//! style overrides. Numeric overrides that are blank, unparsable or not
//! positive are ignored and the previous layer's value is kept.

use crate::carbon_aware::types::{CarbonClientConfig, DEFAULT_REGION};
use crate::engine::analytic::WorkloadSpec;
use crate::engine::{HostSpec, ResourceDemand};
use crate::error::{Error, Result};
use crate::scheduler::{CarbonWeights, PolicyKind, PowerModel};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

pub const ENV_RUNS: &str = "EVAL_RUNS";
pub const ENV_HOST_COUNT: &str = "HOST_COUNT";
pub const ENV_VM_COUNT: &str = "VM_COUNT";
pub const ENV_WORKLOAD_COUNT: &str = "CLOUDLET_COUNT";
pub const ENV_ZONES: &str = "CARBON_ZONES";
pub const ENV_API_KEY: &str = "CARBON_API_KEY";
pub const ENV_API_URL_TEMPLATE: &str = "CARBON_API_URL_TEMPLATE";
pub const ENV_RESULTS_DIR: &str = "RESULTS_DIR";
pub const ENV_LENGTH_JITTER: &str = "WORKLOAD_LENGTH_JITTER";

/// Reference US grid zones assigned to hosts round-robin
pub fn default_zones() -> Vec<String> {
    ["US-CAL-CISO", "US-MIDA-PJM", "US-TEX-ERCO", "US-NY-NYIS"]
        .iter()
        .map(|z| z.to_string())
        .collect()
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Repetitions per policy
    pub runs: u32,
    pub host_count: usize,
    pub vm_count: usize,
    pub workload_count: usize,
    /// Grid zones; host i gets `zones[i % zones.len()]`
    pub zones: Vec<String>,
    /// Policy names in evaluation order
    pub policies: Vec<String>,
    pub results_dir: PathBuf,
    pub carbon: CarbonClientConfig,
    pub power: PowerModel,
    pub weights: CarbonWeights,
    pub host: HostSpec,
    pub vm: ResourceDemand,
    pub workload: WorkloadSpec,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            runs: 5,
            host_count: 50,
            vm_count: 100,
            workload_count: 100,
            zones: default_zones(),
            policies: PolicyKind::ALL.iter().map(|p| p.name().to_string()).collect(),
            results_dir: PathBuf::from("results"),
            carbon: CarbonClientConfig::default(),
            power: PowerModel::default(),
            weights: CarbonWeights::default(),
            host: HostSpec::default(),
            vm: ResourceDemand::default(),
            workload: WorkloadSpec::default(),
        }
    }
}

impl EvaluationConfig {
    /// Defaults, or the given TOML file layered over them
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
                Self::from_toml(&raw)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply environment-style overrides from any key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(runs) = parse_positive(lookup(ENV_RUNS).as_deref()) {
            self.runs = runs;
        }
        if let Some(hosts) = parse_positive(lookup(ENV_HOST_COUNT).as_deref()) {
            self.host_count = hosts;
        }
        if let Some(vms) = parse_positive(lookup(ENV_VM_COUNT).as_deref()) {
            self.vm_count = vms;
        }
        if let Some(workloads) = parse_positive(lookup(ENV_WORKLOAD_COUNT).as_deref()) {
            self.workload_count = workloads;
        }
        if let Some(zones) = parse_zones(lookup(ENV_ZONES).as_deref()) {
            self.zones = zones;
        }
        if let Some(key) = non_blank(lookup(ENV_API_KEY)) {
            self.carbon.api_key = Some(key);
        }
        if let Some(template) = non_blank(lookup(ENV_API_URL_TEMPLATE)) {
            self.carbon.endpoint_template = template;
        }
        if let Some(dir) = non_blank(lookup(ENV_RESULTS_DIR)) {
            self.results_dir = PathBuf::from(dir);
        }
        if let Some(jitter) = lookup(ENV_LENGTH_JITTER)
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|j| (0.0..1.0).contains(j))
        {
            self.workload.length_jitter = jitter;
        }
    }

    /// Policy names resolved to policy kinds, failing on the first unknown one
    pub fn policy_kinds(&self) -> Result<Vec<PolicyKind>> {
        self.policies.iter().map(|name| name.parse()).collect()
    }

    /// Reject configurations the harness cannot run
    pub fn validate(&self) -> Result<()> {
        if self.zones.iter().all(|z| z.trim().is_empty()) {
            return Err(Error::ConfigError("zone list is empty".to_string()));
        }
        if !self.carbon.endpoint_template.contains("%s") {
            return Err(Error::ConfigError(format!(
                "endpoint template has no %s placeholder: {}",
                self.carbon.endpoint_template
            )));
        }
        self.carbon.validate()?;
        let kinds = self.policy_kinds()?;
        if kinds.is_empty() {
            return Err(Error::ConfigError("no policies configured".to_string()));
        }

        let weight_sum = self.weights.sum();
        if (weight_sum - 1.0).abs() > 1e-6 {
            warn!(
                "Carbon-aware weights sum to {:.3}, scores will not stay within [0, 1]",
                weight_sum
            );
        }
        Ok(())
    }
}

/// Strictly positive number, or `None` for blank/unparsable/non-positive input
pub fn parse_positive<T>(raw: Option<&str>) -> Option<T>
where
    T: FromStr + PartialOrd + Default,
{
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<T>().ok())
        .filter(|v| *v > T::default())
}

/// Comma-separated zones; `None` when unset or blank
///
/// A list made only of separators collapses to the default zone.
pub fn parse_zones(raw: Option<&str>) -> Option<Vec<String>> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    let zones: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|z| !z.is_empty())
        .map(str::to_string)
        .collect();

    if zones.is_empty() {
        Some(vec![DEFAULT_REGION.to_string()])
    } else {
        Some(zones)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
