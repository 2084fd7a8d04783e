//! Placement policies and host selection

use crate::carbon_aware::CarbonIntensityClient;
use crate::engine::{Host, HostRegionMap};
use crate::error::Error;
use futures::future::join_all;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use super::scoring::{self, CarbonWeights, PowerModel};

/// Placement policies known to the evaluator, in evaluation order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolicyKind {
    FirstFit,
    EnergyAware,
    CarbonAware,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 3] = [
        PolicyKind::FirstFit,
        PolicyKind::EnergyAware,
        PolicyKind::CarbonAware,
    ];

    /// Name used in result artifacts
    pub fn name(&self) -> &'static str {
        match self {
            PolicyKind::FirstFit => "FIRST_FIT",
            PolicyKind::EnergyAware => "ENERGY_AWARE",
            PolicyKind::CarbonAware => "CIAVMP",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PolicyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        match normalized.as_str() {
            "FIRST_FIT" | "FIRSTFIT" => Ok(PolicyKind::FirstFit),
            "ENERGY_AWARE" | "ENERGY" => Ok(PolicyKind::EnergyAware),
            "CIAVMP" | "CARBON_AWARE" | "CARBON" => Ok(PolicyKind::CarbonAware),
            _ => Err(Error::UnsupportedPolicy(s.to_string())),
        }
    }
}

/// A configured placement policy
///
/// Each variant scores a suitable host; the host with the lowest score wins
/// and ties go to the host that comes first in engine order.
#[derive(Clone)]
pub enum PlacementPolicy {
    /// First suitable host in engine order
    FirstFit,
    /// Host with the lowest current power draw
    EnergyAware { power: PowerModel },
    /// Weighted utilization, power and regional carbon intensity
    CarbonAware {
        power: PowerModel,
        weights: CarbonWeights,
        carbon: CarbonIntensityClient,
        regions: Arc<HostRegionMap>,
    },
}

impl PlacementPolicy {
    pub fn build(
        kind: PolicyKind,
        power: PowerModel,
        weights: CarbonWeights,
        carbon: &CarbonIntensityClient,
        regions: Arc<HostRegionMap>,
    ) -> Self {
        match kind {
            PolicyKind::FirstFit => PlacementPolicy::FirstFit,
            PolicyKind::EnergyAware => PlacementPolicy::EnergyAware { power },
            PolicyKind::CarbonAware => PlacementPolicy::CarbonAware {
                power,
                weights,
                carbon: carbon.clone(),
                regions,
            },
        }
    }

    pub fn kind(&self) -> PolicyKind {
        match self {
            PlacementPolicy::FirstFit => PolicyKind::FirstFit,
            PlacementPolicy::EnergyAware { .. } => PolicyKind::EnergyAware,
            PlacementPolicy::CarbonAware { .. } => PolicyKind::CarbonAware,
        }
    }

    /// Score of `host`, which sits at `position` among the suitable candidates
    pub async fn score(&self, position: usize, host: &Host) -> f64 {
        match self {
            PlacementPolicy::FirstFit => scoring::first_fit_score(position),
            PlacementPolicy::EnergyAware { power } => scoring::energy_score(power, host),
            PlacementPolicy::CarbonAware {
                power,
                weights,
                carbon,
                regions,
            } => {
                let intensity = carbon.get_intensity(regions.region_of(host.id)).await;
                scoring::carbon_score(power, weights, host.utilization(), intensity)
            }
        }
    }

    /// Pick the lowest-scoring host accepted by `is_suitable`
    ///
    /// Returns `None` when no host is suitable; the engine then leaves the
    /// workload pending.
    pub async fn select_host<'a, F>(&self, hosts: &'a [Host], is_suitable: F) -> Option<&'a Host>
    where
        F: Fn(&Host) -> bool,
    {
        let candidates: Vec<&'a Host> = hosts.iter().filter(|&host| is_suitable(host)).collect();
        if candidates.is_empty() {
            return None;
        }

        // Scores for all candidates are resolved concurrently
        let scores = join_all(
            candidates
                .iter()
                .enumerate()
                .map(|(position, host)| self.score(position, host)),
        )
        .await;

        let mut best: Option<(f64, &'a Host)> = None;
        for (score, host) in scores.into_iter().zip(candidates) {
            debug!("{} score for {}: {:.6}", self.kind(), host.id, score);
            if best.map_or(true, |(best_score, _)| score < best_score) {
                best = Some((score, host));
            }
        }

        best.map(|(_, host)| host)
    }
}
