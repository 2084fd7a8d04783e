//! Post-run energy and carbon estimation

use crate::carbon_aware::CarbonIntensityClient;
use crate::engine::{Host, HostRegionMap, WorkloadOutcome};
use crate::scheduler::PowerModel;
use std::collections::HashMap;
use tracing::debug;

const JOULES_PER_KWH: f64 = 3_600_000.0;
const GRAMS_PER_KG: f64 = 1000.0;

/// Energy and carbon totals for one run
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EnergyEstimate {
    pub energy_kwh: f64,
    pub carbon_kg: f64,
}

/// Estimates host energy and emissions from finished workload compute time
#[derive(Clone)]
pub struct MetricsEstimator {
    power: PowerModel,
    carbon: CarbonIntensityClient,
}

impl MetricsEstimator {
    pub fn new(power: PowerModel, carbon: CarbonIntensityClient) -> Self {
        Self { power, carbon }
    }

    /// Sum per-host energy and carbon over a run lasting `makespan` seconds
    ///
    /// Hosts that executed nothing contribute nothing. A non-positive
    /// makespan or an empty host list yields zero totals.
    pub async fn estimate(
        &self,
        hosts: &[Host],
        regions: &HostRegionMap,
        outcomes: &[WorkloadOutcome],
        makespan: f64,
    ) -> EnergyEstimate {
        if hosts.is_empty() || makespan <= 0.0 {
            return EnergyEstimate::default();
        }

        let mut cpu_time_by_host = HashMap::new();
        for outcome in outcomes.iter().filter(|o| o.finished) {
            if let Some(host_id) = outcome.host_id {
                *cpu_time_by_host.entry(host_id).or_insert(0.0) += outcome.actual_cpu_time;
            }
        }

        let mut total = EnergyEstimate::default();
        for host in hosts {
            let cpu_time = cpu_time_by_host.get(&host.id).copied().unwrap_or(0.0);
            if cpu_time <= 0.0 {
                continue;
            }

            let pes = host.spec.pes.max(1) as f64;
            let utilization = (cpu_time / (makespan * pes)).min(1.0);
            let avg_power_watts = self.power.power_at(utilization);
            let energy_kwh = avg_power_watts * makespan / JOULES_PER_KWH;

            let region = regions.region_of(host.id);
            let intensity = self.carbon.get_intensity(region).await;
            let carbon_kg = energy_kwh * intensity / GRAMS_PER_KG;

            debug!(
                "{} in {}: utilization {:.3}, {:.6} kWh, {:.6} kg CO2",
                host.id, region, utilization, energy_kwh, carbon_kg
            );

            total.energy_kwh += energy_kwh;
            total.carbon_kg += carbon_kg;
        }

        total
    }
}
