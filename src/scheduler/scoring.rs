//! Host scoring models
//!
//! Every score here is "lower is better".

use crate::engine::Host;
use serde::{Deserialize, Serialize};

/// Linear host power model
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PowerModel {
    /// Draw at zero utilization (W)
    pub idle_watts: f64,
    /// Draw at full utilization (W)
    pub peak_watts: f64,
}

impl Default for PowerModel {
    fn default() -> Self {
        Self {
            idle_watts: 175.0,
            peak_watts: 250.0,
        }
    }
}

impl PowerModel {
    /// Interpolated power draw for a utilization fraction
    pub fn power_at(&self, utilization: f64) -> f64 {
        self.idle_watts + (self.peak_watts - self.idle_watts) * utilization
    }
}

/// Weights of the carbon-aware score
///
/// `utilization + power + carbon` is expected to be 1.0 so that scores stay
/// roughly within [0, 1] and remain comparable across configurations. This
/// is not enforced; `EvaluationConfig::validate` only warns.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CarbonWeights {
    /// α, weight of CPU utilization
    pub utilization: f64,
    /// β, weight of power relative to peak
    pub power: f64,
    /// γ, weight of normalized carbon intensity
    pub carbon: f64,
    /// Reference intensity ceiling (gCO2/kWh) used to normalize the carbon term
    pub carbon_normalizer: f64,
}

impl Default for CarbonWeights {
    fn default() -> Self {
        Self {
            utilization: 0.4,
            power: 0.3,
            carbon: 0.3,
            carbon_normalizer: 700.0,
        }
    }
}

impl CarbonWeights {
    pub fn sum(&self) -> f64 {
        self.utilization + self.power + self.carbon
    }
}

/// First-fit: the host's position among the suitable candidates
pub fn first_fit_score(position: usize) -> f64 {
    position as f64
}

/// Energy-aware: current power draw of the host
pub fn energy_score(power: &PowerModel, host: &Host) -> f64 {
    power.power_at(host.utilization())
}

/// Carbon-aware weighted score for a utilization and regional intensity
pub fn carbon_score(
    power: &PowerModel,
    weights: &CarbonWeights,
    utilization: f64,
    carbon_intensity: f64,
) -> f64 {
    let power_ratio = if power.peak_watts > 0.0 {
        power.power_at(utilization) / power.peak_watts
    } else {
        0.0
    };
    let carbon_ratio = if weights.carbon_normalizer > 0.0 {
        carbon_intensity / weights.carbon_normalizer
    } else {
        0.0
    };

    weights.utilization * utilization
        + weights.power * power_ratio
        + weights.carbon * carbon_ratio
}
