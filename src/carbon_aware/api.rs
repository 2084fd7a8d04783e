//! Carbon intensity API integration

use crate::carbon_aware::types::CarbonClientConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// A provider of live carbon intensity values for a single zone
#[async_trait]
pub trait IntensitySource: Send + Sync {
    /// Fetch the current intensity (gCO2/kWh) for an already-normalized zone
    async fn fetch(&self, region: &str) -> Result<f64>;
}

/// ElectricityMap-style HTTP source
#[derive(Clone)]
pub struct ElectricityMapSource {
    client: Client,
    config: CarbonClientConfig,
}

impl ElectricityMapSource {
    /// Build a source with bounded connect/response timeouts
    pub fn new(config: &CarbonClientConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(concat!("carbon-placement/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::HttpError)?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl IntensitySource for ElectricityMapSource {
    async fn fetch(&self, region: &str) -> Result<f64> {
        let url = self.config.endpoint_for(region);
        let token = self.config.api_key.as_deref().unwrap_or_default();
        debug!("Fetching carbon intensity from {}", url);

        let response = self
            .client
            .get(&url)
            .header("auth-token", token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::NetworkError(format!(
                "ElectricityMap API error: {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        parse_carbon_intensity(&body)
    }
}

/// Extract the top-level `carbonIntensity` number from a provider response
pub fn parse_carbon_intensity(body: &str) -> Result<f64> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| Error::ParseError(format!("invalid JSON body: {e}")))?;

    let intensity = json
        .get("carbonIntensity")
        .and_then(|ci| ci.as_f64())
        .ok_or_else(|| Error::ParseError("missing numeric carbonIntensity".to_string()))?;

    if !intensity.is_finite() || intensity < 0.0 {
        return Err(Error::ParseError(format!(
            "carbonIntensity out of range: {intensity}"
        )));
    }

    Ok(intensity)
}
