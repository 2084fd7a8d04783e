//! Types for carbon-aware placement

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Grid zone used when a host has no region or an empty one
pub const DEFAULT_REGION: &str = "US-CAL-CISO";

/// ElectricityMap "latest" endpoint; `%s` is replaced by the URL-encoded zone
pub const DEFAULT_ENDPOINT_TEMPLATE: &str =
    "https://api.electricitymap.org/v3/carbon-intensity/latest?zone=%s";

/// Intensity reported for zones missing from the fallback table (gCO2/kWh)
pub const DEFAULT_FALLBACK_INTENSITY: f64 = 500.0;

/// Longest accepted cache TTL (one day)
pub const MAX_CACHE_TTL_SECS: u64 = 86_400;

/// Longest accepted per-request timeout
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Where a cached intensity value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum SampleSource {
    /// Parsed from a live provider response
    Live,
    /// Taken from the static fallback table
    Fallback,
}

impl std::fmt::Display for SampleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleSource::Live => write!(f, "live"),
            SampleSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// Cached carbon intensity for a single region
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CarbonSample {
    /// Region identifier (e.g., "US-CAL-CISO")
    pub region: String,
    /// Carbon intensity in gCO2/kWh, never negative
    pub carbon_intensity: f64,
    /// When the value was obtained
    pub fetched_at: DateTime<Utc>,
    /// When the value stops being served from cache
    pub expires_at: DateTime<Utc>,
    /// Live or fallback
    pub source: SampleSource,
}

impl CarbonSample {
    /// A sample is served from cache strictly before its expiry instant
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Carbon intensity client configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CarbonClientConfig {
    /// ElectricityMap auth token; `None` means fallback-only mode
    pub api_key: Option<String>,
    /// Endpoint template with a single `%s` placeholder for the zone
    pub endpoint_template: String,
    /// How long a sample stays in cache
    pub cache_ttl_secs: u64,
    /// Connect and response timeout for a single fetch
    pub request_timeout_secs: u64,
    /// Zone used for blank region identifiers
    pub default_region: String,
    /// Intensity for zones absent from `fallback_regions`
    pub fallback_intensity: f64,
    /// Static per-zone intensities used when no live value is available
    pub fallback_regions: BTreeMap<String, f64>,
}

impl Default for CarbonClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint_template: DEFAULT_ENDPOINT_TEMPLATE.to_string(),
            cache_ttl_secs: 60,
            request_timeout_secs: 10,
            default_region: DEFAULT_REGION.to_string(),
            fallback_intensity: DEFAULT_FALLBACK_INTENSITY,
            fallback_regions: BTreeMap::from([
                ("US-CAL-CISO".to_string(), 340.0),
                ("US-MIDA-PJM".to_string(), 430.0),
                ("US-TEX-ERCO".to_string(), 510.0),
                ("US-NY-NYIS".to_string(), 210.0),
            ]),
        }
    }
}

impl CarbonClientConfig {
    /// Whether a non-blank API key is configured
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }

    /// Static intensity for a zone, or the global fallback
    pub fn fallback_for(&self, region: &str) -> f64 {
        self.fallback_regions
            .get(region)
            .copied()
            .unwrap_or(self.fallback_intensity)
    }

    /// When a sample fetched at `fetched_at` stops being fresh
    ///
    /// A TTL too large to represent never expires.
    pub fn expiry_after(&self, fetched_at: DateTime<Utc>) -> DateTime<Utc> {
        i64::try_from(self.cache_ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| fetched_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Reject timing bounds and fallback intensities the client cannot use
    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(Error::ConfigError(format!(
                "cache_ttl_secs {} exceeds {}",
                self.cache_ttl_secs, MAX_CACHE_TTL_SECS
            )));
        }
        if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&self.request_timeout_secs) {
            return Err(Error::ConfigError(format!(
                "request_timeout_secs must be within 1..={}, got {}",
                MAX_REQUEST_TIMEOUT_SECS, self.request_timeout_secs
            )));
        }
        if !valid_intensity(self.fallback_intensity) {
            return Err(Error::ConfigError(format!(
                "fallback_intensity must be a non-negative number, got {}",
                self.fallback_intensity
            )));
        }
        if let Some((zone, value)) = self
            .fallback_regions
            .iter()
            .find(|(_, value)| !valid_intensity(**value))
        {
            return Err(Error::ConfigError(format!(
                "fallback intensity for {} must be a non-negative number, got {}",
                zone, value
            )));
        }
        Ok(())
    }

    /// Trimmed region, or the default zone when blank
    pub fn normalize_region(&self, region: &str) -> String {
        let trimmed = region.trim();
        if trimmed.is_empty() {
            self.default_region.clone()
        } else {
            trimmed.to_string()
        }
    }

    /// Expand the endpoint template for one zone
    pub fn endpoint_for(&self, region: &str) -> String {
        self.endpoint_template
            .replacen("%s", &urlencoding::encode(region), 1)
    }
}

fn valid_intensity(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}
