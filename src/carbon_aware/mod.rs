//! Carbon intensity data for carbon-aware placement
//!
//! Resolves grid zones to current carbon intensity through a live provider,
//! a per-region TTL cache and a static fallback table.

pub mod api;
pub mod client;
pub mod types;

pub use api::{ElectricityMapSource, IntensitySource};
pub use client::{CarbonIntensityClient, Clock, SystemClock};
pub use types::{CarbonClientConfig, CarbonSample, SampleSource};
