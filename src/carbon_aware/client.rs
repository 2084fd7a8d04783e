//! Cached, region-scoped carbon intensity lookups
//!
//! `CarbonIntensityClient::get_intensity` never fails: a missing API key,
//! a network error or an unusable response all resolve to the static
//! fallback table. Every resolved value is cached per region for the
//! configured TTL, so a caller may observe a value up to TTL seconds stale.

use crate::carbon_aware::api::{ElectricityMapSource, IntensitySource};
use crate::carbon_aware::types::{CarbonClientConfig, CarbonSample, SampleSource};
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Source of "now" for cache expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Carbon intensity client shared by placement scoring and metrics estimation
#[derive(Clone)]
pub struct CarbonIntensityClient {
    config: Arc<CarbonClientConfig>,
    source: Arc<dyn IntensitySource>,
    clock: Arc<dyn Clock>,
    cache: Arc<RwLock<HashMap<String, CarbonSample>>>,
}

impl CarbonIntensityClient {
    /// Create a client backed by the ElectricityMap HTTP source
    pub fn new(config: CarbonClientConfig) -> Result<Self> {
        let source = ElectricityMapSource::new(&config)?;
        Ok(Self::with_source(
            config,
            Arc::new(source),
            Arc::new(SystemClock),
        ))
    }

    /// Create a client with an explicit data source and clock
    pub fn with_source(
        config: CarbonClientConfig,
        source: Arc<dyn IntensitySource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            source,
            clock,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &CarbonClientConfig {
        &self.config
    }

    /// Current carbon intensity (gCO2/kWh) for a region
    pub async fn get_intensity(&self, region: &str) -> f64 {
        let region = self.config.normalize_region(region);
        let now = self.clock.now();

        {
            let cache = self.cache.read().await;
            if let Some(sample) = cache.get(&region) {
                if sample.is_fresh(now) {
                    debug!(
                        "Cache hit for region {}: {} gCO2/kWh",
                        region, sample.carbon_intensity
                    );
                    return sample.carbon_intensity;
                }
            }
        }

        let (intensity, source) = self.fetch_intensity(&region).await;

        let sample = CarbonSample {
            region: region.clone(),
            carbon_intensity: intensity,
            fetched_at: now,
            expires_at: self.config.expiry_after(now),
            source,
        };
        self.cache.write().await.insert(region, sample);

        intensity
    }

    /// Snapshot of every cached sample, ordered by region
    pub async fn cached_regions(&self) -> Vec<CarbonSample> {
        let cache = self.cache.read().await;
        let mut samples: Vec<CarbonSample> = cache.values().cloned().collect();
        samples.sort_by(|a, b| a.region.cmp(&b.region));
        samples
    }

    async fn fetch_intensity(&self, region: &str) -> (f64, SampleSource) {
        if !self.config.has_api_key() {
            return (self.config.fallback_for(region), SampleSource::Fallback);
        }

        match self.source.fetch(region).await {
            Ok(intensity) => {
                debug!("Fetched live intensity for {}: {}", region, intensity);
                (intensity, SampleSource::Live)
            }
            Err(e) => {
                let fallback = self.config.fallback_for(region);
                warn!(
                    "Carbon intensity fetch for {} failed ({}), using fallback {} gCO2/kWh",
                    region, e, fallback
                );
                (fallback, SampleSource::Fallback)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carbon_aware::types::{DEFAULT_FALLBACK_INTENSITY, DEFAULT_REGION};
    use crate::error::Error;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Utc::now())))
        }

        fn advance(&self, secs: i64) {
            let mut now = self.0.lock().unwrap();
            *now += Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    /// Returns 100, 200, 300... and counts calls
    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingSource {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IntensitySource for CountingSource {
        async fn fetch(&self, _region: &str) -> Result<f64> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(Error::NetworkError("connection refused".to_string()));
            }
            Ok(100.0 * n as f64)
        }
    }

    fn keyed_config() -> CarbonClientConfig {
        CarbonClientConfig {
            api_key: Some("token".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_no_api_key_uses_fallback_without_fetching() {
        let source = Arc::new(CountingSource::default());
        let client = CarbonIntensityClient::with_source(
            CarbonClientConfig::default(),
            source.clone(),
            ManualClock::new(),
        );

        assert_eq!(client.get_intensity("US-TEX-ERCO").await, 510.0);
        assert_eq!(
            client.get_intensity("ZZ-UNKNOWN").await,
            DEFAULT_FALLBACK_INTENSITY
        );
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_region_resolves_to_default() {
        let client = CarbonIntensityClient::with_source(
            CarbonClientConfig::default(),
            Arc::new(CountingSource::default()),
            ManualClock::new(),
        );

        assert_eq!(client.get_intensity("  ").await, 340.0);
        let cached = client.cached_regions().await;
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].region, DEFAULT_REGION);
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        let source = Arc::new(CountingSource::default());
        let clock = ManualClock::new();
        let client =
            CarbonIntensityClient::with_source(keyed_config(), source.clone(), clock.clone());

        let first = client.get_intensity("US-MIDA-PJM").await;
        clock.advance(59);
        let second = client.get_intensity("US-MIDA-PJM").await;

        assert_eq!(first, 100.0);
        assert_eq!(first, second);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_refetch_after_ttl_expiry() {
        let source = Arc::new(CountingSource::default());
        let clock = ManualClock::new();
        let client =
            CarbonIntensityClient::with_source(keyed_config(), source.clone(), clock.clone());

        assert_eq!(client.get_intensity("US-MIDA-PJM").await, 100.0);
        clock.advance(60);
        assert_eq!(client.get_intensity("US-MIDA-PJM").await, 200.0);
        assert_eq!(client.get_intensity("US-MIDA-PJM").await, 200.0);
        assert_eq!(source.calls(), 2);

        let cached = client.cached_regions().await;
        assert_eq!(cached[0].source, SampleSource::Live);
    }

    #[tokio::test]
    async fn test_regions_are_cached_independently() {
        let source = Arc::new(CountingSource::default());
        let client =
            CarbonIntensityClient::with_source(keyed_config(), source.clone(), ManualClock::new());

        client.get_intensity("US-MIDA-PJM").await;
        client.get_intensity("US-NY-NYIS").await;
        client.get_intensity("US-MIDA-PJM").await;

        assert_eq!(source.calls(), 2);
        assert_eq!(client.cached_regions().await.len(), 2);
    }

    #[tokio::test]
    async fn test_source_failure_falls_back_and_is_cached() {
        let source = Arc::new(CountingSource {
            fail: true,
            ..Default::default()
        });
        let client =
            CarbonIntensityClient::with_source(keyed_config(), source.clone(), ManualClock::new());

        assert_eq!(client.get_intensity("US-NY-NYIS").await, 210.0);
        assert_eq!(client.get_intensity("US-NY-NYIS").await, 210.0);
        assert_eq!(source.calls(), 1);

        let cached = client.cached_regions().await;
        assert_eq!(cached[0].source, SampleSource::Fallback);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_cache() {
        let client = CarbonIntensityClient::with_source(
            CarbonClientConfig::default(),
            Arc::new(CountingSource::default()),
            ManualClock::new(),
        );

        let regions = ["US-CAL-CISO", "US-MIDA-PJM", "US-TEX-ERCO", "US-NY-NYIS"];
        let lookups = (0..32).map(|i| {
            let client = client.clone();
            let region = regions[i % regions.len()];
            tokio::spawn(async move { (region, client.get_intensity(region).await) })
        });

        for handle in futures::future::join_all(lookups).await {
            let (region, value) = handle.unwrap();
            assert_eq!(value, client.config().fallback_for(region));
        }
        assert_eq!(client.cached_regions().await.len(), 4);
    }

    #[tokio::test]
    async fn test_oversized_ttl_never_expires() {
        let source = Arc::new(CountingSource::default());
        let clock = ManualClock::new();
        let config = CarbonClientConfig {
            cache_ttl_secs: 10_000_000_000_000,
            ..keyed_config()
        };
        let client = CarbonIntensityClient::with_source(config, source.clone(), clock.clone());

        assert_eq!(client.get_intensity("US-CAL-CISO").await, 100.0);
        clock.advance(86_400 * 365);
        assert_eq!(client.get_intensity("US-CAL-CISO").await, 100.0);
        assert_eq!(source.calls(), 1);
    }

    fn keyed_client_for(server: &MockServer) -> CarbonIntensityClient {
        let config = CarbonClientConfig {
            api_key: Some("secret-token".to_string()),
            endpoint_template: format!("{}/v3/carbon-intensity/latest?zone=%s", server.uri()),
            request_timeout_secs: 2,
            ..Default::default()
        };
        CarbonIntensityClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_live_error_status_falls_back_once_per_ttl() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/carbon-intensity/latest"))
            .and(query_param("zone", "US-MIDA-PJM"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = keyed_client_for(&mock_server);
        assert_eq!(client.get_intensity("US-MIDA-PJM").await, 430.0);
        assert_eq!(client.get_intensity("US-MIDA-PJM").await, 430.0);

        let cached = client.cached_regions().await;
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].source, SampleSource::Fallback);
    }

    #[tokio::test]
    async fn test_live_malformed_body_falls_back() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/carbon-intensity/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"zone":"ZZ"}"#))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = keyed_client_for(&mock_server);
        assert_eq!(client.get_intensity("ZZ").await, DEFAULT_FALLBACK_INTENSITY);
        assert_eq!(client.get_intensity("ZZ").await, DEFAULT_FALLBACK_INTENSITY);
        assert_eq!(client.cached_regions().await[0].source, SampleSource::Fallback);
    }

    #[tokio::test]
    async fn test_live_value_is_cached() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/carbon-intensity/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"carbonIntensity":187}"#))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = keyed_client_for(&mock_server);
        assert_eq!(client.get_intensity("US-NY-NYIS").await, 187.0);
        assert_eq!(client.get_intensity("US-NY-NYIS").await, 187.0);
        assert_eq!(client.cached_regions().await[0].source, SampleSource::Live);
    }
}
