//! Prometheus metrics for the config server client.

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

use crate::error::MetricsError;

/// Prometheus metrics owned by one provider.
pub struct ClientMetrics {
    /// Registry for all metrics.
    registry: Registry,
    /// Fetches by outcome.
    pub requests_total: IntCounterVec,
    /// Top-level loads by result.
    pub loads_total: IntCounterVec,
    /// Walks in which every candidate failed.
    pub walks_exhausted_total: IntCounter,
    /// Loads that replaced the snapshot with different content.
    pub reloads_total: IntCounter,
    /// Keys in the current snapshot.
    pub keys: IntGauge,
}

impl ClientMetrics {
    /// Creates a new metrics instance with its own registry.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "config_client_requests_total",
                "Config server fetches by outcome",
            ),
            &["outcome"],
        )?;

        let loads_total = IntCounterVec::new(
            Opts::new("config_client_loads_total", "Configuration loads by result"),
            &["result"],
        )?;

        let walks_exhausted_total = IntCounter::new(
            "config_client_walks_exhausted_total",
            "Failover walks in which every candidate failed",
        )?;

        let reloads_total = IntCounter::new(
            "config_client_reloads_total",
            "Loads that changed the configuration snapshot",
        )?;

        let keys = IntGauge::new("config_client_keys", "Keys in the configuration snapshot")?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(loads_total.clone()))?;
        registry.register(Box::new(walks_exhausted_total.clone()))?;
        registry.register(Box::new(reloads_total.clone()))?;
        registry.register(Box::new(keys.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            loads_total,
            walks_exhausted_total,
            reloads_total,
            keys,
        })
    }

    /// Records one fetch.
    pub fn record_request(&self, outcome: &str) {
        self.requests_total.with_label_values(&[outcome]).inc();
    }

    /// Records the result of a top-level load.
    pub fn record_load(&self, result: &str) {
        self.loads_total.with_label_values(&[result]).inc();
    }

    /// Records a walk in which every candidate failed.
    pub fn record_walk_exhausted(&self) {
        self.walks_exhausted_total.inc();
    }

    /// Records a snapshot replacement.
    pub fn record_reload(&self, key_count: usize) {
        self.reloads_total.inc();
        self.set_key_count(key_count);
    }

    /// Updates the key gauge.
    pub fn set_key_count(&self, key_count: usize) {
        self.keys.set(key_count as i64);
    }

    /// Number of fetches recorded with `outcome`.
    pub fn request_count(&self, outcome: &str) -> u64 {
        self.requests_total.with_label_values(&[outcome]).get()
    }

    /// Returns the metrics in Prometheus text format.
    pub fn gather(&self) -> Result<String, MetricsError> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}
