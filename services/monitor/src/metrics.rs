//! Duration reporting for monitoring passes.
//!
//! The monitor reports exactly two operations: the whole pass and each host
//! status refresh. [`PrometheusMetrics`] keeps them in an owned registry that
//! the ops server exposes on `/metrics`.

use prometheus::{Encoder, HistogramOpts, HistogramVec, Registry, TextEncoder};
use thiserror::Error;

/// Operation name for one full monitoring pass.
pub const OP_HOST_MONITORING: &str = "HostMonitoring";

/// Operation name for one host status refresh.
pub const OP_MONITORED_HOST: &str = "MonitoredHost";

/// Histogram buckets in milliseconds.
const DURATION_BUCKETS_MS: &[f64] = &[
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0, 30_000.0,
];

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    Encoding(String),
}

/// Sink for duration measurements.
pub trait MetricsReporter: Send + Sync {
    fn report_duration(&self, operation: &str, millis: f64);
}

/// Discards every measurement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsReporter for NoopMetrics {
    fn report_duration(&self, _operation: &str, _millis: f64) {}
}

/// Prometheus histogram of operation durations.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    duration_ms: HistogramVec,
}

impl PrometheusMetrics {
    /// Create the histogram in a fresh registry.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let duration_ms = HistogramVec::new(
            HistogramOpts::new(
                "host_monitor_duration_ms",
                "Duration of host monitoring operations in milliseconds",
            )
            .buckets(DURATION_BUCKETS_MS.to_vec()),
            &["operation"],
        )?;
        registry.register(Box::new(duration_ms.clone()))?;
        Ok(Self {
            registry,
            duration_ms,
        })
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn encode_text(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}

impl MetricsReporter for PrometheusMetrics {
    fn report_duration(&self, operation: &str, millis: f64) {
        self.duration_ms
            .with_label_values(&[operation])
            .observe(millis);
    }
}
