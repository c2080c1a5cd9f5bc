/*!
Observability infrastructure for the savedata engine.

This module provides:
- Structured logging and tracing setup
- Prometheus metrics instrumentation (behind the `metrics` feature)
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
#[cfg(feature = "metrics")]
use std::time::Instant;
use tracing::subscriber::set_global_default;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{Result, SaveDataError};

/// Default filter directive when `RUST_LOG` is unset
pub const DEFAULT_DIRECTIVE: &str = "savedata_core=info";

/// Global metrics instance; `None` if the registry could not be built
#[cfg(feature = "metrics")]
static METRICS: OnceLock<Option<SaveMetrics>> = OnceLock::new();

/// Metrics collection for save and load operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct SaveMetrics {
    pub saves_total: Counter,
    pub save_failures_total: Counter,
    pub loads_total: Counter,
    pub decode_failures_total: Counter,
    pub save_duration_seconds: Histogram,
    pub payload_bytes: Histogram,

    // Prometheus registry for scraping
    registry: Registry,
}

#[cfg(feature = "metrics")]
impl SaveMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let saves_total = Counter::new("savedata_saves_total", "Total save operations")
            .map_err(|e| SaveDataError::observability(format!("Failed to create saves_total metric: {e}")))?;

        let save_failures_total = Counter::new(
            "savedata_save_failures_total",
            "Total save operations that returned an error",
        )
        .map_err(|e| {
            SaveDataError::observability(format!("Failed to create save_failures_total metric: {e}"))
        })?;

        let loads_total = Counter::new("savedata_loads_total", "Total load operations")
            .map_err(|e| SaveDataError::observability(format!("Failed to create loads_total metric: {e}")))?;

        let decode_failures_total = Counter::new(
            "savedata_decode_failures_total",
            "Save payloads discarded as unreadable",
        )
        .map_err(|e| {
            SaveDataError::observability(format!("Failed to create decode_failures_total metric: {e}"))
        })?;

        let save_duration_seconds = Histogram::with_opts(prometheus::HistogramOpts::new(
            "savedata_save_duration_seconds",
            "Duration of save operations in seconds",
        ))
        .map_err(|e| {
            SaveDataError::observability(format!("Failed to create save_duration_seconds metric: {e}"))
        })?;

        let payload_bytes = Histogram::with_opts(
            prometheus::HistogramOpts::new("savedata_payload_bytes", "Size of encoded save payloads in bytes")
                .buckets(prometheus::exponential_buckets(256.0, 4.0, 8).unwrap_or_default()),
        )
        .map_err(|e| SaveDataError::observability(format!("Failed to create payload_bytes metric: {e}")))?;

        register(&registry, "saves_total", &saves_total)?;
        register(&registry, "save_failures_total", &save_failures_total)?;
        register(&registry, "loads_total", &loads_total)?;
        register(&registry, "decode_failures_total", &decode_failures_total)?;
        register(&registry, "save_duration_seconds", &save_duration_seconds)?;
        register(&registry, "payload_bytes", &payload_bytes)?;

        Ok(Self {
            saves_total,
            save_failures_total,
            loads_total,
            decode_failures_total,
            save_duration_seconds,
            payload_bytes,
            registry,
        })
    }

    /// Get or initialize the global metrics instance
    pub fn global() -> Option<&'static SaveMetrics> {
        METRICS
            .get_or_init(|| match Self::new() {
                Ok(metrics) => Some(metrics),
                Err(err) => {
                    tracing::warn!(error = %err, "Metrics disabled");
                    None
                }
            })
            .as_ref()
    }

    /// Gather metrics in Prometheus format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| SaveDataError::observability(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer).map_err(|e| {
            SaveDataError::observability(format!("Failed to convert metrics to string: {e}"))
        })
    }
}

#[cfg(feature = "metrics")]
fn register<C>(registry: &Registry, name: &str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|e| SaveDataError::observability(format!("Failed to register {name}: {e}")))
}

/// Metrics timer for a single save operation
#[cfg(feature = "metrics")]
pub struct SaveTimer {
    start: Instant,
}

#[cfg(feature = "metrics")]
impl SaveTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Complete the timer, recording latency and payload size
    pub fn finish(self, payload_bytes: usize) {
        if let Some(metrics) = SaveMetrics::global() {
            metrics.saves_total.inc();
            metrics
                .save_duration_seconds
                .observe(self.start.elapsed().as_secs_f64());
            metrics.payload_bytes.observe(payload_bytes as f64);
        }
    }

    /// Complete the timer with an error
    pub fn finish_with_error(self) {
        if let Some(metrics) = SaveMetrics::global() {
            metrics.save_failures_total.inc();
            metrics
                .save_duration_seconds
                .observe(self.start.elapsed().as_secs_f64());
        }
    }
}

/// Count one load. No-op without the `metrics` feature.
pub(crate) fn record_load() {
    #[cfg(feature = "metrics")]
    if let Some(metrics) = SaveMetrics::global() {
        metrics.loads_total.inc();
    }
}

/// Count one discarded payload. No-op without the `metrics` feature.
pub(crate) fn record_decode_failure() {
    #[cfg(feature = "metrics")]
    if let Some(metrics) = SaveMetrics::global() {
        metrics.decode_failures_total.inc();
    }
}

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` overrides the default `savedata_core=info` filter.
///
/// # Arguments
/// * `json` - Emit JSON lines instead of human-readable output
pub fn init_observability(json: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    SaveMetrics::global();

    let directive = DEFAULT_DIRECTIVE
        .parse::<Directive>()
        .map_err(|e| SaveDataError::observability(format!("Invalid filter directive: {e}")))?;
    let filter = EnvFilter::from_default_env().add_directive(directive);

    let result = if json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_current_span(false);
        set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
        set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
    };

    result.map_err(|e| {
        SaveDataError::observability(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::info!(json, "savedata observability initialized");
    Ok(())
}

/// Initialize observability with default settings
pub fn init_default_observability() -> Result<()> {
    init_observability(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_parses() {
        assert!(DEFAULT_DIRECTIVE.parse::<Directive>().is_ok());
    }

    #[test]
    fn test_record_helpers_do_not_panic() {
        record_load();
        record_decode_failure();
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_metrics_gathering() {
        let timer = SaveTimer::start();
        timer.finish(1024);
        SaveTimer::start().finish_with_error();
        record_load();

        let metrics = SaveMetrics::global().unwrap();
        let metrics_text = metrics.gather_metrics().unwrap();
        assert!(metrics_text.contains("savedata_saves_total"));
        assert!(metrics_text.contains("savedata_payload_bytes"));
    }
}
