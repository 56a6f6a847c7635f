//! Prometheus metrics for the O'Bloc exporter
//!
//! This module provides the three instruments describing the upstream value
//! and the polling process:
//! - `obloc_utilization_percent`: last successfully observed value (gauge)
//! - `obloc_scrape_duration_seconds`: wall-clock time of each poll cycle (histogram)
//! - `obloc_scrape_errors_total`: failed poll cycles (counter)
//!
//! Metrics are exposed via the scrape endpoint in Prometheus text format.
//! All instruments live in a private registry owned by [`Metrics`]; nothing is
//! registered globally.

use prometheus::{Encoder, Gauge, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub const UTILIZATION_METRIC: &str = "obloc_utilization_percent";
pub const SCRAPE_DURATION_METRIC: &str = "obloc_scrape_duration_seconds";
pub const SCRAPE_ERRORS_METRIC: &str = "obloc_scrape_errors_total";

/// Metrics sink shared by the poll loop (writer) and the scrape endpoint (reader)
///
/// Cloning is cheap and every clone records into the same registry.
/// Each instrument is updated atomically, so a scrape observes either the
/// previous or the new value of a field, never a partial write.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    utilization: Gauge,
    scrape_duration: Histogram,
    scrape_errors: IntCounter,
    has_value: Arc<AtomicBool>,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let utilization = Gauge::with_opts(Opts::new(
            UTILIZATION_METRIC,
            "The current O'Bloc utilization",
        ))?;

        // Default buckets (5ms..10s) cover a single HTTP GET comfortably
        let scrape_duration = Histogram::with_opts(
            HistogramOpts::new(
                SCRAPE_DURATION_METRIC,
                "Time taken to scrape O'Bloc utilization data",
            )
            .buckets(prometheus::DEFAULT_BUCKETS.to_vec()),
        )?;

        let scrape_errors = IntCounter::with_opts(Opts::new(
            SCRAPE_ERRORS_METRIC,
            "Total number of errors while scraping O'Bloc utilization",
        ))?;

        registry.register(Box::new(utilization.clone()))?;
        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(scrape_errors.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            utilization,
            scrape_duration,
            scrape_errors,
            has_value: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Publish a successfully parsed value
    ///
    /// Called at most once per cycle, never in the same cycle as [`Metrics::record_error`].
    pub fn record_success(&self, value: i64) {
        self.utilization.set(value as f64);
        self.has_value.store(true, Ordering::Release);
    }

    /// Count one failed cycle
    ///
    /// The gauge is left untouched so it keeps the last good value.
    pub fn record_error(&self) {
        self.scrape_errors.inc();
    }

    /// Record the duration of one cycle in seconds
    ///
    /// # Errors
    ///
    /// Returns an error if `seconds` is NaN, infinite, or negative. Such samples
    /// would corrupt every histogram quantile, so they are rejected rather than
    /// recorded.
    pub fn observe_duration(&self, seconds: f64) -> Result<(), prometheus::Error> {
        if !seconds.is_finite() {
            return Err(prometheus::Error::Msg(format!(
                "Histogram value must be finite (not NaN or Infinity), got: {}",
                seconds
            )));
        }

        if seconds < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "Histogram value must be non-negative (duration cannot be negative), got: {}",
                seconds
            )));
        }

        self.scrape_duration.observe(seconds);
        Ok(())
    }

    /// Last successfully published value, or `None` before the first success
    pub fn latest_value(&self) -> Option<f64> {
        if self.has_value.load(Ordering::Acquire) {
            Some(self.utilization.get())
        } else {
            None
        }
    }

    /// Number of failed cycles since startup
    pub fn error_count(&self) -> u64 {
        self.scrape_errors.get()
    }

    /// Number of duration samples recorded since startup
    pub fn duration_sample_count(&self) -> u64 {
        self.scrape_duration.get_sample_count()
    }

    /// Gather all metrics and encode them in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if metric encoding fails.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let metric_count = metric_families.len();

        tracing::debug!(
            metric_family_count = metric_count,
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();

        encoder.encode(&metric_families, &mut buffer).map_err(|e| {
            tracing::error!(
                error = %e,
                metric_family_count = metric_count,
                "Prometheus text encoder failed"
            );
            e
        })?;

        String::from_utf8(buffer).map_err(|e| {
            tracing::error!(
                invalid_byte_index = e.utf8_error().valid_up_to(),
                "Prometheus encoder produced invalid UTF-8"
            );
            prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new_creates_registry() {
        let metrics = Metrics::new().expect("Failed to create metrics");

        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(names.len(), 3, "Expected 3 metric families");
        assert!(names.contains(&UTILIZATION_METRIC.to_string()));
        assert!(names.contains(&SCRAPE_DURATION_METRIC.to_string()));
        assert!(names.contains(&SCRAPE_ERRORS_METRIC.to_string()));
    }

    #[test]
    fn test_latest_value_absent_before_first_success() {
        let metrics = Metrics::new().expect("Failed to create test metrics");
        assert_eq!(metrics.latest_value(), None);

        metrics.record_error();
        assert_eq!(metrics.latest_value(), None);
    }

    #[test]
    fn test_record_success_sets_gauge() {
        let metrics = Metrics::new().expect("Failed to create test metrics");
        metrics.record_success(17);
        assert_eq!(metrics.latest_value(), Some(17.0));

        metrics.record_success(-3);
        assert_eq!(metrics.latest_value(), Some(-3.0));
    }

    #[test]
    fn test_record_error_keeps_gauge_and_counts() {
        let metrics = Metrics::new().expect("Failed to create test metrics");
        metrics.record_success(42);
        metrics.record_error();
        metrics.record_error();

        assert_eq!(metrics.latest_value(), Some(42.0));
        assert_eq!(metrics.error_count(), 2);
    }

    #[test]
    fn test_observe_duration_counts_samples() {
        let metrics = Metrics::new().expect("Failed to create test metrics");
        metrics.observe_duration(0.0).expect("zero is valid");
        metrics.observe_duration(0.25).expect("positive is valid");
        assert_eq!(metrics.duration_sample_count(), 2);
    }

    #[test]
    fn test_histogram_rejects_invalid_values() {
        let metrics = Metrics::new().expect("Failed to create test metrics");
        assert!(metrics.observe_duration(f64::NAN).is_err());
        assert!(metrics.observe_duration(f64::INFINITY).is_err());
        assert!(metrics.observe_duration(f64::NEG_INFINITY).is_err());
        assert!(metrics.observe_duration(-0.5).is_err());
        assert_eq!(metrics.duration_sample_count(), 0);
    }

    #[test]
    fn test_gather_produces_prometheus_text_format() {
        let metrics = Metrics::new().expect("Failed to create test metrics");
        metrics.record_success(55);
        metrics.record_error();
        metrics.observe_duration(0.1).expect("valid sample");

        let output = metrics.gather().expect("Failed to gather test metrics");
        assert!(output.contains("# HELP obloc_utilization_percent"));
        assert!(output.contains("# TYPE obloc_utilization_percent gauge"));
        assert!(output.contains("obloc_utilization_percent 55"));
        assert!(output.contains("# TYPE obloc_scrape_errors_total counter"));
        assert!(output.contains("obloc_scrape_errors_total 1"));
        assert!(output.contains("# TYPE obloc_scrape_duration_seconds histogram"));
        assert!(output.contains("obloc_scrape_duration_seconds_count 1"));
        assert!(output.contains("le=\"0.005\""));
        assert!(output.contains("le=\"10\""));
    }

    #[test]
    fn test_metrics_is_clonable() {
        let metrics = Metrics::new().expect("Failed to create test metrics");
        let cloned = metrics.clone();

        metrics.record_success(7);
        metrics.record_error();

        assert_eq!(cloned.latest_value(), Some(7.0));
        assert_eq!(cloned.error_count(), 1);
    }

    #[test]
    fn test_separate_instances_do_not_share_state() {
        let a = Metrics::new().expect("Failed to create test metrics");
        let b = Metrics::new().expect("Failed to create test metrics");
        a.record_error();
        assert_eq!(b.error_count(), 0);
    }

    #[test]
    fn test_concurrent_reads_never_observe_torn_values() {
        use std::thread;

        let metrics = Metrics::new().expect("Failed to create test metrics");
        metrics.record_success(0);

        let writer = {
            let metrics = metrics.clone();
            thread::spawn(move || {
                for _ in 0..10_000 {
                    metrics.record_success(55);
                    metrics.record_success(0);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let metrics = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        let value = metrics.latest_value().expect("value was set");
                        assert!(value == 0.0 || value == 55.0, "torn read: {}", value);
                    }
                })
            })
            .collect();

        writer.join().expect("writer thread panicked");
        for reader in readers {
            reader.join().expect("reader thread panicked");
        }
    }
}
