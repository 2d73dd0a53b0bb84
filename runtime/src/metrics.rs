//! Prometheus metrics for the engines.
//!
//! The engines always record through the `metrics` facade. Nothing is
//! exported until [`PrometheusMetrics::install`] puts a recorder in place;
//! without one every call is a no-op.
//!
//! # Example
//!
//! ```rust,no_run
//! use holdfast_runtime::metrics::PrometheusMetrics;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::install()?;
//!
//! // Serve this from a `/metrics` route
//! let body = metrics.render();
//! # Ok(())
//! # }
//! ```

use holdfast_core::ReservationError;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installed Prometheus recorder.
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: PrometheusHandle,
}

impl PrometheusMetrics {
    /// Register metric descriptions and install the global Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if a recorder is already installed.
    pub fn install() -> Result<Self, MetricsError> {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .install_recorder()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        register_metrics();
        tracing::info!("Prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Render current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl std::fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetrics").finish_non_exhaustive()
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Hold Metrics
    describe_counter!("holdfast_holds_created_total", "Total number of holds created");
    describe_counter!(
        "holdfast_holds_replayed_total",
        "Total number of hold requests answered with an existing hold"
    );
    describe_counter!(
        "holdfast_holds_rejected_total",
        "Total number of hold requests rejected, by reason"
    );

    // Order Metrics
    describe_counter!("holdfast_orders_created_total", "Total number of orders created");
    describe_counter!(
        "holdfast_orders_replayed_total",
        "Total number of confirmations answered with an existing order"
    );
    describe_counter!(
        "holdfast_orders_rejected_total",
        "Total number of confirmations rejected, by reason"
    );

    // Engine Metrics
    describe_histogram!(
        "holdfast_engine_duration_seconds",
        "Time taken by an engine operation, by operation"
    );
}

/// Hold engine metrics recorder.
pub struct HoldMetrics;

impl HoldMetrics {
    /// Record a newly created hold.
    pub fn record_created(duration: Duration) {
        counter!("holdfast_holds_created_total").increment(1);
        record_duration("create_hold", duration);
    }

    /// Record an idempotent replay.
    pub fn record_replayed(duration: Duration) {
        counter!("holdfast_holds_replayed_total").increment(1);
        record_duration("create_hold", duration);
    }

    /// Record a rejected request.
    pub fn record_rejected(error: &ReservationError, duration: Duration) {
        counter!("holdfast_holds_rejected_total", "reason" => error.code()).increment(1);
        record_duration("create_hold", duration);
    }
}

/// Confirmation engine metrics recorder.
pub struct OrderMetrics;

impl OrderMetrics {
    /// Record a newly created order.
    pub fn record_created(duration: Duration) {
        counter!("holdfast_orders_created_total").increment(1);
        record_duration("confirm_hold", duration);
    }

    /// Record an idempotent replay.
    pub fn record_replayed(duration: Duration) {
        counter!("holdfast_orders_replayed_total").increment(1);
        record_duration("confirm_hold", duration);
    }

    /// Record a rejected confirmation.
    pub fn record_rejected(error: &ReservationError, duration: Duration) {
        counter!("holdfast_orders_rejected_total", "reason" => error.code()).increment(1);
        record_duration("confirm_hold", duration);
    }
}

fn record_duration(operation: &'static str, duration: Duration) {
    histogram!("holdfast_engine_duration_seconds", "operation" => operation)
        .record(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_noop() {
        HoldMetrics::record_created(Duration::from_millis(3));
        HoldMetrics::record_rejected(&ReservationError::InvalidQuantity, Duration::ZERO);
        OrderMetrics::record_replayed(Duration::from_millis(1));
    }

    #[test]
    fn installed_recorder_renders_engine_metrics() {
        // Only one global recorder can exist per process.
        let Ok(metrics) = PrometheusMetrics::install() else {
            return;
        };

        HoldMetrics::record_created(Duration::from_millis(5));
        OrderMetrics::record_rejected(&ReservationError::HoldExpired, Duration::from_millis(2));

        let rendered = metrics.render();
        assert!(rendered.contains("holdfast_holds_created_total"));
        assert!(rendered.contains("reason=\"hold_expired\""));
        assert!(rendered.contains("holdfast_engine_duration_seconds"));
    }
}
