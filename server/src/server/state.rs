//! Application state for the Holdfast HTTP server.

use axum::extract::FromRef;
use holdfast_core::environment::Clock;
use holdfast_core::{CatalogStore, Ledger};
use holdfast_runtime::metrics::PrometheusMetrics;
use holdfast_runtime::{CatalogService, ConfirmationEngine, Deadline, HoldEngine, HoldEngineConfig};
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Places holds
    pub holds: HoldEngine,

    /// Turns holds into orders
    pub confirmations: ConfirmationEngine,

    /// Events, zones and availability
    pub catalog: CatalogService,

    /// Backend pinged by the readiness probe
    pub ledger: Arc<dyn Ledger>,

    /// Prometheus handle, when metrics are enabled
    pub metrics: Option<PrometheusMetrics>,

    /// Deadline applied to each engine call
    pub request_timeout: Option<Duration>,
}

impl AppState {
    /// Build the state over a backend that is both ledger and catalog store.
    #[must_use]
    pub fn new<B>(
        backend: Arc<B>,
        clock: Arc<dyn Clock>,
        hold_config: HoldEngineConfig,
        request_timeout: Option<Duration>,
    ) -> Self
    where
        B: Ledger + CatalogStore + 'static,
    {
        let ledger: Arc<dyn Ledger> = backend.clone();
        Self {
            holds: HoldEngine::new(ledger.clone(), clock.clone(), hold_config),
            confirmations: ConfirmationEngine::new(ledger.clone(), clock.clone()),
            catalog: CatalogService::new(backend, clock),
            ledger,
            metrics: None,
            request_timeout,
        }
    }

    /// Serve `/metrics` from this handle.
    #[must_use]
    pub fn with_metrics(mut self, metrics: PrometheusMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// A fresh deadline for one engine call.
    #[must_use]
    pub fn deadline(&self) -> Deadline {
        self.request_timeout.map_or_else(Deadline::none, Deadline::after)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("metrics_enabled", &self.metrics.is_some())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl FromRef<AppState> for Arc<dyn Ledger> {
    fn from_ref(state: &AppState) -> Self {
        state.ledger.clone()
    }
}
