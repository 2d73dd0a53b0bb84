//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use crate::error::AppError;
use axum::{extract::State, http::StatusCode};
use holdfast_core::Ledger;
use std::sync::Arc;

/// Simple health check endpoint (for basic liveness).
///
/// Returns 200 OK to indicate the service is running.
/// This endpoint does NOT check dependencies (database, etc.).
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness check: the ledger backend must answer a ping.
///
/// # Status Codes
///
/// - 200 OK: the database is reachable
/// - 503 Service Unavailable: it is not
///
/// # Endpoint
///
/// ```text
/// GET /ready
/// ```
///
/// # Errors
///
/// Returns a 503 [`AppError`] when the ping fails.
pub async fn readiness_check(
    State(ledger): State<Arc<dyn Ledger>>,
) -> Result<(StatusCode, &'static str), AppError> {
    ledger.ping().await.map_err(|e| {
        tracing::warn!(error = %e, "Readiness check failed");
        AppError::unavailable("database_unavailable", "database unavailable")
    })?;
    Ok((StatusCode::OK, "ready"))
}
