//! Prometheus exposition endpoint.

use crate::server::state::AppState;
use axum::{extract::State, http::header, response::IntoResponse};
use holdfast_web::AppError;

/// Render the Prometheus metrics.
///
/// # Errors
///
/// `not_found` when metrics are disabled.
#[allow(clippy::unused_async)]
pub async fn render(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let metrics = state.metrics.as_ref().ok_or_else(AppError::not_found)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics.render(),
    ))
}
