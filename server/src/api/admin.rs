//! Catalog administration endpoints.
//!
//! - GET /admin/events - List events
//! - POST /admin/events - Create an event
//! - GET /admin/events/:id/zones - List zones of an event
//! - POST /admin/events/:id/zones - Create a zone

use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use holdfast_core::{Event, Zone};
use holdfast_runtime::{CreateEventInput, CreateZoneInput};
use holdfast_web::AppError;
use serde::Deserialize;

// ============================================================================
// Request Types
// ============================================================================

/// Request to create an event.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateEventRequest {
    /// Display name
    #[serde(default)]
    pub name: String,
    /// RFC 3339 start time; defaults to now
    #[serde(default)]
    pub starts_at: Option<String>,
}

/// Request to create a zone.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateZoneRequest {
    /// Display name, unique within the event
    #[serde(default)]
    pub name: String,
    /// Total capacity
    #[serde(default)]
    pub capacity: i32,
}

// ============================================================================
// Handlers
// ============================================================================

/// List all events, oldest first.
///
/// # Errors
///
/// `internal_error` on storage failure.
pub async fn list_events(State(state): State<AppState>) -> Result<Json<Vec<Event>>, AppError> {
    Ok(Json(state.catalog.list_events().await?))
}

/// Create an event.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/admin/events \
///   -H "Content-Type: application/json" \
///   -d '{"name": "Finals", "starts_at": "2026-06-01T19:00:00Z"}'
/// ```
///
/// # Errors
///
/// `invalid_starts_at` for a malformed timestamp, `event_name_required` for a
/// blank name.
pub async fn create_event(
    State(state): State<AppState>,
    body: Result<Json<CreateEventRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    let Json(request) = body?;

    let starts_at = match request.starts_at.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(parse_starts_at(raw)?),
    };

    let event = state
        .catalog
        .create_event(CreateEventInput {
            name: request.name,
            starts_at,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// List the zones of an event, oldest first.
///
/// # Errors
///
/// `invalid_id` for a malformed id, `event_not_found` for an unknown event.
pub async fn list_zones(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<Zone>>, AppError> {
    Ok(Json(state.catalog.list_zones(&event_id).await?))
}

/// Create a zone under an event.
///
/// # Errors
///
/// `invalid_id`, `zone_name_required`, `invalid_capacity`, `event_not_found`
/// or `zone_already_exists`.
pub async fn create_zone(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    body: Result<Json<CreateZoneRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Zone>), AppError> {
    let Json(request) = body?;

    let zone = state
        .catalog
        .create_zone(CreateZoneInput {
            event_id,
            name: request.name,
            capacity: request.capacity,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(zone)))
}

fn parse_starts_at(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| AppError::bad_request("invalid_starts_at", "invalid starts_at format"))
}
