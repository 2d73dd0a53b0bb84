//! Hold placement endpoint.

use crate::server::state::AppState;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use holdfast_core::{Hold, HoldId, HoldStatus};
use holdfast_runtime::CreateHoldInput;
use holdfast_web::{AppError, IdempotencyKey, RequestId};
use serde::{Deserialize, Serialize};

/// Request to place a hold.
///
/// Missing fields decode as empty values so the engine reports the precise
/// validation error.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateHoldRequest {
    /// Event the zone belongs to
    #[serde(default)]
    pub event_id: String,
    /// Zone to draw capacity from
    #[serde(default)]
    pub zone_id: String,
    /// Units requested
    #[serde(default)]
    pub quantity: i32,
    /// Idempotency key; the `Idempotency-Key` header is used when absent
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// A placed hold.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HoldResponse {
    /// Hold id
    pub id: HoldId,
    /// Stored status
    pub status: HoldStatus,
    /// Units held
    pub quantity: i32,
    /// End of the hold window
    pub expires_at: DateTime<Utc>,
}

impl From<Hold> for HoldResponse {
    fn from(hold: Hold) -> Self {
        Self {
            id: hold.id,
            status: hold.status,
            quantity: hold.quantity,
            expires_at: hold.expires_at,
        }
    }
}

/// Place a hold.
///
/// Replays of an earlier request return the original hold, also with 201.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/holds \
///   -H "Content-Type: application/json" \
///   -H "Idempotency-Key: checkout-7f3a" \
///   -d '{"event_id": "...", "zone_id": "...", "quantity": 2}'
/// ```
///
/// # Errors
///
/// Any [`ReservationError`](holdfast_core::ReservationError) from the hold
/// engine, or `invalid_request_body` for an undecodable body.
pub async fn create_hold(
    State(state): State<AppState>,
    IdempotencyKey(header_key): IdempotencyKey,
    request_id: RequestId,
    body: Result<Json<CreateHoldRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<HoldResponse>), AppError> {
    let Json(request) = body?;

    let idempotency_key = request
        .idempotency_key
        .filter(|key| !key.trim().is_empty())
        .or(header_key)
        .unwrap_or_default();

    tracing::debug!(request_id = %request_id, zone_id = %request.zone_id, "Create hold request");

    let hold = state
        .holds
        .create_hold(
            CreateHoldInput {
                event_id: request.event_id,
                zone_id: request.zone_id,
                quantity: request.quantity,
                idempotency_key,
            },
            state.deadline(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(hold.into())))
}
