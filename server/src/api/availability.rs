//! Zone availability endpoint.

use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use holdfast_core::{EventId, ZoneId, ZoneUsage};
use holdfast_web::AppError;
use serde::{Deserialize, Serialize};

/// Capacity snapshot of one zone.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailabilityResponse {
    /// Event id
    pub event_id: EventId,
    /// Zone id
    pub zone_id: ZoneId,
    /// Total capacity
    pub capacity: i32,
    /// Units in live holds
    pub active: i64,
    /// Units in confirmed holds
    pub confirmed: i64,
    /// Units still available
    pub available: i64,
}

impl From<ZoneUsage> for AvailabilityResponse {
    fn from(usage: ZoneUsage) -> Self {
        Self {
            available: usage.available(),
            event_id: usage.zone.event_id,
            zone_id: usage.zone.id,
            capacity: usage.zone.capacity,
            active: usage.active,
            confirmed: usage.confirmed,
        }
    }
}

/// Current availability of a zone.
///
/// Takes no lock; the figure may be stale by the time a hold is placed.
///
/// # Errors
///
/// `invalid_id` for malformed ids and `zone_not_found` for an unknown zone.
pub async fn zone_availability(
    State(state): State<AppState>,
    Path((event_id, zone_id)): Path<(String, String)>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let usage = state.catalog.zone_availability(&event_id, &zone_id).await?;
    Ok(Json(usage.into()))
}
