//! Hold confirmation endpoint.

use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use holdfast_core::{HoldId, Order, OrderId};
use holdfast_runtime::ConfirmHoldInput;
use holdfast_web::{AppError, IdempotencyKey};
use serde::{Deserialize, Serialize};

/// A confirmed order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderResponse {
    /// Order id
    pub id: OrderId,
    /// Hold the order was created from
    pub hold_id: HoldId,
    /// Always `"confirmed"`
    pub status: String,
    /// When the order was created
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            hold_id: order.hold_id,
            status: "confirmed".to_string(),
            created_at: order.created_at,
        }
    }
}

/// Confirm a hold.
///
/// Returns 201 when the order is created and 200 when an earlier
/// confirmation with the same key is replayed.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/holds/<hold_id>/confirm \
///   -H "Idempotency-Key: pay-91c2"
/// ```
///
/// # Errors
///
/// Any [`ReservationError`](holdfast_core::ReservationError) from the
/// confirmation engine. A missing header is `idempotency_key_required`.
pub async fn confirm_hold(
    State(state): State<AppState>,
    Path(hold_id): Path<String>,
    IdempotencyKey(idempotency_key): IdempotencyKey,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    let outcome = state
        .confirmations
        .confirm_hold(
            ConfirmHoldInput {
                hold_id,
                idempotency_key: idempotency_key.unwrap_or_default(),
            },
            state.deadline(),
        )
        .await?;

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome.order.into())))
}
