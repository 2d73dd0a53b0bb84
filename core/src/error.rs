//! Error taxonomy shared by the engines and surfaced to callers.
//!
//! The set is closed: transports match on it exhaustively. Anything storage
//! raises that the engines cannot recover from ends up in
//! [`ReservationError::Internal`], whose details are for logs only.

use crate::ledger::LedgerError;
use thiserror::Error;

/// Failures returned by the hold engine, the confirmation engine and the
/// catalog service.
#[derive(Error, Debug)]
pub enum ReservationError {
    /// Requested quantity was zero or negative.
    #[error("Quantity must be a positive integer")]
    InvalidQuantity,

    /// A caller-supplied identifier is not a valid UUID.
    #[error("Invalid identifier")]
    InvalidId,

    /// The idempotency key was missing or blank.
    #[error("Idempotency key is required")]
    IdempotencyKeyRequired,

    /// The idempotency key was already used for a hold with a different quantity.
    #[error("Idempotency key was already used with a different quantity")]
    IdempotencyConflict,

    /// The zone does not exist under the given event.
    #[error("Zone not found")]
    ZoneNotFound,

    /// Not enough unclaimed capacity left in the zone.
    #[error("Insufficient capacity: requested {requested}, available {available}")]
    InsufficientCapacity {
        /// Quantity asked for.
        requested: i32,
        /// Capacity left at decision time (never negative).
        available: i64,
    },

    /// The hold does not exist.
    #[error("Hold not found")]
    HoldNotFound,

    /// The hold's window has elapsed; it can no longer be confirmed.
    #[error("Hold has expired")]
    HoldExpired,

    /// The hold was already confirmed by a different request.
    #[error("Hold is already confirmed")]
    HoldAlreadyConfirmed,

    /// The event does not exist.
    #[error("Event not found")]
    EventNotFound,

    /// A zone with the same name already exists under the event.
    #[error("Zone already exists for this event")]
    ZoneAlreadyExists,

    /// Zone capacity was zero or negative.
    #[error("Capacity must be a positive integer")]
    InvalidCapacity,

    /// Event name was empty.
    #[error("Event name is required")]
    EventNameRequired,

    /// Zone name was empty.
    #[error("Zone name is required")]
    ZoneNameRequired,

    /// The caller's deadline elapsed before the operation committed.
    ///
    /// Nothing was written.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Unrecoverable storage failure.
    #[error("Internal error: {0}")]
    Internal(#[from] LedgerError),
}

impl ReservationError {
    /// Stable snake-case code for the error kind.
    ///
    /// Used as the `code` field in HTTP error bodies and as the `reason`
    /// label on rejection metrics.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidQuantity => "invalid_quantity",
            Self::InvalidId => "invalid_id",
            Self::IdempotencyKeyRequired => "idempotency_key_required",
            Self::IdempotencyConflict => "idempotency_conflict",
            Self::ZoneNotFound => "zone_not_found",
            Self::InsufficientCapacity { .. } => "insufficient_capacity",
            Self::HoldNotFound => "hold_not_found",
            Self::HoldExpired => "hold_expired",
            Self::HoldAlreadyConfirmed => "hold_already_confirmed",
            Self::EventNotFound => "event_not_found",
            Self::ZoneAlreadyExists => "zone_already_exists",
            Self::InvalidCapacity => "invalid_capacity",
            Self::EventNameRequired => "event_name_required",
            Self::ZoneNameRequired => "zone_name_required",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether this is an opaque storage failure rather than a domain outcome.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}
