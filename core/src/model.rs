//! Domain records persisted by the ledger.

use crate::ids::{EventId, HoldId, OrderId, ZoneId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Catalog
// ============================================================================

/// A ticketed event. Zones hang off events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier
    pub id: EventId,
    /// Display name
    pub name: String,
    /// When the event starts
    pub starts_at: DateTime<Utc>,
}

/// A sellable inventory pool under an event.
///
/// Capacity is fixed when the zone is created. The engines only ever read it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    /// Zone identifier
    pub id: ZoneId,
    /// Owning event
    pub event_id: EventId,
    /// Display name, unique within the event
    pub name: String,
    /// Total capacity (always positive)
    pub capacity: i32,
}

// ============================================================================
// Holds
// ============================================================================

/// Stored status of a hold.
///
/// `Expired` may be written by storage but is never relied upon: a hold whose
/// expiry instant has passed is treated as expired regardless of what is
/// stored. See [`Hold::effective_status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldStatus {
    /// Claims capacity until its expiry instant
    Active,
    /// Converted into an order; terminal
    Confirmed,
    /// Lapsed; terminal
    Expired,
}

impl HoldStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Confirmed => "confirmed",
            Self::Expired => "expired",
        }
    }

    /// Parse status from its database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "confirmed" => Some(Self::Confirmed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time-boxed provisional claim on zone capacity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    /// Hold identifier
    pub id: HoldId,
    /// Event the zone belongs to
    pub event_id: EventId,
    /// Zone whose capacity is claimed
    pub zone_id: ZoneId,
    /// Claimed quantity (always positive)
    pub quantity: i32,
    /// Stored status
    pub status: HoldStatus,
    /// Instant after which the hold no longer counts
    pub expires_at: DateTime<Utc>,
    /// Caller-supplied key; unique per (event, zone)
    pub idempotency_key: String,
    /// Creation instant
    pub created_at: DateTime<Utc>,
}

impl Hold {
    /// Whether the hold currently claims capacity as an active hold.
    ///
    /// True only for stored status `Active` with an expiry strictly after `now`.
    #[must_use]
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.status == HoldStatus::Active && self.expires_at > now
    }

    /// Whether the hold can no longer be confirmed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == HoldStatus::Expired || self.expires_at <= now
    }

    /// Status as observed at `now`, deriving expiry from the expiry instant.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> HoldStatus {
        match self.status {
            HoldStatus::Active if self.expires_at <= now => HoldStatus::Expired,
            status => status,
        }
    }
}

// ============================================================================
// Orders
// ============================================================================

/// A permanent allocation created by confirming a hold. Never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier
    pub id: OrderId,
    /// Hold this order confirmed; unique across orders
    pub hold_id: HoldId,
    /// Key supplied with the confirming request
    pub idempotency_key: String,
    /// Creation instant
    pub created_at: DateTime<Utc>,
}
