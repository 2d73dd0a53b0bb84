//! Strongly typed identifiers.
//!
//! Every record is keyed by a random (v4) UUID generated by Holdfast itself.
//! Callers hand identifiers back as strings; [`EventId::parse`] and friends turn
//! malformed input into [`ReservationError::InvalidId`] before anything touches
//! storage.

use crate::error::ReservationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Parse a caller-supplied identifier.
            ///
            /// # Errors
            ///
            /// Returns [`ReservationError::InvalidId`] if `raw` is not a UUID.
            pub fn parse(raw: &str) -> Result<Self, ReservationError> {
                raw.trim()
                    .parse::<Uuid>()
                    .map(Self)
                    .map_err(|_| ReservationError::InvalidId)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ReservationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

define_id!(
    /// Unique identifier for an event
    EventId
);

define_id!(
    /// Unique identifier for a zone (a capacity pool under an event)
    ZoneId
);

define_id!(
    /// Unique identifier for a hold
    HoldId
);

define_id!(
    /// Unique identifier for an order
    OrderId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_v4() {
        let id = HoldId::new();
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn parse_accepts_canonical_uuid() {
        let raw = "00000000-0000-0000-0000-000000000010";
        let id = EventId::parse(raw);
        assert!(matches!(id, Ok(ref parsed) if parsed.to_string() == raw));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            ZoneId::parse("not-a-uuid"),
            Err(ReservationError::InvalidId)
        ));
        assert!(matches!(
            "".parse::<HoldId>(),
            Err(ReservationError::InvalidId)
        ));
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = OrderId::from_uuid(Uuid::nil());
        let json = serde_json::to_string(&id).ok();
        assert_eq!(
            json.as_deref(),
            Some("\"00000000-0000-0000-0000-000000000000\"")
        );
    }
}
