//! # Holdfast Core
//!
//! Domain model, error taxonomy and storage contracts for the Holdfast
//! reservation engine.
//!
//! Holdfast manages time-limited holds against fixed-capacity zones and turns
//! holds into permanent orders. This crate contains everything the engines and
//! the storage backends agree on, and nothing that performs I/O:
//!
//! - **Model**: [`Event`](model::Event), [`Zone`](model::Zone),
//!   [`Hold`](model::Hold), [`Order`](model::Order)
//! - **Identifiers**: strongly typed UUID wrappers ([`ids`])
//! - **Errors**: the closed [`ReservationError`](error::ReservationError)
//!   taxonomy surfaced to callers, and the [`LedgerError`](ledger::LedgerError)
//!   raised by storage
//! - **Contracts**: the transactional [`Ledger`](ledger::Ledger) and the
//!   non-transactional [`CatalogStore`](ledger::CatalogStore)
//! - **Environment**: the [`Clock`](environment::Clock) abstraction
//!
//! ## Capacity accounting
//!
//! ```text
//! available = zone.capacity - Σ(active holds, expires_at > now) - Σ(confirmed holds)
//! ```
//!
//! Expiry is never written by a background process. A hold whose expiry instant
//! has passed simply stops counting, which is how capacity comes back.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod ids;
pub mod ledger;
pub mod model;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::ReservationError;
pub use ids::{EventId, HoldId, OrderId, ZoneId};
pub use ledger::{
    CatalogStore, Ledger, LedgerError, LedgerFuture, LedgerTransaction, ZoneUsage,
};
pub use model::{Event, Hold, HoldStatus, Order, Zone};

/// Result alias used across the engines.
pub type Result<T> = std::result::Result<T, ReservationError>;

/// Environment module - injected dependencies
///
/// The engines never call `Utc::now()` directly. Time is read through a
/// [`Clock`](environment::Clock) so tests can pin or advance it.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use holdfast_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let earlier = clock.now();
    /// assert!(clock.now() >= earlier);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time (UTC).
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
