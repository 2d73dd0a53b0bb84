//! # Holdfast Testing
//!
//! Testing utilities for the Holdfast reservation engine.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - [`InMemoryLedger`]: a `Ledger` + `CatalogStore` with real row-lock
//!   semantics, fixtures and fault injection
//!
//! ## Example
//!
//! ```ignore
//! use holdfast_testing::{InMemoryLedger, test_clock};
//! use holdfast_runtime::{HoldEngine, HoldEngineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn test_hold_flow() {
//!     let ledger = InMemoryLedger::new();
//!     let event = ledger.seed_event("Concert");
//!     let zone = ledger.seed_zone(event.id, "Floor", 100);
//!
//!     let engine = HoldEngine::new(
//!         Arc::new(ledger.clone()),
//!         Arc::new(test_clock()),
//!         HoldEngineConfig::default(),
//!     );
//!     // ...
//!     assert_eq!(ledger.holds().len(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use holdfast_core::environment::Clock;

/// In-memory ledger
pub mod ledger;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::TimeDelta;
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use holdfast_testing::mocks::FixedClock;
    /// use holdfast_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can hand one clone to the
    /// engines and advance another to make holds expire.
    ///
    /// # Example
    ///
    /// ```
    /// use holdfast_testing::mocks::ManualClock;
    /// use holdfast_core::environment::Clock;
    /// use chrono::{TimeDelta, Utc};
    ///
    /// let clock = ManualClock::new(Utc::now());
    /// let start = clock.now();
    /// clock.advance(TimeDelta::minutes(15));
    /// assert_eq!(clock.now() - start, TimeDelta::minutes(15));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock stopped at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: TimeDelta) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an instant.
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use ledger::{InMemoryLedger, InMemoryTransaction};
pub use mocks::{FixedClock, ManualClock, test_clock};
