//! # Holdfast Runtime
//!
//! The engines that mutate capacity, plus the catalog service around them.
//!
//! ## Core Components
//!
//! - **[`HoldEngine`]**: places holds against zone capacity
//! - **[`ConfirmationEngine`]**: turns holds into orders
//! - **[`CatalogService`]**: events, zones and availability snapshots
//! - **[`Deadline`]**: caller-imposed bound on a whole operation
//!
//! Engines keep no state between calls. Everything lives in the
//! [`Ledger`](holdfast_core::Ledger) they are given.
//!
//! ## Example
//!
//! ```ignore
//! use holdfast_runtime::{CreateHoldInput, Deadline, HoldEngine, HoldEngineConfig};
//! use std::time::Duration;
//!
//! let engine = HoldEngine::new(ledger, clock, HoldEngineConfig::default());
//!
//! let hold = engine
//!     .create_hold(
//!         CreateHoldInput {
//!             event_id,
//!             zone_id,
//!             quantity: 2,
//!             idempotency_key: "checkout-7f3a".to_string(),
//!         },
//!         Deadline::after(Duration::from_secs(5)),
//!     )
//!     .await?;
//! ```

/// Catalog administration and availability queries
pub mod catalog;

/// Hold confirmation into orders
pub mod confirmation;

/// Caller-imposed deadlines
pub mod deadline;

/// Hold placement
pub mod hold;

/// Prometheus metrics for observability
pub mod metrics;

pub use catalog::{CatalogService, CreateEventInput, CreateZoneInput};
pub use confirmation::{ConfirmHoldInput, ConfirmHoldOutcome, ConfirmationEngine};
pub use deadline::Deadline;
pub use hold::{CreateHoldInput, DEFAULT_HOLD_TTL, HoldEngine, HoldEngineConfig};
