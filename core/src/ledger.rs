//! Storage contracts: the transactional capacity ledger and the catalog store.
//!
//! # Design
//!
//! The engines never talk to a database client directly. They open a
//! transaction through [`Ledger::begin`] and thread the returned
//! [`LedgerTransaction`] handle through every read and write belonging to one
//! decision, then either [`commit`](LedgerTransaction::commit) or drop it.
//! Transaction boundaries therefore stay visible at the call site.
//!
//! Locked reads (`zone_for_update`, `hold_for_update`) take an exclusive row
//! lock held until the handle is committed or dropped. That lock is what
//! serializes concurrent holds against one zone and concurrent confirmations
//! of one hold.
//!
//! # Implementations
//!
//! - `PostgresLedger` (in `holdfast-postgres`): production, `SELECT ... FOR UPDATE`
//! - `InMemoryLedger` (in `holdfast-testing`): deterministic tests
//!
//! # Dyn Compatibility
//!
//! Methods return [`LedgerFuture`] (a pinned boxed future) instead of using
//! `async fn`, so the engines can hold an `Arc<dyn Ledger>` and the
//! transaction is a `Box<dyn LedgerTransaction>`.

use crate::ids::{EventId, HoldId, ZoneId};
use crate::model::{Event, Hold, HoldStatus, Order, Zone};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by every storage operation.
pub type LedgerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LedgerError>> + Send + 'a>>;

/// Names of the uniqueness constraints the engines reconcile against.
///
/// Backends report these in [`LedgerError::UniqueViolation`].
pub mod constraints {
    /// One hold per (event, zone, idempotency key).
    pub const HOLDS_IDEMPOTENCY_KEY: &str = "holds_event_id_zone_id_idempotency_key_key";
    /// One order per hold.
    pub const ORDERS_HOLD_ID: &str = "orders_hold_id_key";
    /// Zone names are unique within an event.
    pub const ZONES_EVENT_NAME: &str = "zones_event_id_name_key";
    /// Zones reference an existing event.
    pub const ZONES_EVENT_FK: &str = "zones_event_id_fkey";
}

/// Errors raised by storage backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// An insert collided with a uniqueness constraint.
    ///
    /// The engines recover from this locally by re-reading and reconciling.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation {
        /// Name of the violated constraint.
        constraint: String,
    },

    /// An insert referenced a row that does not exist.
    #[error("Foreign key constraint violated: {constraint}")]
    ForeignKeyViolation {
        /// Name of the violated constraint.
        constraint: String,
    },

    /// Connection, query or transaction failure.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored row could not be decoded into a domain record.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl LedgerError {
    /// Whether this is a uniqueness violation.
    #[must_use]
    pub const fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}

/// Capacity left in a zone.
///
/// `capacity - active - confirmed`, clamped at zero.
#[must_use]
pub fn available_capacity(capacity: i32, active: i64, confirmed: i64) -> i64 {
    (i64::from(capacity) - active - confirmed).max(0)
}

/// Entry point of the transactional capacity ledger.
pub trait Ledger: Send + Sync {
    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// - `Database`: the backend could not start a transaction
    fn begin(&self) -> LedgerFuture<'_, Box<dyn LedgerTransaction>>;

    /// Check that the backend is reachable.
    ///
    /// # Errors
    ///
    /// - `Database`: the backend did not answer
    fn ping(&self) -> LedgerFuture<'_, ()>;
}

/// A transaction handle against the ledger.
///
/// Every operation runs inside the transaction. Dropping the handle without
/// calling [`commit`](Self::commit) rolls it back and releases its row locks.
///
/// # Errors
///
/// Every method fails with `LedgerError::Database` when the backend fails.
/// Inserts additionally report `UniqueViolation`.
pub trait LedgerTransaction: Send {
    /// Fetch a zone and lock it for the rest of the transaction.
    ///
    /// Returns `None` when no zone with this id exists under the event.
    fn zone_for_update(
        &mut self,
        event_id: EventId,
        zone_id: ZoneId,
    ) -> LedgerFuture<'_, Option<Zone>>;

    /// Fetch the hold created with an idempotency key, if any.
    fn hold_by_idempotency_key<'a>(
        &'a mut self,
        event_id: EventId,
        zone_id: ZoneId,
        idempotency_key: &'a str,
    ) -> LedgerFuture<'a, Option<Hold>>;

    /// Sum of quantities of holds with status active that expire strictly
    /// after `now`.
    fn sum_active_holds(
        &mut self,
        event_id: EventId,
        zone_id: ZoneId,
        now: DateTime<Utc>,
    ) -> LedgerFuture<'_, i64>;

    /// Sum of quantities of confirmed holds.
    fn sum_confirmed_holds(&mut self, event_id: EventId, zone_id: ZoneId)
    -> LedgerFuture<'_, i64>;

    /// Persist a new hold.
    ///
    /// Fails with `UniqueViolation` if a hold with the same
    /// (event, zone, idempotency key) exists.
    fn insert_hold<'a>(&'a mut self, hold: &'a Hold) -> LedgerFuture<'a, ()>;

    /// Fetch a hold and lock it for the rest of the transaction.
    fn hold_for_update(&mut self, hold_id: HoldId) -> LedgerFuture<'_, Option<Hold>>;

    /// Overwrite a hold's status. Returns `false` if the hold does not exist.
    fn update_hold_status(
        &mut self,
        hold_id: HoldId,
        status: HoldStatus,
    ) -> LedgerFuture<'_, bool>;

    /// Fetch the order created from a hold, if any.
    fn order_by_hold_id(&mut self, hold_id: HoldId) -> LedgerFuture<'_, Option<Order>>;

    /// Persist a new order.
    ///
    /// Fails with `UniqueViolation` if the hold already has an order.
    fn insert_order<'a>(&'a mut self, order: &'a Order) -> LedgerFuture<'a, ()>;

    /// Make every write visible and release the row locks.
    fn commit(self: Box<Self>) -> LedgerFuture<'static, ()>;

    /// Discard every write and release the row locks.
    fn rollback(self: Box<Self>) -> LedgerFuture<'static, ()>;
}

/// Read-only capacity snapshot of one zone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZoneUsage {
    /// The zone.
    pub zone: Zone,
    /// Sum of active, unexpired hold quantities.
    pub active: i64,
    /// Sum of confirmed hold quantities.
    pub confirmed: i64,
}

impl ZoneUsage {
    /// Capacity still available for new holds.
    #[must_use]
    pub fn available(&self) -> i64 {
        available_capacity(self.zone.capacity, self.active, self.confirmed)
    }
}

/// Storage for catalog entities (events and zones).
///
/// Catalog writes are single statements and need no transaction handle.
///
/// # Errors
///
/// Every method fails with `LedgerError::Database` when the backend fails.
pub trait CatalogStore: Send + Sync {
    /// Persist a new event.
    fn insert_event<'a>(&'a self, event: &'a Event) -> LedgerFuture<'a, ()>;

    /// All events, oldest first.
    fn list_events(&self) -> LedgerFuture<'_, Vec<Event>>;

    /// Whether an event exists.
    fn event_exists(&self, event_id: EventId) -> LedgerFuture<'_, bool>;

    /// Persist a new zone.
    ///
    /// Fails with `UniqueViolation` on a duplicate (event, name) and with
    /// `ForeignKeyViolation` when the event does not exist.
    fn insert_zone<'a>(&'a self, zone: &'a Zone) -> LedgerFuture<'a, ()>;

    /// Zones of an event, oldest first.
    fn list_zones(&self, event_id: EventId) -> LedgerFuture<'_, Vec<Zone>>;

    /// Capacity snapshot of a zone as of `now`, without locking.
    fn zone_usage(
        &self,
        event_id: EventId,
        zone_id: ZoneId,
        now: DateTime<Utc>,
    ) -> LedgerFuture<'_, Option<ZoneUsage>>;
}
