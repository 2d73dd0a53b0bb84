//! In-memory ledger for fast, deterministic engine tests.
//!
//! Implements both [`Ledger`] and [`CatalogStore`] over plain vectors, with
//! the same observable semantics as the Postgres backend:
//!
//! - Row locks: `zone_for_update` / `hold_for_update` take a per-row async
//!   mutex held until the transaction commits or is dropped
//! - Writes are staged in the transaction and applied on commit
//! - Reads see committed data plus the transaction's own writes
//! - Uniqueness of (event, zone, key) on holds and of hold id on orders is
//!   reported as [`LedgerError::UniqueViolation`]
//!
//! Fault hooks let tests reach paths that only happen under real races or
//! backend failures.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned mutex

use crate::mocks::test_clock;
use chrono::{DateTime, TimeDelta, Utc};
use holdfast_core::environment::Clock;
use holdfast_core::ledger::constraints;
use holdfast_core::{
    CatalogStore, Event, EventId, Hold, HoldId, HoldStatus, Ledger, LedgerError, LedgerFuture,
    LedgerTransaction, Order, OrderId, Zone, ZoneId, ZoneUsage,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum RowKey {
    Zone(ZoneId),
    Hold(HoldId),
}

#[derive(Debug, Default)]
struct LedgerState {
    events: Vec<Event>,
    zones: Vec<Zone>,
    holds: Vec<Hold>,
    orders: Vec<Order>,
}

#[derive(Debug, Default)]
struct Faults {
    hidden_idempotency_lookups: usize,
    hidden_order_lookups: usize,
    failed_insert: Option<LedgerError>,
    fail_next_commit: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<LedgerState>,
    row_locks: Mutex<HashMap<RowKey, Arc<tokio::sync::Mutex<()>>>>,
    faults: Mutex<Faults>,
}

/// In-memory ledger and catalog store.
///
/// Cloning shares the underlying data, so a test can keep one handle for
/// assertions while the engines own another.
///
/// # Example
///
/// ```
/// use holdfast_testing::InMemoryLedger;
///
/// let ledger = InMemoryLedger::new();
/// let event = ledger.seed_event("Concert");
/// let zone = ledger.seed_zone(event.id, "Floor", 100);
/// assert_eq!(ledger.zones(), vec![zone]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedger {
    shared: Arc<Shared>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------

    /// Insert an event starting at the default test instant.
    pub fn seed_event(&self, name: &str) -> Event {
        let event = Event {
            id: EventId::new(),
            name: name.to_string(),
            starts_at: test_clock().now(),
        };
        self.shared.state.lock().unwrap().events.push(event.clone());
        event
    }

    /// Insert a zone.
    pub fn seed_zone(&self, event_id: EventId, name: &str, capacity: i32) -> Zone {
        let zone = Zone {
            id: ZoneId::new(),
            event_id,
            name: name.to_string(),
            capacity,
        };
        self.shared.state.lock().unwrap().zones.push(zone.clone());
        zone
    }

    /// Insert an active hold created at `now`, expiring 15 minutes later.
    pub fn seed_hold(
        &self,
        event_id: EventId,
        zone_id: ZoneId,
        quantity: i32,
        idempotency_key: &str,
        now: DateTime<Utc>,
    ) -> Hold {
        let hold = Hold {
            id: HoldId::new(),
            event_id,
            zone_id,
            quantity,
            status: HoldStatus::Active,
            expires_at: now + TimeDelta::minutes(15),
            idempotency_key: idempotency_key.to_string(),
            created_at: now,
        };
        self.shared.state.lock().unwrap().holds.push(hold.clone());
        hold
    }

    /// Insert an order for a hold without touching the hold's status.
    pub fn seed_order(&self, hold_id: HoldId, idempotency_key: &str, now: DateTime<Utc>) -> Order {
        let order = Order {
            id: OrderId::new(),
            hold_id,
            idempotency_key: idempotency_key.to_string(),
            created_at: now,
        };
        self.shared.state.lock().unwrap().orders.push(order.clone());
        order
    }

    /// Overwrite a committed hold's status.
    pub fn set_hold_status(&self, hold_id: HoldId, status: HoldStatus) {
        let mut state = self.shared.state.lock().unwrap();
        if let Some(hold) = state.holds.iter_mut().find(|h| h.id == hold_id) {
            hold.status = status;
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Committed events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.shared.state.lock().unwrap().events.clone()
    }

    /// Committed zones, oldest first.
    #[must_use]
    pub fn zones(&self) -> Vec<Zone> {
        self.shared.state.lock().unwrap().zones.clone()
    }

    /// Committed holds, oldest first.
    #[must_use]
    pub fn holds(&self) -> Vec<Hold> {
        self.shared.state.lock().unwrap().holds.clone()
    }

    /// A committed hold by id.
    #[must_use]
    pub fn hold(&self, hold_id: HoldId) -> Option<Hold> {
        self.shared
            .state
            .lock()
            .unwrap()
            .holds
            .iter()
            .find(|h| h.id == hold_id)
            .cloned()
    }

    /// Committed orders, oldest first.
    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.shared.state.lock().unwrap().orders.clone()
    }

    // ------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------

    /// Make the next `count` idempotency-key lookups report no hold.
    ///
    /// Simulates a concurrent request committing between the lookup and the
    /// insert, which drives the engine into its reconcile path.
    pub fn hide_next_idempotency_lookups(&self, count: usize) {
        self.shared.faults.lock().unwrap().hidden_idempotency_lookups = count;
    }

    /// Make the next `count` order-by-hold lookups report no order.
    pub fn hide_next_order_lookups(&self, count: usize) {
        self.shared.faults.lock().unwrap().hidden_order_lookups = count;
    }

    /// Fail the next hold or order insert with `error`. Nothing is staged.
    pub fn fail_next_insert(&self, error: LedgerError) {
        self.shared.faults.lock().unwrap().failed_insert = Some(error);
    }

    /// Fail the next commit with a database error. Nothing is applied.
    pub fn fail_next_commit(&self) {
        self.shared.faults.lock().unwrap().fail_next_commit = true;
    }
}

impl Shared {
    fn take_fault(&self, pick: impl FnOnce(&mut Faults) -> bool) -> bool {
        pick(&mut *self.faults.lock().unwrap())
    }

    fn take_insert_failure(&self) -> Result<(), LedgerError> {
        self.faults.lock().unwrap().failed_insert.take().map_or(Ok(()), Err)
    }

    fn row_lock(&self, row: RowKey) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.row_locks.lock().unwrap().entry(row).or_default())
    }
}

fn consume(counter: &mut usize) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

fn hold_conflicts(a: &Hold, b: &Hold) -> bool {
    a.event_id == b.event_id && a.zone_id == b.zone_id && a.idempotency_key == b.idempotency_key
}

impl Ledger for InMemoryLedger {
    fn begin(&self) -> LedgerFuture<'_, Box<dyn LedgerTransaction>> {
        let tx = InMemoryTransaction {
            shared: Arc::clone(&self.shared),
            guards: HashMap::new(),
            staged_holds: Vec::new(),
            staged_orders: Vec::new(),
            staged_status: HashMap::new(),
        };
        Box::pin(async move { Ok(Box::new(tx) as Box<dyn LedgerTransaction>) })
    }

    fn ping(&self) -> LedgerFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

/// Transaction over an [`InMemoryLedger`].
///
/// Dropping it discards staged writes and releases its row locks.
pub struct InMemoryTransaction {
    shared: Arc<Shared>,
    guards: HashMap<RowKey, OwnedMutexGuard<()>>,
    staged_holds: Vec<Hold>,
    staged_orders: Vec<Order>,
    staged_status: HashMap<HoldId, HoldStatus>,
}

impl std::fmt::Debug for InMemoryTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransaction")
            .field("locked_rows", &self.guards.len())
            .field("staged_holds", &self.staged_holds.len())
            .field("staged_orders", &self.staged_orders.len())
            .finish_non_exhaustive()
    }
}

impl InMemoryTransaction {
    async fn lock_row(&mut self, row: RowKey) {
        if self.guards.contains_key(&row) {
            return;
        }
        let mutex = self.shared.row_lock(row);
        let guard = mutex.lock_owned().await;
        self.guards.insert(row, guard);
    }

    /// Committed holds overlaid with this transaction's writes.
    fn visible_holds(&self) -> Vec<Hold> {
        let committed = self.shared.state.lock().unwrap().holds.clone();
        committed
            .into_iter()
            .chain(self.staged_holds.iter().cloned())
            .map(|mut hold| {
                if let Some(status) = self.staged_status.get(&hold.id) {
                    hold.status = *status;
                }
                hold
            })
            .collect()
    }

    fn visible_orders(&self) -> Vec<Order> {
        let committed = self.shared.state.lock().unwrap().orders.clone();
        committed
            .into_iter()
            .chain(self.staged_orders.iter().cloned())
            .collect()
    }

    fn sum_holds(
        &self,
        event_id: EventId,
        zone_id: ZoneId,
        counts: impl Fn(&Hold) -> bool,
    ) -> i64 {
        self.visible_holds()
            .iter()
            .filter(|h| h.event_id == event_id && h.zone_id == zone_id && counts(h))
            .map(|h| i64::from(h.quantity))
            .sum()
    }
}

impl LedgerTransaction for InMemoryTransaction {
    fn zone_for_update(
        &mut self,
        event_id: EventId,
        zone_id: ZoneId,
    ) -> LedgerFuture<'_, Option<Zone>> {
        Box::pin(async move {
            self.lock_row(RowKey::Zone(zone_id)).await;
            let state = self.shared.state.lock().unwrap();
            Ok(state
                .zones
                .iter()
                .find(|z| z.id == zone_id && z.event_id == event_id)
                .cloned())
        })
    }

    fn hold_by_idempotency_key<'a>(
        &'a mut self,
        event_id: EventId,
        zone_id: ZoneId,
        idempotency_key: &'a str,
    ) -> LedgerFuture<'a, Option<Hold>> {
        Box::pin(async move {
            if self
                .shared
                .take_fault(|f| consume(&mut f.hidden_idempotency_lookups))
            {
                return Ok(None);
            }
            Ok(self.visible_holds().into_iter().find(|h| {
                h.event_id == event_id
                    && h.zone_id == zone_id
                    && h.idempotency_key == idempotency_key
            }))
        })
    }

    fn sum_active_holds(
        &mut self,
        event_id: EventId,
        zone_id: ZoneId,
        now: DateTime<Utc>,
    ) -> LedgerFuture<'_, i64> {
        Box::pin(async move { Ok(self.sum_holds(event_id, zone_id, |h| h.is_live_at(now))) })
    }

    fn sum_confirmed_holds(
        &mut self,
        event_id: EventId,
        zone_id: ZoneId,
    ) -> LedgerFuture<'_, i64> {
        Box::pin(async move {
            Ok(self.sum_holds(event_id, zone_id, |h| h.status == HoldStatus::Confirmed))
        })
    }

    fn insert_hold<'a>(&'a mut self, hold: &'a Hold) -> LedgerFuture<'a, ()> {
        Box::pin(async move {
            self.shared.take_insert_failure()?;
            if self.visible_holds().iter().any(|h| hold_conflicts(h, hold)) {
                return Err(LedgerError::UniqueViolation {
                    constraint: constraints::HOLDS_IDEMPOTENCY_KEY.to_string(),
                });
            }
            self.staged_holds.push(hold.clone());
            Ok(())
        })
    }

    fn hold_for_update(&mut self, hold_id: HoldId) -> LedgerFuture<'_, Option<Hold>> {
        Box::pin(async move {
            self.lock_row(RowKey::Hold(hold_id)).await;
            Ok(self.visible_holds().into_iter().find(|h| h.id == hold_id))
        })
    }

    fn update_hold_status(
        &mut self,
        hold_id: HoldId,
        status: HoldStatus,
    ) -> LedgerFuture<'_, bool> {
        Box::pin(async move {
            if !self.visible_holds().iter().any(|h| h.id == hold_id) {
                return Ok(false);
            }
            self.staged_status.insert(hold_id, status);
            Ok(true)
        })
    }

    fn order_by_hold_id(&mut self, hold_id: HoldId) -> LedgerFuture<'_, Option<Order>> {
        Box::pin(async move {
            if self
                .shared
                .take_fault(|f| consume(&mut f.hidden_order_lookups))
            {
                return Ok(None);
            }
            Ok(self.visible_orders().into_iter().find(|o| o.hold_id == hold_id))
        })
    }

    fn insert_order<'a>(&'a mut self, order: &'a Order) -> LedgerFuture<'a, ()> {
        Box::pin(async move {
            self.shared.take_insert_failure()?;
            if self.visible_orders().iter().any(|o| o.hold_id == order.hold_id) {
                return Err(LedgerError::UniqueViolation {
                    constraint: constraints::ORDERS_HOLD_ID.to_string(),
                });
            }
            self.staged_orders.push(order.clone());
            Ok(())
        })
    }

    fn commit(self: Box<Self>) -> LedgerFuture<'static, ()> {
        Box::pin(async move {
            if self.shared.take_fault(|f| std::mem::take(&mut f.fail_next_commit)) {
                return Err(LedgerError::Database("simulated commit failure".to_string()));
            }

            let mut state = self.shared.state.lock().unwrap();

            for hold in &self.staged_holds {
                if state.holds.iter().any(|h| hold_conflicts(h, hold)) {
                    return Err(LedgerError::UniqueViolation {
                        constraint: constraints::HOLDS_IDEMPOTENCY_KEY.to_string(),
                    });
                }
            }
            for order in &self.staged_orders {
                if state.orders.iter().any(|o| o.hold_id == order.hold_id) {
                    return Err(LedgerError::UniqueViolation {
                        constraint: constraints::ORDERS_HOLD_ID.to_string(),
                    });
                }
            }

            state.holds.extend(self.staged_holds.iter().cloned());
            state.orders.extend(self.staged_orders.iter().cloned());
            for hold in &mut state.holds {
                if let Some(status) = self.staged_status.get(&hold.id) {
                    hold.status = *status;
                }
            }
            Ok(())
        })
    }

    fn rollback(self: Box<Self>) -> LedgerFuture<'static, ()> {
        Box::pin(async move {
            drop(self);
            Ok(())
        })
    }
}

impl CatalogStore for InMemoryLedger {
    fn insert_event<'a>(&'a self, event: &'a Event) -> LedgerFuture<'a, ()> {
        Box::pin(async move {
            self.shared.state.lock().unwrap().events.push(event.clone());
            Ok(())
        })
    }

    fn list_events(&self) -> LedgerFuture<'_, Vec<Event>> {
        Box::pin(async move { Ok(self.events()) })
    }

    fn event_exists(&self, event_id: EventId) -> LedgerFuture<'_, bool> {
        Box::pin(async move {
            let state = self.shared.state.lock().unwrap();
            Ok(state.events.iter().any(|e| e.id == event_id))
        })
    }

    fn insert_zone<'a>(&'a self, zone: &'a Zone) -> LedgerFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.shared.state.lock().unwrap();
            if !state.events.iter().any(|e| e.id == zone.event_id) {
                return Err(LedgerError::ForeignKeyViolation {
                    constraint: constraints::ZONES_EVENT_FK.to_string(),
                });
            }
            if state
                .zones
                .iter()
                .any(|z| z.event_id == zone.event_id && z.name == zone.name)
            {
                return Err(LedgerError::UniqueViolation {
                    constraint: constraints::ZONES_EVENT_NAME.to_string(),
                });
            }
            state.zones.push(zone.clone());
            Ok(())
        })
    }

    fn list_zones(&self, event_id: EventId) -> LedgerFuture<'_, Vec<Zone>> {
        Box::pin(async move {
            let state = self.shared.state.lock().unwrap();
            Ok(state
                .zones
                .iter()
                .filter(|z| z.event_id == event_id)
                .cloned()
                .collect())
        })
    }

    fn zone_usage(
        &self,
        event_id: EventId,
        zone_id: ZoneId,
        now: DateTime<Utc>,
    ) -> LedgerFuture<'_, Option<ZoneUsage>> {
        Box::pin(async move {
            let state = self.shared.state.lock().unwrap();
            let Some(zone) = state
                .zones
                .iter()
                .find(|z| z.id == zone_id && z.event_id == event_id)
                .cloned()
            else {
                return Ok(None);
            };

            let zone_holds = || {
                state
                    .holds
                    .iter()
                    .filter(|h| h.event_id == event_id && h.zone_id == zone_id)
            };
            let active = zone_holds()
                .filter(|h| h.is_live_at(now))
                .map(|h| i64::from(h.quantity))
                .sum();
            let confirmed = zone_holds()
                .filter(|h| h.status == HoldStatus::Confirmed)
                .map(|h| i64::from(h.quantity))
                .sum();

            Ok(Some(ZoneUsage {
                zone,
                active,
                confirmed,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn seeded() -> (InMemoryLedger, Zone) {
        let ledger = InMemoryLedger::new();
        let event = ledger.seed_event("Concert");
        let zone = ledger.seed_zone(event.id, "Floor", 10);
        (ledger, zone)
    }

    fn hold_for(zone: &Zone, key: &str, quantity: i32) -> Hold {
        let now = test_clock().now();
        Hold {
            id: HoldId::new(),
            event_id: zone.event_id,
            zone_id: zone.id,
            quantity,
            status: HoldStatus::Active,
            expires_at: now + TimeDelta::minutes(15),
            idempotency_key: key.to_string(),
            created_at: now,
        }
    }

    #[tokio::test]
    async fn writes_are_invisible_until_commit() {
        let (ledger, zone) = seeded();
        let mut tx = ledger.begin().await.unwrap();
        let hold = hold_for(&zone, "k1", 2);

        tx.insert_hold(&hold).await.unwrap();
        assert!(ledger.holds().is_empty());
        assert_eq!(
            tx.sum_active_holds(zone.event_id, zone.id, test_clock().now())
                .await
                .unwrap(),
            2
        );

        tx.commit().await.unwrap();
        assert_eq!(ledger.holds(), vec![hold]);
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let (ledger, zone) = seeded();
        {
            let mut tx = ledger.begin().await.unwrap();
            tx.insert_hold(&hold_for(&zone, "k1", 2)).await.unwrap();
        }
        assert!(ledger.holds().is_empty());
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_is_a_unique_violation() {
        let (ledger, zone) = seeded();
        ledger.seed_hold(zone.event_id, zone.id, 1, "k1", test_clock().now());

        let mut tx = ledger.begin().await.unwrap();
        let error = tx.insert_hold(&hold_for(&zone, "k1", 1)).await.unwrap_err();
        assert!(error.is_unique_violation());
    }

    #[tokio::test]
    async fn second_order_for_a_hold_is_a_unique_violation() {
        let (ledger, zone) = seeded();
        let hold = ledger.seed_hold(zone.event_id, zone.id, 1, "k1", test_clock().now());
        ledger.seed_order(hold.id, "c1", test_clock().now());

        let mut tx = ledger.begin().await.unwrap();
        let order = Order {
            id: OrderId::new(),
            hold_id: hold.id,
            idempotency_key: "c2".to_string(),
            created_at: test_clock().now(),
        };
        let error = tx.insert_order(&order).await.unwrap_err();
        assert!(error.is_unique_violation());
    }

    #[tokio::test(start_paused = true)]
    async fn zone_lock_blocks_until_release() {
        let (ledger, zone) = seeded();

        let mut first = ledger.begin().await.unwrap();
        first
            .zone_for_update(zone.event_id, zone.id)
            .await
            .unwrap();

        let mut second = ledger.begin().await.unwrap();
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            second.zone_for_update(zone.event_id, zone.id),
        )
        .await;
        assert!(blocked.is_err(), "second transaction should wait for the lock");

        first.commit().await.unwrap();
        let locked = second
            .zone_for_update(zone.event_id, zone.id)
            .await
            .unwrap();
        assert_eq!(locked, Some(zone));
    }

    #[tokio::test]
    async fn relocking_within_a_transaction_does_not_deadlock() {
        let (ledger, zone) = seeded();
        let mut tx = ledger.begin().await.unwrap();
        tx.zone_for_update(zone.event_id, zone.id).await.unwrap();
        let again = tx.zone_for_update(zone.event_id, zone.id).await.unwrap();
        assert_eq!(again, Some(zone));
    }

    #[tokio::test]
    async fn status_updates_apply_on_commit() {
        let (ledger, zone) = seeded();
        let hold = ledger.seed_hold(zone.event_id, zone.id, 3, "k1", test_clock().now());

        let mut tx = ledger.begin().await.unwrap();
        assert!(
            tx.update_hold_status(hold.id, HoldStatus::Confirmed)
                .await
                .unwrap()
        );
        assert!(
            !tx.update_hold_status(HoldId::new(), HoldStatus::Confirmed)
                .await
                .unwrap()
        );
        assert_eq!(
            tx.sum_confirmed_holds(zone.event_id, zone.id).await.unwrap(),
            3
        );
        assert_eq!(ledger.hold(hold.id).unwrap().status, HoldStatus::Active);

        tx.commit().await.unwrap();
        assert_eq!(ledger.hold(hold.id).unwrap().status, HoldStatus::Confirmed);
    }

    #[tokio::test]
    async fn insert_zone_enforces_event_and_name() {
        let (ledger, zone) = seeded();

        let orphan = Zone {
            id: ZoneId::new(),
            event_id: EventId::new(),
            name: "Floor".to_string(),
            capacity: 5,
        };
        assert!(matches!(
            ledger.insert_zone(&orphan).await,
            Err(LedgerError::ForeignKeyViolation { .. })
        ));

        let duplicate = Zone {
            id: ZoneId::new(),
            ..zone
        };
        assert!(matches!(
            ledger.insert_zone(&duplicate).await,
            Err(LedgerError::UniqueViolation { .. })
        ));
    }

    #[tokio::test]
    async fn failed_commit_applies_nothing() {
        let (ledger, zone) = seeded();
        ledger.fail_next_commit();

        let mut tx = ledger.begin().await.unwrap();
        tx.insert_hold(&hold_for(&zone, "k1", 1)).await.unwrap();
        assert!(matches!(
            tx.commit().await,
            Err(LedgerError::Database(_))
        ));
        assert!(ledger.holds().is_empty());
    }
}
