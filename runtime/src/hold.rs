//! Hold engine: turns a request for `quantity` units of a zone into a hold.
//!
//! # Algorithm
//!
//! Inside one transaction:
//!
//! 1. Look the idempotency key up. A hit with the same quantity is replayed
//!    as-is; a hit with a different quantity is an `IdempotencyConflict`.
//! 2. Lock the zone row. Every concurrent hold on the zone queues here.
//!    Once the lock is held, look the key up again: a same-key request that
//!    queued behind us may have committed while we waited.
//! 3. Sum active unexpired holds and confirmed holds, and compare against the
//!    zone capacity.
//! 4. Insert the new hold. If the insert loses a race on the idempotency key,
//!    re-read and reconcile as in step 1.
//!
//! Expired holds drop out of the active sum on their own, so no sweeper is
//! needed to reclaim capacity.

use crate::deadline::Deadline;
use crate::metrics::HoldMetrics;
use chrono::TimeDelta;
use holdfast_core::environment::Clock;
use holdfast_core::ledger::{available_capacity, constraints};
use holdfast_core::{
    EventId, Hold, HoldId, HoldStatus, Ledger, LedgerError, LedgerTransaction, ReservationError,
    Result, ZoneId,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Default lifetime of a new hold.
pub const DEFAULT_HOLD_TTL: TimeDelta = TimeDelta::minutes(15);

/// Hold engine settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HoldEngineConfig {
    /// How long a new hold claims capacity.
    pub hold_ttl: TimeDelta,
}

impl HoldEngineConfig {
    /// Override the hold lifetime. Non-positive values keep the current one.
    #[must_use]
    pub fn with_hold_ttl(mut self, hold_ttl: TimeDelta) -> Self {
        if hold_ttl > TimeDelta::zero() {
            self.hold_ttl = hold_ttl;
        }
        self
    }
}

impl Default for HoldEngineConfig {
    fn default() -> Self {
        Self {
            hold_ttl: DEFAULT_HOLD_TTL,
        }
    }
}

/// Request to place a hold.
///
/// Identifiers arrive as caller-supplied strings and are parsed by the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateHoldInput {
    /// Event identifier
    pub event_id: String,
    /// Zone identifier
    pub zone_id: String,
    /// Units requested
    pub quantity: i32,
    /// Caller-chosen key making retries safe
    pub idempotency_key: String,
}

/// How a hold request was satisfied.
#[derive(Clone, Debug, PartialEq, Eq)]
enum HoldOutcome {
    Created(Hold),
    Replayed(Hold),
}

impl HoldOutcome {
    fn into_hold(self) -> Hold {
        match self {
            Self::Created(hold) | Self::Replayed(hold) => hold,
        }
    }
}

/// Creates holds against zone capacity.
///
/// Stateless between calls; cheap to clone and share across request handlers.
#[derive(Clone)]
pub struct HoldEngine {
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    config: HoldEngineConfig,
}

impl HoldEngine {
    /// Create a hold engine.
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>, clock: Arc<dyn Clock>, config: HoldEngineConfig) -> Self {
        Self {
            ledger,
            clock,
            config,
        }
    }

    /// Engine settings.
    #[must_use]
    pub const fn config(&self) -> &HoldEngineConfig {
        &self.config
    }

    /// Place a hold, or return the hold previously placed with the same key.
    ///
    /// # Errors
    ///
    /// - `InvalidQuantity`: quantity is zero or negative
    /// - `IdempotencyKeyRequired`: the key is blank
    /// - `InvalidId`: an identifier is not a UUID
    /// - `IdempotencyConflict`: the key was used with a different quantity
    /// - `ZoneNotFound`: no such zone under the event
    /// - `InsufficientCapacity`: the zone cannot fit the quantity
    /// - `DeadlineExceeded`: `deadline` passed first; nothing was written
    /// - `Internal`: storage failure
    #[tracing::instrument(
        name = "create_hold",
        skip(self, input, deadline),
        fields(event_id = %input.event_id, zone_id = %input.zone_id, quantity = input.quantity)
    )]
    pub async fn create_hold(&self, input: CreateHoldInput, deadline: Deadline) -> Result<Hold> {
        let started = Instant::now();
        let result = self.try_create_hold(&input, deadline).await;

        match &result {
            Ok(HoldOutcome::Created(hold)) => {
                info!(hold_id = %hold.id, expires_at = %hold.expires_at, "Hold created");
                HoldMetrics::record_created(started.elapsed());
            }
            Ok(HoldOutcome::Replayed(hold)) => {
                debug!(hold_id = %hold.id, "Hold replayed for idempotency key");
                HoldMetrics::record_replayed(started.elapsed());
            }
            Err(e) if e.is_internal() => {
                error!(error = %e, "Hold creation failed");
                HoldMetrics::record_rejected(e, started.elapsed());
            }
            Err(e) => {
                debug!(code = e.code(), "Hold rejected");
                HoldMetrics::record_rejected(e, started.elapsed());
            }
        }

        result.map(HoldOutcome::into_hold)
    }

    async fn try_create_hold(
        &self,
        input: &CreateHoldInput,
        deadline: Deadline,
    ) -> Result<HoldOutcome> {
        if input.quantity <= 0 {
            return Err(ReservationError::InvalidQuantity);
        }
        if input.idempotency_key.trim().is_empty() {
            return Err(ReservationError::IdempotencyKeyRequired);
        }
        let event_id = EventId::parse(&input.event_id)?;
        let zone_id = ZoneId::parse(&input.zone_id)?;

        let request = HoldRequest {
            event_id,
            zone_id,
            quantity: input.quantity,
            idempotency_key: &input.idempotency_key,
            now: self.clock.now(),
        };

        deadline.run(self.create_in_transaction(request)).await
    }

    async fn create_in_transaction(&self, request: HoldRequest<'_>) -> Result<HoldOutcome> {
        let mut tx = self.ledger.begin().await?;

        if let Some(existing) = tx
            .hold_by_idempotency_key(request.event_id, request.zone_id, request.idempotency_key)
            .await?
        {
            let outcome = reconcile(existing, request.quantity)?;
            tx.commit().await?;
            return Ok(outcome);
        }

        let zone = tx
            .zone_for_update(request.event_id, request.zone_id)
            .await?
            .ok_or(ReservationError::ZoneNotFound)?;

        if let Some(existing) = tx
            .hold_by_idempotency_key(request.event_id, request.zone_id, request.idempotency_key)
            .await?
        {
            debug!("Idempotency key claimed while waiting for the zone lock");
            let outcome = reconcile(existing, request.quantity)?;
            tx.commit().await?;
            return Ok(outcome);
        }

        let active = tx
            .sum_active_holds(request.event_id, request.zone_id, request.now)
            .await?;
        let confirmed = tx
            .sum_confirmed_holds(request.event_id, request.zone_id)
            .await?;

        let available = available_capacity(zone.capacity, active, confirmed);
        if i64::from(request.quantity) > available {
            return Err(ReservationError::InsufficientCapacity {
                requested: request.quantity,
                available,
            });
        }

        let hold = Hold {
            id: HoldId::new(),
            event_id: request.event_id,
            zone_id: request.zone_id,
            quantity: request.quantity,
            status: HoldStatus::Active,
            expires_at: request.now + self.config.hold_ttl,
            idempotency_key: request.idempotency_key.to_string(),
            created_at: request.now,
        };

        match tx.insert_hold(&hold).await {
            Ok(()) => {}
            Err(LedgerError::UniqueViolation { constraint })
                if constraint == constraints::HOLDS_IDEMPOTENCY_KEY =>
            {
                warn!("Concurrent request claimed the idempotency key first, reconciling");
                return reconcile_after_race(tx, &request, constraint).await;
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        Ok(HoldOutcome::Created(hold))
    }
}

impl std::fmt::Debug for HoldEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HoldEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Validated request, read once at the start of the call.
struct HoldRequest<'a> {
    event_id: EventId,
    zone_id: ZoneId,
    quantity: i32,
    idempotency_key: &'a str,
    now: chrono::DateTime<chrono::Utc>,
}

fn reconcile(existing: Hold, quantity: i32) -> Result<HoldOutcome> {
    if existing.quantity == quantity {
        Ok(HoldOutcome::Replayed(existing))
    } else {
        Err(ReservationError::IdempotencyConflict)
    }
}

async fn reconcile_after_race(
    mut tx: Box<dyn LedgerTransaction>,
    request: &HoldRequest<'_>,
    constraint: String,
) -> Result<HoldOutcome> {
    let Some(existing) = tx
        .hold_by_idempotency_key(request.event_id, request.zone_id, request.idempotency_key)
        .await?
    else {
        return Err(LedgerError::UniqueViolation { constraint }.into());
    };

    let outcome = reconcile(existing, request.quantity)?;
    tx.commit().await?;
    Ok(outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Test code
mod tests {
    use super::*;
    use holdfast_core::environment::Clock;
    use holdfast_core::{Event, Zone};
    use holdfast_testing::{InMemoryLedger, ManualClock, test_clock};
    use std::time::Duration;

    struct Fixture {
        ledger: InMemoryLedger,
        clock: ManualClock,
        engine: HoldEngine,
        event: Event,
        zone: Zone,
    }

    fn fixture(capacity: i32) -> Fixture {
        let ledger = InMemoryLedger::new();
        let clock = ManualClock::new(test_clock().now());
        let event = ledger.seed_event("Concert");
        let zone = ledger.seed_zone(event.id, "Floor", capacity);
        let engine = HoldEngine::new(
            Arc::new(ledger.clone()),
            Arc::new(clock.clone()),
            HoldEngineConfig::default(),
        );
        Fixture {
            ledger,
            clock,
            engine,
            event,
            zone,
        }
    }

    fn input(f: &Fixture, quantity: i32, key: &str) -> CreateHoldInput {
        CreateHoldInput {
            event_id: f.event.id.to_string(),
            zone_id: f.zone.id.to_string(),
            quantity,
            idempotency_key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn creates_active_hold_with_ttl() {
        let f = fixture(100);
        let hold = f
            .engine
            .create_hold(input(&f, 30, "k1"), Deadline::none())
            .await
            .unwrap();

        assert_eq!(hold.quantity, 30);
        assert_eq!(hold.status, HoldStatus::Active);
        assert_eq!(hold.created_at, f.clock.now());
        assert_eq!(hold.expires_at, f.clock.now() + DEFAULT_HOLD_TTL);
        assert_eq!(f.ledger.holds(), vec![hold]);
    }

    #[tokio::test]
    async fn rejects_non_positive_quantity_before_storage() {
        let f = fixture(100);
        for quantity in [0, -3] {
            let result = f
                .engine
                .create_hold(input(&f, quantity, "k1"), Deadline::none())
                .await;
            assert!(matches!(result, Err(ReservationError::InvalidQuantity)));
        }
        assert!(f.ledger.holds().is_empty());
    }

    #[tokio::test]
    async fn rejects_blank_idempotency_key() {
        let f = fixture(100);
        let result = f
            .engine
            .create_hold(input(&f, 1, "   "), Deadline::none())
            .await;
        assert!(matches!(result, Err(ReservationError::IdempotencyKeyRequired)));
    }

    #[tokio::test]
    async fn rejects_malformed_ids() {
        let f = fixture(100);
        let mut request = input(&f, 1, "k1");
        request.zone_id = "zone-1".to_string();

        let result = f.engine.create_hold(request, Deadline::none()).await;
        assert!(matches!(result, Err(ReservationError::InvalidId)));
    }

    #[tokio::test]
    async fn unknown_zone_is_not_found() {
        let f = fixture(100);
        let mut request = input(&f, 1, "k1");
        request.zone_id = ZoneId::new().to_string();

        let result = f.engine.create_hold(request, Deadline::none()).await;
        assert!(matches!(result, Err(ReservationError::ZoneNotFound)));
    }

    #[tokio::test]
    async fn zone_under_another_event_is_not_found() {
        let f = fixture(100);
        let other = f.ledger.seed_event("Other");
        let mut request = input(&f, 1, "k1");
        request.event_id = other.id.to_string();

        let result = f.engine.create_hold(request, Deadline::none()).await;
        assert!(matches!(result, Err(ReservationError::ZoneNotFound)));
    }

    #[tokio::test]
    async fn same_key_and_quantity_replays_the_hold() {
        let f = fixture(100);
        let first = f
            .engine
            .create_hold(input(&f, 5, "k1"), Deadline::none())
            .await
            .unwrap();
        let second = f
            .engine
            .create_hold(input(&f, 5, "k1"), Deadline::none())
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(f.ledger.holds().len(), 1);
    }

    #[tokio::test]
    async fn replay_skips_the_capacity_check() {
        let f = fixture(10);
        let first = f
            .engine
            .create_hold(input(&f, 10, "k1"), Deadline::none())
            .await
            .unwrap();

        // Zone is full, yet the retry still resolves to the original hold
        let again = f
            .engine
            .create_hold(input(&f, 10, "k1"), Deadline::none())
            .await
            .unwrap();
        assert_eq!(first.id, again.id);
    }

    #[tokio::test]
    async fn same_key_different_quantity_conflicts() {
        let f = fixture(100);
        let original = f
            .engine
            .create_hold(input(&f, 5, "k1"), Deadline::none())
            .await
            .unwrap();

        let result = f
            .engine
            .create_hold(input(&f, 6, "k1"), Deadline::none())
            .await;
        assert!(matches!(result, Err(ReservationError::IdempotencyConflict)));
        assert_eq!(f.ledger.holds(), vec![original]);
    }

    #[tokio::test]
    async fn insufficient_capacity_reports_what_is_left() {
        let f = fixture(100);
        f.engine
            .create_hold(input(&f, 30, "k1"), Deadline::none())
            .await
            .unwrap();

        let result = f
            .engine
            .create_hold(input(&f, 80, "k2"), Deadline::none())
            .await;
        match result {
            Err(ReservationError::InsufficientCapacity {
                requested,
                available,
            }) => {
                assert_eq!(requested, 80);
                assert_eq!(available, 70);
            }
            other => panic!("expected InsufficientCapacity, got {other:?}"),
        }
        assert_eq!(f.ledger.holds().len(), 1);
    }

    #[tokio::test]
    async fn expired_holds_release_capacity() {
        let f = fixture(10);
        f.engine
            .create_hold(input(&f, 10, "k1"), Deadline::none())
            .await
            .unwrap();

        let full = f
            .engine
            .create_hold(input(&f, 1, "k2"), Deadline::none())
            .await;
        assert!(matches!(
            full,
            Err(ReservationError::InsufficientCapacity { .. })
        ));

        // Exactly at expiry the first hold no longer counts
        f.clock.advance(DEFAULT_HOLD_TTL);
        let hold = f
            .engine
            .create_hold(input(&f, 10, "k3"), Deadline::none())
            .await
            .unwrap();
        assert_eq!(hold.quantity, 10);
    }

    #[tokio::test]
    async fn confirmed_holds_keep_counting_after_expiry() {
        let f = fixture(10);
        let hold = f
            .engine
            .create_hold(input(&f, 4, "k1"), Deadline::none())
            .await
            .unwrap();
        f.ledger.set_hold_status(hold.id, HoldStatus::Confirmed);

        f.clock.advance(TimeDelta::hours(2));
        let result = f
            .engine
            .create_hold(input(&f, 7, "k2"), Deadline::none())
            .await;
        assert!(matches!(
            result,
            Err(ReservationError::InsufficientCapacity { available: 6, .. })
        ));
    }

    #[tokio::test]
    async fn custom_ttl_is_applied() {
        let f = fixture(10);
        let engine = HoldEngine::new(
            Arc::new(f.ledger.clone()),
            Arc::new(f.clock.clone()),
            HoldEngineConfig::default().with_hold_ttl(TimeDelta::seconds(30)),
        );

        let hold = engine
            .create_hold(input(&f, 1, "k1"), Deadline::none())
            .await
            .unwrap();
        assert_eq!(hold.expires_at - hold.created_at, TimeDelta::seconds(30));
    }

    #[test]
    fn non_positive_ttl_keeps_default() {
        let config = HoldEngineConfig::default().with_hold_ttl(TimeDelta::zero());
        assert_eq!(config.hold_ttl, DEFAULT_HOLD_TTL);
    }

    #[tokio::test]
    async fn lost_insert_race_converges_on_the_winner() {
        let f = fixture(100);
        let winner = f.ledger.seed_hold(f.event.id, f.zone.id, 3, "k1", f.clock.now());
        f.ledger.hide_next_idempotency_lookups(2);

        let hold = f
            .engine
            .create_hold(input(&f, 3, "k1"), Deadline::none())
            .await
            .unwrap();
        assert_eq!(hold.id, winner.id);
        assert_eq!(f.ledger.holds().len(), 1);
    }

    #[tokio::test]
    async fn lost_insert_race_with_other_quantity_conflicts() {
        let f = fixture(100);
        f.ledger.seed_hold(f.event.id, f.zone.id, 3, "k1", f.clock.now());
        f.ledger.hide_next_idempotency_lookups(2);

        let result = f
            .engine
            .create_hold(input(&f, 4, "k1"), Deadline::none())
            .await;
        assert!(matches!(result, Err(ReservationError::IdempotencyConflict)));
    }

    #[tokio::test(start_paused = true)]
    async fn same_key_queued_on_zone_lock_replays_the_winner() {
        let f = fixture(10);

        // Both requests miss the key lookup and queue behind this lock
        let mut blocker = f.ledger.begin().await.unwrap();
        blocker
            .zone_for_update(f.event.id, f.zone.id)
            .await
            .unwrap()
            .unwrap();

        let first = tokio::spawn({
            let engine = f.engine.clone();
            let input = input(&f, 10, "same");
            async move { engine.create_hold(input, Deadline::none()).await }
        });
        let second = tokio::spawn({
            let engine = f.engine.clone();
            let input = input(&f, 10, "same");
            async move { engine.create_hold(input, Deadline::none()).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(blocker);

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(f.ledger.holds().len(), 1);
    }

    #[tokio::test]
    async fn unrelated_unique_violation_is_not_reconciled() {
        let f = fixture(100);
        f.ledger.fail_next_insert(LedgerError::UniqueViolation {
            constraint: constraints::ZONES_EVENT_NAME.to_string(),
        });

        let result = f
            .engine
            .create_hold(input(&f, 1, "k1"), Deadline::none())
            .await;
        assert!(matches!(
            result,
            Err(ReservationError::Internal(LedgerError::UniqueViolation { .. }))
        ));
        assert!(f.ledger.holds().is_empty());
    }

    #[tokio::test]
    async fn failed_commit_leaves_nothing_behind() {
        let f = fixture(100);
        f.ledger.fail_next_commit();

        let result = f
            .engine
            .create_hold(input(&f, 1, "k1"), Deadline::none())
            .await;
        assert!(matches!(result, Err(ReservationError::Internal(_))));
        assert!(f.ledger.holds().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_while_waiting_for_zone_lock_rolls_back() {
        let f = fixture(100);

        // Another transaction holds the zone row lock
        let mut blocker = f.ledger.begin().await.unwrap();
        blocker
            .zone_for_update(f.event.id, f.zone.id)
            .await
            .unwrap()
            .unwrap();

        let result = f
            .engine
            .create_hold(
                input(&f, 1, "k1"),
                Deadline::after(Duration::from_millis(100)),
            )
            .await;
        assert!(matches!(result, Err(ReservationError::DeadlineExceeded)));
        assert!(f.ledger.holds().is_empty());

        blocker.rollback().await.unwrap();
        let hold = f
            .engine
            .create_hold(input(&f, 1, "k1"), Deadline::none())
            .await
            .unwrap();
        assert_eq!(f.ledger.holds(), vec![hold]);
    }
}
