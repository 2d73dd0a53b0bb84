//! Confirmation engine: converts an active hold into a permanent order.
//!
//! The hold row is locked for the whole transaction, so concurrent
//! confirmations of one hold run one after another. The unique hold id on
//! orders backs that up: a confirmation that loses the insert race re-reads the
//! winner's order and either replays it (same key) or reports the hold as
//! already confirmed.

use crate::deadline::Deadline;
use crate::metrics::OrderMetrics;
use holdfast_core::environment::Clock;
use holdfast_core::ledger::constraints;
use holdfast_core::{
    DateTime, HoldId, HoldStatus, Ledger, LedgerError, LedgerTransaction, Order, OrderId,
    ReservationError, Result, Utc,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Request to confirm a hold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmHoldInput {
    /// Hold identifier as supplied by the caller
    pub hold_id: String,
    /// Caller-chosen key making retries safe
    pub idempotency_key: String,
}

/// Result of a successful confirmation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmHoldOutcome {
    /// The order for the hold
    pub order: Order,
    /// `true` when this call created the order, `false` on an idempotent replay
    pub created: bool,
}

/// Confirms holds into orders.
#[derive(Clone)]
pub struct ConfirmationEngine {
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
}

impl ConfirmationEngine {
    /// Create a confirmation engine.
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, clock }
    }

    /// Confirm a hold, or return the order previously created with the same key.
    ///
    /// # Errors
    ///
    /// - `IdempotencyKeyRequired`: the key is blank
    /// - `InvalidId`: the hold id is not a UUID
    /// - `HoldNotFound`: no such hold
    /// - `HoldAlreadyConfirmed`: confirmed by a request with another key
    /// - `HoldExpired`: the hold's window has elapsed
    /// - `DeadlineExceeded`: `deadline` passed first; nothing was written
    /// - `Internal`: storage failure
    #[tracing::instrument(name = "confirm_hold", skip(self, input, deadline), fields(hold_id = %input.hold_id))]
    pub async fn confirm_hold(
        &self,
        input: ConfirmHoldInput,
        deadline: Deadline,
    ) -> Result<ConfirmHoldOutcome> {
        let started = Instant::now();
        let result = self.try_confirm_hold(&input, deadline).await;

        match &result {
            Ok(outcome) if outcome.created => {
                info!(order_id = %outcome.order.id, "Hold confirmed");
                OrderMetrics::record_created(started.elapsed());
            }
            Ok(outcome) => {
                debug!(order_id = %outcome.order.id, "Confirmation replayed for idempotency key");
                OrderMetrics::record_replayed(started.elapsed());
            }
            Err(e) if e.is_internal() => {
                error!(error = %e, "Hold confirmation failed");
                OrderMetrics::record_rejected(e, started.elapsed());
            }
            Err(e) => {
                debug!(code = e.code(), "Confirmation rejected");
                OrderMetrics::record_rejected(e, started.elapsed());
            }
        }

        result
    }

    async fn try_confirm_hold(
        &self,
        input: &ConfirmHoldInput,
        deadline: Deadline,
    ) -> Result<ConfirmHoldOutcome> {
        if input.idempotency_key.trim().is_empty() {
            return Err(ReservationError::IdempotencyKeyRequired);
        }
        let hold_id = HoldId::parse(&input.hold_id)?;
        let now = self.clock.now();

        deadline
            .run(self.confirm_in_transaction(hold_id, &input.idempotency_key, now))
            .await
    }

    async fn confirm_in_transaction(
        &self,
        hold_id: HoldId,
        idempotency_key: &str,
        now: DateTime<Utc>,
    ) -> Result<ConfirmHoldOutcome> {
        let mut tx = self.ledger.begin().await?;

        let hold = tx
            .hold_for_update(hold_id)
            .await?
            .ok_or(ReservationError::HoldNotFound)?;

        if let Some(existing) = tx.order_by_hold_id(hold_id).await? {
            let outcome = replay(existing, idempotency_key)?;
            tx.commit().await?;
            return Ok(outcome);
        }

        if hold.status == HoldStatus::Confirmed {
            return Err(ReservationError::HoldAlreadyConfirmed);
        }
        if hold.is_expired_at(now) {
            return Err(ReservationError::HoldExpired);
        }

        let order = Order {
            id: OrderId::new(),
            hold_id,
            idempotency_key: idempotency_key.to_string(),
            created_at: now,
        };

        match tx.insert_order(&order).await {
            Ok(()) => {}
            Err(LedgerError::UniqueViolation { constraint })
                if constraint == constraints::ORDERS_HOLD_ID =>
            {
                warn!("Concurrent confirmation created the order first, reconciling");
                return replay_after_race(tx, hold_id, idempotency_key).await;
            }
            Err(e) => return Err(e.into()),
        }

        if !tx
            .update_hold_status(hold_id, HoldStatus::Confirmed)
            .await?
        {
            return Err(ReservationError::HoldNotFound);
        }

        tx.commit().await?;
        Ok(ConfirmHoldOutcome {
            order,
            created: true,
        })
    }
}

impl std::fmt::Debug for ConfirmationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationEngine").finish_non_exhaustive()
    }
}

fn replay(existing: Order, idempotency_key: &str) -> Result<ConfirmHoldOutcome> {
    if existing.idempotency_key == idempotency_key {
        Ok(ConfirmHoldOutcome {
            order: existing,
            created: false,
        })
    } else {
        Err(ReservationError::HoldAlreadyConfirmed)
    }
}

async fn replay_after_race(
    mut tx: Box<dyn LedgerTransaction>,
    hold_id: HoldId,
    idempotency_key: &str,
) -> Result<ConfirmHoldOutcome> {
    let existing = tx
        .order_by_hold_id(hold_id)
        .await?
        .ok_or(ReservationError::HoldAlreadyConfirmed)?;
    let outcome = replay(existing, idempotency_key)?;
    tx.commit().await?;
    Ok(outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use holdfast_core::{Event, Hold, Zone};
    use holdfast_testing::{InMemoryLedger, ManualClock, test_clock};
    use std::time::Duration;

    struct Fixture {
        ledger: InMemoryLedger,
        clock: ManualClock,
        engine: ConfirmationEngine,
        hold: Hold,
    }

    fn fixture() -> Fixture {
        let ledger = InMemoryLedger::new();
        let clock = ManualClock::new(test_clock().now());
        let event: Event = ledger.seed_event("Concert");
        let zone: Zone = ledger.seed_zone(event.id, "Floor", 100);
        let hold = ledger.seed_hold(event.id, zone.id, 2, "h1", clock.now());
        let engine = ConfirmationEngine::new(Arc::new(ledger.clone()), Arc::new(clock.clone()));
        Fixture {
            ledger,
            clock,
            engine,
            hold,
        }
    }

    fn input(hold_id: HoldId, key: &str) -> ConfirmHoldInput {
        ConfirmHoldInput {
            hold_id: hold_id.to_string(),
            idempotency_key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn confirm_creates_order_and_flips_status() {
        let f = fixture();
        let outcome = f
            .engine
            .confirm_hold(input(f.hold.id, "c1"), Deadline::none())
            .await
            .unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.order.hold_id, f.hold.id);
        assert_eq!(outcome.order.idempotency_key, "c1");
        assert_eq!(outcome.order.created_at, f.clock.now());
        assert_eq!(
            f.ledger.hold(f.hold.id).unwrap().status,
            HoldStatus::Confirmed
        );
        assert_eq!(f.ledger.orders(), vec![outcome.order]);
    }

    #[tokio::test]
    async fn same_key_replays_without_creating() {
        let f = fixture();
        let first = f
            .engine
            .confirm_hold(input(f.hold.id, "c1"), Deadline::none())
            .await
            .unwrap();
        let second = f
            .engine
            .confirm_hold(input(f.hold.id, "c1"), Deadline::none())
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.order, second.order);
        assert_eq!(f.ledger.orders().len(), 1);
    }

    #[tokio::test]
    async fn replay_succeeds_even_after_expiry() {
        let f = fixture();
        let first = f
            .engine
            .confirm_hold(input(f.hold.id, "c1"), Deadline::none())
            .await
            .unwrap();

        f.clock.advance(TimeDelta::hours(1));
        let again = f
            .engine
            .confirm_hold(input(f.hold.id, "c1"), Deadline::none())
            .await
            .unwrap();
        assert_eq!(first.order.id, again.order.id);
    }

    #[tokio::test]
    async fn different_key_after_confirm_is_rejected() {
        let f = fixture();
        f.engine
            .confirm_hold(input(f.hold.id, "c1"), Deadline::none())
            .await
            .unwrap();

        let result = f
            .engine
            .confirm_hold(input(f.hold.id, "c2"), Deadline::none())
            .await;
        assert!(matches!(result, Err(ReservationError::HoldAlreadyConfirmed)));
        assert_eq!(f.ledger.orders().len(), 1);
    }

    #[tokio::test]
    async fn confirmed_status_without_order_is_rejected() {
        let f = fixture();
        f.ledger.set_hold_status(f.hold.id, HoldStatus::Confirmed);

        let result = f
            .engine
            .confirm_hold(input(f.hold.id, "c1"), Deadline::none())
            .await;
        assert!(matches!(result, Err(ReservationError::HoldAlreadyConfirmed)));
        assert!(f.ledger.orders().is_empty());
    }

    #[tokio::test]
    async fn elapsed_window_is_expired_even_when_stored_active() {
        let f = fixture();
        f.clock.set(f.hold.expires_at);

        let result = f
            .engine
            .confirm_hold(input(f.hold.id, "c1"), Deadline::none())
            .await;
        assert!(matches!(result, Err(ReservationError::HoldExpired)));
        assert_eq!(f.ledger.hold(f.hold.id).unwrap().status, HoldStatus::Active);
        assert!(f.ledger.orders().is_empty());
    }

    #[tokio::test]
    async fn stored_expired_status_is_expired() {
        let f = fixture();
        f.ledger.set_hold_status(f.hold.id, HoldStatus::Expired);

        let result = f
            .engine
            .confirm_hold(input(f.hold.id, "c1"), Deadline::none())
            .await;
        assert!(matches!(result, Err(ReservationError::HoldExpired)));
    }

    #[tokio::test]
    async fn validation_happens_before_storage() {
        let f = fixture();

        let blank = f
            .engine
            .confirm_hold(input(f.hold.id, ""), Deadline::none())
            .await;
        assert!(matches!(blank, Err(ReservationError::IdempotencyKeyRequired)));

        let malformed = f
            .engine
            .confirm_hold(
                ConfirmHoldInput {
                    hold_id: "hold-1".to_string(),
                    idempotency_key: "c1".to_string(),
                },
                Deadline::none(),
            )
            .await;
        assert!(matches!(malformed, Err(ReservationError::InvalidId)));
    }

    #[tokio::test]
    async fn unknown_hold_is_not_found() {
        let f = fixture();
        let result = f
            .engine
            .confirm_hold(input(HoldId::new(), "c1"), Deadline::none())
            .await;
        assert!(matches!(result, Err(ReservationError::HoldNotFound)));
    }

    #[tokio::test]
    async fn lost_order_race_with_same_key_replays() {
        let f = fixture();
        let winner = f.ledger.seed_order(f.hold.id, "c1", f.clock.now());
        f.ledger.hide_next_order_lookups(1);

        let outcome = f
            .engine
            .confirm_hold(input(f.hold.id, "c1"), Deadline::none())
            .await
            .unwrap();
        assert!(!outcome.created);
        assert_eq!(outcome.order, winner);
    }

    #[tokio::test]
    async fn lost_order_race_with_other_key_is_already_confirmed() {
        let f = fixture();
        f.ledger.seed_order(f.hold.id, "c1", f.clock.now());
        f.ledger.hide_next_order_lookups(1);

        let result = f
            .engine
            .confirm_hold(input(f.hold.id, "c2"), Deadline::none())
            .await;
        assert!(matches!(result, Err(ReservationError::HoldAlreadyConfirmed)));
    }

    #[tokio::test]
    async fn unrelated_unique_violation_is_not_reconciled() {
        let f = fixture();
        f.ledger.fail_next_insert(LedgerError::UniqueViolation {
            constraint: constraints::HOLDS_IDEMPOTENCY_KEY.to_string(),
        });

        let result = f
            .engine
            .confirm_hold(input(f.hold.id, "c1"), Deadline::none())
            .await;
        assert!(matches!(
            result,
            Err(ReservationError::Internal(LedgerError::UniqueViolation { .. }))
        ));
        assert!(f.ledger.orders().is_empty());
        assert_eq!(f.ledger.hold(f.hold.id).unwrap().status, HoldStatus::Active);
    }

    #[tokio::test]
    async fn failed_commit_rolls_back_order_and_status() {
        let f = fixture();
        f.ledger.fail_next_commit();

        let result = f
            .engine
            .confirm_hold(input(f.hold.id, "c1"), Deadline::none())
            .await;
        assert!(matches!(result, Err(ReservationError::Internal(_))));
        assert!(f.ledger.orders().is_empty());
        assert_eq!(f.ledger.hold(f.hold.id).unwrap().status, HoldStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_while_hold_is_locked_rolls_back() {
        let f = fixture();

        let mut blocker = f.ledger.begin().await.unwrap();
        blocker.hold_for_update(f.hold.id).await.unwrap().unwrap();

        let result = f
            .engine
            .confirm_hold(
                input(f.hold.id, "c1"),
                Deadline::after(Duration::from_millis(100)),
            )
            .await;
        assert!(matches!(result, Err(ReservationError::DeadlineExceeded)));
        assert!(f.ledger.orders().is_empty());

        drop(blocker);
        let outcome = f
            .engine
            .confirm_hold(input(f.hold.id, "c1"), Deadline::none())
            .await
            .unwrap();
        assert!(outcome.created);
    }
}
