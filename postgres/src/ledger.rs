//! `PostgreSQL` capacity ledger.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE holds (
//!     id UUID PRIMARY KEY,
//!     event_id UUID NOT NULL,
//!     zone_id UUID NOT NULL REFERENCES zones(id),
//!     quantity INTEGER NOT NULL CHECK (quantity > 0),
//!     status TEXT NOT NULL,
//!     expires_at TIMESTAMPTZ NOT NULL,
//!     idempotency_key TEXT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     UNIQUE (event_id, zone_id, idempotency_key)
//! );
//! ```
//!
//! See `migrations/` for the full schema.
//!
//! # Locking
//!
//! Locked reads use `SELECT ... FOR UPDATE`. The lock lives as long as the
//! underlying sqlx transaction, so dropping a [`PostgresTransaction`] rolls
//! back and releases it.
//!
//! Inserts use `ON CONFLICT ... DO NOTHING` and report a zero row count as
//! [`LedgerError::UniqueViolation`]. This keeps the transaction usable, so the
//! engines can re-read the winning row in the same transaction.

use crate::error::{SetupError, map_sqlx};
use chrono::{DateTime, Utc};
use holdfast_core::ledger::constraints;
use holdfast_core::{
    EventId, Hold, HoldId, HoldStatus, Ledger, LedgerError, LedgerFuture, LedgerTransaction,
    Order, OrderId, Zone, ZoneId,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::time::Duration;
use uuid::Uuid;

/// PostgreSQL-backed ledger and catalog store.
///
/// Cheap to clone: clones share the connection pool.
#[derive(Clone, Debug)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Create a ledger over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `PostgreSQL` and build a pool.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Connect`] if the pool cannot be established.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, SetupError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await
            .map_err(SetupError::Connect)?;

        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Migrate`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), SetupError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(SetupError::Migrate)?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Ledger for PostgresLedger {
    fn begin(&self) -> LedgerFuture<'_, Box<dyn LedgerTransaction>> {
        Box::pin(async move {
            let tx = self.pool.begin().await.map_err(map_sqlx)?;
            Ok(Box::new(PostgresTransaction { tx }) as Box<dyn LedgerTransaction>)
        })
    }

    fn ping(&self) -> LedgerFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
            Ok(())
        })
    }
}

/// An open `PostgreSQL` transaction.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PostgresTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresTransaction").finish_non_exhaustive()
    }
}

const HOLD_COLUMNS: &str =
    "id, event_id, zone_id, quantity, status, expires_at, idempotency_key, created_at";

impl LedgerTransaction for PostgresTransaction {
    fn zone_for_update(
        &mut self,
        event_id: EventId,
        zone_id: ZoneId,
    ) -> LedgerFuture<'_, Option<Zone>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT id, event_id, name, capacity
                FROM zones
                WHERE id = $1 AND event_id = $2
                FOR UPDATE
                ",
            )
            .bind(zone_id.as_uuid())
            .bind(event_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;

            row.as_ref().map(zone_from_row).transpose()
        })
    }

    fn hold_by_idempotency_key<'a>(
        &'a mut self,
        event_id: EventId,
        zone_id: ZoneId,
        idempotency_key: &'a str,
    ) -> LedgerFuture<'a, Option<Hold>> {
        Box::pin(async move {
            let query = format!(
                "SELECT {HOLD_COLUMNS} FROM holds
                 WHERE event_id = $1 AND zone_id = $2 AND idempotency_key = $3"
            );
            let row = sqlx::query(&query)
                .bind(event_id.as_uuid())
                .bind(zone_id.as_uuid())
                .bind(idempotency_key)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_sqlx)?;

            row.as_ref().map(hold_from_row).transpose()
        })
    }

    fn sum_active_holds(
        &mut self,
        event_id: EventId,
        zone_id: ZoneId,
        now: DateTime<Utc>,
    ) -> LedgerFuture<'_, i64> {
        Box::pin(async move {
            sqlx::query_scalar::<_, i64>(
                r"
                SELECT COALESCE(SUM(quantity), 0)::BIGINT
                FROM holds
                WHERE event_id = $1 AND zone_id = $2
                  AND status = 'active' AND expires_at > $3
                ",
            )
            .bind(event_id.as_uuid())
            .bind(zone_id.as_uuid())
            .bind(now)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx)
        })
    }

    fn sum_confirmed_holds(
        &mut self,
        event_id: EventId,
        zone_id: ZoneId,
    ) -> LedgerFuture<'_, i64> {
        Box::pin(async move {
            sqlx::query_scalar::<_, i64>(
                r"
                SELECT COALESCE(SUM(quantity), 0)::BIGINT
                FROM holds
                WHERE event_id = $1 AND zone_id = $2 AND status = 'confirmed'
                ",
            )
            .bind(event_id.as_uuid())
            .bind(zone_id.as_uuid())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx)
        })
    }

    fn insert_hold<'a>(&'a mut self, hold: &'a Hold) -> LedgerFuture<'a, ()> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                INSERT INTO holds (
                    id, event_id, zone_id, quantity, status,
                    expires_at, idempotency_key, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT ON CONSTRAINT holds_event_id_zone_id_idempotency_key_key
                DO NOTHING
                ",
            )
            .bind(hold.id.as_uuid())
            .bind(hold.event_id.as_uuid())
            .bind(hold.zone_id.as_uuid())
            .bind(hold.quantity)
            .bind(hold.status.as_str())
            .bind(hold.expires_at)
            .bind(&hold.idempotency_key)
            .bind(hold.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;

            if result.rows_affected() == 0 {
                return Err(insert_conflict(constraints::HOLDS_IDEMPOTENCY_KEY));
            }
            Ok(())
        })
    }

    fn hold_for_update(&mut self, hold_id: HoldId) -> LedgerFuture<'_, Option<Hold>> {
        Box::pin(async move {
            let query = format!("SELECT {HOLD_COLUMNS} FROM holds WHERE id = $1 FOR UPDATE");
            let row = sqlx::query(&query)
                .bind(hold_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_sqlx)?;

            row.as_ref().map(hold_from_row).transpose()
        })
    }

    fn update_hold_status(
        &mut self,
        hold_id: HoldId,
        status: HoldStatus,
    ) -> LedgerFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE holds SET status = $2 WHERE id = $1")
                .bind(hold_id.as_uuid())
                .bind(status.as_str())
                .execute(&mut *self.tx)
                .await
                .map_err(map_sqlx)?;

            Ok(result.rows_affected() > 0)
        })
    }

    fn order_by_hold_id(&mut self, hold_id: HoldId) -> LedgerFuture<'_, Option<Order>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT id, hold_id, idempotency_key, created_at FROM orders WHERE hold_id = $1",
            )
            .bind(hold_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;

            row.as_ref().map(order_from_row).transpose()
        })
    }

    fn insert_order<'a>(&'a mut self, order: &'a Order) -> LedgerFuture<'a, ()> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                INSERT INTO orders (id, hold_id, idempotency_key, created_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT ON CONSTRAINT orders_hold_id_key DO NOTHING
                ",
            )
            .bind(order.id.as_uuid())
            .bind(order.hold_id.as_uuid())
            .bind(&order.idempotency_key)
            .bind(order.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;

            if result.rows_affected() == 0 {
                return Err(insert_conflict(constraints::ORDERS_HOLD_ID));
            }
            Ok(())
        })
    }

    fn commit(self: Box<Self>) -> LedgerFuture<'static, ()> {
        Box::pin(async move { self.tx.commit().await.map_err(map_sqlx) })
    }

    fn rollback(self: Box<Self>) -> LedgerFuture<'static, ()> {
        Box::pin(async move { self.tx.rollback().await.map_err(map_sqlx) })
    }
}

fn insert_conflict(constraint: &'static str) -> LedgerError {
    tracing::debug!(constraint, "Insert skipped on conflict");
    metrics::counter!("holdfast_ledger_insert_conflicts_total", "constraint" => constraint)
        .increment(1);
    LedgerError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

/// Read one typed column, treating decode failures as corruption.
pub(crate) fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, LedgerError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| LedgerError::Corrupt(format!("column {name}: {e}")))
}

pub(crate) fn zone_from_row(row: &PgRow) -> Result<Zone, LedgerError> {
    Ok(Zone {
        id: ZoneId::from_uuid(column::<Uuid>(row, "id")?),
        event_id: EventId::from_uuid(column::<Uuid>(row, "event_id")?),
        name: column(row, "name")?,
        capacity: column(row, "capacity")?,
    })
}

fn hold_from_row(row: &PgRow) -> Result<Hold, LedgerError> {
    let status: String = column(row, "status")?;
    let status = HoldStatus::parse(&status)
        .ok_or_else(|| LedgerError::Corrupt(format!("Invalid hold status: {status}")))?;

    Ok(Hold {
        id: HoldId::from_uuid(column::<Uuid>(row, "id")?),
        event_id: EventId::from_uuid(column::<Uuid>(row, "event_id")?),
        zone_id: ZoneId::from_uuid(column::<Uuid>(row, "zone_id")?),
        quantity: column(row, "quantity")?,
        status,
        expires_at: column(row, "expires_at")?,
        idempotency_key: column(row, "idempotency_key")?,
        created_at: column(row, "created_at")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<Order, LedgerError> {
    Ok(Order {
        id: OrderId::from_uuid(column::<Uuid>(row, "id")?),
        hold_id: HoldId::from_uuid(column::<Uuid>(row, "hold_id")?),
        idempotency_key: column(row, "idempotency_key")?,
        created_at: column(row, "created_at")?,
    })
}
