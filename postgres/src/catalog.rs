//! `PostgreSQL` catalog store.

use crate::error::map_sqlx;
use crate::ledger::{PostgresLedger, column, zone_from_row};
use chrono::{DateTime, Utc};
use holdfast_core::{CatalogStore, Event, EventId, LedgerFuture, Zone, ZoneId, ZoneUsage};
use sqlx::postgres::PgRow;
use uuid::Uuid;

impl CatalogStore for PostgresLedger {
    fn insert_event<'a>(&'a self, event: &'a Event) -> LedgerFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query("INSERT INTO events (id, name, starts_at) VALUES ($1, $2, $3)")
                .bind(event.id.as_uuid())
                .bind(&event.name)
                .bind(event.starts_at)
                .execute(self.pool())
                .await
                .map_err(map_sqlx)?;
            Ok(())
        })
    }

    fn list_events(&self) -> LedgerFuture<'_, Vec<Event>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, name, starts_at FROM events ORDER BY created_at, id",
            )
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx)?;

            rows.iter().map(event_from_row).collect()
        })
    }

    fn event_exists(&self, event_id: EventId) -> LedgerFuture<'_, bool> {
        Box::pin(async move {
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM events WHERE id = $1)")
                .bind(event_id.as_uuid())
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx)
        })
    }

    fn insert_zone<'a>(&'a self, zone: &'a Zone) -> LedgerFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO zones (id, event_id, name, capacity) VALUES ($1, $2, $3, $4)",
            )
            .bind(zone.id.as_uuid())
            .bind(zone.event_id.as_uuid())
            .bind(&zone.name)
            .bind(zone.capacity)
            .execute(self.pool())
            .await
            .map_err(map_sqlx)?;
            Ok(())
        })
    }

    fn list_zones(&self, event_id: EventId) -> LedgerFuture<'_, Vec<Zone>> {
        Box::pin(async move {
            let rows = sqlx::query(
                r"
                SELECT id, event_id, name, capacity
                FROM zones
                WHERE event_id = $1
                ORDER BY created_at, id
                ",
            )
            .bind(event_id.as_uuid())
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx)?;

            rows.iter().map(zone_from_row).collect()
        })
    }

    fn zone_usage(
        &self,
        event_id: EventId,
        zone_id: ZoneId,
        now: DateTime<Utc>,
    ) -> LedgerFuture<'_, Option<ZoneUsage>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT z.id, z.event_id, z.name, z.capacity,
                       COALESCE(SUM(h.quantity) FILTER (
                           WHERE h.status = 'active' AND h.expires_at > $3
                       ), 0)::BIGINT AS active,
                       COALESCE(SUM(h.quantity) FILTER (
                           WHERE h.status = 'confirmed'
                       ), 0)::BIGINT AS confirmed
                FROM zones z
                LEFT JOIN holds h ON h.zone_id = z.id AND h.event_id = z.event_id
                WHERE z.event_id = $1 AND z.id = $2
                GROUP BY z.id
                ",
            )
            .bind(event_id.as_uuid())
            .bind(zone_id.as_uuid())
            .bind(now)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx)?;

            let Some(row) = row else {
                return Ok(None);
            };
            Ok(Some(ZoneUsage {
                zone: zone_from_row(&row)?,
                active: column(&row, "active")?,
                confirmed: column(&row, "confirmed")?,
            }))
        })
    }
}

fn event_from_row(row: &PgRow) -> Result<Event, holdfast_core::LedgerError> {
    Ok(Event {
        id: EventId::from_uuid(column::<Uuid>(row, "id")?),
        name: column(row, "name")?,
        starts_at: column(row, "starts_at")?,
    })
}
