//! Catalog service: events, zones and read-only availability.

use holdfast_core::environment::Clock;
use holdfast_core::ledger::constraints;
use holdfast_core::{
    CatalogStore, DateTime, Event, EventId, LedgerError, ReservationError, Result, Utc, Zone,
    ZoneId, ZoneUsage,
};
use std::sync::Arc;
use tracing::info;

/// Request to create an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateEventInput {
    /// Display name
    pub name: String,
    /// Start time; defaults to now
    pub starts_at: Option<DateTime<Utc>>,
}

/// Request to create a zone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateZoneInput {
    /// Owning event, as supplied by the caller
    pub event_id: String,
    /// Display name, unique within the event
    pub name: String,
    /// Total capacity
    pub capacity: i32,
}

/// Catalog administration and availability queries.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    clock: Arc<dyn Clock>,
}

impl CatalogService {
    /// Create a catalog service.
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create an event.
    ///
    /// # Errors
    ///
    /// - `EventNameRequired`: blank name
    /// - `Internal`: storage failure
    pub async fn create_event(&self, input: CreateEventInput) -> Result<Event> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(ReservationError::EventNameRequired);
        }

        let event = Event {
            id: EventId::new(),
            name: name.to_string(),
            starts_at: input.starts_at.unwrap_or_else(|| self.clock.now()),
        };
        self.store.insert_event(&event).await?;

        info!(event_id = %event.id, name = %event.name, "Event created");
        Ok(event)
    }

    /// All events, oldest first.
    ///
    /// # Errors
    ///
    /// - `Internal`: storage failure
    pub async fn list_events(&self) -> Result<Vec<Event>> {
        Ok(self.store.list_events().await?)
    }

    /// Create a zone under an event.
    ///
    /// # Errors
    ///
    /// - `InvalidId`: the event id is not a UUID
    /// - `ZoneNameRequired`: blank name
    /// - `InvalidCapacity`: capacity is zero or negative
    /// - `EventNotFound`: no such event
    /// - `ZoneAlreadyExists`: the event already has a zone with this name
    /// - `Internal`: storage failure
    pub async fn create_zone(&self, input: CreateZoneInput) -> Result<Zone> {
        let event_id = EventId::parse(&input.event_id)?;
        let name = input.name.trim();
        if name.is_empty() {
            return Err(ReservationError::ZoneNameRequired);
        }
        if input.capacity <= 0 {
            return Err(ReservationError::InvalidCapacity);
        }

        let zone = Zone {
            id: ZoneId::new(),
            event_id,
            name: name.to_string(),
            capacity: input.capacity,
        };

        match self.store.insert_zone(&zone).await {
            Ok(()) => {}
            Err(LedgerError::UniqueViolation { constraint })
                if constraint == constraints::ZONES_EVENT_NAME =>
            {
                return Err(ReservationError::ZoneAlreadyExists);
            }
            Err(LedgerError::ForeignKeyViolation { .. }) => {
                return Err(ReservationError::EventNotFound);
            }
            Err(e) => return Err(e.into()),
        }

        info!(zone_id = %zone.id, event_id = %event_id, capacity = zone.capacity, "Zone created");
        Ok(zone)
    }

    /// Zones of an event, oldest first.
    ///
    /// # Errors
    ///
    /// - `InvalidId`: the event id is not a UUID
    /// - `EventNotFound`: no such event
    /// - `Internal`: storage failure
    pub async fn list_zones(&self, event_id: &str) -> Result<Vec<Zone>> {
        let event_id = EventId::parse(event_id)?;
        if !self.store.event_exists(event_id).await? {
            return Err(ReservationError::EventNotFound);
        }
        Ok(self.store.list_zones(event_id).await?)
    }

    /// Current capacity snapshot of a zone.
    ///
    /// Uses the same sums as the hold engine but takes no lock, so the
    /// figure may be stale by the time a hold is attempted.
    ///
    /// # Errors
    ///
    /// - `InvalidId`: an identifier is not a UUID
    /// - `ZoneNotFound`: no such zone under the event
    /// - `Internal`: storage failure
    pub async fn zone_availability(&self, event_id: &str, zone_id: &str) -> Result<ZoneUsage> {
        let event_id = EventId::parse(event_id)?;
        let zone_id = ZoneId::parse(zone_id)?;
        self.store
            .zone_usage(event_id, zone_id, self.clock.now())
            .await?
            .ok_or(ReservationError::ZoneNotFound)
    }
}

impl std::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogService").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use holdfast_core::HoldStatus;
    use holdfast_testing::{InMemoryLedger, ManualClock, test_clock};

    fn service() -> (InMemoryLedger, ManualClock, CatalogService) {
        let ledger = InMemoryLedger::new();
        let clock = ManualClock::new(test_clock().now());
        let service = CatalogService::new(Arc::new(ledger.clone()), Arc::new(clock.clone()));
        (ledger, clock, service)
    }

    #[tokio::test]
    async fn create_event_defaults_start_to_now() {
        let (_, clock, service) = service();
        let event = service
            .create_event(CreateEventInput {
                name: "Concert".to_string(),
                starts_at: None,
            })
            .await
            .unwrap();

        assert_eq!(event.name, "Concert");
        assert_eq!(event.starts_at, clock.now());
        assert_eq!(service.list_events().await.unwrap(), vec![event]);
    }

    #[tokio::test]
    async fn create_event_requires_a_name() {
        let (_, _, service) = service();
        let result = service
            .create_event(CreateEventInput {
                name: "  ".to_string(),
                starts_at: None,
            })
            .await;
        assert!(matches!(result, Err(ReservationError::EventNameRequired)));
    }

    #[tokio::test]
    async fn events_are_listed_oldest_first() {
        let (_, _, service) = service();
        for name in ["First", "Second", "Third"] {
            service
                .create_event(CreateEventInput {
                    name: name.to_string(),
                    starts_at: None,
                })
                .await
                .unwrap();
        }

        let names: Vec<String> = service
            .list_events()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["First", "Second", "Third"]);
    }

    #[tokio::test]
    async fn create_zone_validates_input() {
        let (ledger, _, service) = service();
        let event = ledger.seed_event("Concert");

        let cases = [
            ("nope".to_string(), "Floor", 10, "invalid_id"),
            (event.id.to_string(), "", 10, "zone_name_required"),
            (event.id.to_string(), "Floor", 0, "invalid_capacity"),
            (EventId::new().to_string(), "Floor", 10, "event_not_found"),
        ];

        for (event_id, name, capacity, code) in cases {
            let error = service
                .create_zone(CreateZoneInput {
                    event_id,
                    name: name.to_string(),
                    capacity,
                })
                .await
                .unwrap_err();
            assert_eq!(error.code(), code);
        }
    }

    #[tokio::test]
    async fn duplicate_zone_name_is_rejected() {
        let (ledger, _, service) = service();
        let event = ledger.seed_event("Concert");
        let input = CreateZoneInput {
            event_id: event.id.to_string(),
            name: "Floor".to_string(),
            capacity: 10,
        };

        service.create_zone(input.clone()).await.unwrap();
        let result = service.create_zone(input).await;
        assert!(matches!(result, Err(ReservationError::ZoneAlreadyExists)));
    }

    #[tokio::test]
    async fn list_zones_requires_known_event() {
        let (ledger, _, service) = service();
        let event = ledger.seed_event("Concert");
        let zone = ledger.seed_zone(event.id, "Floor", 10);

        assert_eq!(
            service.list_zones(&event.id.to_string()).await.unwrap(),
            vec![zone]
        );
        assert!(matches!(
            service.list_zones(&EventId::new().to_string()).await,
            Err(ReservationError::EventNotFound)
        ));
        assert!(matches!(
            service.list_zones("").await,
            Err(ReservationError::InvalidId)
        ));
    }

    #[tokio::test]
    async fn availability_ignores_expired_holds() {
        let (ledger, clock, service) = service();
        let event = ledger.seed_event("Concert");
        let zone = ledger.seed_zone(event.id, "Floor", 100);
        ledger.seed_hold(event.id, zone.id, 30, "k1", clock.now());
        let confirmed = ledger.seed_hold(event.id, zone.id, 20, "k2", clock.now());
        ledger.set_hold_status(confirmed.id, HoldStatus::Confirmed);

        let usage = service
            .zone_availability(&event.id.to_string(), &zone.id.to_string())
            .await
            .unwrap();
        assert_eq!((usage.active, usage.confirmed, usage.available()), (30, 20, 50));

        clock.advance(TimeDelta::hours(1));
        let usage = service
            .zone_availability(&event.id.to_string(), &zone.id.to_string())
            .await
            .unwrap();
        assert_eq!((usage.active, usage.confirmed, usage.available()), (0, 20, 80));
    }

    #[tokio::test]
    async fn availability_of_unknown_zone_is_not_found() {
        let (ledger, _, service) = service();
        let event = ledger.seed_event("Concert");
        let result = service
            .zone_availability(&event.id.to_string(), &ZoneId::new().to_string())
            .await;
        assert!(matches!(result, Err(ReservationError::ZoneNotFound)));
    }
}
