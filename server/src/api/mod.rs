//! JSON API handlers.
//!
//! - `POST /holds`: place a hold
//! - `POST /holds/:id/confirm`: confirm a hold into an order
//! - `GET /events/:event_id/zones/:zone_id/availability`: capacity snapshot
//! - `/admin/events` and `/admin/events/:id/zones`: catalog administration
//! - `GET /metrics`: Prometheus exposition, when enabled

pub mod admin;
pub mod availability;
pub mod holds;
pub mod metrics;
pub mod orders;
