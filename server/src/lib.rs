//! Holdfast HTTP server.
//!
//! Wires the engines from `holdfast-runtime` to a JSON API:
//!
//! - [`config`]: environment-driven configuration
//! - [`server`]: application state and the router
//! - [`api`]: request handlers
//!
//! The binary in `main.rs` runs against `PostgreSQL`. Tests build the same
//! router over the in-memory ledger.

pub mod api;
pub mod config;
pub mod server;

pub use config::{Config, ConfigError};
pub use server::{AppState, CorsPolicy, build_router};
