//! `PostgreSQL` storage for Holdfast.
//!
//! This crate provides the production [`Ledger`](holdfast_core::Ledger) and
//! [`CatalogStore`](holdfast_core::CatalogStore) backed by `PostgreSQL`. It
//! uses sqlx with runtime-bound queries and supports:
//!
//! - Row locking with `SELECT ... FOR UPDATE` for capacity decisions
//! - Uniqueness reported as [`LedgerError::UniqueViolation`](holdfast_core::LedgerError)
//! - Connection pooling
//! - Embedded schema migrations
//!
//! # Example
//!
//! ```ignore
//! use holdfast_postgres::PostgresLedger;
//! use std::time::Duration;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let ledger = PostgresLedger::connect("postgres://localhost/holdfast", 10, Duration::from_secs(5)).await?;
//!     ledger.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod error;
mod ledger;

pub use error::SetupError;
pub use ledger::{PostgresLedger, PostgresTransaction};
