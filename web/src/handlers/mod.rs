//! HTTP request handlers shared by every Holdfast server.

pub mod health;

pub use health::{health_check, readiness_check};
