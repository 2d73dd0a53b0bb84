//! Axum integration for Holdfast.
//!
//! The engines know nothing about HTTP. This crate holds the pieces every
//! HTTP surface needs around them:
//!
//! - [`AppError`]: maps engine errors to status codes and a JSON body
//! - [`IdempotencyKey`]: the `Idempotency-Key` header
//! - [`request_id_layer`]: request ids and the `http_request` span
//! - [`handlers::health`]: liveness and readiness probes
//!
//! # Example
//!
//! ```ignore
//! use holdfast_web::{AppError, IdempotencyKey};
//! use axum::{Router, routing::post, Json};
//!
//! async fn confirm(
//!     State(state): State<AppState>,
//!     Path(hold_id): Path<String>,
//!     IdempotencyKey(key): IdempotencyKey,
//! ) -> Result<Json<OrderView>, AppError> {
//!     let outcome = state.confirmations.confirm_hold(input, deadline).await?;
//!     Ok(Json(outcome.order.into()))
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{IDEMPOTENCY_KEY_HEADER, IdempotencyKey, RequestId};
pub use middleware::{REQUEST_ID_HEADER, request_id_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
