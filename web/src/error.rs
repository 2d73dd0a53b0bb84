//! Error types for web handlers.
//!
//! This module bridges [`ReservationError`] and HTTP responses, implementing
//! Axum's `IntoResponse` trait. Every error body has the same shape:
//!
//! ```json
//! { "code": "insufficient_capacity", "message": "Insufficient capacity: requested 80, available 70" }
//! ```

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use holdfast_core::ReservationError;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Hold>, AppError> {
///     let hold = state.holds.create_hold(input, deadline).await?;
///     Ok(Json(hold))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: code.into(),
            source: None,
        }
    }

    /// Create a new error with a source error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 400 Bad Request error with a specific code.
    #[must_use]
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    /// Create a 400 error for a body that could not be decoded.
    #[must_use]
    pub fn invalid_body() -> Self {
        Self::bad_request("invalid_request_body", "invalid request body")
    }

    /// Create a 404 Not Found error for an unknown route.
    #[must_use]
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", "not found")
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, code, message)
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    error = %source,
                    "Request failed"
                );
            } else {
                tracing::warn!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Request failed"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

/// Status code for each engine error.
const fn status_for(error: &ReservationError) -> StatusCode {
    use ReservationError as E;
    match error {
        E::InvalidQuantity
        | E::InvalidId
        | E::IdempotencyKeyRequired
        | E::InvalidCapacity
        | E::EventNameRequired
        | E::ZoneNameRequired => StatusCode::BAD_REQUEST,
        E::ZoneNotFound | E::HoldNotFound | E::EventNotFound => StatusCode::NOT_FOUND,
        E::IdempotencyConflict
        | E::InsufficientCapacity { .. }
        | E::HoldExpired
        | E::HoldAlreadyConfirmed
        | E::ZoneAlreadyExists => StatusCode::CONFLICT,
        E::DeadlineExceeded => StatusCode::SERVICE_UNAVAILABLE,
        E::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        let status = status_for(&err);
        if err.is_internal() {
            return Self::internal("internal error").with_source(anyhow::Error::new(err));
        }
        Self::new(status, err.code(), err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "Rejected request body");
        Self::invalid_body()
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("internal error").with_source(err)
    }
}
