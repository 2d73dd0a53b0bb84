//! Custom Axum extractors.
//!
//! - `IdempotencyKey`: the caller's `Idempotency-Key` header, if any
//! - `RequestId`: the id assigned by [`request_id_layer`](crate::middleware::request_id_layer)
//!
//! # Examples
//!
//! ```ignore
//! use holdfast_web::extractors::{IdempotencyKey, RequestId};
//!
//! async fn handler(
//!     Path(hold_id): Path<String>,
//!     IdempotencyKey(key): IdempotencyKey,
//!     request_id: RequestId,
//! ) -> Result<Json<OrderView>, AppError> {
//!     tracing::info!(request_id = %request_id, "Confirming hold");
//!     // ...
//! }
//! ```

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use std::fmt;
use uuid::Uuid;

/// Header carrying the caller's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// The `Idempotency-Key` header.
///
/// `None` when the header is absent or not valid visible ASCII. Blank values
/// are passed through so the engines can reject them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyKey(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for IdempotencyKey
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);

        Ok(Self(key))
    }
}

/// Request id for log correlation.
///
/// Falls back to a fresh UUID v4 when the middleware is not installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .extensions
            .get::<Self>()
            .cloned()
            .unwrap_or_else(|| Self(Uuid::new_v4().to_string()));

        Ok(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn test_idempotency_key_extraction() {
        let request = Request::builder()
            .header(IDEMPOTENCY_KEY_HEADER, "checkout-42")
            .body(())
            .unwrap();
        let (mut parts, ()) = request.into_parts();

        let key = IdempotencyKey::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(key, IdempotencyKey(Some("checkout-42".to_string())));
    }

    #[tokio::test]
    async fn test_idempotency_key_missing() {
        let request = Request::builder().body(()).unwrap();
        let (mut parts, ()) = request.into_parts();

        let key = IdempotencyKey::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(key, IdempotencyKey(None));
    }

    #[tokio::test]
    async fn test_request_id_from_extensions() {
        let mut request = Request::builder().body(()).unwrap();
        request
            .extensions_mut()
            .insert(RequestId("req-1".to_string()));
        let (mut parts, ()) = request.into_parts();

        let id = RequestId::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(id.to_string(), "req-1");
    }

    #[tokio::test]
    async fn test_request_id_generated_without_middleware() {
        let request = Request::builder().body(()).unwrap();
        let (mut parts, ()) = request.into_parts();

        let id = RequestId::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(Uuid::parse_str(&id.0).is_ok());
    }
}
