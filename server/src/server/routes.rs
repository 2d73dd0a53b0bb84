//! Router configuration for the Holdfast server.

use super::state::AppState;
use crate::api::{admin, availability, holds, metrics, orders};
use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use holdfast_web::handlers::{health_check, readiness_check};
use holdfast_web::{AppError, request_id_layer};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// Configures:
/// - Health and readiness probes
/// - Hold and confirmation endpoints
/// - Catalog administration under `/admin`
/// - Zone availability
/// - A JSON 404 for every other path
/// - CORS, with a 403 for preflights from origins outside the policy
#[must_use]
pub fn build_router(state: AppState, cors: &CorsPolicy) -> Router {
    let admin_routes = Router::new()
        .route("/events", get(admin::list_events).post(admin::create_event))
        .route(
            "/events/:id/zones",
            get(admin::list_zones).post(admin::create_zone),
        );

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics::render))
        .route("/holds", post(holds::create_hold))
        .route("/holds/:id/confirm", post(orders::confirm_hold))
        .route(
            "/events/:event_id/zones/:zone_id/availability",
            get(availability::zone_availability),
        )
        .nest("/admin", admin_routes)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
        .layer(cors.layer())
        .layer(middleware::from_fn_with_state(
            cors.clone(),
            reject_disallowed_preflight,
        ))
        .with_state(state)
}

#[allow(clippy::unused_async)]
async fn not_found() -> AppError {
    AppError::not_found()
}

/// Allowed CORS origins.
#[derive(Clone, Debug)]
pub struct CorsPolicy {
    any: bool,
    allowed: Vec<HeaderValue>,
}

impl CorsPolicy {
    /// Build the policy from the configured origins.
    ///
    /// `*` allows any origin. Origins that are not valid header values are
    /// skipped with a warning.
    #[must_use]
    pub fn new(origins: &[String]) -> Self {
        if origins.iter().any(|origin| origin == "*") {
            return Self {
                any: true,
                allowed: Vec::new(),
            };
        }

        let allowed = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();

        Self {
            any: false,
            allowed,
        }
    }

    /// Whether requests from `origin` may be served.
    #[must_use]
    pub fn allows(&self, origin: &HeaderValue) -> bool {
        self.any || self.allowed.contains(origin)
    }

    /// The `tower-http` layer answering allowed preflights and decorating
    /// responses.
    #[must_use]
    pub fn layer(&self) -> CorsLayer {
        let layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::CONTENT_TYPE,
                HeaderName::from_static("idempotency-key"),
            ])
            .expose_headers([HeaderName::from_static("x-request-id")]);

        if self.any {
            layer.allow_origin(Any)
        } else {
            layer.allow_origin(AllowOrigin::list(self.allowed.clone()))
        }
    }
}

/// Answer a preflight from an origin outside the policy with 403.
///
/// Other requests pass through; browsers enforce the missing
/// `Access-Control-Allow-Origin` on those.
async fn reject_disallowed_preflight(
    State(policy): State<CorsPolicy>,
    request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();
    let is_preflight = request.method() == Method::OPTIONS
        && headers.contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);

    if is_preflight {
        if let Some(origin) = headers.get(header::ORIGIN) {
            if !policy.allows(origin) {
                tracing::debug!(origin = ?origin, "Rejecting CORS preflight");
                return AppError::new(StatusCode::FORBIDDEN, "forbidden", "forbidden")
                    .into_response();
            }
        }
    }

    next.run(request).await
}
