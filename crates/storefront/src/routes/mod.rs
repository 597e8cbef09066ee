//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                     - Liveness
//! GET    /health/ready               - Readiness (store ping)
//! GET    /api/health                 - JSON health
//!
//! # Auth and profile
//! POST   /api/auth/register          - Create customer account (rate limited)
//! POST   /api/auth/login             - Log in (rate limited)
//! POST   /api/auth/logout            - Log out
//! GET    /api/auth/me                - Current user
//! PUT    /api/profile                - Update name, email, phone
//! POST   /api/profile/password       - Change password
//! POST   /api/club/join              - Join the club
//!
//! # Catalog
//! GET    /api/products               - Published products
//! GET    /api/products/{slug}        - Published product by slug
//!
//! # Cart (session or account)
//! GET    /api/cart                   - Cart with totals
//! POST   /api/cart                   - Add item
//! PUT    /api/cart                   - Set quantity
//! DELETE /api/cart                   - Clear
//! DELETE /api/cart/{product_id}      - Remove item
//!
//! # Checkout and payments (requires auth, except verify/webhook)
//! POST   /api/checkout               - Place cash-on-delivery order
//! POST   /api/payments/create-order  - Place order and open gateway order
//! POST   /api/payments/verify        - Verify checkout signature
//! POST   /api/payments/webhook       - Gateway notifications
//! GET    /api/orders                 - Own orders
//! GET    /api/orders/{id}            - Own order
//!
//! # Back office (admin gate)
//! GET    /api/admin/products         - List, create
//! *      /api/admin/products/{id}    - Show, update, delete
//! GET    /api/admin/orders           - List
//! *      /api/admin/orders/{id}      - Show, update
//! GET    /api/admin/users            - List, create staff
//! *      /api/admin/users/{id}       - Show, update, delete
//! GET    /api/admin/stats            - Dashboard
//! POST   /api/admin/upload-image     - Image upload
//!
//! # Static
//! GET    /uploads/*                  - Uploaded images
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod health;
pub mod orders;
pub mod payments;
pub mod products;

use axum::{Router, middleware::from_fn};
use serde_json::Value;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tower_sessions::SessionStore;
use tracing::Span;

use crate::error::AppError;
use crate::middleware::{create_session_layer, request_id_middleware, security_headers_middleware};
use crate::state::AppState;

/// Create all API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(products::router())
        .merge(cart::router())
        .merge(checkout::router())
        .merge(payments::router())
        .merge(orders::router())
        .merge(admin::router())
}

/// Build the complete application: routes, uploaded files, sessions and the
/// tracing, request-id, security-header and Sentry layers.
pub fn app<S>(state: AppState, session_store: S) -> Router
where
    S: SessionStore + Clone,
{
    let session_layer = create_session_layer(session_store, state.config());
    let uploads = ServeDir::new(&state.config().uploads_dir);

    Router::new()
        .merge(routes())
        .nest_service("/uploads", uploads)
        .layer(session_layer)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Parse a numeric id from a path segment or body string.
pub(crate) fn parse_id<T: From<i32>>(raw: &str, what: &str) -> Result<T, AppError> {
    raw.trim()
        .parse::<i32>()
        .map(T::from)
        .map_err(|_| AppError::BadRequest(format!("Invalid {what} ID format")))
}

/// Parse a numeric id given in JSON as either a number or a string.
pub(crate) fn id_from_json<T: From<i32>>(value: &Value, what: &str) -> Result<T, AppError> {
    match value {
        Value::String(s) => parse_id(s, what),
        Value::Number(n) => n
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(T::from)
            .ok_or_else(|| AppError::BadRequest(format!("Invalid {what} ID format"))),
        _ => Err(AppError::BadRequest(format!("Invalid {what} ID format"))),
    }
}
