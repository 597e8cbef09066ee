//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding to the client. All route handlers return
//! `Result<T, AppError>`. Every error body is JSON of the form
//! `{"error": "<message>"}`; rate-limit errors add `resetAt`, and outside
//! production 5xx errors add `details`.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;

use mypeteats_core::ValidationError;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::cart::CartError;
use crate::services::catalog::CatalogError;
use crate::services::checkout::CheckoutError;
use crate::services::payments::GatewayError;
use crate::services::uploads::UploadError;

/// Whether 5xx bodies carry the underlying error text.
static EXPOSE_DETAILS: AtomicBool = AtomicBool::new(false);

/// Turn internal error details in 5xx responses on or off.
///
/// Set once at startup: on outside production, off in production.
pub fn expose_error_details(expose: bool) {
    EXPOSE_DETAILS.store(expose, Ordering::Relaxed);
}

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request from client.
    #[error("{0}")]
    BadRequest(String),

    /// A request field failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Caller is not authenticated.
    #[error("{0}")]
    Unauthorized(String),

    /// Caller is authenticated but not allowed.
    #[error("{0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Resource already exists or is in a conflicting state.
    #[error("{0}")]
    Conflict(String),

    /// Rate limited or locked out.
    #[error("{message}")]
    RateLimited {
        message: String,
        reset_at: Option<DateTime<Utc>>,
    },

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// Session store failure.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// The payment gateway call failed.
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// No gateway credentials are configured.
    #[error("Payment gateway not configured")]
    PaymentsUnavailable,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// 429 with the moment the window resets.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>, reset_at: DateTime<Utc>) -> Self {
        Self::RateLimited {
            message: message.into(),
            reset_at: Some(reset_at),
        }
    }

    /// Status code and client-safe message.
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Validation(err) => (StatusCode::BAD_REQUEST, err.message.clone()),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::RateLimited { message, .. } => (StatusCode::TOO_MANY_REQUESTS, message.clone()),
            Self::Database(err) => repository_status(err),
            Self::Auth(err) => match err {
                AuthError::InvalidEmail(_) => {
                    (StatusCode::BAD_REQUEST, "Invalid email address".to_string())
                }
                AuthError::MissingCredentials(msg) => (StatusCode::BAD_REQUEST, (*msg).to_string()),
                AuthError::WeakPassword(msg) | AuthError::InvalidName(msg) => {
                    (StatusCode::BAD_REQUEST, msg.clone())
                }
                AuthError::InvalidCredentials => {
                    (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string())
                }
                AuthError::WrongCurrentPassword => (
                    StatusCode::UNAUTHORIZED,
                    "Current password is incorrect".to_string(),
                ),
                AuthError::UserAlreadyExists => {
                    (StatusCode::CONFLICT, "Email already in use".to_string())
                }
                AuthError::UserNotFound => (StatusCode::NOT_FOUND, "User not found".to_string()),
                AuthError::Repository(err) => repository_status(err),
                AuthError::PasswordHash => internal(),
            },
            Self::Cart(err) => match err {
                CartError::Repository(err) => repository_status(err),
                CartError::ProductNotFound | CartError::NotInCart | CartError::CartNotFound => {
                    (StatusCode::NOT_FOUND, err.to_string())
                }
                _ => (StatusCode::BAD_REQUEST, err.to_string()),
            },
            Self::Catalog(err) => match err {
                CatalogError::Validation(v) => (StatusCode::BAD_REQUEST, v.message.clone()),
                CatalogError::SkuTaken => (StatusCode::CONFLICT, err.to_string()),
                CatalogError::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
                CatalogError::Repository(err) => repository_status(err),
            },
            Self::Checkout(err) => match err {
                CheckoutError::Repository(err) => repository_status(err),
                _ => (StatusCode::BAD_REQUEST, err.to_string()),
            },
            Self::Upload(err) => match err {
                UploadError::Io(_) => internal(),
                _ => (StatusCode::BAD_REQUEST, err.to_string()),
            },
            Self::Gateway(_) => (StatusCode::BAD_GATEWAY, "Payment gateway error".to_string()),
            Self::PaymentsUnavailable => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            Self::Session(_) | Self::Internal(_) => internal(),
        }
    }
}

fn internal() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

fn repository_status(err: &RepositoryError) -> (StatusCode, String) {
    match err {
        RepositoryError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
        RepositoryError::Conflict(field) => {
            let message = match field.as_str() {
                "email" => "Email already in use".to_string(),
                "sku" => "SKU already exists".to_string(),
                "referenced" => "Resource is still referenced by other records".to_string(),
                other => format!("{other} already exists"),
            };
            (StatusCode::CONFLICT, message)
        }
        RepositoryError::InsufficientStock {
            title, available, ..
        } => (
            StatusCode::BAD_REQUEST,
            format!("Insufficient inventory for {title}. Only {available} available."),
        ),
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => internal(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let mut body = json!({ "error": message });
        if let Self::RateLimited {
            reset_at: Some(reset_at),
            ..
        } = &self
        {
            body["resetAt"] = Value::String(reset_at.to_rfc3339_opts(SecondsFormat::Millis, true));
        }
        if let Self::Validation(err) | Self::Catalog(CatalogError::Validation(err)) = &self {
            body["field"] = Value::String(err.field.to_string());
        }
        if status.is_server_error() && EXPOSE_DETAILS.load(Ordering::Relaxed) {
            body["details"] = Value::String(self.to_string());
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// JSON body extractor whose rejections are [`AppError::BadRequest`], so
/// malformed bodies get the same `{"error": ...}` shape as everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(&rejection)),
        }
    }
}

fn json_rejection(rejection: &JsonRejection) -> AppError {
    let message = match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            "Expected request with `Content-Type: application/json`".to_string()
        }
        JsonRejection::JsonSyntaxError(_) => "Invalid JSON in request body".to_string(),
        _ => format!("Invalid request body: {}", rejection.body_text()),
    };
    AppError::BadRequest(message)
}

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
