//! Back-office API under `/api/admin`.
//!
//! Every handler takes [`RequireStaff`](crate::middleware::RequireStaff),
//! which runs the admin gate, then asks the principal for the capability the
//! endpoint needs.

pub mod orders;
pub mod products;
pub mod stats;
pub mod uploads;
pub mod users;

use std::str::FromStr;

use axum::Router;
use serde_json::Value;

use crate::error::AppError;
use crate::state::AppState;

/// Default page size for back-office listings.
const DEFAULT_LIMIT: u32 = 50;

/// Largest page size for back-office listings.
const MAX_LIMIT: u32 = 200;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(products::router())
        .merge(orders::router())
        .merge(users::router())
        .merge(stats::router())
        .merge(uploads::router())
}

/// Parse an optional enum-valued body field. Anything present but not a
/// known value is rejected with `message`.
fn enum_field<T: FromStr>(value: Option<&Value>, message: &str) -> Result<Option<T>, AppError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s
            .parse()
            .map(Some)
            .map_err(|_| AppError::BadRequest(message.to_string())),
        Some(_) => Err(AppError::BadRequest(message.to_string())),
    }
}

/// Parse `"true"`/`"false"` query flags; anything else is ignored.
fn flag(value: Option<&str>) -> Option<bool> {
    match value?.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
