//! Customer order history.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};

use mypeteats_core::OrderId;

use super::parse_id;
use super::products::Pagination;
use crate::db::Page;
use crate::error::AppError;
use crate::middleware::RequireUser;
use crate::models::OrderFilter;
use crate::state::AppState;

const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/orders", get(index))
        .route("/api/orders/{id}", get(show))
}

#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// The caller's orders, newest first.
pub async fn index(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(query): Query<OrderQuery>,
) -> Result<Json<Value>, AppError> {
    let page = Page::new(query.page, query.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let filter = OrderFilter {
        user_id: Some(user.id),
        ..OrderFilter::default()
    };

    let result = state.store().list_orders(&filter, page).await?;
    Ok(Json(json!({
        "orders": result.items,
        "pagination": Pagination::new(page, &result),
    })))
}

/// One of the caller's orders. Other customers' orders are not found.
pub async fn show(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id: OrderId = parse_id(&id, "order")?;
    let order = state
        .store()
        .order_by_id(id)
        .await?
        .filter(|o| o.user_id == user.id)
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
    Ok(Json(json!({ "order": order })))
}
