//! Order management.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use mypeteats_core::{Capability, OrderId, OrderStatus};

use super::{DEFAULT_LIMIT, MAX_LIMIT, enum_field};
use crate::db::Page;
use crate::error::{AppError, JsonBody};
use crate::middleware::RequireStaff;
use crate::models::{OrderFilter, OrderUpdate};
use crate::routes::parse_id;
use crate::routes::products::{Pagination, non_blank};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/orders", get(index))
        .route("/api/admin/orders/{id}", get(show).put(update))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOrderQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub order_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdateRequest {
    pub status: Option<Value>,
    pub payment_status: Option<Value>,
    pub payment_method: Option<Value>,
}

/// All orders, newest first.
pub async fn index(
    State(state): State<AppState>,
    RequireStaff(principal): RequireStaff,
    Query(query): Query<AdminOrderQuery>,
) -> Result<Json<Value>, AppError> {
    principal.require(Capability::ManageOrders)?;

    let page = Page::new(query.page, query.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let status = match non_blank(query.status) {
        Some(s) => Some(
            s.parse::<OrderStatus>()
                .map_err(|_| AppError::BadRequest("Invalid order status".to_string()))?,
        ),
        None => None,
    };
    let filter = OrderFilter {
        user_id: None,
        status,
        order_number: non_blank(query.order_number),
    };
    let result = state.store().list_orders(&filter, page).await?;

    Ok(Json(json!({
        "orders": result.items,
        "pagination": Pagination::new(page, &result),
    })))
}

pub async fn show(
    State(state): State<AppState>,
    RequireStaff(principal): RequireStaff,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    principal.require(Capability::ManageOrders)?;

    let id: OrderId = parse_id(&id, "order")?;
    let order = state
        .store()
        .order_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
    Ok(Json(json!({ "order": order })))
}

/// Change fulfilment status, payment status or payment method.
#[instrument(skip_all, fields(principal = principal.kind(), order_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    RequireStaff(principal): RequireStaff,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<OrderUpdateRequest>,
) -> Result<Json<Value>, AppError> {
    principal.require(Capability::ManageOrders)?;

    let id: OrderId = parse_id(&id, "order")?;
    let update = OrderUpdate {
        status: enum_field(body.status.as_ref(), "Invalid order status")?,
        payment_status: enum_field(body.payment_status.as_ref(), "Invalid payment status")?,
        payment_method: enum_field(body.payment_method.as_ref(), "Invalid payment method")?,
    };

    let order = match state.store().update_order(id, update).await {
        Ok(order) => order,
        Err(crate::db::RepositoryError::NotFound) => {
            return Err(AppError::NotFound("Order not found".to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!(order_number = %order.order_number, status = %order.status, "Order updated");

    Ok(Json(json!({ "message": "Order updated successfully", "order": order })))
}
