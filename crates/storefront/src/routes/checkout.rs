//! Direct checkout for payment methods settled outside the gateway.

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use crate::error::{AppError, JsonBody};
use crate::middleware::RequireUser;
use crate::models::Order;
use crate::services::checkout::{
    CheckoutService, parse_direct_payment_method, parse_shipping_address,
};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/checkout", post(checkout))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub shipping_address: Option<Value>,
    pub payment_method: Option<Value>,
}

/// The order summary returned after placement.
pub(crate) fn order_summary(order: &Order) -> Value {
    json!({
        "orderNumber": order.order_number,
        "id": order.id,
        "total_cents": order.total_cents,
        "currency": order.currency,
        "status": order.status,
    })
}

/// Place an order from the caller's cart, taking stock immediately.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn checkout(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    JsonBody(body): JsonBody<CheckoutRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let address = parse_shipping_address(body.shipping_address.as_ref())?;
    let method = parse_direct_payment_method(body.payment_method.as_ref())?;

    let order = CheckoutService::new(state.store(), state.carts())
        .place_order(user.id, address, method)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Order created successfully",
            "order": order_summary(&order),
        })),
    ))
}
