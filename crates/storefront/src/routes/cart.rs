//! Cart route handlers.
//!
//! Clients send `productId` and `quantity` as either JSON numbers or numeric
//! strings; both are accepted.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use mypeteats_core::ProductId;

use super::{id_from_json, parse_id};
use crate::error::{AppError, JsonBody};
use crate::middleware::CurrentCart;
use crate::services::cart::{CartLine, CartService, CartView};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/cart",
            get(show).post(add).put(update).delete(clear),
        )
        .route("/api/cart/{product_id}", delete(remove))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemRequest {
    pub product_id: Option<Value>,
    pub quantity: Option<Value>,
}

fn product_id(value: Option<&Value>) -> Result<ProductId, AppError> {
    match value {
        None | Some(Value::Null) => Err(AppError::BadRequest("Product ID is required".to_string())),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Err(AppError::BadRequest("Product ID is required".to_string()))
        }
        Some(value) => id_from_json(value, "product"),
    }
}

/// Whole-number quantity, or `None` if the value is not numeric.
#[allow(clippy::cast_possible_truncation)]
fn quantity(value: Option<&Value>) -> Option<i32> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite()
        .then(|| n.floor().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32)
}

fn cart_response(message: &str, items: &[CartLine]) -> Json<Value> {
    Json(json!({ "message": message, "cart": { "items": items } }))
}

/// The cart with live product data and totals.
pub async fn show(
    State(state): State<AppState>,
    CurrentCart(key): CurrentCart,
) -> Result<Json<CartView>, AppError> {
    let view = CartService::new(state.store(), state.carts()).view(&key).await?;
    Ok(Json(view))
}

/// Add a product. Quantity defaults to 1.
#[instrument(skip_all, fields(cart = %key))]
pub async fn add(
    State(state): State<AppState>,
    CurrentCart(key): CurrentCart,
    JsonBody(body): JsonBody<CartItemRequest>,
) -> Result<Json<Value>, AppError> {
    let product_id = product_id(body.product_id.as_ref())?;
    let quantity = quantity(body.quantity.as_ref()).filter(|q| *q > 0).unwrap_or(1);

    let items = CartService::new(state.store(), state.carts())
        .add(&key, product_id, quantity)
        .await?;
    Ok(cart_response("Item added to cart", &items))
}

/// Set a line's quantity. Zero removes the line.
#[instrument(skip_all, fields(cart = %key))]
pub async fn update(
    State(state): State<AppState>,
    CurrentCart(key): CurrentCart,
    JsonBody(body): JsonBody<CartItemRequest>,
) -> Result<Json<Value>, AppError> {
    let product_id = product_id(body.product_id.as_ref())?;
    let quantity = quantity(body.quantity.as_ref()).unwrap_or(0);

    let items = CartService::new(state.store(), state.carts())
        .set_quantity(&key, product_id, quantity)
        .await?;
    Ok(cart_response("Cart updated", &items))
}

pub async fn remove(
    State(state): State<AppState>,
    CurrentCart(key): CurrentCart,
    Path(raw_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let product_id = parse_id(&raw_id, "product")?;
    let items = CartService::new(state.store(), state.carts())
        .remove(&key, product_id)
        .await?;
    Ok(cart_response("Item removed from cart", &items))
}

pub async fn clear(State(state): State<AppState>, CurrentCart(key): CurrentCart) -> Json<Value> {
    CartService::new(state.store(), state.carts()).clear(&key).await;
    Json(json!({ "message": "Cart cleared" }))
}
