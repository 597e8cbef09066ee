//! Payment gateway flow: create the gateway order, verify the widget's
//! signature, and receive webhooks.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use mypeteats_core::{OrderId, PaymentMethod};

use super::checkout::CheckoutRequest;
use super::id_from_json;
use crate::error::{AppError, JsonBody};
use crate::middleware::RequireUser;
use crate::models::PaymentConfirmation;
use crate::services::checkout::{CheckoutService, parse_shipping_address};
use crate::services::payments::{
    GatewayOrderRequest, PaymentEntity, Payments, WebhookEvent, confirm_order_payment,
};
use crate::state::AppState;

/// Header carrying the webhook signature.
pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-razorpay-signature";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/payments/create-order", post(create_order))
        .route("/api/payments/verify", post(verify))
        .route("/api/payments/webhook", post(webhook))
}

fn payments(state: &AppState) -> Result<&Payments, AppError> {
    state.payments().ok_or(AppError::PaymentsUnavailable)
}

// =============================================================================
// Create order
// =============================================================================

/// Place a gateway order for the caller's cart and open it with the gateway.
///
/// Stock is not taken until payment is confirmed, and the cart is kept until
/// then.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn create_order(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    JsonBody(body): JsonBody<CheckoutRequest>,
) -> Result<Json<Value>, AppError> {
    let payments = payments(&state)?;
    let address = parse_shipping_address(body.shipping_address.as_ref())?;

    let order = CheckoutService::new(state.store(), state.carts())
        .place_order(user.id, address, PaymentMethod::Razorpay)
        .await?;

    let gateway_order = match payments
        .gateway()
        .create_order(&GatewayOrderRequest::for_order(&order))
        .await
    {
        Ok(gateway_order) => gateway_order,
        Err(e) => {
            tracing::error!(order_number = %order.order_number, error = %e, "Gateway order creation failed");
            if let Err(mark_err) = state.store().mark_payment_failed(order.id).await {
                tracing::error!(order_number = %order.order_number, error = %mark_err, "Failed to mark payment failed");
            }
            return Err(e.into());
        }
    };

    let order = state
        .store()
        .set_gateway_order_id(order.id, &gateway_order.id)
        .await?;

    Ok(Json(json!({
        "orderId": order.id,
        "orderNumber": order.order_number,
        "razorpayOrderId": gateway_order.id,
        "amount": order.total_cents,
        "currency": order.currency,
        "key": payments.key_id(),
    })))
}

// =============================================================================
// Verify
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub razorpay_signature: Option<String>,
    #[serde(rename = "orderId")]
    pub order_id: Option<Value>,
}

/// Confirm payment from the signature the checkout widget hands back.
#[instrument(skip_all)]
pub async fn verify(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<VerifyRequest>,
) -> Result<Json<Value>, AppError> {
    let payments = payments(&state)?;

    let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let (Some(gateway_order_id), Some(payment_id), Some(signature), Some(order_id)) = (
        present(body.razorpay_order_id),
        present(body.razorpay_payment_id),
        present(body.razorpay_signature),
        body.order_id.filter(|v| !v.is_null()),
    ) else {
        return Err(AppError::BadRequest(
            "Missing payment verification data".to_string(),
        ));
    };

    if !payments.verify_payment(&gateway_order_id, &payment_id, &signature) {
        tracing::warn!(%gateway_order_id, "Invalid payment signature");
        return Err(AppError::BadRequest("Invalid payment signature".to_string()));
    }

    let order_id: OrderId = id_from_json(&order_id, "order")?;
    let order = state
        .store()
        .order_by_id(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    if order.payment.gateway_order_id.as_deref() != Some(gateway_order_id.as_str()) {
        tracing::warn!(
            order_number = %order.order_number,
            %gateway_order_id,
            "Signed payment belongs to a different gateway order"
        );
        return Err(AppError::BadRequest("Payment does not match order".to_string()));
    }

    match confirm_order_payment(state.store(), state.carts(), order.id, &payment_id).await? {
        PaymentConfirmation::AlreadyCompleted(order) => Ok(Json(json!({
            "success": true,
            "message": "Payment already verified",
            "order": { "id": order.id, "orderNumber": order.order_number },
        }))),
        PaymentConfirmation::Confirmed { order, .. } => Ok(Json(json!({
            "success": true,
            "message": "Payment verified successfully",
            "order": {
                "id": order.id,
                "orderNumber": order.order_number,
                "status": order.status,
            },
        }))),
    }
}

// =============================================================================
// Webhook
// =============================================================================

/// Gateway-to-server notifications, signed over the raw body.
///
/// Once the signature checks out the response is always 200, so the gateway
/// stops retrying even if the event is irrelevant or refers to an unknown
/// order.
#[instrument(skip_all)]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let payments = payments(&state)?;
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match payments.verify_webhook(&body, signature) {
        None => {
            tracing::warn!("Webhook received but no webhook secret is configured");
            return Err(AppError::PaymentsUnavailable);
        }
        Some(false) => {
            tracing::warn!("Invalid webhook signature");
            return Err(AppError::BadRequest("Invalid signature".to_string()));
        }
        Some(true) => {}
    }

    let received = Json(json!({ "received": true }));
    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable webhook payload");
            return Ok(received);
        }
    };

    match (event.event.as_str(), event.payment()) {
        ("payment.captured", Some(payment)) => payment_captured(&state, payment).await?,
        ("payment.failed", Some(payment)) => payment_failed(&state, payment).await?,
        (other, _) => tracing::debug!(event = other, "Ignoring webhook event"),
    }

    Ok(received)
}

async fn payment_captured(state: &AppState, payment: &PaymentEntity) -> Result<(), AppError> {
    let Some(order_id) = payment.storefront_order_id() else {
        tracing::warn!(payment_id = %payment.id, "Captured payment has no order id in notes");
        return Ok(());
    };
    let Some(order) = state.store().order_by_id(order_id).await? else {
        tracing::warn!(%order_id, "Webhook for unknown order");
        return Ok(());
    };
    if let Some(amount) = payment.amount
        && amount != order.total_cents
    {
        tracing::warn!(
            order_number = %order.order_number,
            amount,
            expected = order.total_cents,
            "Captured amount does not match order total"
        );
        return Ok(());
    }

    confirm_order_payment(state.store(), state.carts(), order.id, &payment.id).await?;
    Ok(())
}

async fn payment_failed(state: &AppState, payment: &PaymentEntity) -> Result<(), AppError> {
    let Some(order_id) = payment.storefront_order_id() else {
        return Ok(());
    };
    if state.store().mark_payment_failed(order_id).await? {
        tracing::info!(%order_id, "Payment failed");
    }
    Ok(())
}
