//! Payment gateway integration.
//!
//! [`PaymentGateway`] is the outbound seam: creating the gateway-side order
//! that the embedded checkout widget pays against. [`Payments`] bundles a
//! gateway with the secrets needed to check what comes back, either from the
//! widget ([`Payments::verify_payment`]) or from webhooks
//! ([`Payments::verify_webhook`]).

pub mod razorpay;
pub mod signature;

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mypeteats_core::OrderId;

use crate::config::RazorpayConfig;
use crate::db::{RepositoryError, Store};
use crate::models::{Order, PaymentConfirmation};
use crate::services::cart::{CartKey, CartStore};

pub use razorpay::RazorpayClient;

/// Errors that can occur when talking to the payment gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Metadata attached to a gateway order, echoed back in webhooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayNotes {
    pub order_id: String,
    pub user_id: String,
    pub order_number: String,
}

/// Body of a create-order call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayOrderRequest {
    /// Minor units.
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: GatewayNotes,
}

impl GatewayOrderRequest {
    /// The gateway order mirroring `order`.
    #[must_use]
    pub fn for_order(order: &Order) -> Self {
        Self {
            amount: order.total_cents,
            currency: order.currency.clone(),
            receipt: order.order_number.clone(),
            notes: GatewayNotes {
                order_id: order.id.to_string(),
                user_id: order.user_id.to_string(),
                order_number: order.order_number.clone(),
            },
        }
    }
}

/// A gateway-side order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Outbound payment gateway operations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a gateway order for the embedded checkout widget to pay.
    async fn create_order(
        &self,
        request: &GatewayOrderRequest,
    ) -> Result<GatewayOrder, GatewayError>;
}

/// A configured gateway plus the secrets that authenticate its callbacks.
pub struct Payments {
    gateway: Arc<dyn PaymentGateway>,
    key_id: String,
    key_secret: SecretString,
    webhook_secret: Option<SecretString>,
}

impl Payments {
    /// Wrap an existing gateway implementation.
    #[must_use]
    pub fn new(config: &RazorpayConfig, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            gateway,
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    /// Build the Razorpay-backed payments service.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn razorpay(config: &RazorpayConfig) -> Result<Self, GatewayError> {
        let client = RazorpayClient::new(config)?;
        Ok(Self::new(config, Arc::new(client)))
    }

    /// Publishable key id, handed to the checkout widget.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    #[must_use]
    pub fn gateway(&self) -> &dyn PaymentGateway {
        self.gateway.as_ref()
    }

    /// Check the signature the widget returns for a completed payment.
    #[must_use]
    pub fn verify_payment(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> bool {
        signature::verify_payment(
            self.key_secret.expose_secret().as_bytes(),
            gateway_order_id,
            payment_id,
            signature,
        )
    }

    /// Check a webhook signature. `None` when no webhook secret is configured.
    #[must_use]
    pub fn verify_webhook(&self, body: &[u8], signature: &str) -> Option<bool> {
        self.webhook_secret.as_ref().map(|secret| {
            signature::verify_webhook(secret.expose_secret().as_bytes(), body, signature)
        })
    }
}

/// Record a captured payment and clear the buyer's cart.
///
/// Stock shortfalls found while committing inventory are logged; the payment
/// is still recorded since the money has already moved.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the order does not exist.
pub async fn confirm_order_payment(
    store: &dyn Store,
    carts: &CartStore,
    order_id: OrderId,
    payment_id: &str,
) -> Result<PaymentConfirmation, RepositoryError> {
    let confirmation = store.confirm_payment(order_id, payment_id).await?;

    if let PaymentConfirmation::Confirmed { order, shortfalls } = &confirmation {
        for shortfall in shortfalls {
            tracing::warn!(
                order_number = %order.order_number,
                product_id = %shortfall.product,
                requested = shortfall.requested,
                available = shortfall.available,
                "Stock shortfall at payment confirmation"
            );
        }
        carts.clear(&CartKey::user(order.user_id)).await;
        tracing::info!(order_number = %order.order_number, "Payment confirmed");
    }

    Ok(confirmation)
}

// =============================================================================
// Webhook payloads
// =============================================================================

/// A webhook delivery, reduced to the fields the storefront acts on.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: Option<WebhookPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub payment: Option<WebhookEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEntity {
    pub entity: PaymentEntity,
}

/// A gateway payment object.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub order_id: Option<String>,
    /// An object when notes were set, an empty array when not.
    #[serde(default)]
    pub notes: serde_json::Value,
}

impl PaymentEntity {
    /// The storefront order named in the payment's notes, if any.
    #[must_use]
    pub fn storefront_order_id(&self) -> Option<OrderId> {
        match self.notes.get("orderId")? {
            serde_json::Value::String(s) => s.trim().parse::<i32>().ok().map(OrderId::new),
            serde_json::Value::Number(n) => {
                n.as_i64().and_then(|n| i32::try_from(n).ok()).map(OrderId::new)
            }
            _ => None,
        }
    }
}

impl WebhookEvent {
    /// The payment this event is about.
    #[must_use]
    pub fn payment(&self) -> Option<&PaymentEntity> {
        self.payload
            .as_ref()
            .and_then(|p| p.payment.as_ref())
            .map(|p| &p.entity)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_order_id_from_notes() {
        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "event": "payment.captured",
            "payload": {"payment": {"entity": {
                "id": "pay_123",
                "amount": 4500,
                "order_id": "order_abc",
                "notes": {"orderId": "42", "orderNumber": "ORD-1-000001"}
            }}}
        }))
        .unwrap();

        let payment = event.payment().unwrap();
        assert_eq!(payment.storefront_order_id(), Some(OrderId::new(42)));
        assert_eq!(payment.amount, Some(4500));
    }

    #[test]
    fn test_webhook_without_notes() {
        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "event": "payment.failed",
            "payload": {"payment": {"entity": {"id": "pay_1", "notes": []}}}
        }))
        .unwrap();
        assert_eq!(event.payment().unwrap().storefront_order_id(), None);

        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "event": "payment.failed",
            "payload": {"payment": {"entity": {"id": "pay_1"}}}
        }))
        .unwrap();
        assert_eq!(event.payment().unwrap().storefront_order_id(), None);
    }

    #[test]
    fn test_unrelated_event_has_no_payment() {
        let event: WebhookEvent =
            serde_json::from_value(serde_json::json!({"event": "order.paid"})).unwrap();
        assert!(event.payment().is_none());
    }

    #[test]
    fn test_gateway_request_wire_format() {
        let request = GatewayOrderRequest {
            amount: 4500,
            currency: "INR".to_string(),
            receipt: "ORD-1-000001".to_string(),
            notes: GatewayNotes {
                order_id: "7".to_string(),
                user_id: "3".to_string(),
                order_number: "ORD-1-000001".to_string(),
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["notes"]["orderId"], "7");
        assert_eq!(json["receipt"], "ORD-1-000001");
        assert_eq!(json["amount"], 4500);
    }
}
