//! Orders and the payment state attached to them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use mypeteats_core::{OrderId, OrderStatus, PaymentMethod, PaymentStatus, ProductId, UserId};

/// A line of an order, snapshotting the product as it was at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product: ProductId,
    pub title: String,
    pub sku: String,
    pub price_cents: i64,
    pub quantity: i32,
    pub image: Option<String>,
}

impl OrderItem {
    /// Price times quantity.
    #[must_use]
    pub fn line_total_cents(&self) -> i64 {
        self.price_cents * i64::from(self.quantity)
    }
}

/// Where an order ships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Payment state of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    #[sqlx(rename = "payment_method")]
    pub method: PaymentMethod,
    #[sqlx(rename = "payment_status")]
    pub status: PaymentStatus,
    /// Gateway payment id once payment is captured.
    pub transaction_id: Option<String>,
    /// Gateway-side order mirroring this one.
    pub gateway_order_id: Option<String>,
}

/// A placed order.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    #[serde(rename = "user")]
    pub user_id: UserId,
    #[sqlx(json)]
    pub items: Vec<OrderItem>,
    #[serde(rename = "subtotal_cents")]
    pub subtotal_cents: i64,
    #[serde(rename = "shipping_cents")]
    pub shipping_cents: i64,
    #[serde(rename = "total_cents")]
    pub total_cents: i64,
    pub currency: String,
    pub status: OrderStatus,
    #[sqlx(json)]
    pub shipping_address: ShippingAddress,
    #[sqlx(flatten)]
    pub payment: Payment,
    /// Whether this order's quantities have been taken out of inventory.
    #[serde(skip_serializing)]
    pub stock_committed: bool,
    #[sqlx(json)]
    pub metadata: Map<String, Value>,
    #[serde(rename = "created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updated_at")]
    pub updated_at: DateTime<Utc>,
}

/// An order about to be inserted.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub metadata: Map<String, Value>,
}

/// When an order takes its quantities out of inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockPolicy {
    /// In the same transaction that inserts the order; fails the insert if
    /// any line lacks stock.
    ReserveNow,
    /// When payment is confirmed.
    OnPaymentConfirmation,
}

impl StockPolicy {
    /// The policy for orders paid with `method`.
    #[must_use]
    pub const fn for_method(method: PaymentMethod) -> Self {
        if method.uses_gateway() {
            Self::OnPaymentConfirmation
        } else {
            Self::ReserveNow
        }
    }
}

/// A product that had less stock than an order needed when payment was
/// confirmed. Inventory is floored at zero in that case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockShortfall {
    pub product: ProductId,
    pub requested: i32,
    pub available: i32,
}

/// Outcome of confirming payment for an order.
#[derive(Debug, Clone)]
pub enum PaymentConfirmation {
    /// Payment had already been confirmed; nothing changed.
    AlreadyCompleted(Order),
    /// Payment recorded, and the order confirmed if it was pending.
    Confirmed {
        order: Order,
        shortfalls: Vec<StockShortfall>,
    },
}

impl PaymentConfirmation {
    /// The order after the call.
    #[must_use]
    pub const fn order(&self) -> &Order {
        match self {
            Self::AlreadyCompleted(order) | Self::Confirmed { order, .. } => order,
        }
    }
}

/// Back-office changes to an order. `None` leaves the field as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<PaymentMethod>,
}

/// Filters for order listings.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    /// Only this customer's orders.
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    /// Case-insensitive substring of the order number.
    pub order_number: Option<String>,
}

/// Orders placed on one UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DailyOrderTotals {
    pub day: NaiveDate,
    pub orders: i64,
    /// Value of that day's orders whose payment completed.
    pub revenue_cents: i64,
}

/// Human-facing order number: `ORD-<unix millis>-<sequence padded to 6>`.
#[must_use]
pub fn format_order_number(placed_at: DateTime<Utc>, sequence: i64) -> String {
    format!("ORD-{}-{sequence:06}", placed_at.timestamp_millis())
}
