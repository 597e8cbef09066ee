//! Turning a cart into an order.
//!
//! Both the direct checkout and the gateway `create-order` flow go through
//! [`CheckoutService::place_order`]. The payment method picks the
//! [`StockPolicy`]: direct orders take stock in the same transaction that
//! inserts them, gateway orders take it when payment is confirmed.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::instrument;

use mypeteats_core::{DEFAULT_CURRENCY, PaymentMethod, UserId};

use crate::db::{RepositoryError, Store};
use crate::models::{NewOrder, Order, OrderItem, ShippingAddress, StockPolicy};
use crate::services::cart::{CartKey, CartStore};

/// Errors from checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Shipping address is required")]
    MissingAddress,

    #[error("{0} is required")]
    MissingField(&'static str),

    /// A cart line points at a product that no longer exists.
    #[error("Some products are no longer available")]
    ProductsUnavailable,

    #[error("Product {title} is no longer available")]
    Unpublished { title: String },

    #[error("Insufficient inventory for {title}. Only {available} available.")]
    InsufficientStock { title: String, available: i32 },

    #[error("Invalid payment method")]
    InvalidPaymentMethod,

    /// Gateway payments must go through `create-order`.
    #[error("Online payments must be started with /api/payments/create-order")]
    GatewayRequired,

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for CheckoutError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::InsufficientStock {
                title, available, ..
            } => Self::InsufficientStock { title, available },
            other => Self::Repository(other),
        }
    }
}

/// Parse and normalize the `shippingAddress` object of a checkout body.
///
/// Every field is trimmed and the email lowercased. `instructions` is kept
/// only when non-blank.
///
/// # Errors
///
/// `MissingAddress` when absent or not an object, otherwise `MissingField`
/// for the first required field (in form order) that is missing, blank or
/// not a string.
pub fn parse_shipping_address(value: Option<&Value>) -> Result<ShippingAddress, CheckoutError> {
    let Some(Value::Object(fields)) = value else {
        return Err(CheckoutError::MissingAddress);
    };

    let required = |name: &'static str| {
        fields
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
            .ok_or(CheckoutError::MissingField(name))
    };

    let first_name = required("firstName")?;
    let last_name = required("lastName")?;
    let email = required("email")?.to_lowercase();
    let phone = required("phone")?;
    let address = required("address")?;
    let city = required("city")?;
    let postal_code = required("postalCode")?;

    let instructions = fields
        .get("instructions")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned);

    Ok(ShippingAddress {
        first_name,
        last_name,
        email,
        phone,
        address,
        city,
        postal_code,
        instructions,
    })
}

/// Parse the optional `paymentMethod` of a direct checkout. Defaults to card.
///
/// # Errors
///
/// `InvalidPaymentMethod` for unknown values, `GatewayRequired` for methods
/// that must use the gateway flow.
pub fn parse_direct_payment_method(value: Option<&Value>) -> Result<PaymentMethod, CheckoutError> {
    let method = match value {
        None | Some(Value::Null) => PaymentMethod::Card,
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| CheckoutError::InvalidPaymentMethod)?,
        Some(_) => return Err(CheckoutError::InvalidPaymentMethod),
    };
    if method.uses_gateway() {
        return Err(CheckoutError::GatewayRequired);
    }
    Ok(method)
}

/// Places orders from carts.
pub struct CheckoutService<'a> {
    store: &'a dyn Store,
    carts: &'a CartStore,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store, carts: &'a CartStore) -> Self {
        Self { store, carts }
    }

    /// Build the order for a user's cart from current catalog data.
    ///
    /// Nothing is written. Prices and titles are snapshotted now.
    ///
    /// # Errors
    ///
    /// `EmptyCart`, `ProductsUnavailable`, `Unpublished` or
    /// `InsufficientStock`.
    pub async fn prepare(
        &self,
        user_id: UserId,
        shipping_address: ShippingAddress,
        payment_method: PaymentMethod,
    ) -> Result<NewOrder, CheckoutError> {
        let lines = self.carts.lines(&CartKey::user(user_id)).await;
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let ids: Vec<_> = lines.iter().map(|l| l.product_id).collect();
        let products = self.store.products_by_ids(&ids).await?;
        if products.len() != lines.len() {
            return Err(CheckoutError::ProductsUnavailable);
        }

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = products
                .iter()
                .find(|p| p.id == line.product_id)
                .ok_or(CheckoutError::ProductsUnavailable)?;
            if !product.published {
                return Err(CheckoutError::Unpublished {
                    title: product.title.clone(),
                });
            }
            if product.inventory < line.quantity {
                return Err(CheckoutError::InsufficientStock {
                    title: product.title.clone(),
                    available: product.inventory,
                });
            }
            items.push(OrderItem {
                product: product.id,
                title: product.title.clone(),
                sku: product.sku.clone(),
                price_cents: product.price_cents,
                quantity: line.quantity,
                image: product.primary_image().map(str::to_owned),
            });
        }

        let subtotal_cents: i64 = items.iter().map(OrderItem::line_total_cents).sum();
        let shipping_cents = 0;

        Ok(NewOrder {
            user_id,
            items,
            subtotal_cents,
            shipping_cents,
            total_cents: subtotal_cents + shipping_cents,
            currency: DEFAULT_CURRENCY.to_string(),
            shipping_address,
            payment_method,
            metadata: Map::new(),
        })
    }

    /// Place an order for the user's cart.
    ///
    /// Orders that take stock now also clear the cart. Gateway orders keep
    /// it until payment is confirmed.
    ///
    /// # Errors
    ///
    /// Everything [`Self::prepare`] returns, plus `InsufficientStock` when a
    /// concurrent order took the stock between the check and the insert.
    #[instrument(skip(self, shipping_address), fields(user_id = %user_id, method = %payment_method))]
    pub async fn place_order(
        &self,
        user_id: UserId,
        shipping_address: ShippingAddress,
        payment_method: PaymentMethod,
    ) -> Result<Order, CheckoutError> {
        let new_order = self
            .prepare(user_id, shipping_address, payment_method)
            .await?;
        let policy = StockPolicy::for_method(payment_method);
        let order = self.store.place_order(new_order, policy).await?;

        if policy == StockPolicy::ReserveNow {
            self.carts.clear(&CartKey::user(user_id)).await;
        }

        tracing::info!(
            order_number = %order.order_number,
            total_cents = order.total_cents,
            items = order.items.len(),
            "Order placed"
        );
        Ok(order)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use mypeteats_core::{Email, OrderStatus, PaymentStatus, ProductId, UserRole};

    use super::*;
    use crate::db::{MemoryStore, ProductStore, UserStore};
    use crate::models::{NewUser, Product, ProductDraft};

    fn address_json() -> Value {
        json!({
            "firstName": " Asha ",
            "lastName": "Rao",
            "email": " Asha@Example.COM ",
            "phone": "9876543210",
            "address": "12 MG Road",
            "city": "Pune",
            "postalCode": "411001",
            "instructions": "   "
        })
    }

    fn address() -> ShippingAddress {
        parse_shipping_address(Some(&address_json())).unwrap()
    }

    async fn product(store: &MemoryStore, sku: &str, price_cents: i64, inventory: i32) -> Product {
        store
            .insert_product(ProductDraft {
                sku: sku.to_string(),
                title: format!("{sku} title"),
                slug: sku.to_lowercase(),
                description: String::new(),
                price_cents,
                currency: "INR".to_string(),
                inventory,
                images: vec![format!("/uploads/products/{sku}.png")],
                categories: Vec::new(),
                attributes: Map::new(),
                published: true,
                metadata: Map::new(),
            })
            .await
            .unwrap()
    }

    async fn user(store: &MemoryStore) -> UserId {
        store
            .insert_user(NewUser {
                name: "Asha".to_string(),
                email: Email::parse("asha@example.com").unwrap(),
                password_hash: "x".to_string(),
                role: UserRole::Customer,
                phone: None,
                club_member: false,
            })
            .await
            .unwrap()
            .id
    }

    async fn fill_cart(carts: &CartStore, user: UserId, lines: &[(ProductId, i32)]) {
        for &(product_id, quantity) in lines {
            carts
                .update(&CartKey::user(user), |cart| {
                    cart.push(crate::services::cart::CartLine {
                        product_id,
                        quantity,
                    });
                    Ok(())
                })
                .await
                .unwrap();
        }
    }

    #[test]
    fn test_address_normalized() {
        let address = address();
        assert_eq!(address.first_name, "Asha");
        assert_eq!(address.email, "asha@example.com");
        assert!(address.instructions.is_none());
    }

    #[test]
    fn test_address_reports_first_missing_field() {
        assert!(matches!(
            parse_shipping_address(None),
            Err(CheckoutError::MissingAddress)
        ));

        let mut body = address_json();
        body["phone"] = json!("  ");
        body["city"] = json!(null);
        let err = parse_shipping_address(Some(&body)).unwrap_err();
        assert_eq!(err.to_string(), "phone is required");

        let mut body = address_json();
        body["postalCode"] = json!(411_001);
        let err = parse_shipping_address(Some(&body)).unwrap_err();
        assert_eq!(err.to_string(), "postalCode is required");
    }

    #[test]
    fn test_direct_payment_method() {
        assert_eq!(parse_direct_payment_method(None).unwrap(), PaymentMethod::Card);
        assert_eq!(
            parse_direct_payment_method(Some(&json!("upi"))).unwrap(),
            PaymentMethod::Upi
        );
        assert!(matches!(
            parse_direct_payment_method(Some(&json!("razorpay"))),
            Err(CheckoutError::GatewayRequired)
        ));
        assert!(matches!(
            parse_direct_payment_method(Some(&json!("bitcoin"))),
            Err(CheckoutError::InvalidPaymentMethod)
        ));
    }

    #[tokio::test]
    async fn test_totals_and_stock_for_direct_order() {
        let store = MemoryStore::new();
        let carts = CartStore::new(Duration::from_secs(60));
        let user = user(&store).await;
        let kibble = product(&store, "KIB", 1250, 5).await;
        let treats = product(&store, "TRT", 399, 10).await;
        fill_cart(&carts, user, &[(kibble.id, 3), (treats.id, 2)]).await;

        let order = CheckoutService::new(&store, &carts)
            .place_order(user, address(), PaymentMethod::CashOnDelivery)
            .await
            .unwrap();

        assert_eq!(order.subtotal_cents, 3 * 1250 + 2 * 399);
        assert_eq!(order.total_cents, order.subtotal_cents);
        assert_eq!(order.shipping_cents, 0);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment.status, PaymentStatus::Pending);
        assert_eq!(order.items[0].image.as_deref(), Some("/uploads/products/KIB.png"));

        assert_eq!(store.product_by_id(kibble.id).await.unwrap().unwrap().inventory, 2);
        assert_eq!(store.product_by_id(treats.id).await.unwrap().unwrap().inventory, 8);
        assert!(carts.lines(&CartKey::user(user)).await.is_empty());
    }

    #[tokio::test]
    async fn test_gateway_order_keeps_stock_and_cart() {
        let store = MemoryStore::new();
        let carts = CartStore::new(Duration::from_secs(60));
        let user = user(&store).await;
        let kibble = product(&store, "KIB", 1250, 5).await;
        fill_cart(&carts, user, &[(kibble.id, 3)]).await;

        let order = CheckoutService::new(&store, &carts)
            .place_order(user, address(), PaymentMethod::Razorpay)
            .await
            .unwrap();

        assert!(!order.stock_committed);
        assert_eq!(store.product_by_id(kibble.id).await.unwrap().unwrap().inventory, 5);
        assert_eq!(carts.lines(&CartKey::user(user)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_stock_changes_nothing() {
        let store = MemoryStore::new();
        let carts = CartStore::new(Duration::from_secs(60));
        let user = user(&store).await;
        let kibble = product(&store, "KIB", 1250, 2).await;
        fill_cart(&carts, user, &[(kibble.id, 5)]).await;

        let err = CheckoutService::new(&store, &carts)
            .place_order(user, address(), PaymentMethod::Card)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Insufficient inventory for KIB title. Only 2 available."
        );
        assert_eq!(store.product_by_id(kibble.id).await.unwrap().unwrap().inventory, 2);
        assert_eq!(carts.lines(&CartKey::user(user)).await[0].quantity, 5);
    }

    #[tokio::test]
    async fn test_empty_cart_and_vanished_product() {
        let store = MemoryStore::new();
        let carts = CartStore::new(Duration::from_secs(60));
        let user = user(&store).await;
        let checkout = CheckoutService::new(&store, &carts);

        assert!(matches!(
            checkout.place_order(user, address(), PaymentMethod::Card).await,
            Err(CheckoutError::EmptyCart)
        ));

        let kibble = product(&store, "KIB", 1250, 5).await;
        fill_cart(&carts, user, &[(kibble.id, 1), (ProductId::new(999), 1)]).await;
        assert!(matches!(
            checkout.place_order(user, address(), PaymentMethod::Card).await,
            Err(CheckoutError::ProductsUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_unpublished_product_rejected() {
        let store = MemoryStore::new();
        let carts = CartStore::new(Duration::from_secs(60));
        let user = user(&store).await;
        let kibble = product(&store, "KIB", 1250, 5).await;
        let mut draft = kibble.to_draft();
        draft.published = false;
        store.update_product(kibble.id, draft).await.unwrap();
        fill_cart(&carts, user, &[(kibble.id, 1)]).await;

        let err = CheckoutService::new(&store, &carts)
            .place_order(user, address(), PaymentMethod::Card)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Product KIB title is no longer available");
    }
}
