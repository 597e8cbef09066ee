//! Shopping carts.
//!
//! Carts live only in process memory. [`CartStore`] is a bounded `moka`
//! cache keyed by [`CartKey`]; carts idle past the configured timeout are
//! evicted. Every mutation runs through a per-key atomic compute, so two
//! requests against the same cart never lose each other's writes.
//!
//! [`CartService`] layers product checks and read-time enrichment on top.

use std::collections::HashSet;
use std::future::ready;
use std::time::Duration;

use moka::future::Cache;
use moka::ops::compute::Op;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mypeteats_core::{DEFAULT_CURRENCY, ProductId, UserId};

use crate::db::{RepositoryError, Store};
use crate::models::Product;

/// Upper bound on the number of live carts.
const MAX_CARTS: u64 = 100_000;

/// Identifies one cart: `user:<id>` for signed-in shoppers, `session:<token>`
/// for anonymous visitors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CartKey(String);

impl CartKey {
    #[must_use]
    pub fn user(id: UserId) -> Self {
        Self(format!("user:{id}"))
    }

    /// Key for an anonymous visitor, from the random token in their session.
    #[must_use]
    pub fn session(token: &str) -> Self {
        Self(format!("session:{token}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CartKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("Product not found")]
    ProductNotFound,

    /// Adding an unpublished product.
    #[error("Product is not available for purchase")]
    NotPurchasable,

    /// Changing the quantity of a line whose product is gone or unpublished.
    #[error("Product is not available")]
    Unavailable,

    #[error("Only {available} items available in stock")]
    InsufficientStock { available: i32 },

    #[error("Item not found in cart")]
    NotInCart,

    #[error("Cart not found")]
    CartNotFound,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

// =============================================================================
// CartStore
// =============================================================================

/// Bounded in-memory cart storage.
#[derive(Clone)]
pub struct CartStore {
    carts: Cache<String, Vec<CartLine>>,
}

impl CartStore {
    /// Create a store whose carts expire after `idle_timeout` without access.
    #[must_use]
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            carts: Cache::builder()
                .max_capacity(MAX_CARTS)
                .time_to_idle(idle_timeout)
                .build(),
        }
    }

    /// The stored lines, empty when there is no cart.
    pub async fn lines(&self, key: &CartKey) -> Vec<CartLine> {
        self.carts.get(key.as_str()).await.unwrap_or_default()
    }

    /// Whether a cart exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &CartKey) -> bool {
        self.carts.contains_key(key.as_str())
    }

    /// Atomically apply `f` to the cart at `key`.
    ///
    /// `f` sees an empty list when there is no cart. If it fails nothing is
    /// written. A cart left empty is removed.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub async fn update<F>(&self, key: &CartKey, f: F) -> Result<(), CartError>
    where
        F: FnOnce(&mut Vec<CartLine>) -> Result<(), CartError>,
    {
        self.carts
            .entry(key.as_str().to_string())
            .and_try_compute_with(|entry| {
                let mut lines = entry.map(|e| e.into_value()).unwrap_or_default();
                let op = f(&mut lines).map(|()| {
                    if lines.is_empty() {
                        Op::Remove
                    } else {
                        Op::Put(lines)
                    }
                });
                ready(op)
            })
            .await?;
        Ok(())
    }

    /// Drop the cart at `key`.
    pub async fn clear(&self, key: &CartKey) {
        self.carts.invalidate(key.as_str()).await;
    }
}

// =============================================================================
// CartService
// =============================================================================

/// Snapshot of a product as shown in the cart.
#[derive(Debug, Clone, Serialize)]
pub struct CartProduct {
    pub id: ProductId,
    pub title: String,
    pub slug: String,
    pub sku: String,
    pub price_cents: i64,
    pub currency: String,
    pub images: Vec<String>,
    pub inventory: i32,
}

impl From<&Product> for CartProduct {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            title: product.title.clone(),
            slug: product.slug.clone(),
            sku: product.sku.clone(),
            price_cents: product.price_cents,
            currency: product.currency.clone(),
            images: product.images.clone(),
            inventory: product.inventory,
        }
    }
}

/// A cart line enriched with live product data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemView {
    pub product_id: ProductId,
    pub quantity: i32,
    pub product: CartProduct,
}

/// A cart as returned to the shopper.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub subtotal_cents: i64,
    pub total_cents: i64,
    pub currency: String,
}

/// Cart operations that need to see the catalog.
pub struct CartService<'a> {
    store: &'a dyn Store,
    carts: &'a CartStore,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store, carts: &'a CartStore) -> Self {
        Self { store, carts }
    }

    /// Read a cart with current product data.
    ///
    /// Lines whose product has been deleted are dropped, and the stored cart
    /// is compacted so later reads agree.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the product lookup fails.
    pub async fn view(&self, key: &CartKey) -> Result<CartView, CartError> {
        let lines = self.carts.lines(key).await;
        let ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
        let products = self.store.products_by_ids(&ids).await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            if let Some(product) = products.iter().find(|p| p.id == line.product_id) {
                items.push(CartItemView {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    product: CartProduct::from(product),
                });
            }
        }

        if items.len() != lines.len() {
            let missing: HashSet<ProductId> = ids
                .iter()
                .copied()
                .filter(|id| !products.iter().any(|p| p.id == *id))
                .collect();
            tracing::debug!(cart = %key, dropped = missing.len(), "Compacting cart");
            self.carts
                .update(key, |stored| {
                    stored.retain(|l| !missing.contains(&l.product_id));
                    Ok(())
                })
                .await?;
        }

        let subtotal_cents = items
            .iter()
            .map(|i| i.product.price_cents * i64::from(i.quantity))
            .sum();

        Ok(CartView {
            items,
            subtotal_cents,
            total_cents: subtotal_cents,
            currency: DEFAULT_CURRENCY.to_string(),
        })
    }

    /// Add `quantity` (at least 1) of a product, merging with an existing line.
    ///
    /// Out-of-stock products may still be added as a backorder. Otherwise the
    /// merged quantity must fit in current inventory.
    ///
    /// # Errors
    ///
    /// `ProductNotFound`, `NotPurchasable` or `InsufficientStock`.
    pub async fn add(
        &self,
        key: &CartKey,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<Vec<CartLine>, CartError> {
        let quantity = quantity.max(1);
        let product = self
            .store
            .product_by_id(product_id)
            .await?
            .ok_or(CartError::ProductNotFound)?;
        if !product.published {
            return Err(CartError::NotPurchasable);
        }

        let inventory = product.inventory;
        if inventory == 0 {
            tracing::warn!(%product_id, "Product out of stock, adding as backorder");
        }

        self.carts
            .update(key, |lines| {
                let existing = lines.iter_mut().find(|l| l.product_id == product_id);
                let merged = existing
                    .as_ref()
                    .map_or(quantity, |l| l.quantity.saturating_add(quantity));
                if inventory > 0 && inventory < merged {
                    return Err(CartError::InsufficientStock {
                        available: inventory,
                    });
                }
                match existing {
                    Some(line) => line.quantity = merged,
                    None => lines.push(CartLine {
                        product_id,
                        quantity,
                    }),
                }
                Ok(())
            })
            .await?;

        Ok(self.carts.lines(key).await)
    }

    /// Set the quantity of a line already in the cart. Zero or less removes it.
    ///
    /// # Errors
    ///
    /// `NotInCart`, `Unavailable` or `InsufficientStock`.
    pub async fn set_quantity(
        &self,
        key: &CartKey,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<Vec<CartLine>, CartError> {
        let quantity = quantity.max(0);

        let in_cart = self
            .carts
            .lines(key)
            .await
            .iter()
            .any(|l| l.product_id == product_id);
        if !in_cart {
            return Err(CartError::NotInCart);
        }

        if quantity > 0 {
            let product = self
                .store
                .product_by_id(product_id)
                .await?
                .filter(|p| p.published)
                .ok_or(CartError::Unavailable)?;
            if product.inventory < quantity {
                return Err(CartError::InsufficientStock {
                    available: product.inventory,
                });
            }
        }

        self.carts
            .update(key, |lines| {
                let index = lines
                    .iter()
                    .position(|l| l.product_id == product_id)
                    .ok_or(CartError::NotInCart)?;
                if quantity == 0 {
                    lines.remove(index);
                } else if let Some(line) = lines.get_mut(index) {
                    line.quantity = quantity;
                }
                Ok(())
            })
            .await?;

        Ok(self.carts.lines(key).await)
    }

    /// Remove one product's line.
    ///
    /// # Errors
    ///
    /// `CartNotFound` when there is no cart, `NotInCart` when the product is
    /// not in it.
    pub async fn remove(
        &self,
        key: &CartKey,
        product_id: ProductId,
    ) -> Result<Vec<CartLine>, CartError> {
        if !self.carts.contains(key) {
            return Err(CartError::CartNotFound);
        }
        self.carts
            .update(key, |lines| {
                let before = lines.len();
                lines.retain(|l| l.product_id != product_id);
                if lines.len() == before {
                    return Err(CartError::NotInCart);
                }
                Ok(())
            })
            .await?;
        Ok(self.carts.lines(key).await)
    }

    pub async fn clear(&self, key: &CartKey) {
        self.carts.clear(key).await;
    }
}
