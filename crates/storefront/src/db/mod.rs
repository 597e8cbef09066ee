//! Persistence for users, products and orders.
//!
//! # Database: `mypeteats`
//!
//! ## Tables
//!
//! - `users` - Customer and staff accounts
//! - `products` - Catalog, including live inventory
//! - `orders` - Placed orders with item snapshots and payment state
//! - `tower_sessions.session` - Session storage (created by the session store)
//!
//! # Stores
//!
//! Handlers reach persistence through the [`UserStore`], [`ProductStore`] and
//! [`OrderStore`] traits, bundled as [`Store`]. [`PgStore`] is the production
//! implementation; [`MemoryStore`] keeps everything in process for tests.
//!
//! # Migrations
//!
//! Migrations live in `crates/storefront/migrations/` and are embedded into
//! the binary. [`run_migrations`] applies them at startup.

pub mod memory;
pub mod orders;
pub mod products;
pub mod users;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use mypeteats_core::{Email, OrderId, OrderStatus, ProductId, UserId};

use crate::models::{
    DailyOrderTotals, NewOrder, NewUser, Order, OrderFilter, OrderUpdate, PaymentConfirmation,
    Product, ProductCounts, ProductDraft, ProductFilter, StockPolicy, User, UserCounts, UserFilter,
};

pub use memory::MemoryStore;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Unique constraint violation. Carries the field that collided.
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A line of an order asked for more than is in stock.
    #[error("insufficient inventory for {title}: {available} available")]
    InsufficientStock {
        product: ProductId,
        title: String,
        available: i32,
    },
}

impl RepositoryError {
    /// Map a sqlx error, turning unique violations into [`Self::Conflict`]
    /// named after the column the constraint guards, and foreign key
    /// violations into `Conflict("referenced")`.
    pub(crate) fn from_write(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            let field = match db_err.constraint() {
                Some(c) if c.contains("email") => "email",
                Some(c) if c.contains("sku") => "sku",
                Some(c) if c.contains("slug") => "slug",
                Some(c) if c.contains("order_number") => "order_number",
                _ => "unique",
            };
            return Self::Conflict(field.to_string());
        }
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_foreign_key_violation()
        {
            return Self::Conflict("referenced".to_string());
        }
        Self::Database(e)
    }
}

/// A page request: 1-based page number and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    /// Clamp client-supplied paging to `1..` and `1..=max_limit`.
    #[must_use]
    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32, max_limit: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, max_limit),
        }
    }

    /// Rows to skip.
    #[must_use]
    pub fn offset(self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }
}

/// One page of results plus the total number of matches.
#[derive(Debug, Clone)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
}

// =============================================================================
// Store traits
// =============================================================================

/// Account persistence.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user. Fails with `Conflict("email")` if the email is taken.
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError>;

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    async fn user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// Look a user up by display name, for username logins.
    async fn user_by_name(&self, name: &str) -> Result<Option<User>, RepositoryError>;

    /// Newest first.
    async fn list_users(
        &self,
        filter: &UserFilter,
        page: Page,
    ) -> Result<Paginated<User>, RepositoryError>;

    /// Save every editable field of `user`.
    async fn update_user(&self, user: &User) -> Result<User, RepositoryError>;

    async fn delete_user(&self, id: UserId) -> Result<bool, RepositoryError>;

    async fn user_counts(&self) -> Result<UserCounts, RepositoryError>;
}

/// Catalog persistence.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Insert a product. Fails with `Conflict("sku")` or `Conflict("slug")`.
    async fn insert_product(&self, draft: ProductDraft) -> Result<Product, RepositoryError>;

    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Lookup regardless of published state.
    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError>;

    /// Batch lookup. Missing ids are simply absent from the result.
    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError>;

    /// Newest first.
    async fn list_products(
        &self,
        filter: &ProductFilter,
        page: Page,
    ) -> Result<Paginated<Product>, RepositoryError>;

    async fn update_product(
        &self,
        id: ProductId,
        draft: ProductDraft,
    ) -> Result<Product, RepositoryError>;

    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError>;

    /// Whether a product other than `except` already uses `slug`.
    async fn slug_exists(
        &self,
        slug: &str,
        except: Option<ProductId>,
    ) -> Result<bool, RepositoryError>;

    /// Totals, counting products with inventory below `low_inventory_below`
    /// as low.
    async fn product_counts(
        &self,
        low_inventory_below: i32,
    ) -> Result<ProductCounts, RepositoryError>;
}

/// Order persistence, including the inventory moves tied to orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert an order with a fresh order number.
    ///
    /// With [`StockPolicy::ReserveNow`] every line's quantity is taken from
    /// inventory in the same atomic unit as the insert, and the whole call
    /// fails with [`RepositoryError::InsufficientStock`] (changing nothing)
    /// if any line cannot be covered.
    async fn place_order(
        &self,
        order: NewOrder,
        stock: StockPolicy,
    ) -> Result<Order, RepositoryError>;

    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Newest first.
    async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: Page,
    ) -> Result<Paginated<Order>, RepositoryError>;

    /// Record the gateway-side order id.
    async fn set_gateway_order_id(
        &self,
        id: OrderId,
        gateway_order_id: &str,
    ) -> Result<Order, RepositoryError>;

    /// Mark payment completed. A still-pending order is confirmed and has its
    /// stock committed unless that already happened; an order an admin has
    /// moved on (cancelled, shipped) keeps its status and takes no stock.
    /// Serialized per order: of any number of
    /// concurrent calls, exactly one returns `Confirmed`.
    async fn confirm_payment(
        &self,
        id: OrderId,
        transaction_id: &str,
    ) -> Result<PaymentConfirmation, RepositoryError>;

    /// Mark payment failed if it is still pending. Returns whether it changed.
    async fn mark_payment_failed(&self, id: OrderId) -> Result<bool, RepositoryError>;

    async fn update_order(
        &self,
        id: OrderId,
        update: OrderUpdate,
    ) -> Result<Order, RepositoryError>;

    /// Orders placed since `since` (all orders when `None`).
    async fn count_orders(&self, since: Option<DateTime<Utc>>) -> Result<i64, RepositoryError>;

    async fn order_status_counts(&self) -> Result<Vec<(OrderStatus, i64)>, RepositoryError>;

    /// Sum of totals for orders with completed payment placed since `since`.
    async fn completed_revenue(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64, RepositoryError>;

    /// Per-day totals for days with at least one order since `since`.
    async fn daily_order_totals(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyOrderTotals>, RepositoryError>;
}

/// Everything the service persists.
#[async_trait]
pub trait Store: UserStore + ProductStore + OrderStore {
    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

// =============================================================================
// Postgres
// =============================================================================

/// Postgres-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, shared with the session store.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Apply the embedded migrations.
///
/// # Errors
///
/// Returns an error if a migration fails to apply.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Escape `%`, `_` and `\` so user input matches literally inside `ILIKE`.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamps() {
        assert_eq!(Page::new(None, None, 20, 100), Page { page: 1, limit: 20 });
        assert_eq!(Page::new(Some(0), Some(0), 20, 100), Page { page: 1, limit: 1 });
        assert_eq!(Page::new(Some(3), Some(500), 20, 100), Page { page: 3, limit: 100 });
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(Page { page: 1, limit: 20 }.offset(), 0);
        assert_eq!(Page { page: 4, limit: 25 }.offset(), 75);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("cat"), "%cat%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }
}
