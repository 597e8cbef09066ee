//! In-process [`Store`] for tests and local experiments.
//!
//! All tables sit behind one async mutex, so every trait method is atomic
//! with respect to every other. That gives the same guarantees the Postgres
//! transactions give: placement either reserves every line or nothing, and
//! payment confirmation commits stock at most once per order.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use mypeteats_core::{Email, OrderId, OrderStatus, PaymentStatus, ProductId, UserId, UserRole};

use super::{OrderStore, Page, Paginated, ProductStore, RepositoryError, Store, UserStore};
use crate::models::{
    DailyOrderTotals, NewOrder, NewUser, Order, OrderFilter, OrderUpdate, Payment,
    PaymentConfirmation, Product, ProductCounts, ProductDraft, ProductFilter, StockPolicy,
    StockShortfall, User, UserCounts, UserFilter, format_order_number,
};

#[derive(Default)]
struct MemoryData {
    users: BTreeMap<UserId, User>,
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, Order>,
    next_user_id: i32,
    next_product_id: i32,
    next_order_id: i32,
    order_sequence: i64,
}

impl MemoryData {
    fn sku_or_slug_taken(
        &self,
        draft: &ProductDraft,
        except: Option<ProductId>,
    ) -> Option<&'static str> {
        for product in self.products.values().filter(|p| Some(p.id) != except) {
            if product.sku == draft.sku {
                return Some("sku");
            }
            if product.slug == draft.slug {
                return Some("slug");
            }
        }
        None
    }
}

/// A [`Store`] that keeps everything in memory.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<MemoryData>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move an order's placement time into the past, for exercising
    /// date-windowed queries.
    pub async fn backdate_order(&self, id: OrderId, by: Duration) {
        if let Some(order) = self.data.lock().await.orders.get_mut(&id) {
            order.created_at -= by;
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Newest first, then slice out one page.
fn paginate<T, F>(mut matches: Vec<T>, page: Page, key: F) -> Paginated<T>
where
    F: Fn(&T) -> (DateTime<Utc>, i32),
{
    matches.sort_by(|a, b| key(b).cmp(&key(a)));
    let total = i64::try_from(matches.len()).unwrap_or(i64::MAX);
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let items = matches
        .into_iter()
        .skip(offset)
        .take(page.limit as usize)
        .collect();
    Paginated { items, total }
}

fn count(items: impl Iterator) -> i64 {
    i64::try_from(items.count()).unwrap_or(i64::MAX)
}

// =============================================================================
// Users
// =============================================================================

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut data = self.data.lock().await;
        if data.users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::Conflict("email".to_string()));
        }

        data.next_user_id += 1;
        let now = Utc::now();
        let stored = User {
            id: UserId::new(data.next_user_id),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            phone: user.phone,
            club_member: user.club_member,
            created_at: now,
            updated_at: now,
        };
        data.users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.data.lock().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data.users.values().find(|u| &u.email == email).cloned())
    }

    async fn user_by_name(&self, name: &str) -> Result<Option<User>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data.users.values().find(|u| u.name == name).cloned())
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        page: Page,
    ) -> Result<Paginated<User>, RepositoryError> {
        let data = self.data.lock().await;
        let matches = data
            .users
            .values()
            .filter(|u| filter.role.is_none_or(|role| u.role == role))
            .filter(|u| filter.club_member.is_none_or(|m| u.club_member == m))
            .filter(|u| {
                filter.search.as_deref().is_none_or(|term| {
                    contains_ci(&u.name, term) || contains_ci(u.email.as_str(), term)
                })
            })
            .cloned()
            .collect();
        Ok(paginate(matches, page, |u| (u.created_at, u.id.as_i32())))
    }

    async fn update_user(&self, user: &User) -> Result<User, RepositoryError> {
        let mut data = self.data.lock().await;
        if data
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(RepositoryError::Conflict("email".to_string()));
        }

        let stored = data.users.get_mut(&user.id).ok_or(RepositoryError::NotFound)?;
        *stored = User {
            created_at: stored.created_at,
            updated_at: Utc::now(),
            ..user.clone()
        };
        Ok(stored.clone())
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, RepositoryError> {
        let mut data = self.data.lock().await;
        if data.orders.values().any(|o| o.user_id == id) {
            return Err(RepositoryError::Conflict("referenced".to_string()));
        }
        Ok(data.users.remove(&id).is_some())
    }

    async fn user_counts(&self) -> Result<UserCounts, RepositoryError> {
        let data = self.data.lock().await;
        let users = || data.users.values();
        Ok(UserCounts {
            total: count(users()),
            admins: count(users().filter(|u| u.role != UserRole::Customer)),
            customers: count(users().filter(|u| u.role == UserRole::Customer)),
            club_members: count(users().filter(|u| u.club_member)),
        })
    }
}

// =============================================================================
// Products
// =============================================================================

#[async_trait]
impl ProductStore for MemoryStore {
    async fn insert_product(&self, draft: ProductDraft) -> Result<Product, RepositoryError> {
        let mut data = self.data.lock().await;
        if let Some(field) = data.sku_or_slug_taken(&draft, None) {
            return Err(RepositoryError::Conflict(field.to_string()));
        }

        data.next_product_id += 1;
        let now = Utc::now();
        let product = Product {
            id: ProductId::new(data.next_product_id),
            sku: draft.sku,
            title: draft.title,
            slug: draft.slug,
            description: draft.description,
            price_cents: draft.price_cents,
            currency: draft.currency,
            inventory: draft.inventory,
            images: draft.images,
            categories: draft.categories,
            attributes: draft.attributes,
            published: draft.published,
            metadata: draft.metadata,
            created_at: now,
            updated_at: now,
        };
        data.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.data.lock().await.products.get(&id).cloned())
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data.products.values().find(|p| p.slug == slug).cloned())
    }

    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data
            .products
            .values()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        page: Page,
    ) -> Result<Paginated<Product>, RepositoryError> {
        let data = self.data.lock().await;
        let matches = data
            .products
            .values()
            .filter(|p| filter.published.is_none_or(|published| p.published == published))
            .filter(|p| {
                filter
                    .category
                    .as_ref()
                    .is_none_or(|category| p.categories.contains(category))
            })
            .filter(|p| {
                filter.search.as_deref().is_none_or(|term| {
                    contains_ci(&p.title, term)
                        || contains_ci(&p.description, term)
                        || p.categories.iter().any(|c| contains_ci(c, term))
                })
            })
            .cloned()
            .collect();
        Ok(paginate(matches, page, |p| (p.created_at, p.id.as_i32())))
    }

    async fn update_product(
        &self,
        id: ProductId,
        draft: ProductDraft,
    ) -> Result<Product, RepositoryError> {
        let mut data = self.data.lock().await;
        if !data.products.contains_key(&id) {
            return Err(RepositoryError::NotFound);
        }
        if let Some(field) = data.sku_or_slug_taken(&draft, Some(id)) {
            return Err(RepositoryError::Conflict(field.to_string()));
        }

        let product = data.products.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        product.sku = draft.sku;
        product.title = draft.title;
        product.slug = draft.slug;
        product.description = draft.description;
        product.price_cents = draft.price_cents;
        product.currency = draft.currency;
        product.inventory = draft.inventory;
        product.images = draft.images;
        product.categories = draft.categories;
        product.attributes = draft.attributes;
        product.published = draft.published;
        product.metadata = draft.metadata;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError> {
        Ok(self.data.lock().await.products.remove(&id).is_some())
    }

    async fn slug_exists(
        &self,
        slug: &str,
        except: Option<ProductId>,
    ) -> Result<bool, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data
            .products
            .values()
            .any(|p| p.slug == slug && Some(p.id) != except))
    }

    async fn product_counts(
        &self,
        low_inventory_below: i32,
    ) -> Result<ProductCounts, RepositoryError> {
        let data = self.data.lock().await;
        let products = || data.products.values();
        Ok(ProductCounts {
            total: count(products()),
            published: count(products().filter(|p| p.published)),
            draft: count(products().filter(|p| !p.published)),
            low_inventory: count(products().filter(|p| p.inventory < low_inventory_below)),
        })
    }
}

// =============================================================================
// Orders
// =============================================================================

#[async_trait]
impl OrderStore for MemoryStore {
    async fn place_order(
        &self,
        order: NewOrder,
        stock: StockPolicy,
    ) -> Result<Order, RepositoryError> {
        let mut data = self.data.lock().await;

        if stock == StockPolicy::ReserveNow {
            // Check every line before touching any, so a failure changes nothing.
            for item in &order.items {
                let available = data.products.get(&item.product).map_or(0, |p| p.inventory);
                if available < item.quantity {
                    return Err(RepositoryError::InsufficientStock {
                        product: item.product,
                        title: item.title.clone(),
                        available,
                    });
                }
            }
            let now = Utc::now();
            for item in &order.items {
                if let Some(product) = data.products.get_mut(&item.product) {
                    product.inventory -= item.quantity;
                    product.updated_at = now;
                }
            }
        }

        data.next_order_id += 1;
        data.order_sequence += 1;
        let now = Utc::now();
        let placed = Order {
            id: OrderId::new(data.next_order_id),
            order_number: format_order_number(now, data.order_sequence),
            user_id: order.user_id,
            items: order.items,
            subtotal_cents: order.subtotal_cents,
            shipping_cents: order.shipping_cents,
            total_cents: order.total_cents,
            currency: order.currency,
            status: OrderStatus::Pending,
            shipping_address: order.shipping_address,
            payment: Payment {
                method: order.payment_method,
                status: PaymentStatus::Pending,
                transaction_id: None,
                gateway_order_id: None,
            },
            stock_committed: stock == StockPolicy::ReserveNow,
            metadata: order.metadata,
            created_at: now,
            updated_at: now,
        };
        data.orders.insert(placed.id, placed.clone());
        Ok(placed)
    }

    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.data.lock().await.orders.get(&id).cloned())
    }

    async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: Page,
    ) -> Result<Paginated<Order>, RepositoryError> {
        let data = self.data.lock().await;
        let matches = data
            .orders
            .values()
            .filter(|o| filter.user_id.is_none_or(|user| o.user_id == user))
            .filter(|o| filter.status.is_none_or(|status| o.status == status))
            .filter(|o| {
                filter
                    .order_number
                    .as_deref()
                    .is_none_or(|term| contains_ci(&o.order_number, term))
            })
            .cloned()
            .collect();
        Ok(paginate(matches, page, |o| (o.created_at, o.id.as_i32())))
    }

    async fn set_gateway_order_id(
        &self,
        id: OrderId,
        gateway_order_id: &str,
    ) -> Result<Order, RepositoryError> {
        let mut data = self.data.lock().await;
        let order = data.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        order.payment.gateway_order_id = Some(gateway_order_id.to_string());
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn confirm_payment(
        &self,
        id: OrderId,
        transaction_id: &str,
    ) -> Result<PaymentConfirmation, RepositoryError> {
        let mut data = self.data.lock().await;
        let order = data.orders.get(&id).cloned().ok_or(RepositoryError::NotFound)?;
        if order.payment.status == PaymentStatus::Completed {
            return Ok(PaymentConfirmation::AlreadyCompleted(order));
        }

        let now = Utc::now();
        let mut shortfalls = Vec::new();
        let take_stock = order.status == OrderStatus::Pending && !order.stock_committed;
        if take_stock {
            for item in &order.items {
                let Some(product) = data.products.get_mut(&item.product) else {
                    continue;
                };
                if product.inventory < item.quantity {
                    shortfalls.push(StockShortfall {
                        product: item.product,
                        requested: item.quantity,
                        available: product.inventory,
                    });
                }
                product.inventory = (product.inventory - item.quantity).max(0);
                product.updated_at = now;
            }
        }

        let order = data.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        order.payment.status = PaymentStatus::Completed;
        order.payment.transaction_id = Some(transaction_id.to_string());
        if order.status == OrderStatus::Pending {
            order.status = OrderStatus::Confirmed;
        }
        order.stock_committed |= take_stock;
        order.updated_at = now;

        Ok(PaymentConfirmation::Confirmed {
            order: order.clone(),
            shortfalls,
        })
    }

    async fn mark_payment_failed(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let mut data = self.data.lock().await;
        match data.orders.get_mut(&id) {
            Some(order) if order.payment.status == PaymentStatus::Pending => {
                order.payment.status = PaymentStatus::Failed;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_order(
        &self,
        id: OrderId,
        update: OrderUpdate,
    ) -> Result<Order, RepositoryError> {
        let mut data = self.data.lock().await;
        let order = data.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if let Some(status) = update.status {
            order.status = status;
        }
        if let Some(status) = update.payment_status {
            order.payment.status = status;
        }
        if let Some(method) = update.payment_method {
            order.payment.method = method;
        }
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn count_orders(&self, since: Option<DateTime<Utc>>) -> Result<i64, RepositoryError> {
        let data = self.data.lock().await;
        Ok(count(
            data.orders
                .values()
                .filter(|o| since.is_none_or(|since| o.created_at >= since)),
        ))
    }

    async fn order_status_counts(&self) -> Result<Vec<(OrderStatus, i64)>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(OrderStatus::ALL
            .iter()
            .map(|&status| {
                (
                    status,
                    count(data.orders.values().filter(|o| o.status == status)),
                )
            })
            .filter(|&(_, n)| n > 0)
            .collect())
    }

    async fn completed_revenue(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data
            .orders
            .values()
            .filter(|o| o.payment.status == PaymentStatus::Completed)
            .filter(|o| since.is_none_or(|since| o.created_at >= since))
            .map(|o| o.total_cents)
            .sum())
    }

    async fn daily_order_totals(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyOrderTotals>, RepositoryError> {
        let data = self.data.lock().await;
        let mut days: BTreeMap<chrono::NaiveDate, DailyOrderTotals> = BTreeMap::new();
        for order in data.orders.values().filter(|o| o.created_at >= since) {
            let day = order.created_at.date_naive();
            let totals = days.entry(day).or_insert(DailyOrderTotals {
                day,
                orders: 0,
                revenue_cents: 0,
            });
            totals.orders += 1;
            if order.payment.status == PaymentStatus::Completed {
                totals.revenue_cents += order.total_cents;
            }
        }
        Ok(days.into_values().collect())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::Map;

    use mypeteats_core::PaymentMethod;

    use super::*;
    use crate::models::{OrderItem, ShippingAddress};

    fn draft(sku: &str, slug: &str, inventory: i32) -> ProductDraft {
        ProductDraft {
            sku: sku.to_string(),
            title: sku.to_string(),
            slug: slug.to_string(),
            description: String::new(),
            price_cents: 1000,
            currency: "INR".to_string(),
            inventory,
            images: Vec::new(),
            categories: vec!["dog".to_string()],
            attributes: Map::new(),
            published: true,
            metadata: Map::new(),
        }
    }

    fn new_order(user: UserId, product: &Product, quantity: i32) -> NewOrder {
        let item = OrderItem {
            product: product.id,
            title: product.title.clone(),
            sku: product.sku.clone(),
            price_cents: product.price_cents,
            quantity,
            image: None,
        };
        NewOrder {
            user_id: user,
            subtotal_cents: item.line_total_cents(),
            shipping_cents: 0,
            total_cents: item.line_total_cents(),
            items: vec![item],
            currency: "INR".to_string(),
            shipping_address: ShippingAddress {
                first_name: "Asha".to_string(),
                last_name: "Rao".to_string(),
                email: "asha@example.com".to_string(),
                phone: "9876543210".to_string(),
                address: "12 MG Road".to_string(),
                city: "Pune".to_string(),
                postal_code: "411001".to_string(),
                instructions: None,
            },
            payment_method: PaymentMethod::Razorpay,
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_sku_and_slug_conflict() {
        let store = MemoryStore::new();
        store.insert_product(draft("KIB-1", "kibble", 1)).await.unwrap();

        let err = store.insert_product(draft("KIB-1", "other", 1)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(ref f) if f == "sku"));

        let err = store.insert_product(draft("KIB-2", "kibble", 1)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(ref f) if f == "slug"));
    }

    #[tokio::test]
    async fn test_reserve_now_is_all_or_nothing() {
        let store = MemoryStore::new();
        let plenty = store.insert_product(draft("A-1", "a", 10)).await.unwrap();
        let scarce = store.insert_product(draft("B-1", "b", 1)).await.unwrap();

        let mut order = new_order(UserId::new(1), &plenty, 4);
        order.items.extend(new_order(UserId::new(1), &scarce, 2).items);

        let err = store
            .place_order(order, StockPolicy::ReserveNow)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::InsufficientStock { available: 1, .. }));
        assert_eq!(store.product_by_id(plenty.id).await.unwrap().unwrap().inventory, 10);
    }

    #[tokio::test]
    async fn test_confirm_payment_commits_stock_once() {
        let store = MemoryStore::new();
        let product = store.insert_product(draft("A-1", "a", 5)).await.unwrap();
        let order = store
            .place_order(
                new_order(UserId::new(1), &product, 2),
                StockPolicy::OnPaymentConfirmation,
            )
            .await
            .unwrap();
        assert_eq!(order.order_number, format_order_number(order.created_at, 1));
        assert_eq!(store.product_by_id(product.id).await.unwrap().unwrap().inventory, 5);

        let first = store.confirm_payment(order.id, "pay_1").await.unwrap();
        assert!(matches!(first, PaymentConfirmation::Confirmed { .. }));
        assert_eq!(first.order().status, OrderStatus::Confirmed);

        let second = store.confirm_payment(order.id, "pay_1").await.unwrap();
        assert!(matches!(second, PaymentConfirmation::AlreadyCompleted(_)));
        assert_eq!(store.product_by_id(product.id).await.unwrap().unwrap().inventory, 3);
    }

    #[tokio::test]
    async fn test_confirm_payment_floors_inventory_at_zero() {
        let store = MemoryStore::new();
        let product = store.insert_product(draft("A-1", "a", 1)).await.unwrap();
        let order = store
            .place_order(
                new_order(UserId::new(1), &product, 3),
                StockPolicy::OnPaymentConfirmation,
            )
            .await
            .unwrap();

        let PaymentConfirmation::Confirmed { shortfalls, .. } =
            store.confirm_payment(order.id, "pay_1").await.unwrap()
        else {
            panic!("expected a fresh confirmation");
        };
        assert_eq!(shortfalls.len(), 1);
        assert_eq!(store.product_by_id(product.id).await.unwrap().unwrap().inventory, 0);
    }

    #[tokio::test]
    async fn test_confirm_payment_after_cancel_keeps_stock() {
        let store = MemoryStore::new();
        let product = store.insert_product(draft("A-1", "a", 5)).await.unwrap();
        let order = store
            .place_order(
                new_order(UserId::new(1), &product, 2),
                StockPolicy::OnPaymentConfirmation,
            )
            .await
            .unwrap();
        store
            .update_order(
                order.id,
                OrderUpdate {
                    status: Some(OrderStatus::Cancelled),
                    payment_status: None,
                    payment_method: None,
                },
            )
            .await
            .unwrap();

        let confirmation = store.confirm_payment(order.id, "pay_1").await.unwrap();
        let order = confirmation.order();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.payment.status, PaymentStatus::Completed);
        assert!(!order.stock_committed);
        assert_eq!(store.product_by_id(product.id).await.unwrap().unwrap().inventory, 5);
    }

    #[tokio::test]
    async fn test_mark_payment_failed_only_when_pending() {
        let store = MemoryStore::new();
        let product = store.insert_product(draft("A-1", "a", 5)).await.unwrap();
        let order = store
            .place_order(
                new_order(UserId::new(1), &product, 1),
                StockPolicy::OnPaymentConfirmation,
            )
            .await
            .unwrap();
        store.confirm_payment(order.id, "pay_1").await.unwrap();

        assert!(!store.mark_payment_failed(order.id).await.unwrap());
        let order = store.order_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(order.payment.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_list_products_search_and_paging() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .insert_product(draft(&format!("SKU-{i}"), &format!("p-{i}"), 1))
                .await
                .unwrap();
        }
        let filter = ProductFilter {
            search: Some("sku-3".to_string()),
            ..ProductFilter::default()
        };
        let page = store
            .list_products(&filter, Page { page: 1, limit: 10 })
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        let page = store
            .list_products(&ProductFilter::default(), Page { page: 2, limit: 2 })
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].sku, "SKU-2");
    }
}
