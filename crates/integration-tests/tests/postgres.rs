//! `PgStore` against a live database.
//!
//! These tests require:
//! - A running `PostgreSQL` database
//! - `DATABASE_URL` pointing at it (migrations are applied on connect)
//!
//! Run with: `DATABASE_URL=postgres://... cargo test -p mypeteats-integration-tests --test postgres -- --ignored`
//!
//! Every test works on its own freshly named rows, so they can share one
//! database and run in parallel.

#![allow(clippy::unwrap_used)]

use secrecy::SecretString;
use serde_json::Map;
use uuid::Uuid;

use mypeteats_core::{Email, OrderStatus, PaymentMethod, PaymentStatus, UserId, UserRole};
use mypeteats_storefront::db::{
    OrderStore, Page, PgStore, ProductStore, RepositoryError, UserStore, create_pool,
    run_migrations,
};
use mypeteats_storefront::models::{
    NewOrder, NewUser, OrderItem, OrderUpdate, PaymentConfirmation, Product, ProductDraft,
    ProductFilter, ShippingAddress, StockPolicy,
};

async fn store() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = create_pool(&SecretString::from(url))
        .await
        .expect("Failed to connect to PostgreSQL");
    run_migrations(&pool).await.expect("Failed to run migrations");
    PgStore::new(pool)
}

/// A short token unique to this run, upper-case to satisfy the SKU format.
fn tag() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_uppercase()
}

fn draft(sku: &str, inventory: i32) -> ProductDraft {
    ProductDraft {
        sku: sku.to_string(),
        title: format!("Product {sku}"),
        slug: sku.to_lowercase(),
        description: String::new(),
        price_cents: 1_000,
        currency: "INR".to_string(),
        inventory,
        images: Vec::new(),
        categories: vec!["dog".to_string()],
        attributes: Map::new(),
        published: true,
        metadata: Map::new(),
    }
}

async fn customer(store: &PgStore) -> UserId {
    let email = format!("pg-{}@example.com", tag().to_lowercase());
    store
        .insert_user(NewUser {
            name: "Pg Customer".to_string(),
            email: Email::parse(&email).unwrap(),
            password_hash: "unused".to_string(),
            role: UserRole::Customer,
            phone: None,
            club_member: false,
        })
        .await
        .unwrap()
        .id
}

fn new_order(user: UserId, lines: &[(&Product, i32)], method: PaymentMethod) -> NewOrder {
    let items: Vec<OrderItem> = lines
        .iter()
        .map(|(product, quantity)| OrderItem {
            product: product.id,
            title: product.title.clone(),
            sku: product.sku.clone(),
            price_cents: product.price_cents,
            quantity: *quantity,
            image: None,
        })
        .collect();
    let subtotal = items.iter().map(OrderItem::line_total_cents).sum();
    NewOrder {
        user_id: user,
        items,
        subtotal_cents: subtotal,
        shipping_cents: 0,
        total_cents: subtotal,
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
        payment_method: method,
        metadata: Map::new(),
    }
}

async fn inventory(store: &PgStore, product: &Product) -> i32 {
    store.product_by_id(product.id).await.unwrap().unwrap().inventory
}

// ============================================================================
// Catalog constraints
// ============================================================================

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database (DATABASE_URL)"]
async fn test_pg_sku_and_slug_conflicts() {
    let store = store().await;
    let sku = format!("PG-{}", tag());
    store.insert_product(draft(&sku, 1)).await.unwrap();

    let mut same_sku = draft(&sku, 1);
    same_sku.slug = format!("{}-other", sku.to_lowercase());
    let err = store.insert_product(same_sku).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(ref f) if f == "sku"), "{err:?}");

    let mut same_slug = draft(&format!("PG-{}", tag()), 1);
    same_slug.slug = sku.to_lowercase();
    let err = store.insert_product(same_slug).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(ref f) if f == "slug"), "{err:?}");
}

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database (DATABASE_URL)"]
async fn test_pg_product_search_filter() {
    let store = store().await;
    let marker = tag().to_lowercase();
    let mut published = draft(&format!("PG-{}", tag()), 1);
    published.description = format!("Grain free {marker}_100% chicken");
    let mut hidden = draft(&format!("PG-{}", tag()), 1);
    hidden.description = published.description.clone();
    hidden.published = false;
    let published = store.insert_product(published).await.unwrap();
    store.insert_product(hidden).await.unwrap();

    let filter = ProductFilter {
        published: Some(true),
        category: Some("dog".to_string()),
        search: Some(format!("{}_100%", marker.to_uppercase())),
    };
    let result = store
        .list_products(&filter, Page::new(None, None, 20, 100))
        .await
        .unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.items[0].id, published.id);

    // `_` matches itself only, so the look-alike stays out.
    let mut lookalike = draft(&format!("PG-{}", tag()), 1);
    lookalike.description = format!("Grain free {marker}x100 chicken");
    store.insert_product(lookalike).await.unwrap();
    let filter = ProductFilter {
        search: Some(format!("{marker}_100")),
        ..ProductFilter::default()
    };
    let result = store
        .list_products(&filter, Page::new(None, None, 20, 100))
        .await
        .unwrap();
    assert_eq!(result.total, 2);
}

// ============================================================================
// Orders and inventory
// ============================================================================

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database (DATABASE_URL)"]
async fn test_pg_reserve_now_is_all_or_nothing() {
    let store = store().await;
    let user = customer(&store).await;
    let plenty = store.insert_product(draft(&format!("PG-{}", tag()), 10)).await.unwrap();
    let scarce = store.insert_product(draft(&format!("PG-{}", tag()), 1)).await.unwrap();

    let order = new_order(
        user,
        &[(&plenty, 4), (&scarce, 2)],
        PaymentMethod::CashOnDelivery,
    );
    let err = store
        .place_order(order, StockPolicy::ReserveNow)
        .await
        .unwrap_err();
    assert!(
        matches!(err, RepositoryError::InsufficientStock { available: 1, .. }),
        "{err:?}"
    );
    assert_eq!(inventory(&store, &plenty).await, 10);
    assert_eq!(inventory(&store, &scarce).await, 1);

    let order = new_order(user, &[(&plenty, 4)], PaymentMethod::CashOnDelivery);
    let placed = store.place_order(order, StockPolicy::ReserveNow).await.unwrap();
    assert!(placed.stock_committed);
    assert!(placed.order_number.starts_with("ORD-"));
    assert_eq!(inventory(&store, &plenty).await, 6);
}

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database (DATABASE_URL)"]
async fn test_pg_concurrent_confirmations_take_stock_once() {
    let store = store().await;
    let user = customer(&store).await;
    let product = store.insert_product(draft(&format!("PG-{}", tag()), 5)).await.unwrap();
    let order = store
        .place_order(
            new_order(user, &[(&product, 2)], PaymentMethod::Razorpay),
            StockPolicy::OnPaymentConfirmation,
        )
        .await
        .unwrap();
    assert_eq!(inventory(&store, &product).await, 5);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.confirm_payment(order.id, &format!("pay_{i}")).await })
        })
        .collect();
    let mut confirmed = 0;
    for handle in handles {
        if matches!(
            handle.await.unwrap().unwrap(),
            PaymentConfirmation::Confirmed { .. }
        ) {
            confirmed += 1;
        }
    }

    assert_eq!(confirmed, 1);
    assert_eq!(inventory(&store, &product).await, 3);
    let order = store.order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.payment.status, PaymentStatus::Completed);
    assert!(order.stock_committed);
}

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database (DATABASE_URL)"]
async fn test_pg_confirmation_floors_inventory_at_zero() {
    let store = store().await;
    let user = customer(&store).await;
    let product = store.insert_product(draft(&format!("PG-{}", tag()), 1)).await.unwrap();
    let order = store
        .place_order(
            new_order(user, &[(&product, 3)], PaymentMethod::Razorpay),
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
    assert_eq!(shortfalls[0].available, 1);
    assert_eq!(inventory(&store, &product).await, 0);
}

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database (DATABASE_URL)"]
async fn test_pg_confirmation_after_cancel_keeps_stock() {
    let store = store().await;
    let user = customer(&store).await;
    let product = store.insert_product(draft(&format!("PG-{}", tag()), 5)).await.unwrap();
    let order = store
        .place_order(
            new_order(user, &[(&product, 2)], PaymentMethod::Razorpay),
            StockPolicy::OnPaymentConfirmation,
        )
        .await
        .unwrap();
    store
        .update_order(
            order.id,
            OrderUpdate {
                status: Some(OrderStatus::Cancelled),
                ..OrderUpdate::default()
            },
        )
        .await
        .unwrap();

    let confirmation = store.confirm_payment(order.id, "pay_1").await.unwrap();
    assert_eq!(confirmation.order().status, OrderStatus::Cancelled);
    assert!(!confirmation.order().stock_committed);
    assert_eq!(inventory(&store, &product).await, 5);
}
