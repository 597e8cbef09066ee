//! The admin gate and the back-office endpoints.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use axum::http::{Method, StatusCode};
use serde_json::json;

use mypeteats_core::UserRole;
use mypeteats_integration_tests::{ADMIN_TOKEN, TestClient, TestContext};

async fn logged_in(ctx: &TestContext, email: &str, role: UserRole) -> TestClient {
    ctx.seed_user(email, role).await;
    let mut client = ctx.client();
    let response = client.login(email).await;
    assert_eq!(response.status, StatusCode::OK);
    client
}

async fn with_token(client: &mut TestClient, token: &str) -> axum::http::StatusCode {
    client
        .send(
            Method::GET,
            "/api/admin/products",
            None,
            &[("x-admin-token", token)],
        )
        .await
        .status
}

// ============================================================================
// Gate
// ============================================================================

#[tokio::test]
async fn test_gate_requires_session_or_token() {
    let ctx = TestContext::new();
    let mut anonymous = ctx.client();

    let missing = anonymous.get("/api/admin/products").await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.error(), "Admin token required");

    let wrong = anonymous
        .send(Method::GET, "/api/admin/products", None, &[("x-admin-token", "nope")])
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.error(), "Invalid admin token");

    let token = anonymous.admin(Method::GET, "/api/admin/products", None).await;
    assert_eq!(token.status, StatusCode::OK);

    let mut customer = logged_in(&ctx, "cust@example.com", UserRole::Customer).await;
    let denied = customer.get("/api/admin/products").await;
    assert_eq!(denied.status, StatusCode::UNAUTHORIZED);

    let mut staff = logged_in(&ctx, "staff@example.com", UserRole::Staff).await;
    let allowed = staff.get("/api/admin/products").await;
    assert_eq!(allowed.status, StatusCode::OK);
}

#[tokio::test]
async fn test_lockout_after_five_failures_cleared_by_staff_login() {
    let ctx = TestContext::new();
    let ip = "198.51.100.77";
    let mut attacker = ctx.client_at(ip);

    for _ in 0..5 {
        assert_eq!(with_token(&mut attacker, "guess").await, StatusCode::UNAUTHORIZED);
    }

    // Even the right token is refused while locked out.
    let locked = attacker
        .send(
            Method::GET,
            "/api/admin/products",
            None,
            &[("x-admin-token", ADMIN_TOKEN)],
        )
        .await;
    assert_eq!(locked.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(locked.body["resetAt"].is_string());

    // A staff session from the same address authenticates and clears it.
    ctx.seed_user("ops@example.com", UserRole::Staff).await;
    let mut staff = ctx.client_at(ip);
    staff.login("ops@example.com").await;
    assert_eq!(staff.get("/api/admin/products").await.status, StatusCode::OK);

    assert_eq!(with_token(&mut attacker, ADMIN_TOKEN).await, StatusCode::OK);
}

#[tokio::test]
async fn test_lockout_ends_when_window_resets() {
    let ctx = TestContext::with_lockout_window(Duration::from_millis(300));
    let mut client = ctx.client_at("198.51.100.78");

    for _ in 0..5 {
        with_token(&mut client, "guess").await;
    }
    assert_eq!(
        with_token(&mut client, ADMIN_TOKEN).await,
        StatusCode::TOO_MANY_REQUESTS
    );

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(with_token(&mut client, ADMIN_TOKEN).await, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_request_cap() {
    let ctx = TestContext::with_config(|config| config.admin_rate_limit = 3);
    let mut client = ctx.client();

    for _ in 0..3 {
        assert_eq!(with_token(&mut client, ADMIN_TOKEN).await, StatusCode::OK);
    }
    let capped = client.admin(Method::GET, "/api/admin/products", None).await;
    assert_eq!(capped.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(capped.error(), "Too many requests");
}

#[tokio::test]
async fn test_production_rejects_cross_origin_admin_calls() {
    let ctx = TestContext::with_config(|config| {
        config.environment = mypeteats_storefront::config::Environment::Production;
    });
    let mut client = ctx.client();

    let cross = client
        .send(
            Method::GET,
            "/api/admin/products",
            None,
            &[
                ("x-admin-token", ADMIN_TOKEN),
                ("host", "shop.mypeteats.in"),
                ("origin", "https://evil.example"),
            ],
        )
        .await;
    assert_eq!(cross.status, StatusCode::FORBIDDEN);
    assert_eq!(cross.error(), "Forbidden: Admin endpoints are same-origin only");

    let same = client
        .send(
            Method::GET,
            "/api/admin/products",
            None,
            &[
                ("x-admin-token", ADMIN_TOKEN),
                ("host", "shop.mypeteats.in"),
                ("origin", "https://shop.mypeteats.in"),
            ],
        )
        .await;
    assert_eq!(same.status, StatusCode::OK);
}

// ============================================================================
// Products
// ============================================================================

#[tokio::test]
async fn test_product_crud_and_unique_slugs() {
    let ctx = TestContext::new();
    let mut admin = ctx.client();

    let first = admin
        .admin(
            Method::POST,
            "/api/admin/products",
            Some(&json!({ "sku": "ckn-01", "title": "Chicken Treats!", "price_cents": 29_900, "published": true })),
        )
        .await;
    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(first.body["product"]["sku"], "CKN-01");
    assert_eq!(first.body["product"]["slug"], "chicken-treats");

    let second = admin
        .admin(
            Method::POST,
            "/api/admin/products",
            Some(&json!({ "sku": "CKN-02", "title": "chicken treats", "price_cents": 19_900 })),
        )
        .await;
    assert_eq!(second.status, StatusCode::CREATED);
    assert_eq!(second.body["product"]["slug"], "chicken-treats-2");

    let duplicate = admin
        .admin(
            Method::POST,
            "/api/admin/products",
            Some(&json!({ "sku": "CKN-01", "title": "Other", "price_cents": 1 })),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert_eq!(duplicate.error(), "SKU already exists");

    let invalid = admin
        .admin(
            Method::POST,
            "/api/admin/products",
            Some(&json!({ "title": "No SKU", "price_cents": 1 })),
        )
        .await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert_eq!(invalid.error(), "SKU is required");

    let id = first.body["product"]["id"].as_i64().unwrap();
    let updated = admin
        .admin(
            Method::PUT,
            &format!("/api/admin/products/{id}"),
            Some(&json!({ "inventory": 12 })),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["product"]["inventory"], 12);
    assert_eq!(updated.body["product"]["title"], "Chicken Treats!");

    // Only the published one is public.
    let mut shopper = ctx.client();
    let public = shopper.get("/api/products").await;
    assert_eq!(public.body["products"].as_array().unwrap().len(), 1);
    let by_slug = shopper.get("/api/products/Chicken-Treats").await;
    assert_eq!(by_slug.status, StatusCode::OK);
    assert_eq!(by_slug.body["product"]["sku"], "CKN-01");
    let draft = shopper.get("/api/products/chicken-treats-2").await;
    assert_eq!(draft.status, StatusCode::NOT_FOUND);

    let all = admin.admin(Method::GET, "/api/admin/products", None).await;
    assert_eq!(all.body["pagination"]["total"], 2);
    assert_eq!(all.body["pagination"]["limit"], 50);

    let deleted = admin
        .admin(Method::DELETE, &format!("/api/admin/products/{id}"), None)
        .await;
    assert_eq!(deleted.status, StatusCode::OK);
    let gone = admin
        .admin(Method::GET, &format!("/api/admin/products/{id}"), None)
        .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Orders
// ============================================================================

#[tokio::test]
async fn test_order_update_validates_enums() {
    let ctx = TestContext::new();
    let mut admin = ctx.client();

    let bad_filter = admin
        .admin(Method::GET, "/api/admin/orders?status=lost", None)
        .await;
    assert_eq!(bad_filter.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_filter.error(), "Invalid order status");

    let missing = admin
        .admin(
            Method::PUT,
            "/api/admin/orders/12345",
            Some(&json!({ "status": "shipped" })),
        )
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let bad_status = admin
        .admin(
            Method::PUT,
            "/api/admin/orders/1",
            Some(&json!({ "paymentStatus": "maybe" })),
        )
        .await;
    assert_eq!(bad_status.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_status.error(), "Invalid payment status");
}

// ============================================================================
// Users
// ============================================================================

#[tokio::test]
async fn test_capabilities_by_role() {
    let ctx = TestContext::new();
    let mut staff = logged_in(&ctx, "staff@example.com", UserRole::Staff).await;

    let users = staff.get("/api/admin/users").await;
    assert_eq!(users.status, StatusCode::FORBIDDEN);
    assert_eq!(users.error(), "Forbidden: insufficient permissions");
    assert_eq!(staff.get("/api/admin/stats").await.status, StatusCode::OK);

    let mut manager = logged_in(&ctx, "manager@example.com", UserRole::Manager).await;
    let users = manager.get("/api/admin/users?role=staff").await;
    assert_eq!(users.status, StatusCode::OK);
    assert_eq!(users.body["users"].as_array().unwrap().len(), 1);

    let bad_role = manager.get("/api/admin/users?role=owner").await;
    assert_eq!(bad_role.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_role.error(), "Invalid role");
}

#[tokio::test]
async fn test_role_changes_need_super_admin() {
    let ctx = TestContext::new();
    let customer = ctx.seed_user("c@example.com", UserRole::Customer).await;
    let admin_user = ctx.seed_user("a@example.com", UserRole::Admin).await;
    let mut manager = logged_in(&ctx, "m@example.com", UserRole::Manager).await;

    let promote = manager
        .put(&format!("/api/admin/users/{}", customer.id), &json!({ "role": "staff" }))
        .await;
    assert_eq!(promote.status, StatusCode::OK);
    assert_eq!(promote.body["user"]["role"], "staff");

    let escalate = manager
        .put(&format!("/api/admin/users/{}", customer.id), &json!({ "role": "admin" }))
        .await;
    assert_eq!(escalate.status, StatusCode::FORBIDDEN);
    assert_eq!(escalate.error(), "Only super admins can modify admin roles");

    let demote = manager
        .put(&format!("/api/admin/users/{}", admin_user.id), &json!({ "role": "customer" }))
        .await;
    assert_eq!(demote.status, StatusCode::FORBIDDEN);

    let club = manager
        .put(
            &format!("/api/admin/users/{}", admin_user.id),
            &json!({ "clubMember": true, "name": "Renamed" }),
        )
        .await;
    assert_eq!(club.status, StatusCode::OK);
    assert_eq!(club.body["user"]["clubMember"], true);

    let create = manager
        .post(
            "/api/admin/users",
            &json!({ "name": "New", "email": "new@example.com", "password": "secret1" }),
        )
        .await;
    assert_eq!(create.status, StatusCode::FORBIDDEN);
    assert_eq!(create.error(), "Only super admins can create admin accounts");

    let mut super_admin = logged_in(&ctx, "root@example.com", UserRole::SuperAdmin).await;
    let escalate = super_admin
        .put(&format!("/api/admin/users/{}", customer.id), &json!({ "role": "admin" }))
        .await;
    assert_eq!(escalate.status, StatusCode::OK);

    let created = super_admin
        .post(
            "/api/admin/users",
            &json!({ "name": "New", "email": "new@example.com", "password": "secret1", "role": "manager" }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["user"]["role"], "manager");

    let super_role = super_admin
        .post(
            "/api/admin/users",
            &json!({ "email": "x@example.com", "password": "secret1", "role": "super_admin" }),
        )
        .await;
    assert_eq!(super_role.status, StatusCode::BAD_REQUEST);
    assert_eq!(super_role.error(), "Invalid role");
}

#[tokio::test]
async fn test_user_deletion_rules() {
    let ctx = TestContext::new();
    let customer = ctx.seed_user("c@example.com", UserRole::Customer).await;
    let admin_user = ctx.seed_user("a@example.com", UserRole::Admin).await;
    let mut manager = logged_in(&ctx, "m@example.com", UserRole::Manager).await;

    let me = manager.get("/api/auth/me").await;
    let my_id = me.body["user"]["id"].as_i64().unwrap();
    let self_delete = manager.delete(&format!("/api/admin/users/{my_id}")).await;
    assert_eq!(self_delete.status, StatusCode::BAD_REQUEST);

    let admin_delete = manager
        .delete(&format!("/api/admin/users/{}", admin_user.id))
        .await;
    assert_eq!(admin_delete.status, StatusCode::FORBIDDEN);

    let ok = manager
        .delete(&format!("/api/admin/users/{}", customer.id))
        .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["message"], "User deleted successfully");

    let gone = manager
        .get(&format!("/api/admin/users/{}", customer.id))
        .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
    assert_eq!(gone.error(), "User not found");
}

// ============================================================================
// Stats
// ============================================================================

#[tokio::test]
async fn test_stats_shape() {
    let ctx = TestContext::new();
    ctx.seed_product("ST-1", 1_000, 3).await;
    ctx.seed_product("ST-2", 1_000, 50).await;
    ctx.seed_user("buyer@example.com", UserRole::Customer).await;

    let mut admin = ctx.client();
    let stats = admin.admin(Method::GET, "/api/admin/stats", None).await;
    assert_eq!(stats.status, StatusCode::OK);
    assert_eq!(stats.body["products"]["total"], 2);
    assert_eq!(stats.body["products"]["lowInventory"], 1);
    assert_eq!(stats.body["users"]["customers"], 1);
    assert_eq!(stats.body["orders"]["total"], 0);
    assert_eq!(stats.body["orders"]["timeSeries"].as_array().unwrap().len(), 7);
    assert_eq!(stats.body["revenue"]["total_cents"], 0);
}

// ============================================================================
// Uploads
// ============================================================================

fn multipart(parts: &[(&str, &str, &[u8])]) -> (String, Vec<u8>) {
    let boundary = "mypeteats-test-boundary";
    let mut body = Vec::new();
    for (file_name, content_type, data) in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"images\"; filename=\"{file_name}\"\r\n\
                 Content-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

#[tokio::test]
async fn test_image_upload_is_stored_and_served() {
    let ctx = TestContext::new();
    let mut admin = ctx.client();
    let png = b"\x89PNG\r\n\x1a\nfake image bytes";

    let (content_type, body) = multipart(&[("bowl.PNG", "image/png", png)]);
    let response = admin
        .send_raw(
            Method::POST,
            "/api/admin/upload-image",
            &content_type,
            body,
            &[("x-admin-token", ADMIN_TOKEN)],
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let url = response.body["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("/uploads/products/"));
    assert!(url.ends_with(".png"));

    let served = admin.get(&url).await;
    assert_eq!(served.status, StatusCode::OK);
}

#[tokio::test]
async fn test_image_upload_rejects_bad_files() {
    let ctx = TestContext::new();
    let mut admin = ctx.client();

    let (content_type, body) = multipart(&[("notes.txt", "text/plain", b"hello")]);
    let rejected = admin
        .send_raw(
            Method::POST,
            "/api/admin/upload-image",
            &content_type,
            body,
            &[("x-admin-token", ADMIN_TOKEN)],
        )
        .await;
    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);

    let (content_type, body) = multipart(&[
        ("a.jpg", "image/jpeg", b"jpeg"),
        ("b.gif", "image/gif", b"gif"),
    ]);
    let partial = admin
        .send_raw(
            Method::POST,
            "/api/admin/upload-image",
            &content_type,
            body,
            &[("x-admin-token", ADMIN_TOKEN)],
        )
        .await;
    assert_eq!(partial.status, StatusCode::OK);
    assert_eq!(partial.body["urls"].as_array().unwrap().len(), 1);
    assert_eq!(partial.body["warnings"].as_array().unwrap().len(), 1);
}
