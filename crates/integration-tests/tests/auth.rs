//! Registration, login, sessions and the profile endpoints.

use axum::http::StatusCode;
use serde_json::json;

use mypeteats_core::UserRole;
use mypeteats_integration_tests::{PASSWORD, TestContext};

// ============================================================================
// Registration & Login
// ============================================================================

#[tokio::test]
async fn test_register_logs_in_and_hides_password_hash() {
    let ctx = TestContext::new();
    let mut client = ctx.client();

    let response = client.register("Pet.Parent@Example.com").await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["message"], "Registration successful");
    assert_eq!(response.body["user"]["email"], "pet.parent@example.com");
    assert_eq!(response.body["user"]["role"], "customer");
    assert!(response.body["user"].get("passwordHash").is_none());
    assert!(response.body["user"].get("password_hash").is_none());

    let me = client.get("/api/auth/me").await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["user"]["email"], "pet.parent@example.com");
}

#[tokio::test]
async fn test_register_rejects_duplicate_and_weak_input() {
    let ctx = TestContext::new();
    ctx.seed_user("taken@example.com", UserRole::Customer).await;
    let mut client = ctx.client();

    let duplicate = client.register("TAKEN@example.com").await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert_eq!(duplicate.error(), "Email already in use");

    let weak = client
        .post(
            "/api/auth/register",
            &json!({ "email": "new@example.com", "password": "123" }),
        )
        .await;
    assert_eq!(weak.status, StatusCode::BAD_REQUEST);
    assert_eq!(weak.error(), "Password must be at least 6 characters");

    let missing = client
        .post("/api/auth/register", &json!({ "email": "new@example.com" }))
        .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.error(), "Email and password are required");
}

#[tokio::test]
async fn test_login_logout_round() {
    let ctx = TestContext::new();
    ctx.seed_user("buyer@example.com", UserRole::Customer).await;
    let mut client = ctx.client();

    let wrong = client
        .post(
            "/api/auth/login",
            &json!({ "email": "buyer@example.com", "password": "not-the-password" }),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.error(), "Invalid credentials");

    let ok = client.login("buyer@example.com").await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["message"], "Login successful");

    let logout = client
        .post("/api/auth/logout", &json!({}))
        .await;
    assert_eq!(logout.status, StatusCode::OK);
    assert_eq!(logout.body["success"], true);

    let me = client.get("/api/auth/me").await;
    assert!(me.body["user"].is_null());
}

#[tokio::test]
async fn test_login_by_username() {
    let ctx = TestContext::new();
    ctx.seed_user("named@example.com", UserRole::Customer).await;
    let mut client = ctx.client();

    let response = client
        .post(
            "/api/auth/login",
            &json!({ "username": "Test User", "password": PASSWORD }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["user"]["email"], "named@example.com");
}

#[tokio::test]
async fn test_login_is_rate_limited_per_client() {
    let ctx = TestContext::new();
    let mut client = ctx.client_at("198.51.100.20");
    let attempt = json!({ "email": "nobody@example.com", "password": "whatever1" });

    for _ in 0..5 {
        let response = client.post("/api/auth/login", &attempt).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }
    let limited = client.post("/api/auth/login", &attempt).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);

    // Another address has its own bucket.
    let mut other = ctx.client_at("198.51.100.21");
    let response = other.post("/api/auth/login", &attempt).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_json_is_a_json_400() {
    let ctx = TestContext::new();
    let mut client = ctx.client();

    let response = client
        .send_raw(
            axum::http::Method::POST,
            "/api/auth/login",
            "application/json",
            b"{not json".to_vec(),
            &[],
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(!response.error().is_empty());
}

// ============================================================================
// Profile & Club
// ============================================================================

#[tokio::test]
async fn test_profile_requires_session() {
    let ctx = TestContext::new();
    let mut client = ctx.client();

    let response = client.put("/api/profile", &json!({ "name": "X" })).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error(), "Authentication required");
}

#[tokio::test]
async fn test_profile_update_and_email_conflict() {
    let ctx = TestContext::new();
    ctx.seed_user("other@example.com", UserRole::Customer).await;
    let mut client = ctx.client();
    client.register("me@example.com").await;

    let updated = client
        .put(
            "/api/profile",
            &json!({ "name": "  Meera  ", "phone": " 98765 " }),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["user"]["name"], "Meera");
    assert_eq!(updated.body["user"]["phone"], "98765");

    let conflict = client
        .put("/api/profile", &json!({ "email": "other@example.com" }))
        .await;
    assert_eq!(conflict.status, StatusCode::CONFLICT);
    assert_eq!(conflict.error(), "Email already in use");
}

#[tokio::test]
async fn test_change_password() {
    let ctx = TestContext::new();
    let mut client = ctx.client();
    client.register("pw@example.com").await;

    let wrong = client
        .post(
            "/api/profile/password",
            &json!({ "currentPassword": "nope-nope", "newPassword": "brand-new-pw" }),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.error(), "Current password is incorrect");

    let short = client
        .post(
            "/api/profile/password",
            &json!({ "currentPassword": PASSWORD, "newPassword": "abc" }),
        )
        .await;
    assert_eq!(short.status, StatusCode::BAD_REQUEST);

    let ok = client
        .post(
            "/api/profile/password",
            &json!({ "currentPassword": PASSWORD, "newPassword": "brand-new-pw" }),
        )
        .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["message"], "Password changed successfully");
}

#[tokio::test]
async fn test_join_club_is_idempotent() {
    let ctx = TestContext::new();
    let mut client = ctx.client();
    client.register("club@example.com").await;

    let first = client.post("/api/club/join", &json!({})).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["message"], "Successfully joined MyPetEats Club");
    assert_eq!(first.body["user"]["clubMember"], true);

    let second = client.post("/api/club/join", &json!({})).await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body["message"], "You are already a member");
}
