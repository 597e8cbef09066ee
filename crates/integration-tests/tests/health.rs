//! Probes and public catalog listing.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;

use mypeteats_integration_tests::TestContext;

#[tokio::test]
async fn test_health_endpoints() {
    let ctx = TestContext::new();
    let mut client = ctx.client();

    let live = client.get("/health").await;
    assert_eq!(live.status, StatusCode::OK);
    assert_eq!(live.body, "ok");

    assert_eq!(client.get("/health/ready").await.status, StatusCode::OK);

    let api = client.get("/api/health").await;
    assert_eq!(api.body["status"], "ok");
    assert_eq!(api.body["service"], "mypeteats-api");
    assert!(api.body["timestamp"].is_string());
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let ctx = TestContext::new();
    let mut client = ctx.client();

    let response = client
        .send(
            axum::http::Method::GET,
            "/health",
            None,
            &[("x-request-id", "req-abc-123")],
        )
        .await;
    assert_eq!(response.headers["x-request-id"], "req-abc-123");
}

#[tokio::test]
async fn test_catalog_search_and_pagination() {
    let ctx = TestContext::new();
    for n in 0..5 {
        ctx.seed_product(&format!("CAT-{n}"), 1_000, 10).await;
    }
    let mut client = ctx.client();

    let page = client.get("/api/products?page=2&limit=2").await;
    assert_eq!(page.status, StatusCode::OK);
    assert_eq!(page.body["products"].as_array().unwrap().len(), 2);
    assert_eq!(page.body["pagination"]["total"], 5);
    assert_eq!(page.body["pagination"]["pages"], 3);

    let search = client.get("/api/products?search=cat-3").await;
    assert_eq!(search.body["products"].as_array().unwrap().len(), 1);

    let category = client.get("/api/products?category=toys").await;
    assert!(category.body["products"].as_array().unwrap().is_empty());

    let unknown = client.get("/api/products/no-such-thing").await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
    assert_eq!(unknown.error(), "Product not found");
}
