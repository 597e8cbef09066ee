//! Integration tests for the MyPetEats API.
//!
//! Every test builds the real router in-process over [`MemoryStore`], the
//! in-memory session store and a [`FakeGateway`], then drives it with
//! `tower::ServiceExt::oneshot`. No database or network is needed:
//!
//! ```bash
//! cargo test -p mypeteats-integration-tests
//! ```
//!
//! [`TestClient`] carries the session cookie between requests the way a
//! browser would, and sends a fixed `x-forwarded-for` so rate limits and
//! lockouts see a stable client address.

#![allow(clippy::missing_panics_doc)]

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use secrecy::SecretString;
use serde_json::{Map, Value};
use tower::ServiceExt;

use mypeteats_core::{OrderId, ProductId, UserRole};
use mypeteats_storefront::config::{Environment, RazorpayConfig, StorefrontConfig};
use mypeteats_storefront::db::{MemoryStore, ProductStore, OrderStore};
use mypeteats_storefront::middleware::admin::ADMIN_TOKEN_HEADER;
use mypeteats_storefront::models::{Order, Product, ProductDraft, User};
use mypeteats_storefront::routes;
use mypeteats_storefront::services::auth::AuthService;
use mypeteats_storefront::services::payments::signature;
use mypeteats_storefront::services::payments::{
    GatewayError, GatewayOrder, GatewayOrderRequest, PaymentGateway, Payments,
};
use mypeteats_storefront::services::rate_limit::FailedAuthTracker;
use mypeteats_storefront::state::AppState;

/// Legacy admin token configured for tests.
pub const ADMIN_TOKEN: &str = "test-admin-token-0f9c2b7e41d8a356";

/// Gateway key secret; signs checkout confirmations.
pub const KEY_SECRET: &str = "test-key-secret-5b1e";

/// Gateway webhook secret.
pub const WEBHOOK_SECRET: &str = "test-webhook-secret-a7d3";

/// Publishable gateway key.
pub const KEY_ID: &str = "rzp_test_key";

/// Password given to every seeded account.
pub const PASSWORD: &str = "correct-horse";

const BODY_LIMIT: usize = 1024 * 1024;

// ============================================================================
// Fake payment gateway
// ============================================================================

/// Gateway stand-in that records requests and hands out sequential ids.
#[derive(Default)]
pub struct FakeGateway {
    failing: AtomicBool,
    next_id: AtomicU32,
    requests: Mutex<Vec<GatewayOrderRequest>>,
}

impl FakeGateway {
    /// Make subsequent create-order calls fail.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Every create-order request received so far.
    pub fn requests(&self) -> Vec<GatewayOrderRequest> {
        self.requests.lock().expect("gateway lock poisoned").clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(
        &self,
        request: &GatewayOrderRequest,
    ) -> Result<GatewayOrder, GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: 500,
                message: "gateway unavailable".to_string(),
            });
        }
        self.requests
            .lock()
            .expect("gateway lock poisoned")
            .push(request.clone());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayOrder {
            id: format!("order_fake{n:04}"),
            amount: request.amount,
            currency: request.currency.clone(),
            status: Some("created".to_string()),
        })
    }
}

// ============================================================================
// Test context
// ============================================================================

/// Configuration used by every test unless overridden.
#[must_use]
pub fn test_config(uploads_dir: PathBuf) -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://unused@localhost/mypeteats_test"),
        host: IpAddr::from([127, 0, 0, 1]),
        port: 0,
        base_url: "http://localhost:3000".to_string(),
        environment: Environment::Development,
        session_secret: SecretString::from("k8Jq2vN5xR1tW7yB4mP9sD3fH6gL0zC8aE5uI2oQ7nX4"),
        admin_token: Some(SecretString::from(ADMIN_TOKEN)),
        razorpay: Some(RazorpayConfig {
            key_id: KEY_ID.to_string(),
            key_secret: SecretString::from(KEY_SECRET),
            webhook_secret: Some(SecretString::from(WEBHOOK_SECRET)),
            api_base: "http://127.0.0.1:9".to_string(),
        }),
        uploads_dir,
        admin_rate_limit: 1000,
        cart_idle_timeout: Duration::from_secs(60 * 60),
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// One application instance with its stores.
pub struct TestContext {
    app: Router,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub uploads_dir: PathBuf,
    next_client: AtomicU32,
}

impl TestContext {
    /// The default application.
    #[must_use]
    pub fn new() -> Self {
        Self::build(|_| {}, FailedAuthTracker::default())
    }

    /// The application with configuration tweaks applied.
    #[must_use]
    pub fn with_config(configure: impl FnOnce(&mut StorefrontConfig)) -> Self {
        Self::build(configure, FailedAuthTracker::default())
    }

    /// The application with an admin lockout window of `window`.
    #[must_use]
    pub fn with_lockout_window(window: Duration) -> Self {
        Self::build(|_| {}, FailedAuthTracker::new(5, window))
    }

    fn build(
        configure: impl FnOnce(&mut StorefrontConfig),
        failed_admin_auth: FailedAuthTracker,
    ) -> Self {
        let uploads_dir = std::env::temp_dir().join(format!("mypeteats-test-{}", uuid::Uuid::new_v4()));
        let mut config = test_config(uploads_dir.clone());
        configure(&mut config);

        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::default());
        let payments = config
            .razorpay
            .as_ref()
            .map(|razorpay| Payments::new(razorpay, gateway.clone()));

        let state = AppState::with_failed_auth_tracker(
            config,
            store.clone(),
            payments,
            failed_admin_auth,
        );
        let app = routes::app(state, tower_sessions::MemoryStore::default());

        Self {
            app,
            store,
            gateway,
            uploads_dir,
            next_client: AtomicU32::new(1),
        }
    }

    /// A fresh client with its own address and no cookies.
    pub fn client(&self) -> TestClient {
        let n = self.next_client.fetch_add(1, Ordering::SeqCst);
        self.client_at(&format!("203.0.113.{}", n % 250 + 1))
    }

    /// A fresh client appearing to come from `ip`.
    #[must_use]
    pub fn client_at(&self, ip: &str) -> TestClient {
        TestClient {
            app: self.app.clone(),
            ip: ip.to_string(),
            cookie: None,
        }
    }

    // ------------------------------------------------------------------------
    // Seeding and inspection
    // ------------------------------------------------------------------------

    /// Insert a published product priced in INR.
    pub async fn seed_product(&self, sku: &str, price_cents: i64, inventory: i32) -> Product {
        self.store
            .insert_product(ProductDraft {
                sku: sku.to_string(),
                title: format!("Product {sku}"),
                slug: sku.to_lowercase(),
                description: format!("Description of {sku}"),
                price_cents,
                currency: "INR".to_string(),
                inventory,
                images: vec![format!("/uploads/products/{}.png", sku.to_lowercase())],
                categories: vec!["food".to_string()],
                attributes: Map::new(),
                published: true,
                metadata: Map::new(),
            })
            .await
            .expect("insert product")
    }

    /// Create an account with [`PASSWORD`].
    pub async fn seed_user(&self, email: &str, role: UserRole) -> User {
        AuthService::new(self.store.as_ref())
            .create_staff("Test User", email, PASSWORD, role)
            .await
            .expect("create user")
    }

    pub async fn product(&self, id: ProductId) -> Product {
        self.store
            .product_by_id(id)
            .await
            .expect("load product")
            .expect("product exists")
    }

    pub async fn order(&self, id: OrderId) -> Order {
        self.store
            .order_by_id(id)
            .await
            .expect("load order")
            .expect("order exists")
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.uploads_dir);
    }
}

/// Signature the checkout widget would return for a payment.
#[must_use]
pub fn payment_signature(gateway_order_id: &str, payment_id: &str) -> String {
    signature::sign(
        KEY_SECRET.as_bytes(),
        signature::payment_message(gateway_order_id, payment_id).as_bytes(),
    )
}

/// Signature the gateway puts on a webhook body.
#[must_use]
pub fn webhook_signature(body: &[u8]) -> String {
    signature::sign(WEBHOOK_SECRET.as_bytes(), body)
}

/// A shipping address with every required field.
#[must_use]
pub fn shipping_address() -> Value {
    serde_json::json!({
        "firstName": "Asha",
        "lastName": "Rao",
        "email": "Asha@Example.com",
        "phone": "+91 98765 43210",
        "address": "12 MG Road",
        "city": "Pune",
        "postalCode": "411001",
    })
}

// ============================================================================
// Client
// ============================================================================

/// A decoded response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Parsed JSON, or the raw text as a JSON string.
    pub body: Value,
}

impl TestResponse {
    /// The `error` message of an error body.
    #[must_use]
    pub fn error(&self) -> &str {
        self.body["error"].as_str().unwrap_or_default()
    }
}

/// A browser-like client: remembers the session cookie between requests.
pub struct TestClient {
    app: Router,
    ip: String,
    cookie: Option<String>,
}

impl TestClient {
    pub async fn get(&mut self, uri: &str) -> TestResponse {
        self.send(Method::GET, uri, None, &[]).await
    }

    pub async fn post(&mut self, uri: &str, body: &Value) -> TestResponse {
        self.send(Method::POST, uri, Some(body), &[]).await
    }

    pub async fn put(&mut self, uri: &str, body: &Value) -> TestResponse {
        self.send(Method::PUT, uri, Some(body), &[]).await
    }

    pub async fn delete(&mut self, uri: &str) -> TestResponse {
        self.send(Method::DELETE, uri, None, &[]).await
    }

    /// A request carrying the legacy admin token.
    pub async fn admin(&mut self, method: Method, uri: &str, body: Option<&Value>) -> TestResponse {
        self.send(method, uri, body, &[(ADMIN_TOKEN_HEADER, ADMIN_TOKEN)])
            .await
    }

    /// Register a customer and keep the session.
    pub async fn register(&mut self, email: &str) -> TestResponse {
        self.post(
            "/api/auth/register",
            &serde_json::json!({ "name": "Test Customer", "email": email, "password": PASSWORD }),
        )
        .await
    }

    /// Log in with [`PASSWORD`] and keep the session.
    pub async fn login(&mut self, email: &str) -> TestResponse {
        self.post(
            "/api/auth/login",
            &serde_json::json!({ "email": email, "password": PASSWORD }),
        )
        .await
    }

    pub async fn send(
        &mut self,
        method: Method,
        uri: &str,
        body: Option<&Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", &self.ip);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };
        self.send_request(request.expect("build request")).await
    }

    /// Send a raw body with the given content type.
    pub async fn send_raw(
        &mut self,
        method: Method,
        uri: &str,
        content_type: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", &self.ip)
            .header(header::CONTENT_TYPE, content_type);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::from(body)).expect("build request");
        self.send_request(request).await
    }

    async fn send_request(&mut self, mut request: Request<Body>) -> TestResponse {
        if let Some(cookie) = &self.cookie {
            request.headers_mut().insert(
                header::COOKIE,
                cookie.parse().expect("cookie header value"),
            );
        }

        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        self.remember_cookie(response.headers());

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), BODY_LIMIT)
            .await
            .expect("read body");
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

        TestResponse {
            status,
            headers,
            body,
        }
    }

    fn remember_cookie(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(header::SET_COOKIE) {
            let Ok(value) = value.to_str() else { continue };
            let pair = value.split(';').next().unwrap_or_default().trim();
            let Some((name, cookie_value)) = pair.split_once('=') else {
                continue;
            };
            if name != "mpe_session" {
                continue;
            }
            self.cookie = (!cookie_value.is_empty()).then(|| pair.to_string());
        }
    }
}
