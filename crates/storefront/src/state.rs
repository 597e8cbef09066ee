//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::StorefrontConfig;
use crate::db::Store;
use crate::services::cart::CartStore;
use crate::services::payments::Payments;
use crate::services::rate_limit::{ADMIN_REQUEST_WINDOW, FailedAuthTracker, RequestLimiter};
use crate::services::uploads::ImageUploads;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the store, carts and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    store: Arc<dyn Store>,
    payments: Option<Payments>,
    carts: CartStore,
    admin_limiter: RequestLimiter,
    failed_admin_auth: FailedAuthTracker,
    uploads: ImageUploads,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `store` - Persistence for users, products and orders
    /// * `payments` - The payment gateway, if credentials are configured
    #[must_use]
    pub fn new(config: StorefrontConfig, store: Arc<dyn Store>, payments: Option<Payments>) -> Self {
        Self::with_failed_auth_tracker(config, store, payments, FailedAuthTracker::default())
    }

    /// Like [`Self::new`] with a custom lockout tracker.
    #[must_use]
    pub fn with_failed_auth_tracker(
        config: StorefrontConfig,
        store: Arc<dyn Store>,
        payments: Option<Payments>,
        failed_admin_auth: FailedAuthTracker,
    ) -> Self {
        let carts = CartStore::new(config.cart_idle_timeout);
        let admin_limiter = RequestLimiter::new(config.admin_rate_limit, ADMIN_REQUEST_WINDOW);
        let uploads = ImageUploads::new(config.uploads_dir.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                payments,
                carts,
                admin_limiter,
                failed_admin_auth,
                uploads,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    /// The payment gateway, if configured.
    #[must_use]
    pub fn payments(&self) -> Option<&Payments> {
        self.inner.payments.as_ref()
    }

    #[must_use]
    pub fn carts(&self) -> &CartStore {
        &self.inner.carts
    }

    /// Per-IP cap on admin requests.
    #[must_use]
    pub fn admin_limiter(&self) -> &RequestLimiter {
        &self.inner.admin_limiter
    }

    /// Per-IP failed admin token attempts.
    #[must_use]
    pub fn failed_admin_auth(&self) -> &FailedAuthTracker {
        &self.inner.failed_admin_auth
    }

    #[must_use]
    pub fn uploads(&self) -> &ImageUploads {
        &self.inner.uploads
    }
}
