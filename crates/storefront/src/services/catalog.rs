//! Product catalog management.
//!
//! Turns admin request bodies into validated [`ProductDraft`]s and keeps
//! slugs unique. Field checks come from [`mypeteats_core::validation`] so the
//! create and update paths reject the same inputs with the same messages.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::instrument;

use mypeteats_core::ProductId;
use mypeteats_core::slug::{slug_candidates, slug_for_title};
use mypeteats_core::validation::{
    ValidationError, normalize_currency, sanitize_description, validate_categories,
    validate_images, validate_inventory, validate_price, validate_sku, validate_title,
};

use crate::db::{RepositoryError, Store};
use crate::models::{Product, ProductDraft};

/// Suffixes tried before giving up on a derived slug.
const MAX_SLUG_CANDIDATES: usize = 1000;

/// Inserts that lose a race for a derived slug are retried this many times.
const SLUG_RACE_RETRIES: usize = 3;

/// Errors from catalog management.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("SKU already exists")]
    SkuTaken,

    #[error("Product not found")]
    NotFound,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl CatalogError {
    fn from_write(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Conflict(ref field) if field == "sku" => Self::SkuTaken,
            RepositoryError::NotFound => Self::NotFound,
            other => Self::Repository(other),
        }
    }
}

/// Admin-side catalog operations.
pub struct CatalogService<'a> {
    store: &'a dyn Store,
}

impl<'a> CatalogService<'a> {
    #[must_use]
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Fetch a product by id, published or not.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] for an unknown id.
    pub async fn get(&self, id: ProductId) -> Result<Product, CatalogError> {
        self.store
            .product_by_id(id)
            .await?
            .ok_or(CatalogError::NotFound)
    }

    /// Create a product from a JSON body.
    ///
    /// Checks run in the order SKU, title, price, then the optional fields,
    /// and the first failure is reported. Without an explicit slug, one is
    /// derived from the title and suffixed (`-2`, `-3`, ...) until unique.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input, [`CatalogError::SkuTaken`]
    /// for a duplicate SKU, or a repository conflict for a taken explicit slug.
    #[instrument(skip(self, body))]
    pub async fn create(&self, body: &Value) -> Result<Product, CatalogError> {
        let body = as_object(body)?;

        let sku = validate_sku(body.get("sku"))?;
        let title = validate_title(body.get("title"))?;
        let price_cents = validate_price(body.get("price_cents"))?;
        let inventory = validate_inventory(body.get("inventory"))?;
        let images = validate_images(body.get("images"))?;
        let categories = validate_categories(body.get("categories"))?;

        let mut draft = ProductDraft {
            sku,
            slug: String::new(),
            description: description(body.get("description"))?,
            price_cents,
            currency: currency(body.get("currency"))?,
            inventory,
            images,
            categories,
            attributes: object_field("attributes", body.get("attributes"))?,
            published: matches!(body.get("published"), Some(Value::Bool(true))),
            metadata: object_field("metadata", body.get("metadata"))?,
            title,
        };

        if let Some(slug) = explicit_slug(body.get("slug")) {
            draft.slug = slug;
            return self
                .store
                .insert_product(draft)
                .await
                .map_err(CatalogError::from_write);
        }

        let base = slug_for_title(&draft.title);
        let mut attempt = 0;
        loop {
            draft.slug = self.unique_slug(&base, None).await?;
            match self.store.insert_product(draft.clone()).await {
                Err(RepositoryError::Conflict(field))
                    if field == "slug" && attempt < SLUG_RACE_RETRIES =>
                {
                    attempt += 1;
                    tracing::debug!(slug = %draft.slug, attempt, "Derived slug taken concurrently, retrying");
                }
                result => return result.map_err(CatalogError::from_write),
            }
        }
    }

    /// Apply the fields present in a JSON body to an existing product.
    ///
    /// Only provided fields are validated and changed. A changed title
    /// without an explicit slug regenerates the slug.
    ///
    /// # Errors
    ///
    /// As for [`Self::create`], plus [`CatalogError::NotFound`].
    #[instrument(skip(self, body), fields(product_id = %id))]
    pub async fn update(&self, id: ProductId, body: &Value) -> Result<Product, CatalogError> {
        let body = as_object(body)?;
        let product = self.get(id).await?;
        let mut draft = product.to_draft();

        if let Some(value) = body.get("sku") {
            draft.sku = validate_sku(Some(value))?;
        }
        let mut title_changed = false;
        if let Some(value) = body.get("title") {
            let title = validate_title(Some(value))?;
            title_changed = title != draft.title;
            draft.title = title;
        }
        if let Some(value) = body.get("description") {
            draft.description = description(Some(value))?;
        }
        if let Some(value) = body.get("price_cents") {
            draft.price_cents = validate_price(Some(value))?;
        }
        if let Some(value) = body.get("currency") {
            draft.currency = currency(Some(value))?;
        }
        if let Some(value) = body.get("inventory") {
            draft.inventory = validate_inventory(Some(value))?;
        }
        if let Some(value) = body.get("images") {
            draft.images = validate_images(Some(value))?;
        }
        if let Some(value) = body.get("categories") {
            draft.categories = validate_categories(Some(value))?;
        }
        if let Some(value) = body.get("attributes") {
            draft.attributes = object_field("attributes", Some(value))?;
        }
        if let Some(value) = body.get("published") {
            draft.published = matches!(value, Value::Bool(true));
        }
        if let Some(value) = body.get("metadata") {
            draft.metadata = object_field("metadata", Some(value))?;
        }

        match explicit_slug(body.get("slug")) {
            Some(slug) => draft.slug = slug,
            None if title_changed => {
                draft.slug = self
                    .unique_slug(&slug_for_title(&draft.title), Some(id))
                    .await?;
            }
            None => {}
        }

        self.store
            .update_product(id, draft)
            .await
            .map_err(CatalogError::from_write)
    }

    /// Delete a product.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] for an unknown id.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete(&self, id: ProductId) -> Result<(), CatalogError> {
        if self.store.delete_product(id).await? {
            tracing::info!(product_id = %id, "Product deleted");
            Ok(())
        } else {
            Err(CatalogError::NotFound)
        }
    }

    /// First candidate derived from `base` that no other product uses.
    async fn unique_slug(
        &self,
        base: &str,
        except: Option<ProductId>,
    ) -> Result<String, CatalogError> {
        for candidate in slug_candidates(base).take(MAX_SLUG_CANDIDATES) {
            if !self.store.slug_exists(&candidate, except).await? {
                return Ok(candidate);
            }
        }
        Err(RepositoryError::Conflict("slug".to_string()).into())
    }
}

// =============================================================================
// Field helpers
// =============================================================================

fn as_object(body: &Value) -> Result<&Map<String, Value>, ValidationError> {
    body.as_object()
        .ok_or_else(|| ValidationError::new("body", "Request body must be a JSON object"))
}

/// A non-blank slug string, trimmed and lowercased.
fn explicit_slug(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_lowercase()),
        _ => None,
    }
}

fn description(value: Option<&Value>) -> Result<String, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(sanitize_description(s)),
        Some(_) => Err(ValidationError::new(
            "description",
            "Description must be a string",
        )),
    }
}

fn currency(value: Option<&Value>) -> Result<String, ValidationError> {
    match value {
        None | Some(Value::Null) => normalize_currency(None),
        Some(Value::String(s)) => normalize_currency(Some(s)),
        Some(_) => Err(ValidationError::new(
            "currency",
            "Currency must be a 3-letter code",
        )),
    }
}

/// An open key-value map. Absent or null means empty.
fn object_field(
    field: &'static str,
    value: Option<&Value>,
) -> Result<Map<String, Value>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(ValidationError::new(
            field,
            format!("{} must be an object", capitalize(field)),
        )),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db::MemoryStore;

    fn body(sku: &str, title: &str) -> Value {
        json!({ "sku": sku, "title": title, "price_cents": 49900, "inventory": 5 })
    }

    #[tokio::test]
    async fn test_create_normalizes_fields() {
        let store = MemoryStore::new();
        let catalog = CatalogService::new(&store);

        let product = catalog
            .create(&json!({
                "sku": "kib-01",
                "title": "  Chicken Kibble ",
                "price_cents": "1299",
                "currency": "usd",
                "description": "<b>crunchy</b>",
                "categories": [" dogs ", ""],
                "published": "yes",
            }))
            .await
            .unwrap();

        assert_eq!(product.sku, "KIB-01");
        assert_eq!(product.title, "Chicken Kibble");
        assert_eq!(product.slug, "chicken-kibble");
        assert_eq!(product.price_cents, 1299);
        assert_eq!(product.currency, "USD");
        assert_eq!(product.description, "&lt;b&gt;crunchy&lt;/b&gt;");
        assert_eq!(product.categories, vec!["dogs"]);
        assert_eq!(product.inventory, 0);
        assert!(!product.published);
    }

    #[tokio::test]
    async fn test_create_reports_first_failing_field() {
        let store = MemoryStore::new();
        let catalog = CatalogService::new(&store);

        let err = catalog.create(&json!({ "title": 5 })).await.unwrap_err();
        assert_eq!(err.to_string(), "SKU is required");

        let err = catalog.create(&json!({ "sku": "A-1" })).await.unwrap_err();
        assert_eq!(err.to_string(), "Title is required and must be a string");

        let err = catalog
            .create(&json!({ "sku": "A-1", "title": "Bone" }))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Price is required");
    }

    #[tokio::test]
    async fn test_same_title_gets_suffixed_slug() {
        let store = MemoryStore::new();
        let catalog = CatalogService::new(&store);

        let first = catalog.create(&body("A-1", "Salmon Treats")).await.unwrap();
        let second = catalog.create(&body("A-2", "Salmon   Treats!")).await.unwrap();
        let third = catalog.create(&body("A-3", "salmon treats")).await.unwrap();

        assert_eq!(first.slug, "salmon-treats");
        assert_eq!(second.slug, "salmon-treats-2");
        assert_eq!(third.slug, "salmon-treats-3");
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let store = MemoryStore::new();
        let catalog = CatalogService::new(&store);

        catalog.create(&body("A-1", "Bone")).await.unwrap();
        let err = catalog.create(&body("a-1", "Other")).await.unwrap_err();
        assert!(matches!(err, CatalogError::SkuTaken));
    }

    #[tokio::test]
    async fn test_explicit_slug_conflict() {
        let store = MemoryStore::new();
        let catalog = CatalogService::new(&store);

        let mut first = body("A-1", "Bone");
        first["slug"] = json!(" Big-Bone ");
        assert_eq!(catalog.create(&first).await.unwrap().slug, "big-bone");

        let mut second = body("A-2", "Other");
        second["slug"] = json!("big-bone");
        let err = catalog.create(&second).await.unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Repository(RepositoryError::Conflict(ref f)) if f == "slug"
        ));
    }

    #[tokio::test]
    async fn test_update_only_touches_provided_fields() {
        let store = MemoryStore::new();
        let catalog = CatalogService::new(&store);
        let product = catalog.create(&body("A-1", "Bone")).await.unwrap();

        let updated = catalog
            .update(product.id, &json!({ "inventory": 9, "published": true }))
            .await
            .unwrap();

        assert_eq!(updated.inventory, 9);
        assert!(updated.published);
        assert_eq!(updated.title, "Bone");
        assert_eq!(updated.slug, "bone");
        assert_eq!(updated.price_cents, 49900);

        let err = catalog
            .update(product.id, &json!({ "price_cents": -5 }))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Price must be non-negative");
    }

    #[tokio::test]
    async fn test_update_title_regenerates_slug() {
        let store = MemoryStore::new();
        let catalog = CatalogService::new(&store);
        catalog.create(&body("A-1", "Beef Jerky")).await.unwrap();
        let product = catalog.create(&body("A-2", "Lamb Jerky")).await.unwrap();

        let renamed = catalog
            .update(product.id, &json!({ "title": "Beef Jerky" }))
            .await
            .unwrap();
        assert_eq!(renamed.slug, "beef-jerky-2");

        let same = catalog
            .update(product.id, &json!({ "title": "Beef Jerky", "inventory": 1 }))
            .await
            .unwrap();
        assert_eq!(same.slug, "beef-jerky-2");
    }

    #[tokio::test]
    async fn test_missing_product() {
        let store = MemoryStore::new();
        let catalog = CatalogService::new(&store);
        let missing = ProductId::new(404);

        assert!(matches!(catalog.get(missing).await, Err(CatalogError::NotFound)));
        assert!(matches!(
            catalog.update(missing, &json!({})).await,
            Err(CatalogError::NotFound)
        ));
        assert!(matches!(catalog.delete(missing).await, Err(CatalogError::NotFound)));
    }

    #[test]
    fn test_object_fields() {
        assert!(object_field("attributes", None).unwrap().is_empty());
        let err = object_field("metadata", Some(&json!([1]))).unwrap_err();
        assert_eq!(err.message, "Metadata must be an object");
    }
}
