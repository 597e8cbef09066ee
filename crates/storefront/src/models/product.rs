//! Catalog products.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use mypeteats_core::ProductId;

/// A product as stored.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub price_cents: i64,
    pub currency: String,
    pub inventory: i32,
    pub images: Vec<String>,
    pub categories: Vec<String>,
    #[sqlx(json)]
    pub attributes: Map<String, Value>,
    pub published: bool,
    #[sqlx(json)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// The editable fields of this product, for load-modify-save updates.
    #[must_use]
    pub fn to_draft(&self) -> ProductDraft {
        ProductDraft {
            sku: self.sku.clone(),
            title: self.title.clone(),
            slug: self.slug.clone(),
            description: self.description.clone(),
            price_cents: self.price_cents,
            currency: self.currency.clone(),
            inventory: self.inventory,
            images: self.images.clone(),
            categories: self.categories.clone(),
            attributes: self.attributes.clone(),
            published: self.published,
            metadata: self.metadata.clone(),
        }
    }

    /// First image, used as the order line thumbnail.
    #[must_use]
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// Validated, editable product fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDraft {
    pub sku: String,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub price_cents: i64,
    pub currency: String,
    pub inventory: i32,
    pub images: Vec<String>,
    pub categories: Vec<String>,
    pub attributes: Map<String, Value>,
    pub published: bool,
    pub metadata: Map<String, Value>,
}

/// Filters for product listings.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub published: Option<bool>,
    /// Exact category name.
    pub category: Option<String>,
    /// Case-insensitive substring of title, description or any category.
    pub search: Option<String>,
}

/// Catalog totals for the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCounts {
    pub total: i64,
    pub published: i64,
    pub draft: i64,
    pub low_inventory: i64,
}
