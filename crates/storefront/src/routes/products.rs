//! Public catalog route handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::db::{Page, Paginated};
use crate::error::AppError;
use crate::models::ProductFilter;
use crate::state::AppState;

const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(index))
        .route("/api/products/{slug}", get(show))
}

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<String>,
    pub search: Option<String>,
}

/// Pagination block shared by every listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    #[must_use]
    pub fn new<T>(page: Page, result: &Paginated<T>) -> Self {
        let limit = i64::from(page.limit);
        Self {
            page: page.page,
            limit: page.limit,
            total: result.total,
            pages: (result.total + limit - 1) / limit,
        }
    }
}

/// Trim a query parameter, treating blank as absent.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// List published products, newest first.
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Value>, AppError> {
    let page = Page::new(query.page, query.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let filter = ProductFilter {
        published: Some(true),
        category: non_blank(query.category),
        search: non_blank(query.search),
    };

    let result = state.store().list_products(&filter, page).await?;
    Ok(Json(json!({
        "products": result.items,
        "pagination": Pagination::new(page, &result),
    })))
}

/// A published product by slug.
pub async fn show(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Value>, AppError> {
    let slug = slug.trim().to_lowercase();
    let product = state
        .store()
        .product_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;
    if !product.published {
        tracing::warn!(%slug, "Product found but not published");
        return Err(AppError::NotFound("Product not found".to_string()));
    }
    Ok(Json(json!({ "product": product })))
}
