//! Catalog management.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use mypeteats_core::{Capability, ProductId};

use super::{DEFAULT_LIMIT, MAX_LIMIT, flag};
use crate::db::Page;
use crate::error::{AppError, JsonBody};
use crate::middleware::RequireStaff;
use crate::models::ProductFilter;
use crate::routes::parse_id;
use crate::routes::products::{Pagination, non_blank};
use crate::services::catalog::CatalogService;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/products", get(index).post(create))
        .route(
            "/api/admin/products/{id}",
            get(show).put(update).delete(destroy),
        )
}

#[derive(Debug, Deserialize)]
pub struct AdminProductQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub published: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
}

/// Every product, drafts included, newest first.
pub async fn index(
    State(state): State<AppState>,
    RequireStaff(principal): RequireStaff,
    Query(query): Query<AdminProductQuery>,
) -> Result<Json<Value>, AppError> {
    principal.require(Capability::ManageCatalog)?;

    let page = Page::new(query.page, query.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let filter = ProductFilter {
        published: flag(query.published.as_deref()),
        category: non_blank(query.category),
        search: non_blank(query.search),
    };
    let result = state.store().list_products(&filter, page).await?;

    Ok(Json(json!({
        "products": result.items,
        "pagination": Pagination::new(page, &result),
    })))
}

#[instrument(skip_all, fields(principal = principal.kind()))]
pub async fn create(
    State(state): State<AppState>,
    RequireStaff(principal): RequireStaff,
    JsonBody(body): JsonBody<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    principal.require(Capability::ManageCatalog)?;

    let product = CatalogService::new(state.store()).create(&body).await?;
    tracing::info!(product_id = %product.id, sku = %product.sku, "Product created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Product created successfully", "product": product })),
    ))
}

pub async fn show(
    State(state): State<AppState>,
    RequireStaff(principal): RequireStaff,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    principal.require(Capability::ManageCatalog)?;

    let id: ProductId = parse_id(&id, "product")?;
    let product = CatalogService::new(state.store()).get(id).await?;
    Ok(Json(json!({ "product": product })))
}

/// Partial update: only the fields present in the body are validated and
/// changed.
#[instrument(skip_all, fields(principal = principal.kind(), product_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    RequireStaff(principal): RequireStaff,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Json<Value>, AppError> {
    principal.require(Capability::ManageCatalog)?;

    let id: ProductId = parse_id(&id, "product")?;
    let product = CatalogService::new(state.store()).update(id, &body).await?;
    Ok(Json(json!({ "message": "Product updated successfully", "product": product })))
}

#[instrument(skip_all, fields(principal = principal.kind(), product_id = %id))]
pub async fn destroy(
    State(state): State<AppState>,
    RequireStaff(principal): RequireStaff,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    principal.require(Capability::ManageCatalog)?;

    let id: ProductId = parse_id(&id, "product")?;
    CatalogService::new(state.store()).delete(id).await?;
    tracing::info!(product_id = %id, "Product deleted");
    Ok(Json(json!({ "message": "Product deleted successfully" })))
}
