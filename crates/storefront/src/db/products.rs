//! Postgres implementation of [`ProductStore`].

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};

use mypeteats_core::ProductId;

use super::{Page, Paginated, PgStore, ProductStore, RepositoryError, like_pattern};
use crate::models::{Product, ProductCounts, ProductDraft, ProductFilter};

const PRODUCT_COLUMNS: &str = "id, sku, title, slug, description, price_cents, currency, \
    inventory, images, categories, attributes, published, metadata, created_at, updated_at";

fn push_product_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    if let Some(published) = filter.published {
        query.push(" AND published = ").push_bind(published);
    }
    if let Some(category) = filter.category.clone() {
        query.push(" AND ").push_bind(category).push(" = ANY(categories)");
    }
    if let Some(search) = filter.search.as_deref() {
        let pattern = like_pattern(search);
        query
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR EXISTS (SELECT 1 FROM unnest(categories) AS c WHERE c ILIKE ")
            .push_bind(pattern)
            .push("))");
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn insert_product(&self, draft: ProductDraft) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, Product>(&format!(
            r"
            INSERT INTO products (sku, title, slug, description, price_cents, currency,
                                  inventory, images, categories, attributes, published, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(&draft.sku)
        .bind(&draft.title)
        .bind(&draft.slug)
        .bind(&draft.description)
        .bind(draft.price_cents)
        .bind(&draft.currency)
        .bind(draft.inventory)
        .bind(&draft.images)
        .bind(&draft.categories)
        .bind(Json(&draft.attributes))
        .bind(draft.published)
        .bind(Json(&draft.metadata))
        .fetch_one(self.pool())
        .await
        .map_err(RepositoryError::from_write)
    }

    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(product)
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(self.pool())
        .await?;
        Ok(product)
    }

    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(raw)
        .fetch_all(self.pool())
        .await?;
        Ok(products)
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        page: Page,
    ) -> Result<Paginated<Product>, RepositoryError> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM products WHERE TRUE");
        push_product_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool()).await?;

        let mut query =
            QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE TRUE"));
        push_product_filter(&mut query, filter);
        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(page.offset());
        let items = query
            .build_query_as::<Product>()
            .fetch_all(self.pool())
            .await?;

        Ok(Paginated { items, total })
    }

    async fn update_product(
        &self,
        id: ProductId,
        draft: ProductDraft,
    ) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, Product>(&format!(
            r"
            UPDATE products
            SET sku = $2, title = $3, slug = $4, description = $5, price_cents = $6,
                currency = $7, inventory = $8, images = $9, categories = $10,
                attributes = $11, published = $12, metadata = $13, updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&draft.sku)
        .bind(&draft.title)
        .bind(&draft.slug)
        .bind(&draft.description)
        .bind(draft.price_cents)
        .bind(&draft.currency)
        .bind(draft.inventory)
        .bind(&draft.images)
        .bind(&draft.categories)
        .bind(Json(&draft.attributes))
        .bind(draft.published)
        .bind(Json(&draft.metadata))
        .fetch_optional(self.pool())
        .await
        .map_err(RepositoryError::from_write)?
        .ok_or(RepositoryError::NotFound)
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn slug_exists(
        &self,
        slug: &str,
        except: Option<ProductId>,
    ) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM products WHERE slug = $1 AND ($2::INTEGER IS NULL OR id <> $2))",
        )
        .bind(slug)
        .bind(except)
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    async fn product_counts(
        &self,
        low_inventory_below: i32,
    ) -> Result<ProductCounts, RepositoryError> {
        let (total, published, draft, low_inventory) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                r"
                SELECT COUNT(*),
                       COUNT(*) FILTER (WHERE published),
                       COUNT(*) FILTER (WHERE NOT published),
                       COUNT(*) FILTER (WHERE inventory < $1)
                FROM products
                ",
            )
            .bind(low_inventory_below)
            .fetch_one(self.pool())
            .await?;

        Ok(ProductCounts {
            total,
            published,
            draft,
            low_inventory,
        })
    }
}
