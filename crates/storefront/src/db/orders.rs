//! Postgres implementation of [`OrderStore`].
//!
//! Inventory moves happen inside the same transaction as the order write
//! they belong to. Placement reserves with a conditional decrement; payment
//! confirmation locks the order row so only one caller can commit stock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};

use mypeteats_core::{OrderId, OrderStatus, PaymentStatus};

use super::{OrderStore, Page, Paginated, PgStore, RepositoryError, like_pattern};
use crate::models::{
    DailyOrderTotals, NewOrder, Order, OrderFilter, OrderUpdate, PaymentConfirmation,
    StockPolicy, StockShortfall, format_order_number,
};

const ORDER_COLUMNS: &str = "id, order_number, user_id, items, subtotal_cents, shipping_cents, \
    total_cents, currency, status, shipping_address, payment_method, payment_status, \
    transaction_id, gateway_order_id, stock_committed, metadata, created_at, updated_at";

fn push_order_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    if let Some(user_id) = filter.user_id {
        query.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status);
    }
    if let Some(number) = filter.order_number.as_deref() {
        query
            .push(" AND order_number ILIKE ")
            .push_bind(like_pattern(number));
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn place_order(
        &self,
        order: NewOrder,
        stock: StockPolicy,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool().begin().await?;

        if stock == StockPolicy::ReserveNow {
            for item in &order.items {
                let reserved: Option<i32> = sqlx::query_scalar(
                    r"
                    UPDATE products
                    SET inventory = inventory - $1, updated_at = NOW()
                    WHERE id = $2 AND inventory >= $1
                    RETURNING inventory
                    ",
                )
                .bind(item.quantity)
                .bind(item.product)
                .fetch_optional(&mut *tx)
                .await?;

                if reserved.is_none() {
                    let available: Option<i32> =
                        sqlx::query_scalar("SELECT inventory FROM products WHERE id = $1")
                            .bind(item.product)
                            .fetch_optional(&mut *tx)
                            .await?;
                    tx.rollback().await?;
                    return Err(RepositoryError::InsufficientStock {
                        product: item.product,
                        title: item.title.clone(),
                        available: available.unwrap_or(0),
                    });
                }
            }
        }

        let sequence: i64 = sqlx::query_scalar("SELECT nextval('order_number_seq')")
            .fetch_one(&mut *tx)
            .await?;
        let order_number = format_order_number(Utc::now(), sequence);

        let placed = sqlx::query_as::<_, Order>(&format!(
            r"
            INSERT INTO orders (order_number, user_id, items, subtotal_cents, shipping_cents,
                                total_cents, currency, shipping_address, payment_method,
                                stock_committed, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(&order_number)
        .bind(order.user_id)
        .bind(Json(&order.items))
        .bind(order.subtotal_cents)
        .bind(order.shipping_cents)
        .bind(order.total_cents)
        .bind(&order.currency)
        .bind(Json(&order.shipping_address))
        .bind(order.payment_method)
        .bind(stock == StockPolicy::ReserveNow)
        .bind(Json(&order.metadata))
        .fetch_one(&mut *tx)
        .await
        .map_err(RepositoryError::from_write)?;

        tx.commit().await?;
        Ok(placed)
    }

    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(order)
    }

    async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: Page,
    ) -> Result<Paginated<Order>, RepositoryError> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM orders WHERE TRUE");
        push_order_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool()).await?;

        let mut query = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE TRUE"));
        push_order_filter(&mut query, filter);
        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(page.offset());
        let items = query.build_query_as::<Order>().fetch_all(self.pool()).await?;

        Ok(Paginated { items, total })
    }

    async fn set_gateway_order_id(
        &self,
        id: OrderId,
        gateway_order_id: &str,
    ) -> Result<Order, RepositoryError> {
        sqlx::query_as::<_, Order>(&format!(
            r"
            UPDATE orders SET gateway_order_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(gateway_order_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    async fn confirm_payment(
        &self,
        id: OrderId,
        transaction_id: &str,
    ) -> Result<PaymentConfirmation, RepositoryError> {
        let mut tx = self.pool().begin().await?;

        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        if order.payment.status == PaymentStatus::Completed {
            tx.rollback().await?;
            return Ok(PaymentConfirmation::AlreadyCompleted(order));
        }

        // Orders moved off pending (cancelled, say) keep their stock untouched.
        let mut shortfalls = Vec::new();
        let take_stock = order.status == OrderStatus::Pending && !order.stock_committed;
        if take_stock {
            for item in &order.items {
                let available: Option<i32> = sqlx::query_scalar(
                    "SELECT inventory FROM products WHERE id = $1 FOR UPDATE",
                )
                .bind(item.product)
                .fetch_optional(&mut *tx)
                .await?;

                // A product deleted since checkout has nothing left to take.
                let Some(available) = available else {
                    continue;
                };
                if available < item.quantity {
                    shortfalls.push(StockShortfall {
                        product: item.product,
                        requested: item.quantity,
                        available,
                    });
                }

                sqlx::query(
                    r"
                    UPDATE products
                    SET inventory = GREATEST(inventory - $1, 0), updated_at = NOW()
                    WHERE id = $2
                    ",
                )
                .bind(item.quantity)
                .bind(item.product)
                .execute(&mut *tx)
                .await?;
            }
        }

        let order = sqlx::query_as::<_, Order>(&format!(
            r"
            UPDATE orders
            SET payment_status = $2,
                transaction_id = $3,
                status = CASE WHEN status = $4 THEN $5 ELSE status END,
                stock_committed = stock_committed OR $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(PaymentStatus::Completed)
        .bind(transaction_id)
        .bind(OrderStatus::Pending)
        .bind(OrderStatus::Confirmed)
        .bind(take_stock)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(PaymentConfirmation::Confirmed { order, shortfalls })
    }

    async fn mark_payment_failed(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE orders SET payment_status = $2, updated_at = NOW()
            WHERE id = $1 AND payment_status = $3
            ",
        )
        .bind(id)
        .bind(PaymentStatus::Failed)
        .bind(PaymentStatus::Pending)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_order(
        &self,
        id: OrderId,
        update: OrderUpdate,
    ) -> Result<Order, RepositoryError> {
        sqlx::query_as::<_, Order>(&format!(
            r"
            UPDATE orders
            SET status = COALESCE($2, status),
                payment_status = COALESCE($3, payment_status),
                payment_method = COALESCE($4, payment_method),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(update.status)
        .bind(update.payment_status)
        .bind(update.payment_method)
        .fetch_optional(self.pool())
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    async fn count_orders(&self, since: Option<DateTime<Utc>>) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE $1::TIMESTAMPTZ IS NULL OR created_at >= $1",
        )
        .bind(since)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }

    async fn order_status_counts(&self) -> Result<Vec<(OrderStatus, i64)>, RepositoryError> {
        let counts = sqlx::query_as::<_, (OrderStatus, i64)>(
            "SELECT status, COUNT(*) FROM orders GROUP BY status ORDER BY status",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(counts)
    }

    async fn completed_revenue(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64, RepositoryError> {
        let revenue: i64 = sqlx::query_scalar(
            r"
            SELECT COALESCE(SUM(total_cents), 0)::BIGINT
            FROM orders
            WHERE payment_status = $1 AND ($2::TIMESTAMPTZ IS NULL OR created_at >= $2)
            ",
        )
        .bind(PaymentStatus::Completed)
        .bind(since)
        .fetch_one(self.pool())
        .await?;
        Ok(revenue)
    }

    async fn daily_order_totals(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyOrderTotals>, RepositoryError> {
        let totals = sqlx::query_as::<_, DailyOrderTotals>(
            r"
            SELECT (created_at AT TIME ZONE 'UTC')::DATE AS day,
                   COUNT(*) AS orders,
                   COALESCE(SUM(total_cents) FILTER (WHERE payment_status = $2), 0)::BIGINT
                       AS revenue_cents
            FROM orders
            WHERE created_at >= $1
            GROUP BY day
            ORDER BY day
            ",
        )
        .bind(since)
        .bind(PaymentStatus::Completed)
        .fetch_all(self.pool())
        .await?;
        Ok(totals)
    }
}
