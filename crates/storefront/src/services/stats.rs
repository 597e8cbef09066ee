//! Back-office dashboard figures.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::instrument;

use mypeteats_core::Money;

use crate::db::{RepositoryError, Store};
use crate::models::{DailyOrderTotals, ProductCounts, UserCounts};

/// Products with fewer units than this count as low on stock.
pub const LOW_INVENTORY_THRESHOLD: i32 = 10;

/// "Recent" means placed within this many days.
pub const RECENT_DAYS: i64 = 30;

/// Days covered by the order time series, today included.
pub const TIME_SERIES_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub products: ProductCounts,
    pub orders: OrderStats,
    pub users: UserCounts,
    pub revenue: RevenueStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub total: i64,
    pub recent: i64,
    pub by_status: BTreeMap<String, i64>,
    pub time_series: Vec<DayPoint>,
}

/// One day of the order time series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayPoint {
    pub date: NaiveDate,
    pub orders: i64,
    pub revenue_cents: i64,
}

/// Revenue from orders whose payment completed.
#[derive(Debug, Clone, Serialize)]
pub struct RevenueStats {
    pub total_cents: i64,
    pub recent_cents: i64,
    pub total_formatted: String,
    pub recent_formatted: String,
}

/// Gather every dashboard figure. Queries run concurrently.
///
/// # Errors
///
/// Returns the first repository error.
#[instrument(skip(store))]
pub async fn dashboard_stats(
    store: &dyn Store,
    now: DateTime<Utc>,
) -> Result<DashboardStats, RepositoryError> {
    let recent_since = now - Duration::days(RECENT_DAYS);
    let today = now.date_naive();
    let series_start = today - Duration::days(TIME_SERIES_DAYS - 1);
    let series_since = series_start.and_time(chrono::NaiveTime::MIN).and_utc();

    let (
        products,
        users,
        total_orders,
        recent_orders,
        by_status,
        total_revenue,
        recent_revenue,
        daily,
    ) = tokio::try_join!(
        store.product_counts(LOW_INVENTORY_THRESHOLD),
        store.user_counts(),
        store.count_orders(None),
        store.count_orders(Some(recent_since)),
        store.order_status_counts(),
        store.completed_revenue(None),
        store.completed_revenue(Some(recent_since)),
        store.daily_order_totals(series_since),
    )?;

    Ok(DashboardStats {
        products,
        orders: OrderStats {
            total: total_orders,
            recent: recent_orders,
            by_status: by_status
                .into_iter()
                .map(|(status, count)| (status.as_str().to_string(), count))
                .collect(),
            time_series: zero_filled_series(series_start, today, &daily),
        },
        users,
        revenue: RevenueStats {
            total_cents: total_revenue,
            recent_cents: recent_revenue,
            total_formatted: Money::inr(total_revenue).to_string(),
            recent_formatted: Money::inr(recent_revenue).to_string(),
        },
    })
}

/// One point per day from `start` to `end` inclusive; days without orders
/// are zero.
fn zero_filled_series(start: NaiveDate, end: NaiveDate, daily: &[DailyOrderTotals]) -> Vec<DayPoint> {
    start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(|date| {
            let found = daily.iter().find(|d| d.day == date);
            DayPoint {
                date,
                orders: found.map_or(0, |d| d.orders),
                revenue_cents: found.map_or(0, |d| d.revenue_cents),
            }
        })
        .collect()
}
