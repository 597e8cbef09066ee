//! Dashboard aggregates.

use axum::{Json, Router, extract::State, routing::get};
use chrono::Utc;

use mypeteats_core::Capability;

use crate::error::AppError;
use crate::middleware::RequireStaff;
use crate::services::stats::{DashboardStats, dashboard_stats};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/admin/stats", get(show))
}

pub async fn show(
    State(state): State<AppState>,
    RequireStaff(principal): RequireStaff,
) -> Result<Json<DashboardStats>, AppError> {
    principal.require(Capability::ViewStats)?;
    Ok(Json(dashboard_stats(state.store(), Utc::now()).await?))
}
