//! Account management.
//!
//! Staff with `ManageUsers` may edit customers freely. Touching another
//! back-office account's role, granting an admin-tier role, creating staff
//! accounts, or deleting admin-tier accounts additionally needs
//! `ManageAdminRoles`.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use mypeteats_core::{Capability, UserId, UserRole};

use super::{DEFAULT_LIMIT, MAX_LIMIT, enum_field, flag};
use crate::db::Page;
use crate::error::{AppError, JsonBody};
use crate::middleware::{Principal, RequireStaff};
use crate::models::{User, UserFilter};
use crate::routes::parse_id;
use crate::routes::products::{Pagination, non_blank};
use crate::services::auth::{AuthService, validate_name};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/users", get(index).post(create))
        .route(
            "/api/admin/users/{id}",
            get(show).put(update).delete(destroy),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub role: Option<String>,
    pub club_member: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateStaffRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdateRequest {
    pub role: Option<Value>,
    pub club_member: Option<bool>,
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// Whether `principal` may move `target` from its current role to `new_role`.
fn may_change_role(principal: &Principal, target: &User, new_role: UserRole) -> bool {
    principal.can(Capability::ManageAdminRoles)
        || (target.role == UserRole::Customer && !new_role.is_admin_tier())
}

async fn load_user(state: &AppState, id: UserId) -> Result<User, AppError> {
    state
        .store()
        .user_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

pub async fn index(
    State(state): State<AppState>,
    RequireStaff(principal): RequireStaff,
    Query(query): Query<AdminUserQuery>,
) -> Result<Json<Value>, AppError> {
    principal.require(Capability::ManageUsers)?;

    let page = Page::new(query.page, query.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let role = match non_blank(query.role) {
        Some(r) => Some(
            r.parse::<UserRole>()
                .map_err(|_| AppError::BadRequest("Invalid role".to_string()))?,
        ),
        None => None,
    };
    let filter = UserFilter {
        role,
        club_member: flag(query.club_member.as_deref()),
        search: non_blank(query.search),
    };
    let result = state.store().list_users(&filter, page).await?;

    Ok(Json(json!({
        "users": result.items,
        "pagination": Pagination::new(page, &result),
    })))
}

/// Create a back-office account.
#[instrument(skip_all, fields(principal = principal.kind()))]
pub async fn create(
    State(state): State<AppState>,
    RequireStaff(principal): RequireStaff,
    JsonBody(body): JsonBody<CreateStaffRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if !principal.can(Capability::ManageAdminRoles) {
        return Err(AppError::Forbidden(
            "Only super admins can create admin accounts".to_string(),
        ));
    }

    let role = enum_field::<UserRole>(body.role.as_ref(), "Invalid role")?.unwrap_or(UserRole::Staff);
    if !UserRole::STAFF_ASSIGNABLE.contains(&role) {
        return Err(AppError::BadRequest("Invalid role".to_string()));
    }

    let user = AuthService::new(state.store())
        .create_staff(
            body.name.as_deref().unwrap_or_default(),
            body.email.as_deref().unwrap_or_default(),
            body.password.as_deref().unwrap_or_default(),
            role,
        )
        .await?;
    tracing::info!(user_id = %user.id, role = %user.role, "Staff account created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Admin account created successfully", "user": user })),
    ))
}

pub async fn show(
    State(state): State<AppState>,
    RequireStaff(principal): RequireStaff,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    principal.require(Capability::ManageUsers)?;

    let user = load_user(&state, parse_id(&id, "user")?).await?;
    Ok(Json(json!({ "user": user })))
}

#[instrument(skip_all, fields(principal = principal.kind(), user_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    RequireStaff(principal): RequireStaff,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UserUpdateRequest>,
) -> Result<Json<Value>, AppError> {
    principal.require(Capability::ManageUsers)?;

    let mut user = load_user(&state, parse_id(&id, "user")?).await?;

    if let Some(role) = enum_field::<UserRole>(body.role.as_ref(), "Invalid role")? {
        if !may_change_role(&principal, &user, role) {
            return Err(AppError::Forbidden(
                "Only super admins can modify admin roles".to_string(),
            ));
        }
        if role != user.role {
            tracing::info!(user_id = %user.id, from = %user.role, to = %role, "Role changed");
        }
        user.role = role;
    }
    if let Some(club_member) = body.club_member {
        user.club_member = club_member;
    }
    if let Some(name) = body.name {
        let name = name.trim().to_string();
        validate_name(&name)?;
        user.name = name;
    }
    if let Some(phone) = body.phone {
        let phone = phone.trim().to_string();
        user.phone = (!phone.is_empty()).then_some(phone);
    }

    let user = state.store().update_user(&user).await?;
    Ok(Json(json!({ "message": "User updated successfully", "user": user })))
}

#[instrument(skip_all, fields(principal = principal.kind(), user_id = %id))]
pub async fn destroy(
    State(state): State<AppState>,
    RequireStaff(principal): RequireStaff,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    principal.require(Capability::ManageUsers)?;

    let user = load_user(&state, parse_id(&id, "user")?).await?;
    if principal.user_id() == Some(user.id) {
        return Err(AppError::BadRequest(
            "You cannot delete your own account".to_string(),
        ));
    }
    if user.role.is_admin_tier() && !principal.can(Capability::ManageAdminRoles) {
        return Err(AppError::Forbidden(
            "Only super admins can delete admin accounts".to_string(),
        ));
    }

    state.store().delete_user(user.id).await?;
    tracing::info!(user_id = %user.id, "User deleted");
    Ok(Json(json!({ "message": "User deleted successfully" })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use mypeteats_core::Email;

    use super::*;

    fn user(role: UserRole) -> User {
        let now = Utc::now();
        User {
            id: UserId::new(1),
            name: "Someone".to_string(),
            email: Email::parse("someone@mypeteats.in").unwrap(),
            password_hash: String::new(),
            role,
            phone: None,
            club_member: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_manager_may_promote_customer_to_staff_only() {
        let manager = Principal::User(user(UserRole::Manager));
        let customer = user(UserRole::Customer);
        assert!(may_change_role(&manager, &customer, UserRole::Staff));
        assert!(may_change_role(&manager, &customer, UserRole::Manager));
        assert!(!may_change_role(&manager, &customer, UserRole::Admin));
        assert!(!may_change_role(&manager, &user(UserRole::Staff), UserRole::Customer));
    }

    #[test]
    fn test_super_admin_may_change_any_role() {
        let super_admin = Principal::User(user(UserRole::SuperAdmin));
        assert!(may_change_role(&super_admin, &user(UserRole::Admin), UserRole::Customer));
        assert!(may_change_role(&super_admin, &user(UserRole::Customer), UserRole::SuperAdmin));
    }

    #[test]
    fn test_legacy_token_treated_like_manager() {
        let legacy = Principal::LegacyToken;
        assert!(may_change_role(&legacy, &user(UserRole::Customer), UserRole::Staff));
        assert!(!may_change_role(&legacy, &user(UserRole::Admin), UserRole::Customer));
    }
}
