//! Account route handlers: registration, login, logout and the profile.

use axum::{Json, Router, extract::State, http::StatusCode, routing::{get, post, put}};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, JsonBody};
use crate::middleware::{OptionalUser, RequireUser, auth_rate_limiter, log_in, log_out};
use crate::services::auth::{AuthService, ProfileUpdate, Registration};
use crate::state::AppState;

/// Build the account router.
///
/// Login and registration share a per-IP token bucket.
pub fn router() -> Router<AppState> {
    let limited = Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .layer(auth_rate_limiter());

    Router::new()
        .merge(limited)
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/api/profile", put(update_profile))
        .route("/api/profile/password", post(change_password))
        .route("/api/club/join", post(join_club))
}

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub join_club: Option<bool>,
}

/// Either `email` or `username` identifies the account.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Register a customer and sign them in.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    JsonBody(body): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let user = AuthService::new(state.store())
        .register(Registration {
            name: body.name,
            email: body.email.unwrap_or_default(),
            password: body.password.unwrap_or_default(),
            join_club: body.join_club == Some(true),
        })
        .await?;
    log_in(&session, &user).await?;

    tracing::info!(user_id = %user.id, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Registration successful", "user": user })),
    ))
}

/// Sign in with an email address or display name.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    JsonBody(body): JsonBody<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    let identifier = body.email.or(body.username).unwrap_or_default();
    let user = AuthService::new(state.store())
        .login(&identifier, &body.password.unwrap_or_default())
        .await?;
    log_in(&session, &user).await?;

    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(json!({ "message": "Login successful", "user": user })))
}

pub async fn logout(session: Session) -> Result<Json<Value>, AppError> {
    log_out(&session).await?;
    Ok(Json(json!({ "success": true })))
}

/// The signed-in user, or `null`.
pub async fn me(OptionalUser(user): OptionalUser) -> Json<Value> {
    Json(json!({ "user": user }))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    JsonBody(body): JsonBody<ProfileRequest>,
) -> Result<Json<Value>, AppError> {
    let user = AuthService::new(state.store())
        .update_profile(
            &user,
            ProfileUpdate {
                name: body.name,
                email: body.email,
                phone: body.phone,
            },
        )
        .await?;
    Ok(Json(json!({ "success": true, "user": user })))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn change_password(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    JsonBody(body): JsonBody<ChangePasswordRequest>,
) -> Result<Json<Value>, AppError> {
    AuthService::new(state.store())
        .change_password(
            &user,
            &body.current_password.unwrap_or_default(),
            &body.new_password.unwrap_or_default(),
        )
        .await?;
    Ok(Json(
        json!({ "success": true, "message": "Password changed successfully" }),
    ))
}

/// Join the loyalty club. Joining twice is a no-op.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn join_club(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Value>, AppError> {
    match AuthService::new(state.store()).join_club(&user).await? {
        Some(user) => Ok(Json(json!({
            "success": true,
            "message": "Successfully joined MyPetEats Club",
            "user": user,
        }))),
        None => Ok(Json(json!({
            "success": true,
            "message": "You are already a member",
            "user": user,
        }))),
    }
}
