//! Session authentication extractors.
//!
//! The session holds only a [`CurrentUser`] id. Extractors reload the account
//! on every request so role changes and deletions apply immediately.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;
use uuid::Uuid;

use crate::db::Store;
use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::models::{CurrentUser, User, session_keys};
use crate::services::cart::CartKey;
use crate::state::AppState;

/// The session attached by `SessionManagerLayer`.
///
/// # Errors
///
/// Returns `AppError::Internal` when the session layer is missing.
pub fn session_from_parts(parts: &Parts) -> Result<Session, AppError> {
    parts
        .extensions
        .get::<Session>()
        .cloned()
        .ok_or_else(|| AppError::Internal("session layer not installed".to_string()))
}

/// Load the signed-in user, if any.
///
/// A session pointing at a deleted account is cleared.
///
/// # Errors
///
/// Returns an error if the session or store fails.
pub async fn session_user(session: &Session, store: &dyn Store) -> Result<Option<User>, AppError> {
    let Some(current) = session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await?
    else {
        return Ok(None);
    };

    let user = store.user_by_id(current.id).await?;
    if user.is_none() {
        tracing::debug!(user_id = %current.id, "Session user no longer exists");
        session
            .remove::<CurrentUser>(session_keys::CURRENT_USER)
            .await?;
    }
    Ok(user)
}

/// Extractor that requires a signed-in user. Rejects with 401.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(RequireUser(user): RequireUser) -> impl IntoResponse {
///     format!("Hello, {}!", user.name)
/// }
/// ```
pub struct RequireUser(pub User);

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = session_from_parts(parts)?;
        session_user(&session, state.store())
            .await?
            .map(Self)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

/// Extractor that optionally gets the signed-in user.
pub struct OptionalUser(pub Option<User>);

impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = session_from_parts(parts)?;
        Ok(Self(session_user(&session, state.store()).await?))
    }
}

/// The cart this request operates on: the user's when signed in, otherwise
/// one tied to a random token kept in the visitor's session.
pub struct CurrentCart(pub CartKey);

impl FromRequestParts<AppState> for CurrentCart {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = session_from_parts(parts)?;
        if let Some(user) = session_user(&session, state.store()).await? {
            return Ok(Self(CartKey::user(user.id)));
        }

        let token = match session.get::<String>(session_keys::CART_TOKEN).await? {
            Some(token) => token,
            None => {
                let token = Uuid::new_v4().to_string();
                session.insert(session_keys::CART_TOKEN, &token).await?;
                token
            }
        };
        Ok(Self(CartKey::session(&token)))
    }
}

/// Sign `user` in, rotating the session id.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn log_in(session: &Session, user: &User) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session
        .insert(session_keys::CURRENT_USER, CurrentUser { id: user.id })
        .await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    Ok(())
}

/// Sign out by discarding the whole session.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn log_out(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await?;
    clear_sentry_user();
    Ok(())
}
