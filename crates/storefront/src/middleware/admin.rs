//! Admin gate for `/api/admin/*`.
//!
//! A request passes the gate in three steps:
//!
//! 1. In production, a request carrying an `Origin` that does not name the
//!    request's own host is refused outright.
//! 2. The [`AdminAuthStrategy`] chain runs in order until one strategy
//!    authenticates or rejects. Staff signed in through the normal session
//!    come first; the legacy shared token in `x-admin-token` comes second and
//!    is subject to per-IP lockout after repeated failures.
//! 3. The per-IP admin request cap is charged.
//!
//! Handlers then ask the resulting [`Principal`] for the [`Capability`] they
//! need.

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{
        HeaderMap,
        header::{HOST, ORIGIN},
        request::Parts,
    },
};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha256;
use tower_sessions::Session;

use mypeteats_core::{Capability, UserId};

use super::auth::{session_from_parts, session_user};
use super::client_ip::ClientIp;
use crate::error::AppError;
use crate::models::User;
use crate::state::AppState;

/// Header carrying the legacy shared admin token.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Who passed the admin gate.
#[derive(Debug, Clone)]
pub enum Principal {
    /// A signed-in staff account.
    User(User),
    /// A caller presenting the shared admin token.
    LegacyToken,
}

impl Principal {
    /// Whether this principal may perform `capability`.
    #[must_use]
    pub const fn can(&self, capability: Capability) -> bool {
        match self {
            Self::User(user) => user.role.can(capability),
            Self::LegacyToken => !matches!(capability, Capability::ManageAdminRoles),
        }
    }

    /// Require `capability`, rejecting with 403 otherwise.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` if the capability is not granted.
    pub fn require(&self, capability: Capability) -> Result<(), AppError> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Forbidden: insufficient permissions".to_string(),
            ))
        }
    }

    /// The account behind this principal, if any.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::User(user) => Some(user.id),
            Self::LegacyToken => None,
        }
    }

    /// Short label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "session",
            Self::LegacyToken => "legacy_token",
        }
    }
}

/// What the gate knows about the request.
pub struct GateRequest<'a> {
    pub headers: &'a HeaderMap,
    pub session: &'a Session,
    pub client: &'a ClientIp,
    pub state: &'a AppState,
}

/// Result of one strategy.
pub enum StrategyOutcome {
    Authenticated(Principal),
    /// This strategy has nothing to say; try the next one.
    NotApplicable,
    Rejected(AppError),
}

/// One way of authenticating an admin request.
#[async_trait]
pub trait AdminAuthStrategy: Send + Sync {
    async fn authenticate(&self, request: &GateRequest<'_>) -> StrategyOutcome;
}

/// Staff signed in with their own account.
pub struct SessionUserStrategy;

#[async_trait]
impl AdminAuthStrategy for SessionUserStrategy {
    async fn authenticate(&self, request: &GateRequest<'_>) -> StrategyOutcome {
        let user = match session_user(request.session, request.state.store()).await {
            Ok(user) => user,
            Err(e) => return StrategyOutcome::Rejected(e),
        };
        match user {
            Some(user) if user.role.can(Capability::AccessAdmin) => {
                request
                    .state
                    .failed_admin_auth()
                    .clear(request.client.as_str())
                    .await;
                StrategyOutcome::Authenticated(Principal::User(user))
            }
            _ => StrategyOutcome::NotApplicable,
        }
    }
}

/// The shared token from `x-admin-token`, with lockout after repeated
/// failures from one client.
pub struct LegacyTokenStrategy;

#[async_trait]
impl AdminAuthStrategy for LegacyTokenStrategy {
    async fn authenticate(&self, request: &GateRequest<'_>) -> StrategyOutcome {
        let client = request.client.as_str();
        let tracker = request.state.failed_admin_auth();

        if let Some(reset_at) = tracker.locked_until(client).await {
            return StrategyOutcome::Rejected(AppError::rate_limited(
                "Too many failed authentication attempts. Please try again later.",
                reset_at,
            ));
        }

        let Some(presented) = request
            .headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
        else {
            tracker.record_failure(client).await;
            return StrategyOutcome::Rejected(AppError::Unauthorized(
                "Admin token required".to_string(),
            ));
        };

        let matches = request
            .state
            .config()
            .admin_token
            .as_ref()
            .is_some_and(|expected| tokens_match(expected.expose_secret(), presented));
        if !matches {
            let failures = tracker.record_failure(client).await;
            tracing::warn!(client, failures, "Invalid admin token");
            return StrategyOutcome::Rejected(AppError::Unauthorized(
                "Invalid admin token".to_string(),
            ));
        }

        tracker.clear(client).await;
        StrategyOutcome::Authenticated(Principal::LegacyToken)
    }
}

/// Strategies in the order they are tried.
const STRATEGIES: &[&dyn AdminAuthStrategy] = &[&SessionUserStrategy, &LegacyTokenStrategy];

/// Compare tokens in constant time by comparing their MACs.
fn tokens_match(expected: &str, presented: &str) -> bool {
    const LABEL: &[u8] = b"mypeteats-admin-token";

    let Ok(mut expected_mac) = Hmac::<Sha256>::new_from_slice(LABEL) else {
        return false;
    };
    expected_mac.update(expected.as_bytes());
    let expected_tag = expected_mac.finalize().into_bytes();

    let Ok(mut presented_mac) = Hmac::<Sha256>::new_from_slice(LABEL) else {
        return false;
    };
    presented_mac.update(presented.as_bytes());
    presented_mac.verify_slice(&expected_tag).is_ok()
}

/// Whether the request's `Origin`, if any, names the request's host.
fn same_origin(headers: &HeaderMap) -> bool {
    let Some(origin) = headers.get(ORIGIN).and_then(|v| v.to_str().ok()) else {
        return true;
    };
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    origin.contains(host)
}

/// Extractor that runs the admin gate.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(RequireStaff(principal): RequireStaff) -> Result<impl IntoResponse, AppError> {
///     principal.require(Capability::ManageCatalog)?;
///     // ...
/// }
/// ```
pub struct RequireStaff(pub Principal);

impl FromRequestParts<AppState> for RequireStaff {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if state.config().is_production() && !same_origin(&parts.headers) {
            return Err(AppError::Forbidden(
                "Forbidden: Admin endpoints are same-origin only".to_string(),
            ));
        }

        let client = ClientIp::from_request_parts(parts, state)
            .await
            .unwrap_or_else(|never| match never {});
        let session = session_from_parts(parts)?;
        let request = GateRequest {
            headers: &parts.headers,
            session: &session,
            client: &client,
            state,
        };

        let mut principal = None;
        for strategy in STRATEGIES {
            match strategy.authenticate(&request).await {
                StrategyOutcome::Authenticated(p) => {
                    principal = Some(p);
                    break;
                }
                StrategyOutcome::NotApplicable => {}
                StrategyOutcome::Rejected(e) => return Err(e),
            }
        }
        let Some(principal) = principal else {
            return Err(AppError::Unauthorized("Authentication required".to_string()));
        };

        if let Err(reset_at) = state.admin_limiter().check(client.as_str()).await {
            return Err(AppError::rate_limited("Too many requests", reset_at));
        }

        tracing::debug!(client = %client, principal = principal.kind(), "Admin request authorized");
        Ok(Self(principal))
    }
}
