//! Session-related types.
//!
//! Types stored in the session for authentication state.

use serde::{Deserialize, Serialize};

use mypeteats_core::UserId;

/// Session-stored user identity.
///
/// Only the id is kept: the account (and its current role) is reloaded on
/// every request, so a demotion takes effect immediately.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
}

/// Session keys.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the anonymous visitor's cart token.
    pub const CART_TOKEN: &str = "cart_token";
}
