//! User accounts.

use chrono::{DateTime, Utc};
use serde::Serialize;

use mypeteats_core::{Email, UserId, UserRole};

/// A registered account, customer or staff.
///
/// The password hash never leaves the server: it is skipped when the user is
/// serialized into a response.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub club_member: bool,
    #[serde(rename = "created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updated_at")]
    pub updated_at: DateTime<Utc>,
}

/// Fields for a user about to be inserted.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: Email,
    pub password_hash: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub club_member: bool,
}

/// Filters for the back-office user list.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub club_member: Option<bool>,
    /// Case-insensitive substring of name or email.
    pub search: Option<String>,
}

/// Account totals for the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCounts {
    pub total: i64,
    /// Accounts with any back-office role.
    pub admins: i64,
    pub customers: i64,
    pub club_members: i64,
}
