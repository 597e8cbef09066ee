//! Role and status enums for users, orders and payments.
//!
//! Each enum stores as a Postgres enum type (with the `postgres` feature) and
//! serializes as `snake_case`, matching the values clients send and receive.

use serde::{Deserialize, Serialize};

/// Error returned when parsing one of the enums in this module from a string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

impl ParseStatusError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

/// Generates `Display`, `FromStr` and an `ALL` listing for a unit-variant enum.
macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Returns the wire representation.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ParseStatusError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ParseStatusError::new($kind, s)),
                }
            }
        }
    };
}

// =============================================================================
// Users
// =============================================================================

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Customer,
    Staff,
    Manager,
    Admin,
    SuperAdmin,
}

string_enum!(UserRole, "user role", {
    Customer => "customer",
    Staff => "staff",
    Manager => "manager",
    Admin => "admin",
    SuperAdmin => "super_admin",
});

/// An action guarded by role.
///
/// Handlers ask for a capability instead of checking role names, so the
/// mapping from role to permitted actions lives in [`UserRole::can`] only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Pass the admin gate at all.
    AccessAdmin,
    /// Create, edit and delete products.
    ManageCatalog,
    /// View and update any customer's orders.
    ManageOrders,
    /// View and update user accounts.
    ManageUsers,
    /// Create staff accounts and grant or revoke admin-tier roles.
    ManageAdminRoles,
    /// Read the dashboard aggregates.
    ViewStats,
    /// Upload product images.
    UploadMedia,
}

impl UserRole {
    /// Roles that may be assigned when creating a back-office account.
    pub const STAFF_ASSIGNABLE: &'static [Self] = &[Self::Staff, Self::Manager, Self::Admin];

    /// Whether this role grants the capability.
    #[must_use]
    pub const fn can(self, capability: Capability) -> bool {
        use Capability as C;

        match self {
            Self::Customer => false,
            Self::Staff => matches!(
                capability,
                C::AccessAdmin | C::ManageCatalog | C::ManageOrders | C::ViewStats | C::UploadMedia
            ),
            Self::Manager | Self::Admin => !matches!(capability, C::ManageAdminRoles),
            Self::SuperAdmin => true,
        }
    }

    /// Admin and super admin, the roles only a super admin may grant.
    #[must_use]
    pub const fn is_admin_tier(self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }

    /// Any role that may sign in to the back office.
    #[must_use]
    pub const fn is_staff(self) -> bool {
        self.can(Capability::AccessAdmin)
    }
}

// =============================================================================
// Orders
// =============================================================================

/// Fulfilment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

string_enum!(OrderStatus, "order status", {
    Pending => "pending",
    Confirmed => "confirmed",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

/// Payment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Refunded,
}

string_enum!(PaymentStatus, "payment status", {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Refunded => "refunded",
});

/// How the customer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_method", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Card,
    CashOnDelivery,
    Upi,
    Netbanking,
    Razorpay,
}

string_enum!(PaymentMethod, "payment method", {
    Card => "card",
    CashOnDelivery => "cash_on_delivery",
    Upi => "upi",
    Netbanking => "netbanking",
    Razorpay => "razorpay",
});

impl PaymentMethod {
    /// Whether payment for this method is collected through the hosted
    /// gateway widget, so stock is committed only once payment is confirmed.
    #[must_use]
    pub const fn uses_gateway(self) -> bool {
        matches!(self, Self::Razorpay)
    }
}
