//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Registration, login and password changes (argon2)
//! - `cart` - In-memory carts with live product enrichment
//! - `catalog` - Admin product create/update with slug management
//! - `checkout` - Cart to order, with stock taken per payment method
//! - `payments` - Gateway client, signature checks, payment confirmation
//! - `rate_limit` - Fixed-window admin request cap and lockout tracker
//! - `stats` - Dashboard figures
//! - `uploads` - Product image uploads
//!
//! Services borrow what they need (`&dyn Store`, `&CartStore`) and are
//! constructed per request from [`crate::state::AppState`].

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod payments;
pub mod rate_limit;
pub mod stats;
pub mod uploads;
