//! MyPetEats Core - Shared domain types.
//!
//! This crate provides the types and rules shared by the storefront service
//! and its tests:
//! - [`types`] - Typed IDs, emails, money, roles and order/payment statuses
//! - [`slug`] - URL slugs derived from product titles
//! - [`validation`] - Input checks for product fields
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients. Postgres encoding for the enums and IDs
//! is available behind the `postgres` feature.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod slug;
pub mod types;
pub mod validation;

pub use types::*;
pub use validation::ValidationError;
