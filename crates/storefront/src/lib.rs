//! MyPetEats storefront library.
//!
//! The JSON API behind the shop and its back office: accounts, catalog,
//! carts, checkout with cash on delivery or the Razorpay gateway, and the
//! admin endpoints. The binary in `main.rs` wires it to Postgres; tests use
//! the in-memory store.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
