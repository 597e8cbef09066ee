//! Core types for MyPetEats.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{DEFAULT_CURRENCY, Money};
pub use status::*;
