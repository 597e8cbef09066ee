//! HTTP middleware stack for the storefront API.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (hub per request, capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Security headers (JSON API lockdown, HSTS)
//! 5. Session layer (tower-sessions, signed cookie)
//! 6. Rate limiting (governor on login and registration)
//!
//! Authentication is done by extractors rather than layers: [`RequireUser`],
//! [`OptionalUser`] and [`CurrentCart`] for customers, [`RequireStaff`] for
//! the admin gate.

pub mod admin;
pub mod auth;
pub mod client_ip;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use admin::{Principal, RequireStaff};
pub use auth::{CurrentCart, OptionalUser, RequireUser, log_in, log_out};
pub use client_ip::ClientIp;
pub use rate_limit::auth_rate_limiter;
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;
