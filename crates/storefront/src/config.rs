//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MYPETEATS_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `MYPETEATS_BASE_URL` - Public URL for the storefront
//! - `MYPETEATS_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `MYPETEATS_HOST` - Bind address (default: 127.0.0.1)
//! - `MYPETEATS_PORT` - Listen port (default: 3000)
//! - `MYPETEATS_ENV` - `production` or `development` (default: development)
//! - `MYPETEATS_ADMIN_TOKEN` - Legacy static token for admin endpoints
//! - `MYPETEATS_UPLOADS_DIR` - Upload root directory (default: public/uploads)
//! - `MYPETEATS_ADMIN_RATE_LIMIT` - Admin requests per IP per minute (default: 10)
//! - `MYPETEATS_CART_IDLE_DAYS` - Days of inactivity before a cart expires (default: 7)
//! - `RAZORPAY_KEY_ID` / `RAZORPAY_KEY_SECRET` - Payment gateway credentials
//! - `RAZORPAY_WEBHOOK_SECRET` - Payment webhook signing secret
//! - `RAZORPAY_API_BASE` - Gateway API base URL (default: <https://api.razorpay.com>)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate, 0.0-1.0 (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate, 0.0-1.0 (default: 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" | "test" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Deployment environment
    pub environment: Environment,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Legacy shared token accepted by the admin gate
    pub admin_token: Option<SecretString>,
    /// Payment gateway settings, absent when the gateway is not configured
    pub razorpay: Option<RazorpayConfig>,
    /// Directory uploaded images are written to
    pub uploads_dir: PathBuf,
    /// Admin requests allowed per client IP per minute
    pub admin_rate_limit: u32,
    /// Carts untouched for this long are dropped
    pub cart_idle_timeout: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate
    pub sentry_sample_rate: f32,
    /// Sentry transaction sample rate
    pub sentry_traces_sample_rate: f32,
}

/// Razorpay payment gateway configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct RazorpayConfig {
    /// Publishable key id, returned to clients for the checkout widget
    pub key_id: String,
    /// API key secret, also used to sign payment confirmations
    pub key_secret: SecretString,
    /// Webhook signing secret
    pub webhook_secret: Option<SecretString>,
    /// API base URL
    pub api_base: String,
}

impl std::fmt::Debug for RazorpayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayConfig")
            .field("key_id", &self.key_id)
            .field("key_secret", &"[REDACTED]")
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("MYPETEATS_DATABASE_URL")?;
        let host = parse_env("MYPETEATS_HOST", "127.0.0.1")?;
        let port = parse_env("MYPETEATS_PORT", "3000")?;
        let base_url = get_required_env("MYPETEATS_BASE_URL")?;
        let environment = parse_env("MYPETEATS_ENV", "development")?;
        let session_secret = get_validated_secret("MYPETEATS_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "MYPETEATS_SESSION_SECRET")?;

        let admin_token = get_optional_env("MYPETEATS_ADMIN_TOKEN")
            .map(|token| {
                validate_secret_strength(&token, "MYPETEATS_ADMIN_TOKEN")?;
                Ok::<_, ConfigError>(SecretString::from(token))
            })
            .transpose()?;

        let razorpay = RazorpayConfig::from_env()?;
        let uploads_dir = PathBuf::from(get_env_or_default("MYPETEATS_UPLOADS_DIR", "public/uploads"));
        let admin_rate_limit = parse_env("MYPETEATS_ADMIN_RATE_LIMIT", "10")?;
        let cart_idle_days: u64 = parse_env("MYPETEATS_CART_IDLE_DAYS", "7")?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            environment,
            session_secret,
            admin_token,
            razorpay,
            uploads_dir,
            admin_rate_limit,
            cart_idle_timeout: Duration::from_secs(cart_idle_days * 24 * 60 * 60),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether this is a production deployment.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn uses_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl RazorpayConfig {
    /// Gateway settings, or `None` when the key pair is not set.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let (Some(key_id), Some(key_secret)) = (
            get_optional_env("RAZORPAY_KEY_ID"),
            get_optional_env("RAZORPAY_KEY_SECRET"),
        ) else {
            return Ok(None);
        };

        let api_base = get_env_or_default("RAZORPAY_API_BASE", "https://api.razorpay.com");
        url::Url::parse(&api_base)
            .map_err(|e| ConfigError::InvalidEnvVar("RAZORPAY_API_BASE".to_string(), e.to_string()))?;

        Ok(Some(Self {
            key_id,
            key_secret: SecretString::from(key_secret),
            webhook_secret: get_optional_env("RAZORPAY_WEBHOOK_SECRET").map(SecretString::from),
            api_base: api_base.trim_end_matches('/').to_string(),
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable, treating blank values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
