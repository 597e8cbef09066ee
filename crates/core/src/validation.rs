//! Input validation for product fields.
//!
//! Each validator takes the raw JSON value a client sent (so that a string
//! where a number belongs gets a precise message instead of a generic parse
//! failure) and returns either the normalized value or a [`ValidationError`]
//! naming the offending field. Create and update paths call the same
//! functions.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use url::Url;

use crate::money::DEFAULT_CURRENCY;

/// Longest accepted product title, in characters.
pub const MAX_TITLE_LENGTH: usize = 200;
/// Largest accepted price, in minor units.
pub const MAX_PRICE_CENTS: i64 = 999_999_999;
/// Descriptions are cut to this many characters before escaping.
pub const MAX_DESCRIPTION_LENGTH: usize = 5000;

const DATA_URL_IMAGE_TYPES: &[&str] = &["png", "jpeg", "jpg", "webp"];

/// A rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Name of the offending field as clients spell it.
    pub field: &'static str,
    /// Human-readable reason, safe to show to clients.
    pub message: String,
}

impl ValidationError {
    /// Create an error for `field`.
    #[must_use]
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

type Result<T> = std::result::Result<T, ValidationError>;

/// Title: a string of 1 to 200 characters after trimming.
///
/// # Errors
///
/// Returns an error if the value is missing, not a string, blank, or too long.
pub fn validate_title(value: Option<&Value>) -> Result<String> {
    let Some(Value::String(raw)) = value else {
        return Err(ValidationError::new(
            "title",
            "Title is required and must be a string",
        ));
    };

    let title = raw.trim();
    if title.is_empty() {
        return Err(ValidationError::new("title", "Title cannot be empty"));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ValidationError::new(
            "title",
            format!("Title must not exceed {MAX_TITLE_LENGTH} characters"),
        ));
    }

    Ok(title.to_owned())
}

/// SKU: trimmed, uppercased, and limited to `A-Z`, `0-9` and `-`.
///
/// # Errors
///
/// Returns an error if the value is missing, blank, or has other characters.
pub fn validate_sku(value: Option<&Value>) -> Result<String> {
    let sku = match value {
        Some(Value::String(raw)) => raw.trim().to_uppercase(),
        _ => return Err(ValidationError::new("sku", "SKU is required")),
    };

    if sku.is_empty() {
        return Err(ValidationError::new("sku", "SKU is required"));
    }
    if !sku.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-') {
        return Err(ValidationError::new(
            "sku",
            "SKU must contain only uppercase letters, numbers, and hyphens",
        ));
    }

    Ok(sku)
}

/// Price in minor units: an integer from 0 to 999,999,999.
///
/// Numeric strings are accepted.
///
/// # Errors
///
/// Returns an error if the value is missing, not numeric, fractional,
/// negative, or above the maximum.
pub fn validate_price(value: Option<&Value>) -> Result<i64> {
    let number = match value {
        None | Some(Value::Null) => return Err(ValidationError::new("price_cents", "Price is required")),
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(ValidationError::new("price_cents", "Price is required"));
        }
        Some(other) => as_number(other)
            .ok_or_else(|| ValidationError::new("price_cents", "Price must be a number"))?,
    };

    let price = whole_number(number)
        .ok_or_else(|| ValidationError::new("price_cents", "Price must be an integer (cents)"))?;

    if price < 0 {
        return Err(ValidationError::new("price_cents", "Price must be non-negative"));
    }
    if price > MAX_PRICE_CENTS {
        return Err(ValidationError::new(
            "price_cents",
            "Price exceeds maximum allowed value",
        ));
    }

    Ok(price)
}

/// Inventory: a non-negative integer, 0 when absent.
///
/// # Errors
///
/// Returns an error if the value is not numeric, fractional, negative, or
/// does not fit in 32 bits.
pub fn validate_inventory(value: Option<&Value>) -> Result<i32> {
    let number = match value {
        None | Some(Value::Null) => return Ok(0),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(0),
        Some(other) => as_number(other)
            .ok_or_else(|| ValidationError::new("inventory", "Inventory must be a number"))?,
    };

    let inventory = whole_number(number)
        .ok_or_else(|| ValidationError::new("inventory", "Inventory must be an integer"))?;

    if inventory < 0 {
        return Err(ValidationError::new("inventory", "Inventory must be non-negative"));
    }

    i32::try_from(inventory)
        .map_err(|_| ValidationError::new("inventory", "Inventory exceeds maximum allowed value"))
}

/// Image reference: an http(s) URL, a relative path, or a base64 image data URL.
///
/// Relative paths (`/`, `./`, `../`) and data URLs are returned unchanged.
/// A bare host such as `cdn.example.com/a.png` gets `https://` prepended.
///
/// # Errors
///
/// Returns an error if the value is blank, a malformed data URL, not
/// parseable, or uses a scheme other than http or https.
pub fn validate_image_url(raw: &str) -> Result<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ValidationError::new("images", "Image URL cannot be empty"));
    }

    if value.starts_with('/') || value.starts_with("./") || value.starts_with("../") {
        return Ok(value.to_owned());
    }

    if let Some(rest) = value.strip_prefix("data:") {
        return if is_base64_image(rest) {
            Ok(value.to_owned())
        } else {
            Err(ValidationError::new("images", "Invalid data URL format"))
        };
    }

    let candidate = if value.contains("://") {
        value.to_owned()
    } else {
        format!("https://{value}")
    };

    let url = Url::parse(&candidate)
        .map_err(|_| ValidationError::new("images", "Invalid URL format"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::new(
            "images",
            "URL must use http or https protocol",
        ));
    }

    Ok(url.to_string())
}

/// Image list: an array of strings, each passing [`validate_image_url`].
/// Absent means no images.
///
/// # Errors
///
/// Returns an error if the value is not an array of strings, naming the
/// index of the first bad entry.
pub fn validate_images(value: Option<&Value>) -> Result<Vec<String>> {
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(ValidationError::new("images", "Images must be an array")),
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let Value::String(raw) = item else {
                return Err(ValidationError::new(
                    "images",
                    format!("Image at index {index} must be a string"),
                ));
            };
            validate_image_url(raw).map_err(|e| {
                ValidationError::new("images", format!("Invalid image URL at index {index}: {e}"))
            })
        })
        .collect()
}

/// Categories: an array of strings, trimmed, with blank entries dropped.
///
/// # Errors
///
/// Returns an error if the value is not an array or holds a non-string.
pub fn validate_categories(value: Option<&Value>) -> Result<Vec<String>> {
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(ValidationError::new(
                "categories",
                "Categories must be an array",
            ));
        }
    };

    let mut categories = Vec::with_capacity(items.len());
    for item in items {
        let Value::String(raw) = item else {
            return Err(ValidationError::new(
                "categories",
                "Each category must be a string",
            ));
        };
        let category = raw.trim();
        if !category.is_empty() {
            categories.push(category.to_owned());
        }
    }
    Ok(categories)
}

/// Currency: a three-letter code, uppercased. Blank means the default.
///
/// # Errors
///
/// Returns an error if the trimmed value is not three ASCII letters.
pub fn normalize_currency(value: Option<&str>) -> Result<String> {
    let code = value.map(str::trim).unwrap_or_default();
    if code.is_empty() {
        return Ok(DEFAULT_CURRENCY.to_owned());
    }
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::new(
            "currency",
            "Currency must be a 3-letter code",
        ));
    }
    Ok(code.to_ascii_uppercase())
}

/// Cut a description to 5000 characters and HTML-escape it.
#[must_use]
pub fn sanitize_description(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(MAX_DESCRIPTION_LENGTH));
    for c in raw.chars().take(MAX_DESCRIPTION_LENGTH) {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

// =============================================================================
// Helpers
// =============================================================================

/// Interpret a JSON number or numeric string as `f64`.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// The value as `i64` if it has no fractional part and fits.
#[allow(clippy::cast_possible_truncation)] // range checked before the cast
fn whole_number(n: f64) -> Option<i64> {
    const LIMIT: f64 = 9_007_199_254_740_992.0; // 2^53, exact in f64
    (n.fract() == 0.0 && n.abs() <= LIMIT).then_some(n as i64)
}

/// Whether the part after `data:` is `image/<png|jpeg|jpg|webp>;base64,<payload>`
/// with a payload that decodes.
fn is_base64_image(rest: &str) -> bool {
    let Some((media, payload)) = rest.split_once(',') else {
        return false;
    };
    let Some(subtype) = media
        .strip_prefix("image/")
        .and_then(|m| m.strip_suffix(";base64"))
    else {
        return false;
    };

    DATA_URL_IMAGE_TYPES.contains(&subtype.to_ascii_lowercase().as_str())
        && !payload.is_empty()
        && BASE64.decode(payload).is_ok()
}
