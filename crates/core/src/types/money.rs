//! Money amounts stored in minor units (paise, cents).
//!
//! Prices and totals travel through the system as `i64` minor units. This
//! module turns them into major-unit decimals and display strings for the
//! dashboard.

use core::fmt;

use rust_decimal::Decimal;

/// Currency used when a product or order does not name one.
pub const DEFAULT_CURRENCY: &str = "INR";

/// An amount in minor units together with its ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Money {
    minor_units: i64,
    currency: String,
}

impl Money {
    /// Create an amount from minor units.
    #[must_use]
    pub fn new(minor_units: i64, currency: &str) -> Self {
        Self {
            minor_units,
            currency: currency.to_ascii_uppercase(),
        }
    }

    /// Create an amount in the default currency.
    #[must_use]
    pub fn inr(minor_units: i64) -> Self {
        Self::new(minor_units, DEFAULT_CURRENCY)
    }

    /// Amount in minor units.
    #[must_use]
    pub const fn minor_units(&self) -> i64 {
        self.minor_units
    }

    /// Amount in major units (e.g. rupees), exact to two decimal places.
    #[must_use]
    pub fn amount(&self) -> Decimal {
        Decimal::new(self.minor_units, 2)
    }

    /// ISO 4217 currency code.
    #[must_use]
    pub fn currency(&self) -> &str {
        &self.currency
    }

    fn symbol(&self) -> Option<&'static str> {
        match self.currency.as_str() {
            "INR" => Some("₹"),
            "USD" | "CAD" | "AUD" => Some("$"),
            "EUR" => Some("€"),
            "GBP" => Some("£"),
            _ => None,
        }
    }
}

/// Formats like a receipt: symbol, grouped whole units, and paise only when
/// non-zero. INR uses lakh grouping (`₹12,34,567`), everything else groups
/// by thousands.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let abs = self.minor_units.unsigned_abs();
        let whole = (abs / 100).to_string();
        let fraction = abs % 100;

        let grouped = if self.currency == "INR" {
            group_indian(&whole)
        } else {
            group_thousands(&whole)
        };

        if self.minor_units < 0 {
            f.write_str("-")?;
        }
        match self.symbol() {
            Some(symbol) => write!(f, "{symbol}{grouped}")?,
            None => write!(f, "{} {grouped}", self.currency)?,
        }
        if fraction != 0 {
            write!(f, ".{fraction:02}")?;
        }
        Ok(())
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn group_indian(digits: &str) -> String {
    if digits.len() <= 3 {
        return digits.to_owned();
    }
    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut out = String::with_capacity(digits.len() + digits.len() / 2);
    for (i, c) in head.chars().enumerate() {
        if i > 0 && (head.len() - i) % 2 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out.push(',');
    out.push_str(tail);
    out
}
