//! Price representation in minor currency units.
//!
//! The storefront AJAX endpoints report prices as integer cents
//! (`/products/{handle}.js`, `/cart.js`) while the collection listing JSON
//! reports decimal strings (`"19.99"`). [`Cents`] deserializes both.
//!
//! Display uses a single convention, `$12.34`. There is no locale or currency
//! awareness.

use core::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// An amount in minor currency units (e.g., cents for USD).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Cents(u64);

impl Cents {
    /// Create a new amount from minor units.
    #[must_use]
    pub const fn new(cents: u64) -> Self {
        Self(cents)
    }

    /// Get the amount in minor units.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Convert to a decimal amount in major units (e.g., dollars).
    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        Decimal::from(self.0) / Decimal::ONE_HUNDRED
    }

    /// Parse a decimal amount in major units (`"19.99"`) into cents.
    ///
    /// Fractions of a cent are rounded half away from zero. Negative amounts
    /// are rejected.
    #[must_use]
    pub fn from_decimal_str(s: &str) -> Option<Self> {
        let amount: Decimal = s.trim().parse().ok()?;
        if amount.is_sign_negative() {
            return None;
        }
        let cents = (amount * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
        cents.to_u64().map(Self)
    }

    /// Format for display (e.g., `$19.99`).
    #[must_use]
    pub fn display(&self) -> String {
        format!("${:.2}", self.to_decimal())
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl From<u64> for Cents {
    fn from(cents: u64) -> Self {
        Self(cents)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPrice {
    Cents(u64),
    Decimal(String),
}

impl<'de> Deserialize<'de> for Cents {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match RawPrice::deserialize(deserializer)? {
            RawPrice::Cents(cents) => Ok(Self(cents)),
            RawPrice::Decimal(s) => Self::from_decimal_str(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid price: {s:?}"))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display() {
        assert_eq!(Cents::new(1999).display(), "$19.99");
        assert_eq!(Cents::new(5).display(), "$0.05");
        assert_eq!(Cents::new(0).display(), "$0.00");
        assert_eq!(Cents::new(120_000).to_string(), "$1200.00");
    }

    #[test]
    fn test_deserialize_integer_cents() {
        let price: Cents = serde_json::from_value(json!(2500)).unwrap();
        assert_eq!(price, Cents::new(2500));
    }

    #[test]
    fn test_deserialize_decimal_string() {
        let price: Cents = serde_json::from_value(json!("19.99")).unwrap();
        assert_eq!(price, Cents::new(1999));

        let price: Cents = serde_json::from_value(json!("7")).unwrap();
        assert_eq!(price, Cents::new(700));
    }

    #[test]
    fn test_deserialize_rejects_invalid() {
        assert!(serde_json::from_value::<Cents>(json!("free")).is_err());
        assert!(serde_json::from_value::<Cents>(json!("-1.00")).is_err());
    }

    #[test]
    fn test_from_decimal_str_rounds() {
        assert_eq!(Cents::from_decimal_str("0.125"), Some(Cents::new(13)));
        assert_eq!(Cents::from_decimal_str(" 10.10 "), Some(Cents::new(1010)));
    }
}
