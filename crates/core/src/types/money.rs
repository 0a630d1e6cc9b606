//! Monetary amounts using decimal arithmetic.
//!
//! All ledger money passes through [`Price`]. Amounts are stored in the
//! currency's standard unit (dollars, not cents) as [`Decimal`] to avoid
//! floating-point drift in promotion/discount arithmetic.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A monetary amount with its currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    /// A zero amount in the given currency.
    #[must_use]
    pub const fn zero(currency: CurrencyCode) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Whether the amount is strictly greater than zero.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// Subtract `deduction`, clamping at zero instead of going negative.
    #[must_use]
    pub fn saturating_sub(&self, deduction: Decimal) -> Self {
        let amount = (self.amount - deduction).max(Decimal::ZERO);
        Self {
            amount,
            currency: self.currency,
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.amount, self.currency)
    }
}

/// ISO 4217 currency codes supported by Shopify billing for this app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    /// The ISO 4217 code as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown currency code.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported currency code: {0}")]
pub struct UnknownCurrency(pub String);

impl std::str::FromStr for CurrencyCode {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            "CAD" => Ok(Self::CAD),
            "AUD" => Ok(Self::AUD),
            other => Err(UnknownCurrency(other.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_saturating_sub_clamps_at_zero() {
        let price = Price::new(Decimal::new(1000, 2), CurrencyCode::USD); // 10.00
        let discounted = price.saturating_sub(Decimal::new(2500, 2)); // -25.00
        assert_eq!(discounted.amount, Decimal::ZERO);
    }

    #[test]
    fn test_saturating_sub_normal_case() {
        let price = Price::new(Decimal::new(1000, 2), CurrencyCode::USD);
        let discounted = price.saturating_sub(Decimal::new(250, 2));
        assert_eq!(discounted.amount, Decimal::new(750, 2));
    }

    #[test]
    fn test_display_two_decimal_places() {
        let price = Price::new(Decimal::new(95, 1), CurrencyCode::EUR); // 9.5
        assert_eq!(price.to_string(), "9.50 EUR");
    }

    #[test]
    fn test_currency_roundtrip() {
        for code in ["USD", "EUR", "GBP", "CAD", "AUD"] {
            let parsed: CurrencyCode = code.parse().unwrap();
            assert_eq!(parsed.as_str(), code);
        }
        assert!("XYZ".parse::<CurrencyCode>().is_err());
    }

    #[test]
    fn test_is_positive() {
        assert!(Price::new(Decimal::ONE, CurrencyCode::USD).is_positive());
        assert!(!Price::zero(CurrencyCode::USD).is_positive());
    }
}
