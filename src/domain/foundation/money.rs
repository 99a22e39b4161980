//! Money as integer minor units.
//!
//! Amounts never pass through floating point. Providers also speak minor
//! units, so the adapter boundary only has to agree on the currency code
//! spelling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ValidationError;

/// ISO 4217 alphabetic currency code, stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parses a three-letter code in either case.
    pub fn new(code: impl AsRef<str>) -> Result<Self, ValidationError> {
        let code = code.as_ref().trim();
        if code.is_empty() {
            return Err(ValidationError::empty_field("currency"));
        }
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::invalid_format(
                "currency",
                format!("expected a three-letter ISO 4217 code, got '{}'", code),
            ));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// Upper-case code, e.g. `USD`.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Lower-case spelling used on provider wire formats.
    pub fn to_provider_code(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// A non-negative amount in the currency's smallest unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount_minor: i64,
    currency: Currency,
}

impl Money {
    /// Creates an amount, rejecting negative values.
    pub fn new(amount_minor: i64, currency: Currency) -> Result<Self, ValidationError> {
        if amount_minor < 0 {
            return Err(ValidationError::invalid_format(
                "amount",
                format!("must not be negative, got {}", amount_minor),
            ));
        }
        Ok(Self {
            amount_minor,
            currency,
        })
    }

    /// Parses both parts at once.
    pub fn from_parts(amount_minor: i64, currency: &str) -> Result<Self, ValidationError> {
        Self::new(amount_minor, Currency::new(currency)?)
    }

    pub fn amount_minor(&self) -> i64 {
        self.amount_minor
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount_minor == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount_minor, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn currency_normalizes_to_upper_case() {
        let currency = Currency::new("usd").unwrap();
        assert_eq!(currency.code(), "USD");
        assert_eq!(currency.to_provider_code(), "usd");
    }

    #[test]
    fn currency_rejects_wrong_length_and_digits() {
        assert!(Currency::new("US").is_err());
        assert!(Currency::new("USDT").is_err());
        assert!(Currency::new("U5D").is_err());
        assert!(matches!(
            Currency::new("  "),
            Err(ValidationError::EmptyField { .. })
        ));
    }

    #[test]
    fn money_rejects_negative_amounts() {
        assert!(Money::from_parts(-1, "USD").is_err());
        assert!(Money::from_parts(0, "USD").unwrap().is_zero());
    }

    #[test]
    fn money_deserializes_and_validates_currency() {
        let money: Money =
            serde_json::from_str(r#"{"amount_minor":999,"currency":"eur"}"#).unwrap();
        assert_eq!(money.amount_minor(), 999);
        assert_eq!(money.currency().code(), "EUR");

        let bad = serde_json::from_str::<Money>(r#"{"amount_minor":1,"currency":"euro"}"#);
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn any_non_negative_amount_is_preserved_exactly(amount in 0i64..=i64::MAX) {
            let money = Money::from_parts(amount, "USD").unwrap();
            prop_assert_eq!(money.amount_minor(), amount);
        }

        #[test]
        fn any_three_letter_code_is_accepted(code in "[a-zA-Z]{3}") {
            let currency = Currency::new(&code).unwrap();
            prop_assert_eq!(currency.code(), code.to_ascii_uppercase());
        }
    }
}
