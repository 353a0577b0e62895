//! Decimal money handling.
//!
//! Monetary amounts are transmitted as decimal strings to avoid binary-float
//! loss; `rust_decimal::Decimal` gives us exact base-10 arithmetic and
//! serializes as a string via `serde-with-str`.

use rust_decimal::Decimal;
use rust_decimal::prelude::Zero;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ISO-ish currency code. Local rails and stablecoins share one enum since
/// both appear interchangeably as transfer source/destination currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Usdc,
    Brl,
    Mxn,
    Ars,
    Cop,
}

impl Currency {
    /// Emerging-market local currencies get the wider FX spread.
    pub fn is_emerging_market(&self) -> bool {
        matches!(self, Currency::Brl | Currency::Mxn | Currency::Ars | Currency::Cop)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Currency::Usd => "USD",
            Currency::Usdc => "USDC",
            Currency::Brl => "BRL",
            Currency::Mxn => "MXN",
            Currency::Ars => "ARS",
            Currency::Cop => "COP",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid currency code: {0}")]
pub struct CurrencyParseError(String);

impl FromStr for Currency {
    type Err = CurrencyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "USDC" => Ok(Currency::Usdc),
            "BRL" => Ok(Currency::Brl),
            "MXN" => Ok(Currency::Mxn),
            "ARS" => Ok(Currency::Ars),
            "COP" => Ok(Currency::Cop),
            other => Err(CurrencyParseError(other.to_string())),
        }
    }
}

/// A monetary amount, transported as a decimal string at the HTTP boundary.
///
/// Newtype rather than a bare `Decimal` so serde can enforce the string
/// encoding independently of how `rust_decimal`'s default feature set
/// serializes (some of its own feature flags serialize as numbers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Money(pub Decimal);

impl Default for Money {
    fn default() -> Self {
        Money::ZERO
    }
}

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Money(value)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(&self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    pub fn percent_of(&self, pct: Decimal) -> Money {
        Money((self.0 * pct / dec!(100)).round_dp(2))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s).map(Money)
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("{:.2}", self.0))
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Decimal::from_str(&s)
            .map(Money)
            .map_err(|e| serde::de::Error::custom(format!("invalid decimal amount: {e}")))
    }
}

impl std::ops::Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_serializes_as_fixed_point_string() {
        let m = Money::from_str("100").unwrap();
        assert_eq!(serde_json::to_string(&m).unwrap(), "\"100.00\"");
    }

    #[test]
    fn money_percent_of_rounds_to_cents() {
        let m = Money::from_str("1000").unwrap();
        let fee = m.percent_of(dec!(0.5));
        assert_eq!(fee.to_string(), "5.00");
    }

    #[test]
    fn currency_emerging_market_classification() {
        assert!(Currency::Brl.is_emerging_market());
        assert!(Currency::Mxn.is_emerging_market());
        assert!(!Currency::Usd.is_emerging_market());
        assert!(!Currency::Usdc.is_emerging_market());
    }

    #[test]
    fn currency_parses_from_str_case_insensitively() {
        assert_eq!(Currency::from_str("brl").unwrap(), Currency::Brl);
        assert!(Currency::from_str("eur").is_err());
    }
}
