//! Account entity.

use crate::money::{Currency, Money};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Person,
    Business,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Suspended,
    Closed,
}

/// Per-currency balance. `available` must never go negative; `available +
/// holds` must never exceed `available + pending_in + holds` (there is no
/// single "total" field — it is derived where needed).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Balance {
    pub available: Money,
    pub pending_in: Money,
    pub pending_out: Money,
    pub holds: Money,
}

impl Balance {
    pub fn zero() -> Self {
        Self {
            available: Money::ZERO,
            pending_in: Money::ZERO,
            pending_out: Money::ZERO,
            holds: Money::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub tenant: String,
    pub account_type: AccountType,
    pub status: AccountStatus,
    pub verification_tier: u8,
    pub balances: HashMap<Currency, Balance>,
}

impl Account {
    pub fn balance_for(&self, currency: Currency) -> Balance {
        self.balances.get(&currency).copied().unwrap_or_else(Balance::zero)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, AccountStatus::Active)
    }
}

/// Verification-tier transfer caps `{per_tx, daily, monthly}`.
#[derive(Debug, Clone, Copy)]
pub struct TierCaps {
    pub per_tx: Money,
    pub daily: Money,
    pub monthly: Money,
}

pub fn tier_caps(tier: u8) -> TierCaps {
    use rust_decimal_macros::dec;
    match tier {
        0 => TierCaps {
            per_tx: Money::new(dec!(500)),
            daily: Money::new(dec!(1000)),
            monthly: Money::new(dec!(5000)),
        },
        1 => TierCaps {
            per_tx: Money::new(dec!(5000)),
            daily: Money::new(dec!(10000)),
            monthly: Money::new(dec!(50000)),
        },
        2 => TierCaps {
            per_tx: Money::new(dec!(25000)),
            daily: Money::new(dec!(50000)),
            monthly: Money::new(dec!(250000)),
        },
        _ => TierCaps {
            per_tx: Money::new(dec!(100000)),
            daily: Money::new(dec!(100000)),
            monthly: Money::new(dec!(1000000)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_tiers_have_wider_caps() {
        let t0 = tier_caps(0);
        let t3 = tier_caps(3);
        assert!(t3.daily.0 > t0.daily.0);
    }

    #[test]
    fn missing_currency_balance_defaults_to_zero() {
        let account = Account {
            id: "acc_1".into(),
            tenant: "t1".into(),
            account_type: AccountType::Person,
            status: AccountStatus::Active,
            verification_tier: 0,
            balances: HashMap::new(),
        };
        assert!(account.balance_for(Currency::Usd).available.is_zero());
    }
}
