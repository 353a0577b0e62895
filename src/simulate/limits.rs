//! Verification-tier limits check.

use crate::error::ErrorKind;
use crate::money::{Currency, Money};
use crate::store::account::tier_caps;
use crate::store::transfer::{Transfer, TransferStatus};
use chrono::{DateTime, Utc};
use serde_json::json;

/// One blocking limit violation, shaped so it can be turned directly into a
/// `SimulationError` with `ErrorKind::LimitExceeded`.
pub struct LimitViolation {
    pub kind: &'static str,
    pub cap: Money,
    pub used: Money,
    pub remaining: Money,
}

impl LimitViolation {
    pub fn error_kind(&self) -> ErrorKind {
        ErrorKind::LimitExceeded
    }

    pub fn details(&self) -> serde_json::Value {
        json!({
            "kind": self.kind,
            "cap": self.cap.to_string(),
            "used": self.used.to_string(),
            "remaining": self.remaining.to_string(),
        })
    }
}

/// Usage so far against the daily/monthly windows, summed over `from_account`
/// transfers in `currency` that are not cancelled/failed (spec: "computing
/// used amounts from recent transfers").
pub struct Usage {
    pub daily: Money,
    pub monthly: Money,
}

pub fn usage_for(transfers: &[Transfer], account_id: &str, currency: Currency, now: DateTime<Utc>) -> Usage {
    let day_ago = now - chrono::Duration::hours(24);
    let month_ago = now - chrono::Duration::days(30);
    let mut daily = Money::ZERO;
    let mut monthly = Money::ZERO;
    for t in transfers {
        if t.from_account != account_id || t.currency != currency {
            continue;
        }
        if matches!(t.status, TransferStatus::Cancelled | TransferStatus::Failed) {
            continue;
        }
        if t.created_at >= month_ago {
            monthly = monthly + t.amount;
        }
        if t.created_at >= day_ago {
            daily = daily + t.amount;
        }
    }
    Usage { daily, monthly }
}

/// Checks `amount` against the tier's per-tx/daily/monthly caps, returning
/// every violated cap.
pub fn check(tier: u8, amount: Money, usage: &Usage) -> Vec<LimitViolation> {
    let caps = tier_caps(tier);
    let mut violations = Vec::new();
    if amount.0 > caps.per_tx.0 {
        violations.push(LimitViolation {
            kind: "per_tx",
            cap: caps.per_tx,
            used: amount,
            remaining: Money::ZERO,
        });
    }
    let daily_after = usage.daily + amount;
    if daily_after.0 > caps.daily.0 {
        violations.push(LimitViolation {
            kind: "daily",
            cap: caps.daily,
            used: usage.daily,
            remaining: caps.daily.checked_sub(usage.daily).unwrap_or(Money::ZERO),
        });
    }
    let monthly_after = usage.monthly + amount;
    if monthly_after.0 > caps.monthly.0 {
        violations.push(LimitViolation {
            kind: "monthly",
            cap: caps.monthly,
            used: usage.monthly,
            remaining: caps.monthly.checked_sub(usage.monthly).unwrap_or(Money::ZERO),
        });
    }
    violations
}

/// Fraction of a cap already used, for the `APPROACHING_*_LIMIT` warnings
///.
pub fn used_pct(used: Money, cap: Money) -> rust_decimal::Decimal {
    if cap.is_zero() {
        return rust_decimal::Decimal::ZERO;
    }
    (used.0 / cap.0) * rust_decimal::Decimal::from(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn tier_zero_rejects_amount_above_per_tx_cap() {
        let usage = Usage {
            daily: Money::ZERO,
            monthly: Money::ZERO,
        };
        let violations = check(0, Money::new(dec!(600)), &usage);
        assert!(violations.iter().any(|v| v.kind == "per_tx"));
    }

    #[test]
    fn usage_only_counts_matching_account_currency_and_window() {
        let now = Utc::now();
        let transfers = vec![Transfer {
            id: "txn_1".into(),
            from_account: "acc_1".into(),
            to_account: "acc_2".into(),
            amount: Money::new(dec!(100)),
            currency: Currency::Usd,
            destination_currency: None,
            status: TransferStatus::Completed,
            rail: crate::store::transfer::Rail::Internal,
            fees: crate::store::transfer::FeeBreakdown {
                platform_fee: Money::ZERO,
                fx_fee: Money::ZERO,
                rail_fee: Money::ZERO,
                total: Money::ZERO,
                currency: Currency::Usd,
            },
            fx_rate: None,
            created_at: now,
            completed_at: Some(now),
            failure_code: None,
        }];
        let usage = usage_for(&transfers, "acc_1", Currency::Usd, now);
        assert_eq!(usage.daily.to_string(), "100.00");
        let other = usage_for(&transfers, "acc_2", Currency::Usd, now);
        assert_eq!(other.daily, Money::ZERO);
    }
}
