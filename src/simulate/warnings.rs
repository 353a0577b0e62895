//! Non-blocking advisories attached to a simulation.

use super::{fx, limits, rails};
use crate::money::Money;
use crate::store::account::{Account, AccountType};
use crate::store::simulation::Warning;
use crate::store::transfer::{FeeBreakdown, Rail};
use chrono::Utc;
use rust_decimal_macros::dec;

/// Builds the warning set for a transfer simulation. `usage` is the caller's
/// pre-transfer daily/monthly spend; `destination_account` is `None` when it
/// could not be resolved (in which case a terminal error already exists and
/// warnings are moot, but we still return whatever applies to the source).
pub fn transfer_warnings(
    amount: Money,
    balance_after: Money,
    fees: &FeeBreakdown,
    balance_before: Money,
    rail: Rail,
    tier: u8,
    usage: &limits::Usage,
    destination_account: Option<&Account>,
    fx_quote: Option<&crate::store::simulation::FxProjection>,
    destination_currency: crate::money::Currency,
) -> Vec<Warning> {
    let mut warnings = Vec::new();
    let caps = crate::store::account::tier_caps(tier);

    if balance_after.0 < dec!(100) && balance_after.0 >= dec!(0) {
        warnings.push(Warning::LowBalanceAfter { balance_after });
    }

    let daily_pct = limits::used_pct(usage.daily + amount, caps.daily);
    if daily_pct > dec!(80) {
        warnings.push(Warning::ApproachingDailyLimit { used_pct: daily_pct });
    }
    let monthly_pct = limits::used_pct(usage.monthly + amount, caps.monthly);
    if monthly_pct > dec!(80) {
        warnings.push(Warning::ApproachingMonthlyLimit { used_pct: monthly_pct });
    }

    if amount.0 > dec!(10000) {
        warnings.push(Warning::LargeTransfer { amount });
    }

    if let Some(quote) = fx_quote {
        let recent = fx::recent_rate(destination_currency);
        if quote.rate < recent {
            warnings.push(Warning::FxRateWorseThanRecent {
                current_rate: quote.rate,
                recent_rate: recent,
            });
        }
    }

    if rails::in_maintenance_window(rail, Utc::now()) {
        warnings.push(Warning::RailMaintenanceWindow { rail });
    }

    if let Some(dest) = destination_account {
        if dest.account_type == AccountType::Business && dest.verification_tier < 2 && amount.0 > dec!(1000) {
            warnings.push(Warning::KybUpgradeRecommended);
        }
    }

    let remaining_after_amount = balance_before.checked_sub(amount).unwrap_or(Money::ZERO);
    if fees.total.0 > remaining_after_amount.0 * dec!(0.5) && remaining_after_amount.0 > dec!(0) {
        warnings.push(Warning::FeesOverdrawRisk);
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use crate::store::transfer::FeeBreakdown;

    #[test]
    fn low_balance_after_is_flagged_under_100() {
        let fees = FeeBreakdown {
            platform_fee: Money::ZERO,
            fx_fee: Money::ZERO,
            rail_fee: Money::ZERO,
            total: Money::ZERO,
            currency: Currency::Usd,
        };
        let usage = limits::Usage {
            daily: Money::ZERO,
            monthly: Money::ZERO,
        };
        let warnings = transfer_warnings(
            Money::new(dec!(900)),
            Money::new(dec!(50)),
            &fees,
            Money::new(dec!(950)),
            Rail::Internal,
            1,
            &usage,
            None,
            None,
            Currency::Usd,
        );
        assert!(warnings.iter().any(|w| matches!(w, Warning::LowBalanceAfter { .. })));
    }

    #[test]
    fn large_transfer_over_10k_is_flagged() {
        let fees = FeeBreakdown {
            platform_fee: Money::ZERO,
            fx_fee: Money::ZERO,
            rail_fee: Money::ZERO,
            total: Money::ZERO,
            currency: Currency::Usd,
        };
        let usage = limits::Usage {
            daily: Money::ZERO,
            monthly: Money::ZERO,
        };
        let warnings = transfer_warnings(
            Money::new(dec!(20000)),
            Money::new(dec!(5000)),
            &fees,
            Money::new(dec!(25000)),
            Rail::Internal,
            3,
            &usage,
            None,
            None,
            Currency::Usd,
        );
        assert!(warnings.iter().any(|w| matches!(w, Warning::LargeTransfer { .. })));
    }
}
