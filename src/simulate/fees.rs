//! Fee computation.

use crate::money::{Currency, Money};
use crate::store::transfer::FeeBreakdown;
use rust_decimal_macros::dec;

/// Flat corridor fee charged on top of the percentage fees, keyed by
/// destination currency (spec: "Corridor flat fee: BRL destination → $1.50;
/// others as configured"). Non-BRL corridors are configured here with
/// indicative flat fees; same-currency transfers never reach this table.
fn corridor_flat_fee(destination: Currency) -> Money {
    match destination {
        Currency::Brl => Money::new(dec!(1.50)),
        Currency::Mxn => Money::new(dec!(1.00)),
        Currency::Ars => Money::new(dec!(1.25)),
        Currency::Cop => Money::new(dec!(1.00)),
        Currency::Usd | Currency::Usdc => Money::ZERO,
    }
}

/// Computes the full fee breakdown for a transfer, all denominated in
/// `source_currency`.
pub fn compute(amount: Money, source_currency: Currency, destination_currency: Currency) -> FeeBreakdown {
    let platform_fee = amount.percent_of(dec!(0.5));
    let cross_border = source_currency != destination_currency;
    let fx_fee = if cross_border {
        amount.percent_of(dec!(0.2))
    } else {
        Money::ZERO
    };
    let rail_fee = if cross_border {
        corridor_flat_fee(destination_currency)
    } else {
        Money::ZERO
    };
    let total = platform_fee + fx_fee + rail_fee;
    FeeBreakdown {
        platform_fee,
        fx_fee,
        rail_fee,
        total,
        currency: source_currency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_transfer_only_pays_platform_fee() {
        let fees = compute(Money::new(dec!(100)), Currency::Usdc, Currency::Usdc);
        assert_eq!(fees.total.to_string(), "0.50");
        assert_eq!(fees.fx_fee, Money::ZERO);
        assert_eq!(fees.rail_fee, Money::ZERO);
    }

    #[test]
    fn usd_to_brl_matches_seed_scenario_2() {
        let fees = compute(Money::new(dec!(1000)), Currency::Usd, Currency::Brl);
        assert_eq!(fees.platform_fee.to_string(), "5.00");
        assert_eq!(fees.fx_fee.to_string(), "2.00");
        assert_eq!(fees.rail_fee.to_string(), "1.50");
        assert_eq!(fees.total.to_string(), "8.50");
    }
}
