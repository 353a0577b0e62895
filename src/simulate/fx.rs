//! FX quoting.
//!
//! There is no real FX provider wired up here — `PAYOS_FX_ENV` (config.rs)
//! is the seam a real provider would sit behind. This module stands in with
//! a static rate table, the same way the sandbox facilitator stands in for
//! a real settlement network.

use crate::money::Currency;
use crate::store::simulation::FxProjection;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Indicative USD-quoted market rate for each local/stablecoin currency.
fn base_rate(currency: Currency) -> Decimal {
    match currency {
        Currency::Usd | Currency::Usdc => dec!(1.00),
        Currency::Brl => dec!(5.20),
        Currency::Mxn => dec!(17.50),
        Currency::Ars => dec!(950.00),
        Currency::Cop => dec!(4000.00),
    }
}

/// FX spread in percentage points: 0.35% for emerging
/// market destinations (BRL/MXN/ARS/COP), 0.20% otherwise.
pub fn spread_pct(destination: Currency) -> Decimal {
    if destination.is_emerging_market() {
        dec!(0.35)
    } else {
        dec!(0.20)
    }
}

/// Quotes a cross-currency conversion from `source` to `destination`.
/// Returns `None` when the two currencies are identical — callers treat
/// that as "no FX involved".
pub fn quote(source: Currency, destination: Currency) -> Option<FxProjection> {
    if source == destination {
        return None;
    }
    let rate = base_rate(destination) / base_rate(source);
    Some(FxProjection {
        rate,
        spread: spread_pct(destination),
        rate_locked: false,
    })
}

/// The rate actually applied to the converted amount once the spread is
/// taken out (the platform's margin on the conversion).
pub fn effective_rate(quote: &FxProjection) -> Decimal {
    quote.rate * (dec!(100) - quote.spread) / dec!(100)
}

/// A synthetic "rate observed a moment ago" used only to derive the
/// `FX_RATE_WORSE_THAN_RECENT` warning. No historical
/// rate series is modeled; see DESIGN.md for why this is a fixed offset
/// rather than a real moving average.
pub fn recent_rate(destination: Currency) -> Decimal {
    base_rate(destination) * dec!(0.999)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_currency_quotes_to_none() {
        assert!(quote(Currency::Usd, Currency::Usd).is_none());
    }

    #[test]
    fn emerging_market_destination_gets_wider_spread() {
        let q = quote(Currency::Usd, Currency::Brl).unwrap();
        assert_eq!(q.spread, dec!(0.35));
        let q2 = quote(Currency::Usd, Currency::Usdc).unwrap();
        assert_eq!(q2.spread, dec!(0.20));
    }

    #[test]
    fn effective_rate_is_below_quoted_rate() {
        let q = quote(Currency::Usd, Currency::Brl).unwrap();
        assert!(effective_rate(&q) < q.rate);
    }
}
