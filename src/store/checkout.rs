//! ACP checkout entity and lifecycle.

use crate::money::{Currency, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    Pending,
    Completed,
    Cancelled,
    Expired,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub sku: String,
    pub description: String,
    pub quantity: u32,
    pub unit_price: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkout {
    pub id: String,
    pub tenant: String,
    pub merchant_id: String,
    pub agent_id: String,
    pub currency: Currency,
    pub items: Vec<CheckoutItem>,
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub discount: Money,
    pub total: Money,
    pub status: CheckoutStatus,
    pub shared_payment_token: String,
    pub transfer_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Checkout {
    /// Lazily computed status: `pending` becomes `expired` once `expires_at`
    /// has passed, without requiring a background sweep.
    pub fn effective_status(&self, now: DateTime<Utc>) -> CheckoutStatus {
        if self.status == CheckoutStatus::Pending && now > self.expires_at {
            CheckoutStatus::Expired
        } else {
            self.status
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn checkout(status: CheckoutStatus, expires_at: DateTime<Utc>) -> Checkout {
        Checkout {
            id: "checkout_1".into(),
            tenant: "t1".into(),
            merchant_id: "merchant_1".into(),
            agent_id: "agent_1".into(),
            currency: Currency::Usd,
            items: vec![],
            subtotal: Money::new(dec!(100)),
            tax: Money::ZERO,
            shipping: Money::ZERO,
            discount: Money::ZERO,
            total: Money::new(dec!(100)),
            status,
            shared_payment_token: "spt_1".into(),
            transfer_id: None,
            expires_at,
        }
    }

    #[test]
    fn pending_past_expiry_reads_as_expired() {
        let c = checkout(CheckoutStatus::Pending, Utc::now() - chrono::Duration::seconds(1));
        assert_eq!(c.effective_status(Utc::now()), CheckoutStatus::Expired);
    }

    #[test]
    fn completed_past_expiry_stays_completed() {
        let c = checkout(CheckoutStatus::Completed, Utc::now() - chrono::Duration::seconds(1));
        assert_eq!(c.effective_status(Utc::now()), CheckoutStatus::Completed);
    }
}
