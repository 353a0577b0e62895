//! AP2 mandate entity and lifecycle state.

use crate::money::{Currency, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MandateType {
    Intent,
    Cart,
    Payment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MandateStatus {
    Active,
    Completed,
    Cancelled,
    Expired,
}

impl MandateStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MandateStatus::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MandateExecution {
    pub execution_index: u64,
    pub transfer_id: String,
    pub amount: Money,
    pub timestamp: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mandate {
    pub id: String,
    pub tenant: String,
    pub mandate_type: MandateType,
    pub agent_id: String,
    pub account_id: String,
    pub currency: Currency,
    pub authorized_amount: Money,
    pub used_amount: Money,
    pub remaining_amount: Money,
    pub execution_count: u64,
    pub status: MandateStatus,
    pub expires_at: DateTime<Utc>,
    pub executions: Vec<MandateExecution>,
}

impl Mandate {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Checks whether `now` should force a lazy expiry transition, mirroring
    /// the checkout's lazy-on-read expiry semantics.
    pub fn effective_status(&self, now: DateTime<Utc>) -> MandateStatus {
        if self.status == MandateStatus::Active && self.is_expired(now) {
            MandateStatus::Expired
        } else {
            self.status
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_is_not_terminal() {
        assert!(!MandateStatus::Active.is_terminal());
        assert!(MandateStatus::Completed.is_terminal());
    }
}
