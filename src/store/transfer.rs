//! Transfer entity and settlement rail metadata.

use crate::money::{Currency, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Cancelled
        )
    }
}

/// Settlement rail, each with a fixed estimated duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rail {
    Internal,
    Pix,
    Spei,
    Cvu,
    Pse,
    Wire,
}

impl Rail {
    pub fn estimated_duration_seconds(&self) -> i64 {
        match self {
            Rail::Internal => 5,
            Rail::Pix => 120,
            Rail::Spei => 180,
            Rail::Cvu => 300,
            Rail::Pse => 600,
            Rail::Wire => 86_400,
        }
    }

    /// Selects the rail for a transfer between `source` and `destination`
    /// currencies.
    pub fn select(source: Currency, destination: Currency) -> Rail {
        if source == destination || matches!(destination, Currency::Usd | Currency::Usdc) {
            return Rail::Internal;
        }
        match destination {
            Currency::Brl => Rail::Pix,
            Currency::Mxn => Rail::Spei,
            Currency::Ars => Rail::Cvu,
            Currency::Cop => Rail::Pse,
            _ => Rail::Wire,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub platform_fee: Money,
    pub fx_fee: Money,
    pub rail_fee: Money,
    pub total: Money,
    pub currency: Currency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: String,
    pub from_account: String,
    pub to_account: String,
    pub amount: Money,
    pub currency: Currency,
    pub destination_currency: Option<Currency>,
    pub status: TransferStatus,
    pub rail: Rail,
    pub fees: FeeBreakdown,
    pub fx_rate: Option<rust_decimal::Decimal>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rail_selects_pix_for_brl_destination() {
        assert_eq!(Rail::select(Currency::Usd, Currency::Brl), Rail::Pix);
        assert_eq!(Rail::select(Currency::Usd, Currency::Usdc), Rail::Internal);
    }

    #[test]
    fn terminal_statuses_are_closed() {
        assert!(TransferStatus::Completed.is_terminal());
        assert!(!TransferStatus::Pending.is_terminal());
    }
}
