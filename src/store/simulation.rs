//! Simulation entity and its tagged payload/preview/warning/error variants.
//! Actions are represented as a tagged union rather than a dynamic
//! object-literal payload, so `serde` can validate shape at the boundary.

use crate::money::{Currency, Money};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    Pending,
    Completed,
    Failed,
    Executed,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_account: String,
    pub to_account: String,
    pub amount: Money,
    pub currency: Currency,
    pub destination_currency: Option<Currency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub original_transfer: String,
    pub amount: Money,
    pub reason: RefundReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    CustomerRequest,
    DuplicatePayment,
    Fraud,
    Error,
    Other,
}

/// Stream simulation request. Shape mirrors [`TransferRequest`] per the
/// design note that the full stream algorithm is not specified upstream —
/// only the projection/runway framing is known, so it rides the same
/// preview contract as a transfer with an added runway projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRequest {
    pub from_account: String,
    pub to_account: String,
    pub amount_per_interval: Money,
    pub currency: Currency,
    pub interval_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub simulations: Vec<TransferRequest>,
    pub stop_on_first_error: Option<bool>,
}

/// Tagged union over the four simulatable action kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action_type", content = "action_payload", rename_all = "snake_case")]
pub enum ActionPayload {
    Transfer(TransferRequest),
    Refund(RefundRequest),
    Stream(StreamRequest),
    Batch(BatchRequest),
}

impl ActionPayload {
    pub fn action_type(&self) -> &'static str {
        match self {
            ActionPayload::Transfer(_) => "transfer",
            ActionPayload::Refund(_) => "refund",
            ActionPayload::Stream(_) => "stream",
            ActionPayload::Batch(_) => "batch",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccountBalanceProjection {
    pub balance_before: Money,
    pub balance_after: Money,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FxProjection {
    pub rate: Decimal,
    pub spread: Decimal,
    pub rate_locked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingProjection {
    pub rail: crate::store::transfer::Rail,
    pub estimated_duration_seconds: i64,
    pub estimated_arrival: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferPreview {
    pub source: AccountBalanceProjection,
    pub destination: AccountBalanceProjection,
    pub fx: Option<FxProjection>,
    pub fees: crate::store::transfer::FeeBreakdown,
    pub timing: TimingProjection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundType {
    Full,
    Partial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundEligibility {
    pub can_refund: bool,
    pub window_expires: DateTime<Utc>,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundPreview {
    pub refund_type: RefundType,
    pub source: AccountBalanceProjection,
    pub destination: AccountBalanceProjection,
    pub eligibility: RefundEligibility,
    pub original_transfer_id: String,
    pub timing: TimingProjection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamPreview {
    pub per_interval: Money,
    pub interval_seconds: i64,
    pub projected_runway_intervals: u64,
    pub fees_per_interval: crate::store::transfer::FeeBreakdown,
    pub timing: TimingProjection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Preview {
    Transfer(TransferPreview),
    Refund(RefundPreview),
    Stream(StreamPreview),
    Batch(crate::store::batch::Batch),
}

/// A non-blocking advisory surfaced alongside a simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Warning {
    LowBalanceAfter { balance_after: Money },
    ApproachingDailyLimit { used_pct: Decimal },
    ApproachingMonthlyLimit { used_pct: Decimal },
    LargeTransfer { amount: Money },
    FxRateWorseThanRecent { current_rate: Decimal, recent_rate: Decimal },
    RailMaintenanceWindow { rail: crate::store::transfer::Rail },
    KybUpgradeRecommended,
    FeesOverdrawRisk,
    LargePartialRefund { pct_of_original: Decimal },
    RefundWindowExpiringSoon { days_remaining: i64 },
    StreamNotFullySpecified,
}

/// A blocking simulation error that forces `can_execute = false`. Carries
/// the same `kind`/`details` shape error envelopes use so the execution
/// gate can surface it directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationError {
    pub kind: crate::error::ErrorKind,
    pub message: String,
    pub details: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResultRef {
    pub id: String,
    pub resource_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variance {
    pub fx_rate_change: Option<Decimal>,
    pub fee_change: Option<Money>,
    pub destination_amount_change: Option<Money>,
    pub timing_change: Option<i64>,
    pub variance_level: VarianceLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    pub id: String,
    pub tenant: String,
    pub action_payload: ActionPayload,
    pub status: SimulationStatus,
    pub can_execute: bool,
    pub preview: Option<Preview>,
    pub warnings: Vec<Warning>,
    pub errors: Vec<SimulationError>,
    pub executed: bool,
    pub execution_result: Option<ExecutionResultRef>,
    pub variance: Option<Variance>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Simulation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_payload_reports_its_action_type() {
        let payload = ActionPayload::Transfer(TransferRequest {
            from_account: "acc_1".into(),
            to_account: "acc_2".into(),
            amount: Money::ZERO,
            currency: Currency::Usd,
            destination_currency: None,
        });
        assert_eq!(payload.action_type(), "transfer");
    }

    #[test]
    fn simulation_expiry_is_relative_to_supplied_now() {
        let sim = Simulation {
            id: "sim_1".into(),
            tenant: "t1".into(),
            action_payload: ActionPayload::Refund(RefundRequest {
                original_transfer: "txn_1".into(),
                amount: Money::ZERO,
                reason: RefundReason::Other,
            }),
            status: SimulationStatus::Pending,
            can_execute: true,
            preview: None,
            warnings: vec![],
            errors: vec![],
            executed: false,
            execution_result: None,
            variance: None,
            created_at: Utc::now(),
            expires_at: Utc::now() - chrono::Duration::seconds(1),
        };
        assert!(sim.is_expired(Utc::now()));
    }
}
