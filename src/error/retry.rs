//! Retry guidance & suggested actions.

use super::ErrorKind;
use chrono::{TimeZone, Utc};
use serde::Serialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    Exponential,
    Linear,
}

/// Retry policy attached to every error envelope.
#[derive(Debug, Clone, Serialize)]
pub struct RetryGuidance {
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_strategy: Option<BackoffStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_action: Option<&'static str>,
}

impl RetryGuidance {
    fn not_retryable() -> Self {
        Self {
            retryable: false,
            retry_after_seconds: None,
            backoff_strategy: None,
            max_retries: None,
            retry_after_action: None,
        }
    }

    fn fixed(seconds: i64) -> Self {
        Self {
            retryable: true,
            retry_after_seconds: Some(seconds),
            backoff_strategy: Some(BackoffStrategy::Fixed),
            max_retries: None,
            retry_after_action: None,
        }
    }

    fn fixed_after_action(action: &'static str) -> Self {
        Self {
            retryable: true,
            retry_after_seconds: Some(0),
            backoff_strategy: Some(BackoffStrategy::Fixed),
            max_retries: None,
            retry_after_action: Some(action),
        }
    }

    fn exponential(seconds: i64, max_retries: u32) -> Self {
        Self {
            retryable: true,
            retry_after_seconds: Some(seconds),
            backoff_strategy: Some(BackoffStrategy::Exponential),
            max_retries: Some(max_retries),
            retry_after_action: None,
        }
    }
}

/// Extra context a caller may supply when deriving retry guidance for a
/// specific error occurrence (e.g. the rate-limit header value actually
/// observed, or the seconds remaining until a mandate renews).
#[derive(Debug, Clone, Default)]
pub struct RetryContext {
    pub rate_limit_retry_after: Option<i64>,
    pub seconds_until_daily_reset: Option<i64>,
    pub seconds_until_monthly_reset: Option<i64>,
}

/// Derives the retry policy for a given error kind.
pub fn derive(kind: ErrorKind, ctx: &RetryContext) -> RetryGuidance {
    use ErrorKind::*;
    match kind {
        RateLimited => RetryGuidance::fixed(ctx.rate_limit_retry_after.unwrap_or(60)),
        DailyLimitExceeded => RetryGuidance::fixed(
            ctx.seconds_until_daily_reset
                .unwrap_or_else(seconds_until_next_utc_midnight),
        ),
        MonthlyLimitExceeded | Ap2MandateDailyCapExceeded => RetryGuidance::fixed(
            ctx.seconds_until_monthly_reset
                .unwrap_or_else(seconds_until_next_utc_month_start),
        ),
        InsufficientBalance
        | InsufficientHoldBalance
        | DestinationInsufficientBalance
        | HoldExceedsAvailable
        | ZeroBalanceAccount
        | RefundAmountExceedsAvailable => RetryGuidance::fixed_after_action("top_up_account"),
        QuoteExpired | SimulationStale | SimulationFxVarianceExceeded | SimulationFeeVarianceExceeded => {
            RetryGuidance::fixed_after_action("refresh_quote")
        }
        ServiceUnavailable | RailUnavailable | FacilitatorUnreachable | FxProviderUnavailable
        | DependencyFailure | BalanceQueryFailed => RetryGuidance::exponential(30, 5),
        Timeout => RetryGuidance::exponential(10, 3),
        IdempotencyKeyConflict => RetryGuidance::not_retryable(),
        WorkflowStateConflict | ExecutionAlreadyInProgress | PendingBalanceLocked => {
            let mut g = RetryGuidance::exponential(1, 5);
            g.backoff_strategy = Some(BackoffStrategy::Exponential);
            g
        }
        ComplianceHold | ApprovalRequired | AmlReviewPending | AccountUnderReview => {
            RetryGuidance::fixed(3600)
        }
        MandateExpired => RetryGuidance::fixed_after_action("create_new_mandate"),
        ValidationError
        | MissingRequiredField
        | InvalidAmountFormat
        | InvalidCurrencyCode
        | InvalidAccountId
        | CurrencyMismatch
        | AmountTooSmall
        | AmountTooLarge
        | InvalidIdempotencyKey
        | BatchSizeInvalid
        | InvalidRefundReason
        | AccountNotFound
        | TransferNotFound
        | SimulationNotFound
        | BatchNotFound
        | AgentNotFound
        | MandateNotFound
        | CheckoutNotFound
        | RefundNotFound
        | OriginalTransferNotFound
        | CapabilityNotFound
        | SimulationExpired
        | SimulationCannotExecute
        | RefundWindowExpired
        | CheckoutExpired
        | BatchStopped => RetryGuidance::not_retryable(),
        _ => {
            let meta = kind.meta();
            if meta.retryable {
                RetryGuidance::exponential(5, 3)
            } else {
                RetryGuidance::not_retryable()
            }
        }
    }
}

fn seconds_until_next_utc_midnight() -> i64 {
    let now = Utc::now();
    let tomorrow = (now.date_naive() + chrono::Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .expect("valid midnight");
    let next = Utc.from_utc_datetime(&tomorrow);
    (next - now).num_seconds().max(0)
}

fn seconds_until_next_utc_month_start() -> i64 {
    let now = Utc::now();
    let (year, month) = if now.format("%m").to_string() == "12" {
        (now.format("%Y").to_string().parse::<i32>().unwrap() + 1, 1)
    } else {
        (
            now.format("%Y").to_string().parse::<i32>().unwrap(),
            now.format("%m").to_string().parse::<u32>().unwrap() + 1,
        )
    };
    let next = Utc
        .with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .expect("valid month start");
    (next - now).num_seconds().max(0)
}

/// A single next-step hint attached to an error envelope.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestedAction {
    pub action: &'static str,
    pub description: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub context: Value,
}

impl SuggestedAction {
    fn new(action: &'static str, description: impl Into<String>) -> Self {
        Self {
            action,
            description: description.into(),
            context: Value::Null,
        }
    }

    fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

/// Builds the context-aware suggested actions for a given error kind, using
/// whatever details were already attached to the error.
pub fn suggested_actions(kind: ErrorKind, details: &Value) -> Vec<SuggestedAction> {
    use ErrorKind::*;
    match kind {
        InsufficientBalance | InsufficientHoldBalance | DestinationInsufficientBalance
        | ZeroBalanceAccount => vec![
            SuggestedAction::new("top_up_account", "Add funds to the source account")
                .with_context(details.clone()),
            SuggestedAction::new("reduce_amount", "Retry with a smaller amount"),
            SuggestedAction::new("use_different_account", "Use an account with sufficient balance"),
        ],
        DailyLimitExceeded | MonthlyLimitExceeded | PerTransactionLimitExceeded | LimitExceeded => {
            vec![
                SuggestedAction::new("wait_for_reset", "Wait until the limit window resets")
                    .with_context(details.clone()),
                SuggestedAction::new("request_limit_increase", "Request a higher verification tier or limit"),
                SuggestedAction::new("reduce_amount", "Retry with a smaller amount"),
            ]
        }
        QuoteExpired | SimulationStale | SimulationFxVarianceExceeded | SimulationFeeVarianceExceeded => {
            vec![SuggestedAction::new("refresh_quote", "Re-simulate to get a current quote")]
        }
        ComplianceBlock | ComplianceHold | KycRequired | AccountUnderReview => vec![
            SuggestedAction::new("complete_kyc", "Complete identity verification"),
            SuggestedAction::new("complete_kyb", "Complete business verification"),
            SuggestedAction::new("complete_kya", "Complete agent verification"),
            SuggestedAction::new("contact_support", "Contact support for manual review"),
        ],
        AccountNotFound | TransferNotFound | SimulationNotFound | BatchNotFound | AgentNotFound
        | MandateNotFound | CheckoutNotFound | RefundNotFound | OriginalTransferNotFound => {
            vec![SuggestedAction::new("verify_id", "Double-check the id used in the request")
                .with_context(details.clone())]
        }
        RailUnavailable => vec![SuggestedAction::new(
            "use_alternative_rail",
            "Retry via an alternative settlement rail",
        )],
        Ap2MandateExceeded | MandateExpired => {
            vec![SuggestedAction::new("create_new_mandate", "Create a new mandate with sufficient headroom")]
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_uses_header_value_when_present() {
        let ctx = RetryContext {
            rate_limit_retry_after: Some(12),
            ..Default::default()
        };
        let guidance = derive(ErrorKind::RateLimited, &ctx);
        assert_eq!(guidance.retry_after_seconds, Some(12));
        assert!(matches!(guidance.backoff_strategy, Some(BackoffStrategy::Fixed)));
    }

    #[test]
    fn idempotency_conflict_is_not_retryable() {
        let guidance = derive(ErrorKind::IdempotencyKeyConflict, &RetryContext::default());
        assert!(!guidance.retryable);
    }

    #[test]
    fn service_unavailable_is_exponential_with_max_five() {
        let guidance = derive(ErrorKind::ServiceUnavailable, &RetryContext::default());
        assert!(guidance.retryable);
        assert_eq!(guidance.max_retries, Some(5));
        assert!(matches!(guidance.backoff_strategy, Some(BackoffStrategy::Exponential)));
    }

    #[test]
    fn not_found_has_no_retry_but_has_verify_id_action() {
        let guidance = derive(ErrorKind::AccountNotFound, &RetryContext::default());
        assert!(!guidance.retryable);
        let actions = suggested_actions(ErrorKind::AccountNotFound, &json!({"account_id": "acc_1"}));
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action, "verify_id");
    }

    #[test]
    fn balance_errors_include_three_suggested_actions() {
        let actions = suggested_actions(ErrorKind::InsufficientBalance, &json!({"shortfall": "5.00"}));
        let names: Vec<_> = actions.iter().map(|a| a.action).collect();
        assert!(names.contains(&"top_up_account"));
        assert!(names.contains(&"reduce_amount"));
        assert!(names.contains(&"use_different_account"));
    }
}
