//! Error taxonomy & response envelope support.
//!
//! `ErrorKind` is a closed, `#[non_exhaustive]`-free enumeration of every
//! error PayOS can return to a partner. Each variant carries static metadata
//! (category, HTTP status, retryability) looked up through [`ErrorKind::meta`].

pub mod retry;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// The ten broad error categories every `ErrorKind` maps into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Balance,
    Validation,
    Limits,
    Compliance,
    Technical,
    Workflow,
    Auth,
    Resource,
    State,
    Protocol,
}

/// Static metadata attached to every [`ErrorKind`].
#[derive(Debug, Clone, Copy)]
pub struct ErrorMeta {
    pub category: ErrorCategory,
    pub http_status: u16,
    pub retryable: bool,
    pub default_retry_action: &'static str,
    pub expected_detail_fields: &'static [&'static str],
    pub documentation_url: &'static str,
}

fn doc_url(slug: &str) -> String {
    format!("https://docs.payos.dev/errors/{slug}")
}

macro_rules! error_kinds {
    (
        $(
            $category:ident => {
                $( $variant:ident ( $status:literal, $retryable:literal, $retry_action:literal, [$($field:literal),*] ) ),* $(,)?
            }
        ),* $(,)?
    ) => {
        /// Closed enumeration of ~110 error kinds across ten categories.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum ErrorKind {
            $( $( $variant, )* )*
        }

        impl ErrorKind {
            /// Returns this kind's static category/status/retry metadata.
            pub fn meta(&self) -> ErrorMeta {
                match self {
                    $(
                        $(
                            ErrorKind::$variant => ErrorMeta {
                                category: ErrorCategory::$category,
                                http_status: $status,
                                retryable: $retryable,
                                default_retry_action: $retry_action,
                                expected_detail_fields: &[$($field),*],
                                documentation_url: "",
                            },
                        )*
                    )*
                }
            }

            /// `SCREAMING_SNAKE_CASE` wire code, e.g. `INSUFFICIENT_BALANCE`.
            pub fn code(&self) -> &'static str {
                match self {
                    $( $( ErrorKind::$variant => stringify!($variant), )* )*
                }
            }
        }
    };
}

error_kinds! {
    Balance => {
        InsufficientBalance(400, true, "top_up_account", ["shortfall", "currency"]),
        InsufficientHoldBalance(400, true, "top_up_account", ["shortfall"]),
        DestinationInsufficientBalance(409, true, "use_different_account", ["shortfall"]),
        NegativeBalanceForbidden(400, false, "contact_support", []),
        HoldExceedsAvailable(400, true, "reduce_amount", ["available", "requested_hold"]),
        PendingBalanceLocked(409, true, "retry_later", []),
        BalanceMismatch(500, false, "contact_support", []),
        OverdraftAttempted(409, false, "contact_support", []),
        ZeroBalanceAccount(400, true, "top_up_account", []),
        BalanceQueryFailed(503, true, "retry_later", []),
        RefundAmountExceedsAvailable(400, false, "reduce_amount", ["remaining_refundable"]),
    },
    Validation => {
        ValidationError(400, false, "fix_request", ["field"]),
        MissingRequiredField(400, false, "fix_request", ["field"]),
        InvalidAmountFormat(400, false, "fix_request", ["field"]),
        InvalidCurrencyCode(400, false, "fix_request", ["field"]),
        InvalidAccountId(400, false, "verify_id", ["field"]),
        CurrencyMismatch(400, false, "fix_request", ["expected", "actual"]),
        AmountTooSmall(400, false, "fix_request", ["minimum"]),
        AmountTooLarge(400, false, "fix_request", ["maximum"]),
        InvalidIdempotencyKey(400, false, "fix_request", []),
        BatchSizeInvalid(400, false, "fix_request", ["min", "max", "actual"]),
        InvalidRefundReason(400, false, "fix_request", ["allowed_values"]),
    },
    Limits => {
        DailyLimitExceeded(429, true, "wait_for_reset", ["cap", "used", "reset_at"]),
        MonthlyLimitExceeded(429, true, "wait_for_reset", ["cap", "used", "reset_at"]),
        PerTransactionLimitExceeded(400, false, "reduce_amount", ["cap"]),
        LimitExceeded(400, true, "request_limit_increase", ["kind", "cap", "used", "remaining"]),
        VerificationTierTooLow(403, false, "complete_kyc", ["required_tier"]),
        RateLimited(429, true, "wait_for_reset", ["retry_after_seconds"]),
        Ap2MandateExceeded(400, true, "create_new_mandate", ["remaining_amount", "requested_amount"]),
        Ap2MandateDailyCapExceeded(429, true, "wait_for_reset", ["cap"]),
        AgentSpendingCapExceeded(400, true, "request_limit_increase", ["cap"]),
        BatchItemLimitExceeded(400, false, "reduce_amount", ["max_items"]),
        ConcurrentRequestLimitExceeded(429, true, "wait_for_reset", []),
    },
    Compliance => {
        ComplianceBlock(403, true, "contact_support", ["severity"]),
        KycRequired(403, true, "complete_kyc", []),
        KybRequired(403, true, "complete_kyb", []),
        KyaRequired(403, true, "complete_kya", []),
        SanctionsScreenHit(403, false, "contact_support", []),
        ComplianceHold(403, true, "contact_support", ["reset_at"]),
        HighRiskJurisdiction(403, false, "contact_support", ["jurisdiction"]),
        ApprovalRequired(202, true, "contact_support", ["approval_threshold"]),
        AmlReviewPending(202, true, "contact_support", []),
        AccountUnderReview(403, true, "contact_support", []),
        PepMatch(403, false, "contact_support", []),
    },
    Technical => {
        InternalError(500, true, "retry_later", []),
        ServiceUnavailable(503, true, "retry_later", []),
        RailUnavailable(503, true, "use_alternative_rail", ["rail"]),
        Timeout(504, true, "retry_later", []),
        DatabaseError(500, true, "retry_later", []),
        FacilitatorUnreachable(502, true, "retry_later", []),
        FxProviderUnavailable(503, true, "retry_later", []),
        DependencyFailure(502, true, "retry_later", ["dependency"]),
        SerializationError(500, false, "contact_support", []),
        UnexpectedState(500, false, "contact_support", []),
        ConfigurationError(500, false, "contact_support", []),
    },
    Workflow => {
        QuoteExpired(409, true, "refresh_quote", []),
        SimulationExpired(410, false, "refresh_quote", ["expires_at"]),
        SimulationStale(409, true, "refresh_quote", ["original_preview", "current_preview", "errors"]),
        SimulationCannotExecute(400, false, "fix_request", ["errors"]),
        SimulationFxVarianceExceeded(409, true, "refresh_quote", ["original_rate", "current_rate"]),
        SimulationFeeVarianceExceeded(409, true, "refresh_quote", ["original_fee", "current_fee"]),
        BatchStopped(400, false, "fix_request", []),
        RefundWindowExpired(400, false, "contact_support", ["days_since_transfer", "window_days"]),
        CheckoutExpired(410, false, "fix_request", ["expires_at"]),
        MandateExpired(410, true, "create_new_mandate", ["expires_at"]),
        WorkflowStateConflict(409, true, "retry_later", []),
    },
    Auth => {
        Unauthorized(401, false, "contact_support", []),
        Forbidden(403, false, "contact_support", []),
        InvalidApiKey(401, false, "contact_support", []),
        ExpiredToken(401, true, "retry_later", []),
        InsufficientScope(403, false, "contact_support", ["required_scope"]),
        TenantMismatch(403, false, "verify_id", []),
        AgentNotAuthorized(403, false, "contact_support", []),
        MandateNotOwnedByAgent(403, false, "verify_id", []),
        IdempotencyKeyConflict(409, false, "fix_request", []),
        SignatureInvalid(401, false, "fix_request", []),
        MissingAuthHeader(401, false, "fix_request", []),
    },
    Resource => {
        AccountNotFound(404, false, "verify_id", ["account_id"]),
        TransferNotFound(404, false, "verify_id", ["transfer_id"]),
        SimulationNotFound(404, false, "verify_id", ["simulation_id"]),
        BatchNotFound(404, false, "verify_id", ["batch_id"]),
        AgentNotFound(404, false, "verify_id", ["agent_id"]),
        MandateNotFound(404, false, "verify_id", ["mandate_id"]),
        CheckoutNotFound(404, false, "verify_id", ["checkout_id"]),
        RefundNotFound(404, false, "verify_id", ["refund_id"]),
        OriginalTransferNotFound(404, false, "verify_id", ["transfer_id"]),
        CapabilityNotFound(404, false, "verify_id", ["name"]),
        ResourceGone(410, false, "verify_id", []),
    },
    State => {
        AccountSuspended(403, false, "contact_support", ["account_id"]),
        AccountClosed(403, false, "use_different_account", ["account_id"]),
        TransferAlreadyTerminal(409, false, "fix_request", ["status"]),
        AgentSuspended(403, false, "contact_support", ["agent_id"]),
        MandateNotActive(409, false, "create_new_mandate", ["status"]),
        CheckoutNotPending(409, false, "fix_request", ["status"]),
        AgentSameStateTransition(409, false, "fix_request", ["status"]),
        AgentHasActiveStreams(409, false, "fix_request", []),
        ExecutionAlreadyInProgress(409, true, "retry_later", []),
        BatchAlreadyProcessed(409, false, "fix_request", []),
        TransferNotCancellable(409, false, "fix_request", ["status"]),
    },
    Protocol => {
        UnsupportedX402Scheme(400, false, "fix_request", ["scheme"]),
        UnsupportedX402Network(400, false, "fix_request", ["network"]),
        X402PaymentInvalid(400, false, "fix_request", []),
        X402SettlementFailed(502, true, "retry_later", []),
        Ap2MandateTypeInvalid(400, false, "fix_request", ["mandate_type"]),
        AcpTotalMismatch(400, false, "fix_request", ["expected_total", "actual_total"]),
        AcpSharedTokenInvalid(400, false, "fix_request", []),
        ProtocolVersionUnsupported(400, false, "fix_request", ["version"]),
        MalformedPayload(400, false, "fix_request", []),
        UnsupportedRail(400, false, "use_alternative_rail", ["rail"]),
        UnsupportedResourceType(400, false, "fix_request", ["resource_type"]),
    },
}

impl ErrorKind {
    pub fn documentation_url(&self) -> String {
        doc_url(&self.code().to_ascii_lowercase())
    }
}

/// A typed API error: the wire-facing error produced by any domain
/// operation. Handlers propagate this with `?`; the response-wrapper layer
/// turns it into the error envelope.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind_code}: {message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    kind_code: &'static str,
    pub message: String,
    pub details: Value,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            kind_code: kind.code(),
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn not_found(kind: ErrorKind, id_field: &str, id: &str) -> Self {
        Self::new(kind, format!("{} not found", id_field)).with_details(json!({ id_field: id }))
    }
}

pub fn is_success(value: &Value) -> bool {
    value.get("success").and_then(Value::as_bool) == Some(true)
}

pub fn is_error(value: &Value) -> bool {
    value.get("success").and_then(Value::as_bool) == Some(false) && value.get("error").is_some()
}

pub fn is_paginated(value: &Value) -> bool {
    value
        .get("data")
        .map(|d| d.get("items").is_some() && d.get("page").is_some())
        .unwrap_or(false)
}
