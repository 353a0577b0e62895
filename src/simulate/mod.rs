//! Simulation engine: transfer, refund, and stream
//! dry-runs that produce an immutable [`Simulation`] with a frozen preview,
//! warnings, and terminal errors — never a side effect on real state.

pub mod fees;
pub mod fx;
pub mod limits;
pub mod rails;
pub mod warnings;

use crate::error::{ApiError, ErrorKind};
use crate::ids;
use crate::money::Money;
use crate::store::Store;
use crate::store::simulation::{
    AccountBalanceProjection, ActionPayload, BatchRequest, FxProjection, Preview, RefundEligibility,
    RefundPreview, RefundRequest, RefundType, Simulation, SimulationError, SimulationStatus, StreamPreview,
    StreamRequest, TimingProjection, TransferPreview, TransferRequest,
};
use crate::store::transfer::TransferStatus;
use chrono::Utc;
use rust_decimal_macros::dec;
use serde_json::json;

pub(crate) fn sim_error(kind: ErrorKind, message: impl Into<String>, details: serde_json::Value) -> SimulationError {
    SimulationError {
        kind,
        message: message.into(),
        details,
    }
}

fn frame(tenant: &str, payload: ActionPayload, preview: Option<Preview>, warnings: Vec<crate::store::simulation::Warning>, errors: Vec<SimulationError>) -> Simulation {
    let now = Utc::now();
    Simulation {
        id: ids::simulation_id(),
        tenant: tenant.to_string(),
        action_payload: payload,
        status: SimulationStatus::Completed,
        can_execute: errors.is_empty(),
        preview,
        warnings,
        errors,
        executed: false,
        execution_result: None,
        variance: None,
        created_at: now,
        expires_at: now + chrono::Duration::hours(1),
    }
}

/// Dispatches a simulation request by action type.
pub async fn create(store: &dyn Store, tenant: &str, payload: ActionPayload) -> Result<Simulation, ApiError> {
    let simulation = match payload.clone() {
        ActionPayload::Transfer(req) => transfer(store, tenant, req).await?,
        ActionPayload::Refund(req) => refund(store, tenant, req).await?,
        ActionPayload::Stream(req) => stream(store, tenant, req).await?,
        ActionPayload::Batch(req) => batch_action(store, tenant, req).await?,
    };
    store.put_simulation(simulation.clone()).await;
    Ok(simulation)
}

/// Transfer simulation.
pub async fn transfer(store: &dyn Store, tenant: &str, req: TransferRequest) -> Result<Simulation, ApiError> {
    let mut errors = Vec::new();
    let now = Utc::now();

    let from_account = store.get_account(&req.from_account).await;
    let to_account = store.get_account(&req.to_account).await;

    match &from_account {
        None => errors.push(sim_error(
            ErrorKind::AccountNotFound,
            "source account not found",
            json!({"account_id": req.from_account}),
        )),
        Some(acc) if !acc.is_active() => errors.push(sim_error(
            ErrorKind::AccountSuspended,
            "source account is not active",
            json!({"account_id": req.from_account}),
        )),
        Some(_) => {}
    }
    match &to_account {
        None => errors.push(sim_error(
            ErrorKind::AccountNotFound,
            "destination account not found",
            json!({"account_id": req.to_account}),
        )),
        Some(acc) if !acc.is_active() => errors.push(sim_error(
            ErrorKind::AccountSuspended,
            "destination account is not active",
            json!({"account_id": req.to_account}),
        )),
        Some(_) => {}
    }

    let destination_currency = req.destination_currency.unwrap_or(req.currency);
    let fx_quote: Option<FxProjection> = fx::quote(req.currency, destination_currency);
    let rail = rails::select(req.currency, destination_currency);
    let fee_breakdown = fees::compute(req.amount, req.currency, destination_currency);

    let source_balance_before = from_account
        .as_ref()
        .map(|a| a.balance_for(req.currency).available)
        .unwrap_or(Money::ZERO);
    let destination_balance_before = to_account
        .as_ref()
        .map(|a| a.balance_for(destination_currency).available)
        .unwrap_or(Money::ZERO);

    let total_debit = req.amount + fee_breakdown.total;
    let source_balance_after = source_balance_before.checked_sub(total_debit).unwrap_or(Money::ZERO);

    let mut usage = limits::Usage {
        daily: Money::ZERO,
        monthly: Money::ZERO,
    };
    if let Some(from) = &from_account {
        if source_balance_before.0 < total_debit.0 {
            errors.push(sim_error(
                ErrorKind::InsufficientBalance,
                "source account has insufficient available balance",
                json!({
                    "shortfall": req.amount.checked_sub(source_balance_before).unwrap_or(Money::ZERO).to_string(),
                    "currency": req.currency,
                }),
            ));
        }

        let transfers = store.list_transfers_for_account(&req.from_account).await;
        usage = limits::usage_for(&transfers, &req.from_account, req.currency, now);
        for violation in limits::check(from.verification_tier, req.amount, &usage) {
            errors.push(sim_error(
                violation.error_kind(),
                format!("{} limit exceeded", violation.kind),
                violation.details(),
            ));
        }
    }

    let effective_destination_amount = match &fx_quote {
        Some(q) => Money::new((req.amount.0 * fx::effective_rate(q)).round_dp(2)),
        None => req.amount,
    };
    let destination_balance_after = destination_balance_before + effective_destination_amount;

    let warnings = warnings::transfer_warnings(
        req.amount,
        source_balance_after,
        &fee_breakdown,
        source_balance_before,
        rail,
        from_account.as_ref().map(|a| a.verification_tier).unwrap_or(0),
        &usage,
        to_account.as_ref(),
        fx_quote.as_ref(),
        destination_currency,
    );

    let preview = Preview::Transfer(TransferPreview {
        source: AccountBalanceProjection {
            balance_before: source_balance_before,
            balance_after: source_balance_after,
        },
        destination: AccountBalanceProjection {
            balance_before: destination_balance_before,
            balance_after: destination_balance_after,
        },
        fx: fx_quote,
        fees: fee_breakdown,
        timing: TimingProjection {
            rail,
            estimated_duration_seconds: rail.estimated_duration_seconds(),
            estimated_arrival: now + chrono::Duration::seconds(rail.estimated_duration_seconds()),
        },
    });

    Ok(frame(
        tenant,
        ActionPayload::Transfer(req),
        Some(preview),
        warnings,
        errors,
    ))
}

/// Refund simulation.
pub async fn refund(store: &dyn Store, tenant: &str, req: RefundRequest) -> Result<Simulation, ApiError> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let now = Utc::now();

    let original = store.get_transfer(&req.original_transfer).await;

    let (source_before, destination_before, timing, refund_type, window_expires) = if let Some(transfer) = &original {
        if !matches!(transfer.status, TransferStatus::Completed | TransferStatus::Processing) {
            errors.push(sim_error(
                ErrorKind::WorkflowStateConflict,
                "original transfer is not in a refundable state",
                json!({"status": transfer.status}),
            ));
        }

        let window_expires = transfer
            .completed_at
            .map(|c| c + chrono::Duration::days(30))
            .unwrap_or(now + chrono::Duration::days(30));
        if let Some(completed_at) = transfer.completed_at {
            let days_since = (now - completed_at).num_days();
            if days_since > 30 {
                errors.push(sim_error(
                    ErrorKind::RefundWindowExpired,
                    "refund window has expired",
                    json!({"days_since_transfer": days_since, "window_days": 30}),
                ));
            } else if (window_expires - now).num_days() < 7 {
                warnings.push(crate::store::simulation::Warning::RefundWindowExpiringSoon {
                    days_remaining: (window_expires - now).num_days(),
                });
            }
        }

        let prior_refunds = store.list_refunds_for_transfer(&transfer.id).await;
        let already_refunded: Money = prior_refunds.iter().map(|r| r.amount).sum();
        let remaining_refundable = transfer.amount.checked_sub(already_refunded).unwrap_or(Money::ZERO);
        if req.amount.0 > remaining_refundable.0 {
            errors.push(sim_error(
                ErrorKind::RefundAmountExceedsAvailable,
                "requested refund exceeds what remains refundable",
                json!({"remaining_refundable": remaining_refundable.to_string()}),
            ));
        }

        let from_account = store.get_account(&transfer.from_account).await;
        let to_account = store.get_account(&transfer.to_account).await;
        let source_before = from_account
            .as_ref()
            .map(|a| a.balance_for(transfer.currency).available)
            .unwrap_or(Money::ZERO);
        let destination_before = to_account
            .as_ref()
            .map(|a| a.balance_for(transfer.currency).available)
            .unwrap_or(Money::ZERO);

        if destination_before.0 < req.amount.0 {
            errors.push(sim_error(
                ErrorKind::DestinationInsufficientBalance,
                "the account funding the refund has insufficient balance",
                json!({"shortfall": (req.amount.checked_sub(destination_before).unwrap_or(Money::ZERO)).to_string()}),
            ));
        }

        let refund_type = if req.amount.0 == transfer.amount.0 {
            RefundType::Full
        } else {
            RefundType::Partial
        };
        if refund_type == RefundType::Partial && req.amount.0 * dec!(2) > transfer.amount.0 {
            warnings.push(crate::store::simulation::Warning::LargePartialRefund {
                pct_of_original: limits::used_pct(req.amount, transfer.amount),
            });
        }

        (
            source_before,
            destination_before,
            TimingProjection {
                rail: crate::store::transfer::Rail::Internal,
                estimated_duration_seconds: 5,
                estimated_arrival: now + chrono::Duration::seconds(5),
            },
            refund_type,
            window_expires,
        )
    } else {
        errors.push(sim_error(
            ErrorKind::OriginalTransferNotFound,
            "original transfer not found",
            json!({"transfer_id": req.original_transfer}),
        ));
        (
            Money::ZERO,
            Money::ZERO,
            TimingProjection {
                rail: crate::store::transfer::Rail::Internal,
                estimated_duration_seconds: 5,
                estimated_arrival: now + chrono::Duration::seconds(5),
            },
            RefundType::Partial,
            now,
        )
    };

    let preview = Preview::Refund(RefundPreview {
        refund_type,
        source: AccountBalanceProjection {
            balance_before: source_before,
            balance_after: source_before + req.amount,
        },
        destination: AccountBalanceProjection {
            balance_before: destination_before,
            balance_after: destination_before.checked_sub(req.amount).unwrap_or(Money::ZERO),
        },
        eligibility: RefundEligibility {
            can_refund: errors.is_empty(),
            window_expires,
            reasons: errors.iter().map(|e| e.message.clone()).collect(),
        },
        original_transfer_id: req.original_transfer.clone(),
        timing,
    });

    Ok(frame(tenant, ActionPayload::Refund(req), Some(preview), warnings, errors))
}

/// Stream simulation. The full streaming-payment algorithm is left open;
/// this mirrors the transfer contract in shape only (see DESIGN.md).
pub async fn stream(store: &dyn Store, tenant: &str, req: StreamRequest) -> Result<Simulation, ApiError> {
    let mut errors = Vec::new();
    let now = Utc::now();

    let from_account = store.get_account(&req.from_account).await;
    let to_account = store.get_account(&req.to_account).await;
    if from_account.is_none() {
        errors.push(sim_error(
            ErrorKind::AccountNotFound,
            "source account not found",
            json!({"account_id": req.from_account}),
        ));
    }
    if to_account.is_none() {
        errors.push(sim_error(
            ErrorKind::AccountNotFound,
            "destination account not found",
            json!({"account_id": req.to_account}),
        ));
    }

    let balance_before = from_account
        .as_ref()
        .map(|a| a.balance_for(req.currency).available)
        .unwrap_or(Money::ZERO);
    let fees_per_interval = fees::compute(req.amount_per_interval, req.currency, req.currency);
    let per_interval_cost = req.amount_per_interval + fees_per_interval.total;
    let projected_runway_intervals = if per_interval_cost.is_zero() {
        0
    } else {
        (balance_before.0 / per_interval_cost.0)
            .floor()
            .to_string()
            .parse::<u64>()
            .unwrap_or(0)
    };

    let preview = Preview::Stream(StreamPreview {
        per_interval: req.amount_per_interval,
        interval_seconds: req.interval_seconds,
        projected_runway_intervals,
        fees_per_interval,
        timing: TimingProjection {
            rail: crate::store::transfer::Rail::Internal,
            estimated_duration_seconds: crate::store::transfer::Rail::Internal.estimated_duration_seconds(),
            estimated_arrival: now + chrono::Duration::seconds(req.interval_seconds),
        },
    });

    let warnings = vec![crate::store::simulation::Warning::StreamNotFullySpecified];

    Ok(frame(tenant, ActionPayload::Stream(req), Some(preview), warnings, errors))
}

/// Wraps the batch processor's result (component G) as a simulation preview
/// so `POST /v1/simulate` can accept `action_type=batch` uniformly.
pub async fn batch_action(store: &dyn Store, tenant: &str, req: BatchRequest) -> Result<Simulation, ApiError> {
    let batch = crate::batch::process(store, tenant, req.simulations.clone(), req.stop_on_first_error.unwrap_or(false)).await?;
    let can_execute_all = batch.can_execute_all;
    let preview = Preview::Batch(batch);
    Ok(frame(
        tenant,
        ActionPayload::Batch(req),
        Some(preview),
        Vec::new(),
        if can_execute_all {
            Vec::new()
        } else {
            vec![sim_error(
                ErrorKind::BatchStopped,
                "one or more batch items cannot execute",
                json!({}),
            )]
        },
    ))
}
