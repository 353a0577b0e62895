//! Execution gate: materializes a frozen [`Simulation`]
//! into real state exactly once under concurrent callers.

use crate::error::{ApiError, ErrorKind};
use crate::ids;
use crate::money::Money;
use crate::simulate;
use crate::store::Store;
use crate::store::simulation::{
    ActionPayload, ExecutionResultRef, Preview, RefundRequest, Simulation, TransferRequest, Variance, VarianceLevel,
};
use crate::store::transfer::{Transfer, TransferStatus};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecutionResponse {
    pub simulation_id: String,
    pub status: String,
    pub execution_result: ExecutionResultRef,
    pub variance: Option<Variance>,
    pub resource_url: String,
    /// Not part of the wire response; tells the HTTP layer whether to answer
    /// 201 (winner) or 200 (idempotent replay).
    #[serde(skip)]
    pub already_executed: bool,
}

/// Runs the five pre-flight checks then the atomic transition.
pub async fn execute_simulation(store: &dyn Store, tenant: &str, id: &str) -> Result<ExecutionResponse, ApiError> {
    let now = Utc::now();

    // 1. exists
    let simulation = store
        .get_simulation(id)
        .await
        .ok_or_else(|| ApiError::not_found(ErrorKind::SimulationNotFound, "simulation_id", id))?;
    if simulation.tenant != tenant {
        return Err(ApiError::not_found(ErrorKind::SimulationNotFound, "simulation_id", id));
    }

    // Already executed: replay the persisted result rather than re-validating
    //.
    if simulation.executed {
        return Ok(replay_response(&simulation));
    }

    // 2. not expired
    if simulation.is_expired(now) {
        return Err(ApiError::new(ErrorKind::SimulationExpired, "simulation has expired")
            .with_details(json!({"expires_at": simulation.expires_at})));
    }

    // 3. can_execute
    if !simulation.can_execute {
        return Err(ApiError::new(ErrorKind::SimulationCannotExecute, "simulation cannot be executed")
            .with_details(json!({"errors": simulation.errors})));
    }

    // 4. re-simulate and compute variance, rejecting on drift or new errors
    let current = resimulate(store, tenant, &simulation).await?;
    let variance = check_variance(&simulation, &current)?;

    // 5-8. atomic transition: the closure runs while `try_mark_executed`
    // holds the simulation's shard lock, so it performs the actual balance
    // movement and resource creation synchronously through the sync store
    // primitives rather than re-entering the async Store methods.
    let payload = simulation.action_payload.clone();
    let resource_type = payload.action_type().to_string();
    let tenant_owned = tenant.to_string();
    let outcome = store
        .try_mark_executed(id, Box::new(move || materialize(store, &tenant_owned, payload, variance)))
        .await?;

    match outcome {
        crate::store::ExecutionOutcome::Won(sim) => {
            let result = sim
                .execution_result
                .clone()
                .ok_or_else(|| ApiError::new(ErrorKind::UnexpectedState, "execution result missing after win"))?;
            Ok(ExecutionResponse {
                simulation_id: sim.id.clone(),
                status: "executed".to_string(),
                resource_url: format!("/v1/{}s/{}", resource_type, result.id),
                execution_result: result,
                variance: sim.variance.clone(),
                already_executed: false,
            })
        }
        crate::store::ExecutionOutcome::AlreadyExecuted(sim) => Ok(replay_response(&sim)),
    }
}

fn replay_response(simulation: &Simulation) -> ExecutionResponse {
    let result = simulation.execution_result.clone().unwrap_or(ExecutionResultRef {
        id: simulation.id.clone(),
        resource_type: "unknown".to_string(),
    });
    ExecutionResponse {
        simulation_id: simulation.id.clone(),
        status: "already executed".to_string(),
        resource_url: format!("/v1/{}s/{}", result.resource_type, result.id),
        execution_result: result,
        variance: simulation.variance.clone(),
        already_executed: true,
    }
}

/// Re-runs the simulation algorithm against current state, without persisting.
async fn resimulate(store: &dyn Store, tenant: &str, simulation: &Simulation) -> Result<Simulation, ApiError> {
    match simulation.action_payload.clone() {
        ActionPayload::Transfer(req) => simulate::transfer(store, tenant, req).await,
        ActionPayload::Refund(req) => simulate::refund(store, tenant, req).await,
        ActionPayload::Stream(_) | ActionPayload::Batch(_) => Err(ApiError::new(
            ErrorKind::UnsupportedResourceType,
            "this simulation type cannot be executed, only simulated",
        )),
    }
}

/// Variance thresholds for re-simulation drift. Blocks on excessive drift;
/// otherwise returns the `low`/`medium` variance that step 8 attaches to the
/// executed simulation. `VarianceLevel::High` is never produced here: by the
/// time drift is large enough to qualify, one of the blocking checks above
/// has already rejected the execution (see DESIGN.md).
fn check_variance(original: &Simulation, current: &Simulation) -> Result<Variance, ApiError> {
    if !current.errors.is_empty() {
        return Err(ApiError::new(ErrorKind::SimulationStale, "new terminal errors appeared on re-simulation").with_details(json!({
            "original_preview": original.preview,
            "current_preview": current.preview,
            "errors": current.errors,
        })));
    }

    let (fx_before, fee_before) = preview_fx_and_fee(original.preview.as_ref());
    let (fx_after, fee_after) = preview_fx_and_fee(current.preview.as_ref());

    let mut fx_rate_change: Option<Decimal> = None;
    if let (Some(before), Some(after)) = (fx_before, fx_after) {
        let drift_pct = ((after - before) / before * dec!(100)).abs();
        if drift_pct > dec!(2) {
            return Err(ApiError::new(ErrorKind::SimulationFxVarianceExceeded, "fx rate drifted beyond tolerance")
                .with_details(json!({"original_rate": before, "current_rate": after})));
        }
        fx_rate_change = Some(after - before);
    }

    let mut fee_change: Option<Money> = None;
    if let (Some(before), Some(after)) = (fee_before, fee_after) {
        let drift = (after.0 - before.0).abs();
        let tolerance = dec!(5).max(before.0 * dec!(0.10));
        if drift > tolerance {
            return Err(ApiError::new(ErrorKind::SimulationFeeVarianceExceeded, "fee drifted beyond tolerance")
                .with_details(json!({"original_fee": before, "current_fee": after})));
        }
        fee_change = Some(Money::new(after.0 - before.0));
    }

    let fx_drift_pct = fx_rate_change
        .zip(fx_before)
        .map(|(change, before)| (change / before * dec!(100)).abs())
        .unwrap_or(Decimal::ZERO);
    let fee_drift_abs = fee_change.map(|m| m.0.abs()).unwrap_or(Decimal::ZERO);

    let variance_level = if fx_drift_pct > dec!(0.5) || fee_drift_abs > dec!(1) {
        VarianceLevel::Medium
    } else {
        VarianceLevel::Low
    };

    Ok(Variance {
        fx_rate_change,
        fee_change,
        destination_amount_change: None,
        timing_change: None,
        variance_level,
    })
}

fn preview_fx_and_fee(preview: Option<&Preview>) -> (Option<Decimal>, Option<Money>) {
    match preview {
        Some(Preview::Transfer(t)) => (t.fx.map(|fx| fx.rate), Some(t.fees.total)),
        _ => (None, None),
    }
}

/// Runs while the simulation's shard lock is held (see `Store::try_mark_executed`).
/// Moves balances and creates the settled resource synchronously, so the
/// whole materialization is indivisible from the exactly-once flag flip.
fn materialize(
    store: &dyn Store,
    tenant: &str,
    payload: ActionPayload,
    variance: Variance,
) -> Result<(ExecutionResultRef, Variance), ApiError> {
    let result = match payload {
        ActionPayload::Transfer(req) => {
            let transfer = create_transfer_sync(store, &req)?;
            ExecutionResultRef {
                id: transfer.id,
                resource_type: "transfer".to_string(),
            }
        }
        ActionPayload::Refund(req) => {
            let transfer = create_refund_sync(store, tenant, &req)?;
            ExecutionResultRef {
                id: transfer.id,
                resource_type: "transfer".to_string(),
            }
        }
        ActionPayload::Stream(_) | ActionPayload::Batch(_) => {
            return Err(ApiError::new(
                ErrorKind::UnsupportedResourceType,
                "this simulation type cannot be executed, only simulated",
            ));
        }
    };
    Ok((result, variance))
}

/// Debits `from_account`, credits `to_account` (at the FX-converted amount
/// when currencies differ) and persists the resulting [`Transfer`].
fn create_transfer_sync(store: &dyn Store, req: &TransferRequest) -> Result<Transfer, ApiError> {
    let destination_currency = req.destination_currency.unwrap_or(req.currency);
    let fees = crate::simulate::fees::compute(req.amount, req.currency, destination_currency);
    let rail = crate::simulate::rails::select(req.currency, destination_currency);
    let fx_quote = crate::simulate::fx::quote(req.currency, destination_currency);
    let total_debit = req.amount + fees.total;

    store.debit_balance_sync(&req.from_account, req.currency, total_debit)?;

    let credit_amount = match &fx_quote {
        Some(q) => Money::new((req.amount.0 * crate::simulate::fx::effective_rate(q)).round_dp(2)),
        None => req.amount,
    };
    store.credit_balance_sync(&req.to_account, destination_currency, credit_amount)?;

    let now = Utc::now();
    let transfer = Transfer {
        id: ids::transfer_id(),
        from_account: req.from_account.clone(),
        to_account: req.to_account.clone(),
        amount: req.amount,
        currency: req.currency,
        destination_currency: req.destination_currency,
        status: TransferStatus::Completed,
        rail,
        fees,
        fx_rate: fx_quote.map(|q| q.rate),
        created_at: now,
        completed_at: Some(now),
        failure_code: None,
    };
    store.put_transfer_sync(transfer.clone());
    Ok(transfer)
}

/// Reverses the original transfer's movement (debits its `to_account`,
/// credits its `from_account`) and persists both the reversing [`Transfer`]
/// and the [`crate::store::refund::Refund`] record.
fn create_refund_sync(store: &dyn Store, tenant: &str, req: &RefundRequest) -> Result<Transfer, ApiError> {
    let original = store
        .get_transfer_sync(&req.original_transfer)
        .ok_or_else(|| ApiError::not_found(ErrorKind::OriginalTransferNotFound, "transfer_id", &req.original_transfer))?;

    store.debit_balance_sync(&original.to_account, original.currency, req.amount)
        .map_err(|_| ApiError::new(ErrorKind::DestinationInsufficientBalance, "insufficient balance to fund refund"))?;
    store.credit_balance_sync(&original.from_account, original.currency, req.amount)?;

    let now = Utc::now();
    let transfer = Transfer {
        id: ids::transfer_id(),
        from_account: original.to_account.clone(),
        to_account: original.from_account.clone(),
        amount: req.amount,
        currency: original.currency,
        destination_currency: None,
        status: TransferStatus::Completed,
        rail: crate::store::transfer::Rail::Internal,
        fees: crate::store::transfer::FeeBreakdown {
            platform_fee: Money::ZERO,
            fx_fee: Money::ZERO,
            rail_fee: Money::ZERO,
            total: Money::ZERO,
            currency: original.currency,
        },
        fx_rate: None,
        created_at: now,
        completed_at: Some(now),
        failure_code: None,
    };
    store.put_transfer_sync(transfer.clone());

    let refund = crate::store::refund::Refund {
        id: ids::refund_id(),
        tenant: tenant.to_string(),
        original_transfer: req.original_transfer.clone(),
        amount: req.amount,
        reason: req.reason,
        created_at: now,
    };
    store.put_refund_sync(refund);

    Ok(transfer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use crate::simulate;
    use crate::store::InMemoryStore;
    use crate::store::account::{Account, AccountStatus, AccountType, Balance};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn account(id: &str, available: Money) -> Account {
        let mut balances = HashMap::new();
        balances.insert(
            Currency::Usd,
            Balance {
                available,
                pending_in: Money::ZERO,
                pending_out: Money::ZERO,
                holds: Money::ZERO,
            },
        );
        Account {
            id: id.to_string(),
            tenant: "t1".into(),
            account_type: AccountType::Person,
            status: AccountStatus::Active,
            verification_tier: 3,
            balances,
        }
    }

    #[tokio::test]
    async fn concurrent_execute_calls_all_win_exactly_once() {
        let store = InMemoryStore::new();
        store.put_account(account("acc_1", Money::new(dec!(1000)))).await;
        store.put_account(account("acc_2", Money::new(dec!(0)))).await;

        let simulation = simulate::transfer(
            store.as_ref(),
            "t1",
            TransferRequest {
                from_account: "acc_1".into(),
                to_account: "acc_2".into(),
                amount: Money::new(dec!(10)),
                currency: Currency::Usd,
                destination_currency: None,
            },
        )
        .await
        .unwrap();
        assert!(simulation.can_execute);
        let simulation_id = simulation.id.clone();
        store.put_simulation(simulation).await;

        let store: Arc<dyn Store> = store;
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = Arc::clone(&store);
                let simulation_id = simulation_id.clone();
                tokio::spawn(async move { execute_simulation(store.as_ref(), "t1", &simulation_id).await })
            })
            .collect();

        let results: Vec<ExecutionResponse> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        let winners = results.iter().filter(|r| !r.already_executed).count();
        let replays = results.iter().filter(|r| r.already_executed).count();
        assert_eq!(winners, 1);
        assert_eq!(replays, 9);

        let resource_ids: std::collections::HashSet<_> = results.iter().map(|r| r.execution_result.id.clone()).collect();
        assert_eq!(resource_ids.len(), 1, "all callers must observe the same executed resource");

        let transfers = store.list_transfers_for_account("acc_1").await;
        assert_eq!(transfers.len(), 1, "materialization must run exactly once");
    }
}
