//! AP2 mandate lifecycle: create/execute/cancel a
//! pre-authorized agent spending envelope with cumulative, serialized spend.

use crate::error::{ApiError, ErrorKind};
use crate::ids;
use crate::money::{Currency, Money};
use crate::store::Store;
use crate::store::agent::AgentStatus;
use crate::store::mandate::{Mandate, MandateExecution, MandateStatus, MandateType};
use crate::transfer_ops;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMandateRequest {
    pub mandate_type: MandateType,
    pub agent_id: String,
    pub account_id: String,
    pub currency: Currency,
    pub authorized_amount: Money,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteMandateRequest {
    pub amount: Money,
    pub to_account: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MandateExecutionResponse {
    pub mandate: Mandate,
    pub execution: MandateExecution,
}

/// Mandate invariants: agent must be active, account must exist, amount
/// must be positive, `expires_at` must be in the future.
pub async fn create(store: &dyn Store, tenant: &str, req: CreateMandateRequest) -> Result<Mandate, ApiError> {
    let agent = store
        .get_agent(&req.agent_id)
        .await
        .ok_or_else(|| ApiError::not_found(ErrorKind::AgentNotFound, "agent_id", &req.agent_id))?;
    if agent.status != AgentStatus::Active {
        return Err(ApiError::new(ErrorKind::AgentSuspended, "agent is suspended"));
    }
    store
        .get_account(&req.account_id)
        .await
        .ok_or_else(|| ApiError::not_found(ErrorKind::AccountNotFound, "account_id", &req.account_id))?;
    if req.authorized_amount.is_zero() || req.authorized_amount.is_negative() {
        return Err(ApiError::new(ErrorKind::ValidationError, "authorized_amount must be positive"));
    }
    if req.expires_at <= Utc::now() {
        return Err(ApiError::new(ErrorKind::ValidationError, "expires_at must be in the future"));
    }
    if let Some(cap) = agent.spending_policy.per_transaction_cap {
        if req.authorized_amount.0 > cap.0 {
            return Err(ApiError::new(ErrorKind::AgentSpendingCapExceeded, "authorized_amount exceeds agent's per-transaction cap"));
        }
    }

    let mandate = Mandate {
        id: ids::mandate_id(),
        tenant: tenant.to_string(),
        mandate_type: req.mandate_type,
        agent_id: req.agent_id,
        account_id: req.account_id,
        currency: req.currency,
        authorized_amount: req.authorized_amount,
        used_amount: Money::ZERO,
        remaining_amount: req.authorized_amount,
        execution_count: 0,
        status: MandateStatus::Active,
        expires_at: req.expires_at,
        executions: Vec::new(),
    };
    store.put_mandate(mandate.clone()).await;
    Ok(mandate)
}

/// Executes a partial payment against the mandate's remaining envelope.
/// Serialized via `Store::try_execute_mandate`'s atomic conditional update
/// on `(status=active AND remaining_amount >= amount)`.
pub async fn execute(store: &dyn Store, tenant: &str, id: &str, req: ExecuteMandateRequest) -> Result<MandateExecutionResponse, ApiError> {
    let mandate = store
        .get_mandate(id)
        .await
        .ok_or_else(|| ApiError::not_found(ErrorKind::MandateNotFound, "mandate_id", id))?;
    if mandate.tenant != tenant {
        return Err(ApiError::not_found(ErrorKind::MandateNotFound, "mandate_id", id));
    }
    if mandate.effective_status(Utc::now()) == MandateStatus::Expired {
        return Err(ApiError::new(ErrorKind::MandateExpired, "mandate has expired"));
    }
    if req.amount.is_zero() || req.amount.is_negative() {
        return Err(ApiError::new(ErrorKind::ValidationError, "amount must be positive"));
    }

    let from_account = mandate.account_id.clone();
    let to_account = req.to_account.clone();
    let amount = req.amount;
    let currency = mandate.currency;

    let outcome = store
        .try_execute_mandate(
            id,
            amount,
            Box::new(move || {
                // Executions reuse the already fixed mandate currency and
                // move funds flat (no re-pricing FX/fees at execution time).
                let transfer = settle_blocking(store, &from_account, &to_account, amount, currency)?;
                Ok(transfer.id)
            }),
        )
        .await?;

    let crate::store::MandateExecutionOutcome::Applied(execution, mandate) = outcome;
    store.put_mandate(mandate.clone()).await;
    Ok(MandateExecutionResponse { mandate, execution })
}

/// `try_execute_mandate`'s closure is synchronous (it runs under the
/// mandate's shard lock), so the settlement itself must not await. We block
/// on the async settlement helper via `futures::executor::block_on` rather
/// than duplicating it as a sync primitive, since mandate settlement (unlike
/// the execution gate's) only ever touches two account balances with no FX
/// re-pricing and is cheap enough to not justify a second code path.
fn settle_blocking(
    store: &dyn Store,
    from_account: &str,
    to_account: &str,
    amount: Money,
    currency: Currency,
) -> Result<crate::store::transfer::Transfer, ApiError> {
    futures::executor::block_on(transfer_ops::settle_flat(store, from_account, to_account, amount, currency))
}

/// Cancels an active mandate.
pub async fn cancel(store: &dyn Store, tenant: &str, id: &str) -> Result<Mandate, ApiError> {
    let mandate = store
        .get_mandate(id)
        .await
        .ok_or_else(|| ApiError::not_found(ErrorKind::MandateNotFound, "mandate_id", id))?;
    if mandate.tenant != tenant {
        return Err(ApiError::not_found(ErrorKind::MandateNotFound, "mandate_id", id));
    }
    store.cancel_mandate(id).await
}

pub async fn get(store: &dyn Store, tenant: &str, id: &str) -> Result<Mandate, ApiError> {
    let mandate = store
        .get_mandate(id)
        .await
        .ok_or_else(|| ApiError::not_found(ErrorKind::MandateNotFound, "mandate_id", id))?;
    if mandate.tenant != tenant {
        return Err(ApiError::not_found(ErrorKind::MandateNotFound, "mandate_id", id));
    }
    let mut mandate = mandate;
    mandate.status = mandate.effective_status(Utc::now());
    Ok(mandate)
}
