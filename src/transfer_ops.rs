//! Shared transfer settlement, used by the AP2 and ACP lifecycles to move
//! balances and persist a completed [`Transfer`] outside the execution
//! gate's lock (those flows have their own atomic primitives —
//! `try_execute_mandate` for mandates, checkout completion for ACP — so
//! they settle through the regular async `Store` methods rather than the gate's
//! synchronous ones in `crate::execute`).

use crate::error::{ApiError, ErrorKind};
use crate::ids;
use crate::money::{Currency, Money};
use crate::store::Store;
use crate::store::transfer::{FeeBreakdown, Rail, Transfer, TransferStatus};
use chrono::Utc;
use serde::Deserialize;

/// Debits `from_account`, credits `to_account` at the quoted FX rate (if
/// cross-currency), and persists the resulting completed [`Transfer`].
pub async fn settle(
    store: &dyn Store,
    from_account: &str,
    to_account: &str,
    amount: Money,
    currency: Currency,
    destination_currency: Option<Currency>,
) -> Result<Transfer, ApiError> {
    let dest_currency = destination_currency.unwrap_or(currency);
    let fees = crate::simulate::fees::compute(amount, currency, dest_currency);
    let rail = crate::simulate::rails::select(currency, dest_currency);
    let fx_quote = crate::simulate::fx::quote(currency, dest_currency);
    let total_debit = amount + fees.total;

    store
        .apply_balance_update(
            from_account,
            currency,
            Box::new(move |mut balance| {
                if balance.available.0 < total_debit.0 {
                    return Err(ApiError::new(
                        crate::error::ErrorKind::InsufficientBalance,
                        "insufficient balance at settlement time",
                    ));
                }
                balance.available = balance.available - total_debit;
                Ok(balance)
            }),
        )
        .await?;

    let credit_amount = match &fx_quote {
        Some(q) => Money::new((amount.0 * crate::simulate::fx::effective_rate(q)).round_dp(2)),
        None => amount,
    };
    store
        .apply_balance_update(
            to_account,
            dest_currency,
            Box::new(move |mut balance| {
                balance.available = balance.available + credit_amount;
                Ok(balance)
            }),
        )
        .await?;

    let now = Utc::now();
    let transfer = Transfer {
        id: ids::transfer_id(),
        from_account: from_account.to_string(),
        to_account: to_account.to_string(),
        amount,
        currency,
        destination_currency,
        status: TransferStatus::Completed,
        rail,
        fees,
        fx_rate: fx_quote.map(|q| q.rate),
        created_at: now,
        completed_at: Some(now),
        failure_code: None,
    };
    store.put_transfer(transfer.clone()).await;
    Ok(transfer)
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTransferRequest {
    pub from_account: String,
    pub to_account: String,
    pub amount: Money,
    pub currency: Currency,
    pub destination_currency: Option<Currency>,
}

/// Direct transfer creation: re-runs the
/// simulation algorithm for validation, then settles immediately if it can
/// execute. Unlike `POST /v1/simulate/{id}/execute`, there is no quote to
/// freeze first — the caller is asking PayOS to move money now.
pub async fn create_direct(store: &dyn Store, tenant: &str, req: CreateTransferRequest) -> Result<Transfer, ApiError> {
    let simulation = crate::simulate::transfer(
        store,
        tenant,
        crate::store::simulation::TransferRequest {
            from_account: req.from_account.clone(),
            to_account: req.to_account.clone(),
            amount: req.amount,
            currency: req.currency,
            destination_currency: req.destination_currency,
        },
    )
    .await?;

    if !simulation.errors.is_empty() {
        let first = simulation.errors[0].clone();
        return Err(ApiError::new(first.kind, first.message).with_details(first.details));
    }

    settle(store, &req.from_account, &req.to_account, req.amount, req.currency, req.destination_currency).await
}

pub async fn get(store: &dyn Store, id: &str) -> Result<Transfer, ApiError> {
    store.get_transfer(id).await.ok_or_else(|| ApiError::not_found(ErrorKind::TransferNotFound, "transfer_id", id))
}

/// Cancels a transfer that has not yet reached a terminal state, reversing
/// any balance movement already applied by `settle`. Rejects with
/// `ErrorKind::TransferNotCancellable` for transfers already
/// `completed`/`failed`/`cancelled`.
///
/// Every transfer currently settles synchronously to `completed` (there is
/// no async rail-settlement worker modeled), so in practice this endpoint
/// only ever rejects with `TransferNotCancellable` — it exists so the
/// resource's full state machine is exercised and documented (see
/// DESIGN.md) rather than silently omitted.
pub async fn cancel(store: &dyn Store, id: &str) -> Result<Transfer, ApiError> {
    let transfer = get(store, id).await?;
    if transfer.status.is_terminal() {
        return Err(ApiError::new(ErrorKind::TransferNotCancellable, "transfer has already reached a terminal state")
            .with_details(serde_json::json!({"status": transfer.status})));
    }
    // The destination was credited at the quoted FX rate, not the source
    // amount, when currencies differ — reverse the same converted amount.
    let credited_amount = match transfer.fx_rate {
        Some(rate) => Money::new((transfer.amount.0 * rate).round_dp(2)),
        None => transfer.amount,
    };
    store
        .apply_balance_update(
            &transfer.to_account,
            transfer.destination_currency.unwrap_or(transfer.currency),
            Box::new(move |mut balance| {
                balance.available = balance.available - credited_amount;
                Ok(balance)
            }),
        )
        .await?;
    store
        .apply_balance_update(
            &transfer.from_account,
            transfer.currency,
            Box::new({
                let amount = transfer.amount + transfer.fees.total;
                move |mut balance| {
                    balance.available = balance.available + amount;
                    Ok(balance)
                }
            }),
        )
        .await?;

    let mut cancelled = transfer;
    cancelled.status = TransferStatus::Cancelled;
    store.put_transfer(cancelled.clone()).await;
    Ok(cancelled)
}

/// A same-currency, no-fee settlement used by AP2 mandate execution: funds
/// move without re-pricing FX/fees, since those were already fixed at
/// mandate authorization time.
pub async fn settle_flat(store: &dyn Store, from_account: &str, to_account: &str, amount: Money, currency: Currency) -> Result<Transfer, ApiError> {
    store
        .apply_balance_update(
            from_account,
            currency,
            Box::new(move |mut balance| {
                if balance.available.0 < amount.0 {
                    return Err(ApiError::new(crate::error::ErrorKind::InsufficientBalance, "insufficient balance at settlement time"));
                }
                balance.available = balance.available - amount;
                Ok(balance)
            }),
        )
        .await?;
    store
        .apply_balance_update(
            to_account,
            currency,
            Box::new(move |mut balance| {
                balance.available = balance.available + amount;
                Ok(balance)
            }),
        )
        .await?;

    let now = Utc::now();
    let transfer = Transfer {
        id: ids::transfer_id(),
        from_account: from_account.to_string(),
        to_account: to_account.to_string(),
        amount,
        currency,
        destination_currency: None,
        status: TransferStatus::Completed,
        rail: Rail::Internal,
        fees: FeeBreakdown {
            platform_fee: Money::ZERO,
            fx_fee: Money::ZERO,
            rail_fee: Money::ZERO,
            total: Money::ZERO,
            currency,
        },
        fx_rate: None,
        created_at: now,
        completed_at: Some(now),
        failure_code: None,
    };
    store.put_transfer(transfer.clone()).await;
    Ok(transfer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::store::account::{Account, AccountStatus, AccountType, Balance};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

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
            verification_tier: 2,
            balances,
        }
    }

    #[tokio::test]
    async fn create_direct_settles_a_valid_transfer() {
        let store = InMemoryStore::new();
        store.put_account(account("acc_1", Money::new(dec!(1000)))).await;
        store.put_account(account("acc_2", Money::ZERO)).await;

        let transfer = create_direct(
            store.as_ref(),
            "t1",
            CreateTransferRequest {
                from_account: "acc_1".into(),
                to_account: "acc_2".into(),
                amount: Money::new(dec!(100)),
                currency: Currency::Usd,
                destination_currency: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(transfer.status, TransferStatus::Completed);

        let payee = store.get_account("acc_2").await.unwrap();
        assert_eq!(payee.balance_for(Currency::Usd).available, Money::new(dec!(100)));
    }

    #[tokio::test]
    async fn create_direct_rejects_insufficient_balance() {
        let store = InMemoryStore::new();
        store.put_account(account("acc_1", Money::ZERO)).await;
        store.put_account(account("acc_2", Money::ZERO)).await;

        let err = create_direct(
            store.as_ref(),
            "t1",
            CreateTransferRequest {
                from_account: "acc_1".into(),
                to_account: "acc_2".into(),
                amount: Money::new(dec!(100)),
                currency: Currency::Usd,
                destination_currency: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InsufficientBalance);
    }

    #[tokio::test]
    async fn cancel_rejects_already_completed_transfer() {
        let store = InMemoryStore::new();
        store.put_account(account("acc_1", Money::new(dec!(1000)))).await;
        store.put_account(account("acc_2", Money::ZERO)).await;

        let transfer = create_direct(
            store.as_ref(),
            "t1",
            CreateTransferRequest {
                from_account: "acc_1".into(),
                to_account: "acc_2".into(),
                amount: Money::new(dec!(100)),
                currency: Currency::Usd,
                destination_currency: None,
            },
        )
        .await
        .unwrap();

        let err = cancel(store.as_ref(), &transfer.id).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::TransferNotCancellable);
    }
}
