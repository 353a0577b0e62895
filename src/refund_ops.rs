//! Direct refund creation: runs the same
//! eligibility algorithm the simulation engine uses, then settles
//! immediately rather than going through the execution gate — refunds
//! created this way are not preceded by a quote a caller needs to lock in.

use crate::error::{ApiError, ErrorKind};
use crate::ids;
use crate::simulate;
use crate::store::Store;
use crate::store::refund::Refund;
use crate::store::simulation::{Preview, RefundReason};
use crate::store::transfer::{FeeBreakdown, Rail, Transfer, TransferStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRefundRequest {
    pub original_transfer: String,
    pub amount: crate::money::Money,
    pub reason: RefundReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundResponse {
    pub refund: Refund,
    pub transfer: Transfer,
}

/// Re-runs `simulate::refund`'s eligibility checks for the requested amount
/// and, if they pass, reverses the original transfer's movement and
/// persists both the reversing [`Transfer`] and the [`Refund`] record.
pub async fn create(store: &dyn Store, tenant: &str, req: CreateRefundRequest) -> Result<RefundResponse, ApiError> {
    let simulation = simulate::refund(
        store,
        tenant,
        crate::store::simulation::RefundRequest {
            original_transfer: req.original_transfer.clone(),
            amount: req.amount,
            reason: req.reason,
        },
    )
    .await?;

    if !simulation.errors.is_empty() {
        let first = simulation.errors[0].clone();
        return Err(ApiError::new(first.kind, first.message).with_details(first.details));
    }

    let original = store
        .get_transfer(&req.original_transfer)
        .await
        .ok_or_else(|| ApiError::not_found(ErrorKind::OriginalTransferNotFound, "transfer_id", &req.original_transfer))?;

    store
        .apply_balance_update(
            &original.to_account,
            original.currency,
            Box::new(move |mut balance| {
                if balance.available.0 < req.amount.0 {
                    return Err(ApiError::new(ErrorKind::DestinationInsufficientBalance, "insufficient balance to fund refund"));
                }
                balance.available = balance.available - req.amount;
                Ok(balance)
            }),
        )
        .await?;
    store
        .apply_balance_update(
            &original.from_account,
            original.currency,
            Box::new(move |mut balance| {
                balance.available = balance.available + req.amount;
                Ok(balance)
            }),
        )
        .await?;

    let now = Utc::now();
    let transfer = Transfer {
        id: ids::transfer_id(),
        from_account: original.to_account.clone(),
        to_account: original.from_account.clone(),
        amount: req.amount,
        currency: original.currency,
        destination_currency: None,
        status: TransferStatus::Completed,
        rail: Rail::Internal,
        fees: FeeBreakdown {
            platform_fee: crate::money::Money::ZERO,
            fx_fee: crate::money::Money::ZERO,
            rail_fee: crate::money::Money::ZERO,
            total: crate::money::Money::ZERO,
            currency: original.currency,
        },
        fx_rate: None,
        created_at: now,
        completed_at: Some(now),
        failure_code: None,
    };
    store.put_transfer(transfer.clone()).await;

    let refund = Refund {
        id: ids::refund_id(),
        tenant: tenant.to_string(),
        original_transfer: req.original_transfer,
        amount: req.amount,
        reason: req.reason,
        created_at: now,
    };
    store.put_refund(refund.clone()).await;

    let _ = matches!(simulation.preview, Some(Preview::Refund(_)));
    Ok(RefundResponse { refund, transfer })
}

pub async fn get(store: &dyn Store, tenant: &str, id: &str) -> Result<Refund, ApiError> {
    let refund = store
        .get_refund(id)
        .await
        .ok_or_else(|| ApiError::not_found(ErrorKind::RefundNotFound, "refund_id", id))?;
    if refund.tenant != tenant {
        return Err(ApiError::not_found(ErrorKind::RefundNotFound, "refund_id", id));
    }
    Ok(refund)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::{Currency, Money};
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
    async fn full_refund_reverses_the_original_movement() {
        let store = InMemoryStore::new();
        store.put_account(account("acc_payer", Money::ZERO)).await;
        store.put_account(account("acc_payee", Money::new(dec!(100)))).await;
        let original = Transfer {
            id: "txn_1".into(),
            from_account: "acc_payer".into(),
            to_account: "acc_payee".into(),
            amount: Money::new(dec!(100)),
            currency: Currency::Usd,
            destination_currency: None,
            status: TransferStatus::Completed,
            rail: Rail::Internal,
            fees: FeeBreakdown {
                platform_fee: Money::ZERO,
                fx_fee: Money::ZERO,
                rail_fee: Money::ZERO,
                total: Money::ZERO,
                currency: Currency::Usd,
            },
            fx_rate: None,
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
            failure_code: None,
        };
        store.put_transfer(original.clone()).await;

        let result = create(
            store.as_ref(),
            "t1",
            CreateRefundRequest {
                original_transfer: "txn_1".into(),
                amount: Money::new(dec!(100)),
                reason: RefundReason::CustomerRequest,
            },
        )
        .await
        .unwrap();
        assert_eq!(result.transfer.from_account, "acc_payee");
        assert_eq!(result.transfer.to_account, "acc_payer");

        let payer = store.get_account("acc_payer").await.unwrap();
        assert_eq!(payer.balance_for(Currency::Usd).available, Money::new(dec!(100)));
    }

    #[tokio::test]
    async fn refund_exceeding_available_is_rejected() {
        let store = InMemoryStore::new();
        store.put_account(account("acc_payer", Money::ZERO)).await;
        store.put_account(account("acc_payee", Money::new(dec!(50)))).await;
        let original = Transfer {
            id: "txn_1".into(),
            from_account: "acc_payer".into(),
            to_account: "acc_payee".into(),
            amount: Money::new(dec!(50)),
            currency: Currency::Usd,
            destination_currency: None,
            status: TransferStatus::Completed,
            rail: Rail::Internal,
            fees: FeeBreakdown {
                platform_fee: Money::ZERO,
                fx_fee: Money::ZERO,
                rail_fee: Money::ZERO,
                total: Money::ZERO,
                currency: Currency::Usd,
            },
            fx_rate: None,
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
            failure_code: None,
        };
        store.put_transfer(original).await;

        let err = create(
            store.as_ref(),
            "t1",
            CreateRefundRequest {
                original_transfer: "txn_1".into(),
                amount: Money::new(dec!(75)),
                reason: RefundReason::Error,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::RefundAmountExceedsAvailable);
    }
}
