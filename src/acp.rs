//! ACP checkout lifecycle: a merchant-created cart
//! that an agent completes against a shared payment token.

use crate::error::{ApiError, ErrorKind};
use crate::ids;
use crate::money::{Currency, Money};
use crate::store::Store;
use crate::store::CheckoutCompletionOutcome;
use crate::store::agent::AgentStatus;
use crate::store::checkout::{Checkout, CheckoutItem, CheckoutStatus};
use crate::transfer_ops;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCheckoutRequest {
    pub merchant_id: String,
    pub agent_id: String,
    pub currency: Currency,
    pub items: Vec<CheckoutItem>,
    #[serde(default)]
    pub tax: Money,
    #[serde(default)]
    pub shipping: Money,
    #[serde(default)]
    pub discount: Money,
    /// Caller-asserted total, checked against the computed total.
    /// `AcpTotalMismatch` guards against client/server drift before a
    /// shared payment token is minted for it.
    pub total: Money,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteCheckoutRequest {
    pub shared_payment_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutCompletionResponse {
    pub checkout: Checkout,
    pub transfer_id: String,
}

fn computed_total(items: &[CheckoutItem], tax: Money, shipping: Money, discount: Money) -> Money {
    let subtotal: Money = items.iter().map(|i| Money::new(i.unit_price.0 * rust_decimal::Decimal::from(i.quantity))).sum();
    subtotal + tax + shipping - discount
}

/// Creates a pending checkout with a fresh opaque shared payment token. The
/// agent must be active and belong to the tenant creating the cart.
pub async fn create(store: &dyn Store, tenant: &str, req: CreateCheckoutRequest) -> Result<Checkout, ApiError> {
    let agent = store
        .get_agent(&req.agent_id)
        .await
        .ok_or_else(|| ApiError::not_found(ErrorKind::AgentNotFound, "agent_id", &req.agent_id))?;
    if agent.status != AgentStatus::Active {
        return Err(ApiError::new(ErrorKind::AgentSuspended, "agent is suspended"));
    }
    if req.items.is_empty() {
        return Err(ApiError::new(ErrorKind::ValidationError, "checkout must have at least one item"));
    }

    let subtotal: Money = req.items.iter().map(|i| Money::new(i.unit_price.0 * rust_decimal::Decimal::from(i.quantity))).sum();
    let total = computed_total(&req.items, req.tax, req.shipping, req.discount);
    if total.0 != req.total.0 {
        return Err(ApiError::new(ErrorKind::AcpTotalMismatch, "asserted total does not match computed total").with_details(
            serde_json::json!({"expected_total": total.to_string(), "actual_total": req.total.to_string()}),
        ));
    }
    if req.expires_at <= Utc::now() {
        return Err(ApiError::new(ErrorKind::ValidationError, "expires_at must be in the future"));
    }

    let checkout = Checkout {
        id: ids::checkout_id(),
        tenant: tenant.to_string(),
        merchant_id: req.merchant_id,
        agent_id: req.agent_id,
        currency: req.currency,
        items: req.items,
        subtotal,
        tax: req.tax,
        shipping: req.shipping,
        discount: req.discount,
        total,
        status: CheckoutStatus::Pending,
        shared_payment_token: format!("spt_{}", uuid::Uuid::new_v4().simple()),
        transfer_id: None,
        expires_at: req.expires_at,
    };
    store.put_checkout(checkout.clone()).await;
    Ok(checkout)
}

/// Completes a pending checkout: validates the bearer shared payment token,
/// settles the agent's parent account to the merchant, and transitions the
/// checkout atomically via `Store::try_complete_checkout`.
pub async fn complete(store: &dyn Store, tenant: &str, id: &str, req: CompleteCheckoutRequest) -> Result<CheckoutCompletionResponse, ApiError> {
    let checkout = store
        .get_checkout(id)
        .await
        .ok_or_else(|| ApiError::not_found(ErrorKind::CheckoutNotFound, "checkout_id", id))?;
    if checkout.tenant != tenant {
        return Err(ApiError::not_found(ErrorKind::CheckoutNotFound, "checkout_id", id));
    }
    if checkout.effective_status(Utc::now()) == CheckoutStatus::Expired {
        return Err(ApiError::new(ErrorKind::CheckoutExpired, "checkout has expired").with_details(serde_json::json!({"expires_at": checkout.expires_at})));
    }

    let agent = store
        .get_agent(&checkout.agent_id)
        .await
        .ok_or_else(|| ApiError::not_found(ErrorKind::AgentNotFound, "agent_id", &checkout.agent_id))?;
    let from_account = agent.parent_account.clone();
    let to_account = checkout.merchant_id.clone();
    let amount = checkout.total;
    let currency = checkout.currency;

    let outcome = store
        .try_complete_checkout(
            id,
            &req.shared_payment_token,
            Box::new(move || {
                let transfer = settle_blocking(store, &from_account, &to_account, amount, currency)?;
                Ok(transfer.id)
            }),
        )
        .await?;

    let CheckoutCompletionOutcome::Completed(checkout) = outcome;
    let transfer_id = checkout.transfer_id.clone().ok_or_else(|| ApiError::new(ErrorKind::UnexpectedState, "checkout completed without a transfer id"))?;
    Ok(CheckoutCompletionResponse { checkout, transfer_id })
}

/// `try_complete_checkout`'s closure runs synchronously under the checkout's
/// shard lock, mirroring AP2's `settle_blocking` (see `ap2.rs`).
fn settle_blocking(store: &dyn Store, from_account: &str, to_account: &str, amount: Money, currency: Currency) -> Result<crate::store::transfer::Transfer, ApiError> {
    futures::executor::block_on(transfer_ops::settle_flat(store, from_account, to_account, amount, currency))
}

pub async fn cancel(store: &dyn Store, tenant: &str, id: &str) -> Result<Checkout, ApiError> {
    let checkout = store
        .get_checkout(id)
        .await
        .ok_or_else(|| ApiError::not_found(ErrorKind::CheckoutNotFound, "checkout_id", id))?;
    if checkout.tenant != tenant {
        return Err(ApiError::not_found(ErrorKind::CheckoutNotFound, "checkout_id", id));
    }
    store.cancel_checkout(id).await
}

pub async fn get(store: &dyn Store, tenant: &str, id: &str) -> Result<Checkout, ApiError> {
    let checkout = store
        .get_checkout(id)
        .await
        .ok_or_else(|| ApiError::not_found(ErrorKind::CheckoutNotFound, "checkout_id", id))?;
    if checkout.tenant != tenant {
        return Err(ApiError::not_found(ErrorKind::CheckoutNotFound, "checkout_id", id));
    }
    let mut checkout = checkout;
    checkout.status = checkout.effective_status(Utc::now());
    Ok(checkout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::store::account::{Account, AccountStatus, AccountType, Balance};
    use crate::store::agent::{Agent, SpendingPolicy};
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
            account_type: AccountType::Business,
            status: AccountStatus::Active,
            verification_tier: 2,
            balances,
        }
    }

    fn agent(id: &str, parent: &str) -> Agent {
        Agent {
            id: id.to_string(),
            tenant: "t1".into(),
            parent_account: parent.to_string(),
            status: AgentStatus::Active,
            kya_tier: 2,
            spending_policy: SpendingPolicy::default(),
            active_stream_count: 0,
        }
    }

    fn item(price: &str, qty: u32) -> CheckoutItem {
        CheckoutItem {
            sku: "sku_1".into(),
            description: "widget".into(),
            quantity: qty,
            unit_price: price.parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn create_rejects_total_mismatch() {
        let store = InMemoryStore::new();
        store.put_agent(agent("agent_1", "acc_payer")).await;
        let err = create(
            store.as_ref(),
            "t1",
            CreateCheckoutRequest {
                merchant_id: "merchant_1".into(),
                agent_id: "agent_1".into(),
                currency: Currency::Usd,
                items: vec![item("10.00", 2)],
                tax: Money::ZERO,
                shipping: Money::ZERO,
                discount: Money::ZERO,
                total: Money::new(dec!(15)),
                expires_at: Utc::now() + chrono::Duration::hours(1),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::AcpTotalMismatch);
    }

    #[tokio::test]
    async fn complete_requires_matching_token_and_settles_funds() {
        let store = InMemoryStore::new();
        store.put_account(account("acc_payer", Money::new(dec!(1000)))).await;
        store.put_account(account("merchant_1", Money::ZERO)).await;
        store.put_agent(agent("agent_1", "acc_payer")).await;

        let checkout = create(
            store.as_ref(),
            "t1",
            CreateCheckoutRequest {
                merchant_id: "merchant_1".into(),
                agent_id: "agent_1".into(),
                currency: Currency::Usd,
                items: vec![item("20.00", 2)],
                tax: Money::ZERO,
                shipping: Money::ZERO,
                discount: Money::ZERO,
                total: Money::new(dec!(40)),
                expires_at: Utc::now() + chrono::Duration::hours(1),
            },
        )
        .await
        .unwrap();

        let bad_token = complete(
            store.as_ref(),
            "t1",
            &checkout.id,
            CompleteCheckoutRequest {
                shared_payment_token: "wrong".into(),
            },
        )
        .await;
        assert_eq!(bad_token.unwrap_err().kind, ErrorKind::AcpSharedTokenInvalid);

        let result = complete(
            store.as_ref(),
            "t1",
            &checkout.id,
            CompleteCheckoutRequest {
                shared_payment_token: checkout.shared_payment_token.clone(),
            },
        )
        .await
        .unwrap();
        assert_eq!(result.checkout.status, CheckoutStatus::Completed);

        let again = complete(
            store.as_ref(),
            "t1",
            &checkout.id,
            CompleteCheckoutRequest {
                shared_payment_token: checkout.shared_payment_token,
            },
        )
        .await;
        assert_eq!(again.unwrap_err().kind, ErrorKind::CheckoutNotPending);
    }

    #[tokio::test]
    async fn cancel_then_complete_is_rejected() {
        let store = InMemoryStore::new();
        store.put_account(account("acc_payer", Money::new(dec!(100)))).await;
        store.put_account(account("merchant_1", Money::ZERO)).await;
        store.put_agent(agent("agent_1", "acc_payer")).await;

        let checkout = create(
            store.as_ref(),
            "t1",
            CreateCheckoutRequest {
                merchant_id: "merchant_1".into(),
                agent_id: "agent_1".into(),
                currency: Currency::Usd,
                items: vec![item("10.00", 1)],
                tax: Money::ZERO,
                shipping: Money::ZERO,
                discount: Money::ZERO,
                total: Money::new(dec!(10)),
                expires_at: Utc::now() + chrono::Duration::hours(1),
            },
        )
        .await
        .unwrap();

        cancel(store.as_ref(), "t1", &checkout.id).await.unwrap();

        let err = complete(
            store.as_ref(),
            "t1",
            &checkout.id,
            CompleteCheckoutRequest {
                shared_payment_token: checkout.shared_payment_token,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::CheckoutNotPending);
    }
}
