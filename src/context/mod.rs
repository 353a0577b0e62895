//! Context aggregators.
//!
//! `/context/account/{id}`, `/context/transfer/{id}`, `/context/agent/{id}`,
//! and `/context/batch/{id}` each fan out concurrent reads across the
//! underlying stores and compose one denormalized response instead of
//! making a caller stitch several GETs together — the same motivation as
//! `cache.rs`'s bucket-keyed TTLs existing at all. The HTTP layer is what
//! actually caches the result; this module only computes it.
//!
//! Failure semantics: a sub-query failure degrades to a partial
//! response with that section omitted and `meta.partial = true`, except a
//! root-entity-not-found, which surfaces the ordinary `NotFound` error. The
//! in-memory `Store` only has one sub-query that can meaningfully fail this
//! way per aggregator — a foreign key pointing at a record that was deleted
//! out from under it (an orphaned agent's parent account, a transfer's
//! counterparty account) — everything else here is an infallible `DashMap`
//! scan and so never actually trips the partial path. See DESIGN.md.

use crate::error::{ApiError, ErrorKind};
use crate::money::{Currency, Money};
use crate::store::Store;
use crate::store::account::{Account, AccountStatus, AccountType};
use crate::store::agent::{Agent, AgentStatus};
use crate::store::batch::Batch;
use crate::store::mandate::{Mandate, MandateStatus};
use crate::store::refund::Refund;
use crate::store::transfer::{Transfer, TransferStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

const ACTIVITY_WINDOW_DAYS: i64 = 30;
const REFUND_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Level low 0, medium 1-2, high 3+.
    fn from_flag_count(n: usize) -> Self {
        match n {
            0 => RiskLevel::Low,
            1..=2 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub flags: Vec<String>,
    pub level: RiskLevel,
}

impl RiskAssessment {
    fn from_flags(flags: Vec<String>) -> Self {
        let level = RiskLevel::from_flag_count(flags.len());
        Self { flags, level }
    }
}

/// 30-day activity derived summary shared by account and agent context:
/// 30-day activity, success rate, and fee totals.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivitySummary {
    pub window_days: i64,
    pub transfer_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub success_rate: f64,
    pub volume_by_currency: HashMap<Currency, Money>,
    pub fees_by_currency: HashMap<Currency, Money>,
}

fn summarize_activity(transfers: &[Transfer], now: DateTime<Utc>) -> ActivitySummary {
    let cutoff = now - chrono::Duration::days(ACTIVITY_WINDOW_DAYS);
    let recent: Vec<&Transfer> = transfers.iter().filter(|t| t.created_at >= cutoff).collect();

    let mut summary = ActivitySummary {
        window_days: ACTIVITY_WINDOW_DAYS,
        transfer_count: recent.len(),
        ..Default::default()
    };
    for transfer in &recent {
        match transfer.status {
            TransferStatus::Completed => {
                summary.completed_count += 1;
                let volume = summary.volume_by_currency.entry(transfer.currency).or_insert(Money::ZERO);
                *volume = *volume + transfer.amount;
                let fees = summary.fees_by_currency.entry(transfer.fees.currency).or_insert(Money::ZERO);
                *fees = *fees + transfer.fees.total;
            }
            TransferStatus::Failed => summary.failed_count += 1,
            TransferStatus::Pending | TransferStatus::Processing | TransferStatus::Cancelled => {}
        }
    }
    summary.success_rate = if summary.transfer_count == 0 {
        0.0
    } else {
        summary.completed_count as f64 / summary.transfer_count as f64
    };
    summary
}

/// Trimmed-down account view used as a counterparty/parent reference from
/// the transfer and agent aggregators, so a caller doesn't have to follow up
/// with a second `/context/account/{id}` call just to see who they're
/// dealing with.
#[derive(Debug, Clone, Serialize)]
pub struct AccountRef {
    pub account_id: String,
    pub account_type: AccountType,
    pub status: AccountStatus,
    pub verification_tier: u8,
}

impl From<Account> for AccountRef {
    fn from(a: Account) -> Self {
        Self {
            account_id: a.id,
            account_type: a.account_type,
            status: a.status,
            verification_tier: a.verification_tier,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountContext {
    pub account: Account,
    pub activity: ActivitySummary,
    pub agent_count: usize,
    pub risk: RiskAssessment,
    pub available_actions: Vec<String>,
}

/// `Ok((context, partial))` — `partial` is true when a sub-query beyond the
/// root account fetch was degraded.
pub async fn account(store: &dyn Store, id: &str) -> Result<(AccountContext, bool), ApiError> {
    let account = store
        .get_account(id)
        .await
        .ok_or_else(|| ApiError::not_found(ErrorKind::AccountNotFound, "account_id", id))?;

    let (transfers, agents) = tokio::join!(store.list_transfers_for_account(id), store.list_agents_for_account(id),);
    let partial = false;

    let now = Utc::now();
    let activity = summarize_activity(&transfers, now);
    let agent_count = agents.len();

    let mut flags = Vec::new();
    if account.status != AccountStatus::Active {
        flags.push("suspended".to_string());
    }
    if account.verification_tier < 2 {
        flags.push("tier_below_2".to_string());
    }
    if agent_count > 10 {
        flags.push("agent_count_above_10".to_string());
    }
    let risk = RiskAssessment::from_flags(flags);

    let available_actions = match account.status {
        AccountStatus::Active => vec!["transfer".to_string(), "refund".to_string(), "create_agent".to_string()],
        AccountStatus::Suspended => vec!["reactivate".to_string()],
        AccountStatus::Closed => Vec::new(),
    };

    Ok((
        AccountContext {
            account,
            activity,
            agent_count,
            risk,
            available_actions,
        },
        partial,
    ))
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundEligibilitySummary {
    pub can_refund: bool,
    pub window_expires: DateTime<Utc>,
    pub max_refundable: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferContext {
    pub transfer: Transfer,
    pub refunds: Vec<Refund>,
    pub refunded_amount: Money,
    pub eligibility: Option<RefundEligibilitySummary>,
    pub from: Option<AccountRef>,
    pub to: Option<AccountRef>,
    pub available_actions: Vec<String>,
}

/// Transfer status to available-actions mapping: `pending→cancel,
/// completed→refund/dispute/receipt, failed→retry`. `processing` is treated
/// like `pending` (both are pre-terminal) and `cancelled` has no further
/// action.
fn transfer_available_actions(status: TransferStatus, still_refundable: bool) -> Vec<String> {
    match status {
        TransferStatus::Pending | TransferStatus::Processing => vec!["cancel".to_string()],
        TransferStatus::Completed => {
            let mut actions = vec!["dispute".to_string(), "receipt".to_string()];
            if still_refundable {
                actions.insert(0, "refund".to_string());
            }
            actions
        }
        TransferStatus::Failed => vec!["retry".to_string()],
        TransferStatus::Cancelled => Vec::new(),
    }
}

pub async fn transfer(store: &dyn Store, id: &str) -> Result<(TransferContext, bool), ApiError> {
    let transfer = store
        .get_transfer(id)
        .await
        .ok_or_else(|| ApiError::not_found(ErrorKind::TransferNotFound, "transfer_id", id))?;

    let (from_account, to_account, refunds) = tokio::join!(
        store.get_account(&transfer.from_account),
        store.get_account(&transfer.to_account),
        store.list_refunds_for_transfer(id),
    );

    let mut partial = false;
    let from = from_account.map(AccountRef::from);
    if from.is_none() {
        partial = true;
        tracing::warn!(transfer_id = %id, account_id = %transfer.from_account, "transfer context: source account missing, degrading to partial");
    }
    let to = to_account.map(AccountRef::from);
    if to.is_none() {
        partial = true;
        tracing::warn!(transfer_id = %id, account_id = %transfer.to_account, "transfer context: destination account missing, degrading to partial");
    }

    let refunded_amount: Money = refunds.iter().map(|r| r.amount).sum();
    let max_refundable = transfer.amount.checked_sub(refunded_amount).unwrap_or(Money::ZERO);

    let now = Utc::now();
    let eligibility = if matches!(transfer.status, TransferStatus::Completed | TransferStatus::Processing) {
        let window_expires = transfer
            .completed_at
            .map(|c| c + chrono::Duration::days(REFUND_WINDOW_DAYS))
            .unwrap_or(now + chrono::Duration::days(REFUND_WINDOW_DAYS));
        let within_window = now < window_expires;
        Some(RefundEligibilitySummary {
            can_refund: within_window && !max_refundable.is_zero(),
            window_expires,
            max_refundable,
        })
    } else {
        None
    };

    let still_refundable = eligibility.as_ref().map(|e| e.can_refund).unwrap_or(false);
    let available_actions = transfer_available_actions(transfer.status, still_refundable);

    Ok((
        TransferContext {
            transfer,
            refunds,
            refunded_amount,
            eligibility,
            from,
            to,
            available_actions,
        },
        partial,
    ))
}

#[derive(Debug, Clone, Serialize)]
pub struct MandateSpendSummary {
    pub mandate_count: usize,
    pub active_mandate_count: usize,
    pub cumulative_authorized: Money,
    pub cumulative_used: Money,
    pub cumulative_remaining: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentContext {
    pub agent: Agent,
    pub parent_account: Option<AccountRef>,
    pub spend: MandateSpendSummary,
    pub available_actions: Vec<String>,
}

/// Agent status to available-actions mapping: `active→make_payment,
/// suspended→activate`.
fn agent_available_actions(status: AgentStatus) -> Vec<String> {
    match status {
        AgentStatus::Active => vec!["make_payment".to_string()],
        AgentStatus::Suspended => vec!["activate".to_string()],
    }
}

pub async fn agent(store: &dyn Store, id: &str) -> Result<(AgentContext, bool), ApiError> {
    let agent = store.get_agent(id).await.ok_or_else(|| ApiError::not_found(ErrorKind::AgentNotFound, "agent_id", id))?;

    let (parent, mandates) = tokio::join!(store.get_account(&agent.parent_account), store.list_mandates_for_agent(id),);

    let mut partial = false;
    let parent_account = parent.map(AccountRef::from);
    if parent_account.is_none() {
        partial = true;
        tracing::warn!(agent_id = %id, account_id = %agent.parent_account, "agent context: parent account missing, degrading to partial");
    }

    let now = Utc::now();
    let active_mandate_count = mandates.iter().filter(|m| m.effective_status(now) == MandateStatus::Active).count();
    let cumulative_authorized: Money = mandates.iter().map(|m| m.authorized_amount).sum();
    let cumulative_used: Money = mandates.iter().map(|m| m.used_amount).sum();
    let cumulative_remaining: Money = mandates.iter().map(|m| m.remaining_amount).sum();

    let spend = MandateSpendSummary {
        mandate_count: mandates.len(),
        active_mandate_count,
        cumulative_authorized,
        cumulative_used,
        cumulative_remaining,
    };

    let available_actions = agent_available_actions(agent.status);

    Ok((
        AgentContext {
            agent,
            parent_account,
            spend,
            available_actions,
        },
        partial,
    ))
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchContext {
    pub batch: Batch,
    pub available_actions: Vec<String>,
}

/// Batch status to available-actions mapping: `any_failed→retry_failed,
/// any_pending→cancel_pending`. A batch's items are frozen simulation
/// previews (there is
/// no further pending-execution state once the batch request returns), so
/// "any_pending" only ever fires for an item whose preview says it
/// `can_execute` but the batch as a whole has not been executed — the
/// aggregator can't distinguish "not yet executed" from "executed"  without
/// an execution marker on `Batch` itself, so this reports `cancel_pending`
/// whenever not every item failed and not every item succeeded.
fn batch_available_actions(batch: &Batch) -> Vec<String> {
    let mut actions = Vec::new();
    if batch.failed > 0 {
        actions.push("retry_failed".to_string());
    }
    if batch.successful + batch.failed < batch.total_count {
        actions.push("cancel_pending".to_string());
    }
    actions
}

/// Batch context has no foreign-key sub-query that can fail independently
/// of the root fetch — a `Batch` embeds its own `items[]` — so `partial` is
/// always false here (see module docs).
pub async fn batch(store: &dyn Store, id: &str) -> Result<(BatchContext, bool), ApiError> {
    let batch = store.get_batch(id).await.ok_or_else(|| ApiError::not_found(ErrorKind::BatchNotFound, "batch_id", id))?;
    let available_actions = batch_available_actions(&batch);
    Ok((BatchContext { batch, available_actions }, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::store::account::Balance;
    use crate::store::agent::SpendingPolicy;
    use crate::store::transfer::{FeeBreakdown, Rail};
    use rust_decimal_macros::dec;
    use std::collections::HashMap as StdHashMap;

    fn business_account(id: &str, tier: u8) -> Account {
        Account {
            id: id.to_string(),
            tenant: "t1".into(),
            account_type: AccountType::Business,
            status: AccountStatus::Active,
            verification_tier: tier,
            balances: StdHashMap::new(),
        }
    }

    fn completed_transfer(from: &str, to: &str, amount: Money, days_ago: i64) -> Transfer {
        let completed_at = Utc::now() - chrono::Duration::days(days_ago);
        Transfer {
            id: format!("txn_{days_ago}"),
            from_account: from.to_string(),
            to_account: to.to_string(),
            amount,
            currency: Currency::Usd,
            destination_currency: None,
            status: TransferStatus::Completed,
            rail: Rail::Internal,
            fees: FeeBreakdown {
                platform_fee: Money::ZERO,
                fx_fee: Money::ZERO,
                rail_fee: Money::ZERO,
                total: Money::new(dec!(1)),
                currency: Currency::Usd,
            },
            fx_rate: None,
            created_at: completed_at,
            completed_at: Some(completed_at),
            failure_code: None,
        }
    }

    #[tokio::test]
    async fn account_context_flags_low_tier_and_is_not_found_for_missing_root() {
        let store = InMemoryStore::new();
        store.put_account(business_account("acc_1", 1)).await;

        let (ctx, partial) = account(store.as_ref(), "acc_1").await.unwrap();
        assert!(!partial);
        assert!(ctx.risk.flags.contains(&"tier_below_2".to_string()));
        assert_eq!(ctx.risk.level, RiskLevel::Medium);

        let err = account(store.as_ref(), "acc_missing").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AccountNotFound);
    }

    #[tokio::test]
    async fn account_context_only_counts_transfers_inside_the_window() {
        let store = InMemoryStore::new();
        store.put_account(business_account("acc_1", 2)).await;
        store.put_transfer(completed_transfer("acc_1", "acc_2", Money::new(dec!(100)), 5)).await;
        store.put_transfer(completed_transfer("acc_1", "acc_2", Money::new(dec!(50)), 90)).await;

        let (ctx, _) = account(store.as_ref(), "acc_1").await.unwrap();
        assert_eq!(ctx.activity.transfer_count, 1);
        assert_eq!(ctx.activity.completed_count, 1);
        assert_eq!(ctx.activity.success_rate, 1.0);
        assert_eq!(ctx.activity.volume_by_currency.get(&Currency::Usd).copied().unwrap(), Money::new(dec!(100)));
    }

    #[tokio::test]
    async fn transfer_context_degrades_to_partial_when_a_counterparty_is_missing() {
        let store = InMemoryStore::new();
        store.put_account(business_account("acc_1", 2)).await;
        // acc_2 deliberately not stored.
        store.put_transfer(completed_transfer("acc_1", "acc_2", Money::new(dec!(100)), 1)).await;

        let (ctx, partial) = transfer(store.as_ref(), "txn_1").await.unwrap();
        assert!(partial);
        assert!(ctx.to.is_none());
        assert!(ctx.from.is_some());
        assert!(ctx.available_actions.contains(&"refund".to_string()));
    }

    #[tokio::test]
    async fn agent_context_sums_spend_across_mandates() {
        let store = InMemoryStore::new();
        store.put_account(business_account("acc_1", 2)).await;
        let agent = Agent {
            id: "agent_1".into(),
            tenant: "t1".into(),
            parent_account: "acc_1".into(),
            status: AgentStatus::Active,
            kya_tier: 1,
            spending_policy: SpendingPolicy::default(),
            active_stream_count: 0,
        };
        store.put_agent(agent).await;
        store
            .put_mandate(Mandate {
                id: "mandate_1".into(),
                tenant: "t1".into(),
                mandate_type: crate::store::mandate::MandateType::Intent,
                agent_id: "agent_1".into(),
                account_id: "acc_1".into(),
                currency: Currency::Usd,
                authorized_amount: Money::new(dec!(1000)),
                used_amount: Money::new(dec!(400)),
                remaining_amount: Money::new(dec!(600)),
                execution_count: 1,
                status: MandateStatus::Active,
                expires_at: Utc::now() + chrono::Duration::days(30),
                executions: Vec::new(),
            })
            .await;

        let (ctx, partial) = agent(store.as_ref(), "agent_1").await.unwrap();
        assert!(!partial);
        assert_eq!(ctx.spend.cumulative_remaining, Money::new(dec!(600)));
        assert_eq!(ctx.available_actions, vec!["make_payment".to_string()]);
    }

    #[tokio::test]
    async fn batch_context_reports_retry_failed_when_any_item_failed() {
        let store = InMemoryStore::new();
        store
            .put_batch(Batch {
                id: "batch_1".into(),
                tenant: "t1".into(),
                total_count: 3,
                successful: 2,
                failed: 1,
                can_execute_all: false,
                totals: Default::default(),
                summary: Default::default(),
                items: Vec::new(),
            })
            .await;

        let (ctx, partial) = batch(store.as_ref(), "batch_1").await.unwrap();
        assert!(!partial);
        assert!(ctx.available_actions.contains(&"retry_failed".to_string()));
        assert!(!ctx.available_actions.contains(&"cancel_pending".to_string()));
    }
}
