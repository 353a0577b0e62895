//! Persistence substitute.
//!
//! There is no external database in this system: the `Store` trait is the
//! seam a real persistence driver would sit behind. [`InMemoryStore`] is the
//! only implementation, backed by `dashmap::DashMap` so balance mutations
//! and the execution-gate transition can use a single entry-level lock as
//! their conditional-update primitive rather than a separate in-process lock
//! manager — the invariant lives in the store.

pub mod account;
pub mod agent;
pub mod batch;
pub mod checkout;
pub mod mandate;
pub mod refund;
pub mod simulation;
pub mod transfer;

use crate::error::{ApiError, ErrorKind};
use crate::money::{Currency, Money};
use account::{Account, Balance};
use agent::Agent;
use async_trait::async_trait;
use batch::Batch;
use checkout::Checkout;
use dashmap::DashMap;
use mandate::{Mandate, MandateExecution, MandateStatus};
use refund::Refund;
use simulation::{ExecutionResultRef, Simulation, SimulationStatus, Variance};
use std::sync::Arc;
use transfer::Transfer;

/// Result of a race on the execution gate's conditional transition.
pub enum ExecutionOutcome {
    Won(Simulation),
    AlreadyExecuted(Simulation),
}

/// Result of a race on a mandate's conditional spend update.
pub enum MandateExecutionOutcome {
    Applied(MandateExecution, Mandate),
}

/// Result of a race on a checkout's conditional completion, mirroring
/// `MandateExecutionOutcome`.
pub enum CheckoutCompletionOutcome {
    Completed(Checkout),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_account(&self, id: &str) -> Option<Account>;
    async fn put_account(&self, account: Account);
    async fn apply_balance_update(
        &self,
        account_id: &str,
        currency: Currency,
        apply: Box<dyn FnOnce(Balance) -> Result<Balance, ApiError> + Send>,
    ) -> Result<Balance, ApiError>;

    async fn get_transfer(&self, id: &str) -> Option<Transfer>;
    async fn put_transfer(&self, transfer: Transfer);
    async fn list_transfers_for_account(&self, account_id: &str) -> Vec<Transfer>;

    async fn get_simulation(&self, id: &str) -> Option<Simulation>;
    async fn put_simulation(&self, simulation: Simulation);
    /// Performs the execution gate's single conditional transition: exactly
    /// one concurrent caller observes `ExecutionOutcome::Won` for a given id.
    /// `apply` may borrow `self` (e.g. to call the synchronous balance
    /// helpers below) — it only needs to live for this call, hence the `'_`
    /// tied to `&self` rather than `'static`.
    async fn try_mark_executed(
        &self,
        id: &str,
        apply: Box<dyn FnOnce() -> Result<(ExecutionResultRef, Variance), ApiError> + Send + '_>,
    ) -> Result<ExecutionOutcome, ApiError>;
    /// Rolls a simulation back to `status=failed, executed=false` after the
    /// winner's resource-creation step fails.
    async fn rollback_execution(&self, id: &str);

    async fn get_batch(&self, id: &str) -> Option<Batch>;
    async fn put_batch(&self, batch: Batch);

    async fn get_mandate(&self, id: &str) -> Option<Mandate>;
    async fn put_mandate(&self, mandate: Mandate);
    /// Every mandate owned by `agent_id`: cumulative spend and
    /// remaining-spend eligibility are derived across all of an agent's
    /// mandates, not just one.
    async fn list_mandates_for_agent(&self, agent_id: &str) -> Vec<Mandate>;
    /// Atomically checks `status=active AND remaining_amount >= amount`,
    /// then applies `apply` and updates spend counters.
    async fn try_execute_mandate(
        &self,
        id: &str,
        amount: Money,
        apply: Box<dyn FnOnce() -> Result<String, ApiError> + Send + '_>,
    ) -> Result<MandateExecutionOutcome, ApiError>;
    async fn cancel_mandate(&self, id: &str) -> Result<Mandate, ApiError>;

    async fn get_checkout(&self, id: &str) -> Option<Checkout>;
    async fn put_checkout(&self, checkout: Checkout);
    /// Atomically checks `status=pending AND shared_payment_token matches`,
    /// then applies `apply` (the settlement) and transitions to completed
    ///, the same single-writer shape as `try_execute_mandate`.
    async fn try_complete_checkout(
        &self,
        id: &str,
        shared_payment_token: &str,
        apply: Box<dyn FnOnce() -> Result<String, ApiError> + Send + '_>,
    ) -> Result<CheckoutCompletionOutcome, ApiError>;
    async fn cancel_checkout(&self, id: &str) -> Result<Checkout, ApiError>;

    async fn get_agent(&self, id: &str) -> Option<Agent>;
    async fn put_agent(&self, agent: Agent);
    /// Idempotent status transition: rejects a transition into the agent's
    /// current status.
    async fn transition_agent_status(&self, id: &str, to: agent::AgentStatus) -> Result<Agent, ApiError>;
    /// Rejects deletion while the agent owns active managed streams.
    async fn delete_agent(&self, id: &str) -> Result<(), ApiError>;
    /// Every agent owned by `account_id` — backs the `agent_count > 10`
    /// risk flag without a dedicated index.
    async fn list_agents_for_account(&self, account_id: &str) -> Vec<Agent>;

    async fn get_refund(&self, id: &str) -> Option<Refund>;
    async fn put_refund(&self, refund: Refund);
    async fn list_refunds_for_transfer(&self, transfer_id: &str) -> Vec<Refund>;

    /// Synchronous balance/transfer primitives for use inside the closures
    /// passed to `try_mark_executed`/`try_execute_mandate`. Those closures
    /// run while the caller holds the simulation/mandate's shard lock, so
    /// they cannot `.await` — `dashmap::DashMap` access is non-blocking I/O
    /// regardless, so these are plain synchronous trait methods rather than
    /// async ones.
    fn debit_balance_sync(&self, account_id: &str, currency: Currency, amount: Money) -> Result<Balance, ApiError>;
    fn credit_balance_sync(&self, account_id: &str, currency: Currency, amount: Money) -> Result<Balance, ApiError>;
    fn get_transfer_sync(&self, id: &str) -> Option<Transfer>;
    fn put_transfer_sync(&self, transfer: Transfer);
    fn put_refund_sync(&self, refund: Refund);
}

#[derive(Default)]
pub struct InMemoryStore {
    accounts: DashMap<String, Account>,
    transfers: DashMap<String, Transfer>,
    simulations: DashMap<String, Simulation>,
    batches: DashMap<String, Batch>,
    mandates: DashMap<String, Mandate>,
    checkouts: DashMap<String, Checkout>,
    agents: DashMap<String, Agent>,
    refunds: DashMap<String, Refund>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_account(&self, id: &str) -> Option<Account> {
        self.accounts.get(id).map(|a| a.clone())
    }

    async fn put_account(&self, account: Account) {
        self.accounts.insert(account.id.clone(), account);
    }

    async fn apply_balance_update(
        &self,
        account_id: &str,
        currency: Currency,
        apply: Box<dyn FnOnce(Balance) -> Result<Balance, ApiError> + Send>,
    ) -> Result<Balance, ApiError> {
        let mut entry = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| ApiError::not_found(ErrorKind::AccountNotFound, "account_id", account_id))?;
        let current = entry.balance_for(currency);
        let updated = apply(current)?;
        entry.balances.insert(currency, updated);
        Ok(updated)
    }

    async fn get_transfer(&self, id: &str) -> Option<Transfer> {
        self.transfers.get(id).map(|t| t.clone())
    }

    async fn put_transfer(&self, transfer: Transfer) {
        self.transfers.insert(transfer.id.clone(), transfer);
    }

    async fn list_transfers_for_account(&self, account_id: &str) -> Vec<Transfer> {
        self.transfers
            .iter()
            .filter(|entry| entry.from_account == account_id || entry.to_account == account_id)
            .map(|entry| entry.clone())
            .collect()
    }

    async fn get_simulation(&self, id: &str) -> Option<Simulation> {
        self.simulations.get(id).map(|s| s.clone())
    }

    async fn put_simulation(&self, simulation: Simulation) {
        self.simulations.insert(simulation.id.clone(), simulation);
    }

    async fn try_mark_executed(
        &self,
        id: &str,
        apply: Box<dyn FnOnce() -> Result<(ExecutionResultRef, Variance), ApiError> + Send + '_>,
    ) -> Result<ExecutionOutcome, ApiError> {
        let mut entry = self
            .simulations
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(ErrorKind::SimulationNotFound, "simulation_id", id))?;
        if entry.executed {
            return Ok(ExecutionOutcome::AlreadyExecuted(entry.clone()));
        }
        // This closure runs while holding the shard lock for `id`, so only
        // one concurrent caller ever observes `executed == false` here.
        entry.executed = true;
        entry.status = SimulationStatus::Executed;
        match apply() {
            Ok((result_ref, variance)) => {
                entry.execution_result = Some(result_ref);
                entry.variance = Some(variance);
                Ok(ExecutionOutcome::Won(entry.clone()))
            }
            Err(err) => {
                entry.executed = false;
                entry.status = SimulationStatus::Failed;
                Err(err)
            }
        }
    }

    async fn rollback_execution(&self, id: &str) {
        if let Some(mut entry) = self.simulations.get_mut(id) {
            entry.executed = false;
            entry.status = SimulationStatus::Failed;
        }
    }

    async fn get_batch(&self, id: &str) -> Option<Batch> {
        self.batches.get(id).map(|b| b.clone())
    }

    async fn put_batch(&self, batch: Batch) {
        self.batches.insert(batch.id.clone(), batch);
    }

    async fn get_mandate(&self, id: &str) -> Option<Mandate> {
        self.mandates.get(id).map(|m| m.clone())
    }

    async fn put_mandate(&self, mandate: Mandate) {
        self.mandates.insert(mandate.id.clone(), mandate);
    }

    async fn list_mandates_for_agent(&self, agent_id: &str) -> Vec<Mandate> {
        self.mandates.iter().filter(|entry| entry.agent_id == agent_id).map(|entry| entry.clone()).collect()
    }

    async fn try_execute_mandate(
        &self,
        id: &str,
        amount: Money,
        apply: Box<dyn FnOnce() -> Result<String, ApiError> + Send + '_>,
    ) -> Result<MandateExecutionOutcome, ApiError> {
        let mut entry = self
            .mandates
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(ErrorKind::MandateNotFound, "mandate_id", id))?;
        if entry.status != MandateStatus::Active {
            return Err(ApiError::new(ErrorKind::MandateNotActive, "mandate is not active")
                .with_details(serde_json::json!({"status": entry.status})));
        }
        if amount.0 > entry.remaining_amount.0 {
            return Err(ApiError::new(ErrorKind::Ap2MandateExceeded, "amount exceeds remaining mandate balance")
                .with_details(serde_json::json!({
                    "remaining_amount": entry.remaining_amount.to_string(),
                    "requested_amount": amount.to_string(),
                })));
        }
        let transfer_id = apply()?;
        entry.used_amount = entry.used_amount + amount;
        entry.remaining_amount = entry.remaining_amount - amount;
        entry.execution_count += 1;
        if entry.remaining_amount.is_zero() {
            entry.status = MandateStatus::Completed;
        }
        let execution = MandateExecution {
            execution_index: entry.execution_count,
            transfer_id,
            amount,
            timestamp: chrono::Utc::now(),
            status: "completed".to_string(),
        };
        entry.executions.push(execution.clone());
        Ok(MandateExecutionOutcome::Applied(execution, entry.clone()))
    }

    async fn cancel_mandate(&self, id: &str) -> Result<Mandate, ApiError> {
        let mut entry = self
            .mandates
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(ErrorKind::MandateNotFound, "mandate_id", id))?;
        if entry.status != MandateStatus::Active {
            return Err(ApiError::new(ErrorKind::MandateNotActive, "mandate is not active")
                .with_details(serde_json::json!({"status": entry.status})));
        }
        entry.status = MandateStatus::Cancelled;
        Ok(entry.clone())
    }

    async fn get_checkout(&self, id: &str) -> Option<Checkout> {
        self.checkouts.get(id).map(|c| c.clone())
    }

    async fn put_checkout(&self, checkout: Checkout) {
        self.checkouts.insert(checkout.id.clone(), checkout);
    }

    async fn try_complete_checkout(
        &self,
        id: &str,
        shared_payment_token: &str,
        apply: Box<dyn FnOnce() -> Result<String, ApiError> + Send + '_>,
    ) -> Result<CheckoutCompletionOutcome, ApiError> {
        let mut entry = self
            .checkouts
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(ErrorKind::CheckoutNotFound, "checkout_id", id))?;
        if entry.effective_status(chrono::Utc::now()) != checkout::CheckoutStatus::Pending {
            return Err(ApiError::new(ErrorKind::CheckoutNotPending, "checkout is not pending")
                .with_details(serde_json::json!({"status": entry.status})));
        }
        if entry.shared_payment_token != shared_payment_token {
            return Err(ApiError::new(ErrorKind::AcpSharedTokenInvalid, "shared payment token does not match"));
        }
        let transfer_id = apply()?;
        entry.transfer_id = Some(transfer_id);
        entry.status = checkout::CheckoutStatus::Completed;
        Ok(CheckoutCompletionOutcome::Completed(entry.clone()))
    }

    async fn cancel_checkout(&self, id: &str) -> Result<Checkout, ApiError> {
        let mut entry = self
            .checkouts
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(ErrorKind::CheckoutNotFound, "checkout_id", id))?;
        if entry.effective_status(chrono::Utc::now()) != checkout::CheckoutStatus::Pending {
            return Err(ApiError::new(ErrorKind::CheckoutNotPending, "checkout is not pending")
                .with_details(serde_json::json!({"status": entry.status})));
        }
        entry.status = checkout::CheckoutStatus::Cancelled;
        Ok(entry.clone())
    }

    async fn get_agent(&self, id: &str) -> Option<Agent> {
        self.agents.get(id).map(|a| a.clone())
    }

    async fn put_agent(&self, agent: Agent) {
        self.agents.insert(agent.id.clone(), agent);
    }

    async fn transition_agent_status(&self, id: &str, to: agent::AgentStatus) -> Result<Agent, ApiError> {
        let mut entry = self
            .agents
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(ErrorKind::AgentNotFound, "agent_id", id))?;
        if entry.status == to {
            return Err(ApiError::new(ErrorKind::AgentSameStateTransition, "agent is already in that status")
                .with_details(serde_json::json!({"status": entry.status})));
        }
        entry.status = to;
        Ok(entry.clone())
    }

    async fn delete_agent(&self, id: &str) -> Result<(), ApiError> {
        let entry = self
            .agents
            .get(id)
            .ok_or_else(|| ApiError::not_found(ErrorKind::AgentNotFound, "agent_id", id))?;
        if entry.has_active_streams() {
            return Err(ApiError::new(ErrorKind::AgentHasActiveStreams, "agent owns active managed streams"));
        }
        drop(entry);
        self.agents.remove(id);
        Ok(())
    }

    async fn list_agents_for_account(&self, account_id: &str) -> Vec<Agent> {
        self.agents
            .iter()
            .filter(|entry| entry.parent_account == account_id)
            .map(|entry| entry.clone())
            .collect()
    }

    async fn get_refund(&self, id: &str) -> Option<Refund> {
        self.refunds.get(id).map(|r| r.clone())
    }

    async fn put_refund(&self, refund: Refund) {
        self.refunds.insert(refund.id.clone(), refund);
    }

    async fn list_refunds_for_transfer(&self, transfer_id: &str) -> Vec<Refund> {
        self.refunds
            .iter()
            .filter(|entry| entry.original_transfer == transfer_id)
            .map(|entry| entry.clone())
            .collect()
    }

    fn debit_balance_sync(&self, account_id: &str, currency: Currency, amount: Money) -> Result<Balance, ApiError> {
        let mut entry = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| ApiError::not_found(ErrorKind::AccountNotFound, "account_id", account_id))?;
        let mut balance = entry.balance_for(currency);
        if balance.available.0 < amount.0 {
            return Err(ApiError::new(ErrorKind::InsufficientBalance, "insufficient balance at execution time")
                .with_details(serde_json::json!({"shortfall": (amount - balance.available).to_string()})));
        }
        balance.available = balance.available - amount;
        entry.balances.insert(currency, balance);
        Ok(balance)
    }

    fn credit_balance_sync(&self, account_id: &str, currency: Currency, amount: Money) -> Result<Balance, ApiError> {
        let mut entry = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| ApiError::not_found(ErrorKind::AccountNotFound, "account_id", account_id))?;
        let mut balance = entry.balance_for(currency);
        balance.available = balance.available + amount;
        entry.balances.insert(currency, balance);
        Ok(balance)
    }

    fn get_transfer_sync(&self, id: &str) -> Option<Transfer> {
        self.transfers.get(id).map(|t| t.clone())
    }

    fn put_transfer_sync(&self, transfer: Transfer) {
        self.transfers.insert(transfer.id.clone(), transfer);
    }

    fn put_refund_sync(&self, refund: Refund) {
        self.refunds.insert(refund.id.clone(), refund);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use account::{AccountStatus, AccountType};
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
            verification_tier: 1,
            balances,
        }
    }

    #[tokio::test]
    async fn apply_balance_update_rejects_negative_available() {
        let store = InMemoryStore::new();
        store.put_account(account("acc_1", Money::new(dec!(100)))).await;
        let result = store
            .apply_balance_update(
                "acc_1",
                Currency::Usd,
                Box::new(|mut balance: Balance| {
                    if balance.available.0 < dec!(500) {
                        return Err(ApiError::new(ErrorKind::InsufficientBalance, "insufficient"));
                    }
                    balance.available = balance.available - Money::new(dec!(500));
                    Ok(balance)
                }),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn try_mark_executed_only_lets_one_caller_win() {
        let store = InMemoryStore::new();
        store
            .put_simulation(Simulation {
                id: "sim_1".into(),
                tenant: "t1".into(),
                action_payload: simulation::ActionPayload::Refund(simulation::RefundRequest {
                    original_transfer: "txn_1".into(),
                    amount: Money::ZERO,
                    reason: simulation::RefundReason::Other,
                }),
                status: SimulationStatus::Pending,
                can_execute: true,
                preview: None,
                warnings: vec![],
                errors: vec![],
                executed: false,
                execution_result: None,
                variance: None,
                created_at: chrono::Utc::now(),
                expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
            })
            .await;

        let first = store
            .try_mark_executed(
                "sim_1",
                Box::new(|| {
                    Ok((
                        ExecutionResultRef {
                            id: "txn_1".into(),
                            resource_type: "transfer".into(),
                        },
                        Variance {
                            fx_rate_change: None,
                            fee_change: None,
                            destination_amount_change: None,
                            timing_change: None,
                            variance_level: simulation::VarianceLevel::Low,
                        },
                    ))
                }),
            )
            .await
            .unwrap();
        assert!(matches!(first, ExecutionOutcome::Won(_)));

        let second = store
            .try_mark_executed(
                "sim_1",
                Box::new(|| panic!("should not run for the losing caller")),
            )
            .await
            .unwrap();
        assert!(matches!(second, ExecutionOutcome::AlreadyExecuted(_)));
    }

    #[tokio::test]
    async fn try_complete_checkout_only_lets_one_caller_win() {
        let store = InMemoryStore::new();
        store
            .put_checkout(checkout::Checkout {
                id: "checkout_1".into(),
                tenant: "t1".into(),
                merchant_id: "merchant_1".into(),
                agent_id: "agent_1".into(),
                currency: Currency::Usd,
                items: vec![],
                subtotal: Money::ZERO,
                tax: Money::ZERO,
                shipping: Money::ZERO,
                discount: Money::ZERO,
                total: Money::ZERO,
                status: checkout::CheckoutStatus::Pending,
                shared_payment_token: "spt_1".into(),
                transfer_id: None,
                expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
            })
            .await;

        let first = store
            .try_complete_checkout("checkout_1", "spt_1", Box::new(|| Ok("txn_1".to_string())))
            .await
            .unwrap();
        assert!(matches!(first, CheckoutCompletionOutcome::Completed(_)));

        let second = store.try_complete_checkout("checkout_1", "spt_1", Box::new(|| panic!("already completed"))).await;
        assert_eq!(second.unwrap_err().kind, ErrorKind::CheckoutNotPending);
    }

    #[tokio::test]
    async fn transition_agent_status_rejects_same_state() {
        let store = InMemoryStore::new();
        store
            .put_agent(agent::Agent {
                id: "agent_1".into(),
                tenant: "t1".into(),
                parent_account: "acc_1".into(),
                status: agent::AgentStatus::Active,
                kya_tier: 1,
                spending_policy: agent::SpendingPolicy::default(),
                active_stream_count: 0,
            })
            .await;
        let suspended = store.transition_agent_status("agent_1", agent::AgentStatus::Suspended).await.unwrap();
        assert_eq!(suspended.status, agent::AgentStatus::Suspended);
        let err = store.transition_agent_status("agent_1", agent::AgentStatus::Suspended).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AgentSameStateTransition);
    }
}
