//! Agent lifecycle operations: create/suspend/activate/delete for
//! the spending actors AP2 mandates and ACP checkouts act on behalf of.

use crate::error::{ApiError, ErrorKind};
use crate::ids;
use crate::store::Store;
use crate::store::account::AccountType;
use crate::store::agent::{Agent, AgentStatus, SpendingPolicy};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAgentRequest {
    pub parent_account: String,
    #[serde(default)]
    pub kya_tier: u8,
    #[serde(default)]
    pub spending_policy: SpendingPolicy,
}

/// Creates an agent under a business account. Agents are only ever owned
/// by a business account, never a person account.
pub async fn create(store: &dyn Store, tenant: &str, req: CreateAgentRequest) -> Result<Agent, ApiError> {
    let parent = store
        .get_account(&req.parent_account)
        .await
        .ok_or_else(|| ApiError::not_found(ErrorKind::AccountNotFound, "parent_account", &req.parent_account))?;
    if parent.account_type != AccountType::Business {
        return Err(ApiError::new(ErrorKind::ValidationError, "agents can only be created under a business account"));
    }

    let agent = Agent {
        id: ids::agent_id(),
        tenant: tenant.to_string(),
        parent_account: req.parent_account,
        status: AgentStatus::Active,
        kya_tier: req.kya_tier,
        spending_policy: req.spending_policy,
        active_stream_count: 0,
    };
    store.put_agent(agent.clone()).await;
    Ok(agent)
}

pub async fn get(store: &dyn Store, tenant: &str, id: &str) -> Result<Agent, ApiError> {
    let agent = store
        .get_agent(id)
        .await
        .ok_or_else(|| ApiError::not_found(ErrorKind::AgentNotFound, "agent_id", id))?;
    if agent.tenant != tenant {
        return Err(ApiError::not_found(ErrorKind::AgentNotFound, "agent_id", id));
    }
    Ok(agent)
}

/// Idempotent status transition; rejects a transition into the agent's
/// current status via `ErrorKind::AgentSameStateTransition`.
pub async fn suspend(store: &dyn Store, tenant: &str, id: &str) -> Result<Agent, ApiError> {
    transition(store, tenant, id, AgentStatus::Suspended).await
}

pub async fn activate(store: &dyn Store, tenant: &str, id: &str) -> Result<Agent, ApiError> {
    transition(store, tenant, id, AgentStatus::Active).await
}

async fn transition(store: &dyn Store, tenant: &str, id: &str, to: AgentStatus) -> Result<Agent, ApiError> {
    get(store, tenant, id).await?;
    store.transition_agent_status(id, to).await
}

/// Refuses deletion while the agent owns active managed streams.
pub async fn delete(store: &dyn Store, tenant: &str, id: &str) -> Result<(), ApiError> {
    get(store, tenant, id).await?;
    store.delete_agent(id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::store::account::{Account, AccountStatus, Balance};
    use std::collections::HashMap;

    fn business_account(id: &str) -> Account {
        Account {
            id: id.to_string(),
            tenant: "t1".into(),
            account_type: AccountType::Business,
            status: AccountStatus::Active,
            verification_tier: 2,
            balances: HashMap::new(),
        }
    }

    fn person_account(id: &str) -> Account {
        let mut account = business_account(id);
        account.account_type = AccountType::Person;
        account
    }

    #[tokio::test]
    async fn create_rejects_person_parent_account() {
        let store = InMemoryStore::new();
        store.put_account(person_account("acc_1")).await;
        let err = create(
            store.as_ref(),
            "t1",
            CreateAgentRequest {
                parent_account: "acc_1".into(),
                kya_tier: 1,
                spending_policy: SpendingPolicy::default(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn suspend_then_suspend_again_is_rejected() {
        let store = InMemoryStore::new();
        store.put_account(business_account("acc_1")).await;
        let agent = create(
            store.as_ref(),
            "t1",
            CreateAgentRequest {
                parent_account: "acc_1".into(),
                kya_tier: 1,
                spending_policy: SpendingPolicy::default(),
            },
        )
        .await
        .unwrap();

        let suspended = suspend(store.as_ref(), "t1", &agent.id).await.unwrap();
        assert_eq!(suspended.status, AgentStatus::Suspended);
        let err = suspend(store.as_ref(), "t1", &agent.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AgentSameStateTransition);

        let activated = activate(store.as_ref(), "t1", &agent.id).await.unwrap();
        assert_eq!(activated.status, AgentStatus::Active);
    }

    #[tokio::test]
    async fn delete_rejects_active_streams() {
        let store = InMemoryStore::new();
        store.put_account(business_account("acc_1")).await;
        let mut agent = create(
            store.as_ref(),
            "t1",
            CreateAgentRequest {
                parent_account: "acc_1".into(),
                kya_tier: 1,
                spending_policy: SpendingPolicy::default(),
            },
        )
        .await
        .unwrap();
        agent.active_stream_count = 1;
        store.put_agent(agent.clone()).await;

        let err = delete(store.as_ref(), "t1", &agent.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AgentHasActiveStreams);
    }
}
