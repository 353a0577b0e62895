//! Agent entity: a spending actor owned by a business account.

use crate::money::Money;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendingPolicy {
    pub daily_cap: Option<Money>,
    pub monthly_cap: Option<Money>,
    pub per_transaction_cap: Option<Money>,
    pub allowlist: Vec<String>,
    pub approval_threshold: Option<Money>,
}

impl Default for SpendingPolicy {
    fn default() -> Self {
        Self {
            daily_cap: None,
            monthly_cap: None,
            per_transaction_cap: None,
            allowlist: Vec::new(),
            approval_threshold: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub tenant: String,
    pub parent_account: String,
    pub status: AgentStatus,
    pub kya_tier: u8,
    pub spending_policy: SpendingPolicy,
    pub active_stream_count: u32,
}

impl Agent {
    pub fn has_active_streams(&self) -> bool {
        self.active_stream_count > 0
    }
}
