//! Refund entity.

use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::simulation::RefundReason;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub tenant: String,
    pub original_transfer: String,
    pub amount: Money,
    pub reason: RefundReason,
    pub created_at: DateTime<Utc>,
}
