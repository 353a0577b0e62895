//! Batch entity.

use crate::money::{Currency, Money};
use crate::store::simulation::{SimulationError, TransferPreview, Warning};
use crate::store::transfer::Rail;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub index: usize,
    pub can_execute: bool,
    pub preview: Option<TransferPreview>,
    pub warnings: Vec<Warning>,
    pub errors: Vec<SimulationError>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CurrencyAggregate {
    pub count: u32,
    pub total: Money,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchTotals {
    pub amount_by_currency: HashMap<Currency, Money>,
    pub fees_by_currency: HashMap<Currency, Money>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub by_currency: HashMap<Currency, CurrencyAggregate>,
    pub by_rail: HashMap<Rail, CurrencyAggregate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub tenant: String,
    pub total_count: usize,
    pub successful: usize,
    pub failed: usize,
    pub can_execute_all: bool,
    pub totals: BatchTotals,
    pub summary: BatchSummary,
    pub items: Vec<BatchItem>,
}
