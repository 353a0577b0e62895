//! Batch processor.
//!
//! Processes a list of transfer requests strictly in order, against a
//! cumulative in-process ledger: request 2 sees the projected balance left
//! over after request 1 debits it, even though nothing is persisted to the
//! [`Store`] until the execution gate actually runs — balances are treated
//! cumulatively across the batch, never independently per item.

use crate::error::{ApiError, ErrorKind};
use crate::ids;
use crate::money::{Currency, Money};
use crate::simulate::{fees, fx, limits, rails, warnings};
use crate::store::Store;
use crate::store::account::Account;
use crate::store::batch::{Batch, BatchItem, BatchSummary, BatchTotals, CurrencyAggregate};
use crate::store::simulation::{AccountBalanceProjection, FxProjection, TimingProjection, TransferPreview, TransferRequest};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;

const MIN_ITEMS: usize = 1;
const MAX_ITEMS: usize = 1000;

/// Tracks running available balances within a single batch run, seeded
/// lazily from the store on first touch so unrelated accounts are never
/// fetched.
struct Ledger<'a> {
    store: &'a dyn Store,
    balances: HashMap<(String, Currency), Money>,
    accounts: HashMap<String, Option<Account>>,
}

impl<'a> Ledger<'a> {
    fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            balances: HashMap::new(),
            accounts: HashMap::new(),
        }
    }

    async fn account(&mut self, id: &str) -> Option<Account> {
        if let Some(existing) = self.accounts.get(id) {
            return existing.clone();
        }
        let fetched = self.store.get_account(id).await;
        self.accounts.insert(id.to_string(), fetched.clone());
        fetched
    }

    async fn balance(&mut self, account_id: &str, currency: Currency) -> Money {
        let key = (account_id.to_string(), currency);
        if let Some(existing) = self.balances.get(&key) {
            return *existing;
        }
        let initial = self
            .account(account_id)
            .await
            .map(|a| a.balance_for(currency).available)
            .unwrap_or(Money::ZERO);
        self.balances.insert(key, initial);
        initial
    }

    fn debit(&mut self, account_id: &str, currency: Currency, amount: Money) {
        let key = (account_id.to_string(), currency);
        let entry = self.balances.entry(key).or_insert(Money::ZERO);
        *entry = entry.checked_sub(amount).unwrap_or(Money::ZERO);
    }

    fn credit(&mut self, account_id: &str, currency: Currency, amount: Money) {
        let key = (account_id.to_string(), currency);
        let entry = self.balances.entry(key).or_insert(Money::ZERO);
        *entry = *entry + amount;
    }
}

/// Processes `requests` in order, stopping early when `stop_on_first_error`
/// is set and an item cannot execute.
pub async fn process(store: &dyn Store, tenant: &str, requests: Vec<TransferRequest>, stop_on_first_error: bool) -> Result<Batch, ApiError> {
    if requests.len() < MIN_ITEMS || requests.len() > MAX_ITEMS {
        return Err(ApiError::new(ErrorKind::BatchSizeInvalid, "batch size out of bounds").with_details(json!({
            "min": MIN_ITEMS,
            "max": MAX_ITEMS,
            "actual": requests.len(),
        })));
    }

    let total_count = requests.len();
    let mut ledger = Ledger::new(store);
    let mut items = Vec::with_capacity(total_count);
    let mut stopped_early = false;

    for (index, req) in requests.into_iter().enumerate() {
        if stopped_early {
            items.push(BatchItem {
                index,
                can_execute: false,
                preview: None,
                warnings: Vec::new(),
                errors: vec![crate::simulate::sim_error(
                    ErrorKind::BatchStopped,
                    "batch stopped after an earlier item failed",
                    json!({"stopped_at_index": index}),
                )],
            });
            continue;
        }
        let item = process_one(&mut ledger, store, index, req).await;
        let can_execute = item.can_execute;
        items.push(item);
        if stop_on_first_error && !can_execute {
            stopped_early = true;
        }
    }

    let successful = items.iter().filter(|i| i.can_execute).count();
    let failed = items.len() - successful;
    let can_execute_all = !stopped_early && failed == 0 && items.len() == total_count;

    let mut totals = BatchTotals::default();
    let mut summary = BatchSummary::default();
    for item in &items {
        if !item.can_execute {
            continue;
        }
        if let Some(preview) = &item.preview {
            let currency = preview.fees.currency;
            let amount_entry = totals.amount_by_currency.entry(currency).or_insert(Money::ZERO);
            *amount_entry = *amount_entry + preview.destination.balance_after.checked_sub(preview.destination.balance_before).unwrap_or(Money::ZERO);
            let fee_entry = totals.fees_by_currency.entry(currency).or_insert(Money::ZERO);
            *fee_entry = *fee_entry + preview.fees.total;

            let currency_agg = summary.by_currency.entry(currency).or_insert_with(CurrencyAggregate::default);
            currency_agg.count += 1;
            currency_agg.total = currency_agg.total + preview.fees.total;

            let rail_agg = summary.by_rail.entry(preview.timing.rail).or_insert_with(CurrencyAggregate::default);
            rail_agg.count += 1;
            rail_agg.total = rail_agg.total + preview.fees.total;
        }
    }

    Ok(Batch {
        id: ids::batch_id(),
        tenant: tenant.to_string(),
        total_count,
        successful,
        failed,
        can_execute_all,
        totals,
        summary,
        items,
    })
}

async fn process_one(ledger: &mut Ledger<'_>, store: &dyn Store, index: usize, req: TransferRequest) -> BatchItem {
    let mut errors = Vec::new();
    let now = Utc::now();

    let from_account = ledger.account(&req.from_account).await;
    let to_account = ledger.account(&req.to_account).await;

    match &from_account {
        None => errors.push(crate::simulate::sim_error(
            ErrorKind::AccountNotFound,
            "source account not found",
            json!({"account_id": req.from_account}),
        )),
        Some(acc) if !acc.is_active() => errors.push(crate::simulate::sim_error(
            ErrorKind::AccountSuspended,
            "source account is not active",
            json!({"account_id": req.from_account}),
        )),
        Some(_) => {}
    }
    match &to_account {
        None => errors.push(crate::simulate::sim_error(
            ErrorKind::AccountNotFound,
            "destination account not found",
            json!({"account_id": req.to_account}),
        )),
        Some(acc) if !acc.is_active() => errors.push(crate::simulate::sim_error(
            ErrorKind::AccountSuspended,
            "destination account is not active",
            json!({"account_id": req.to_account}),
        )),
        Some(_) => {}
    }

    let destination_currency = req.destination_currency.unwrap_or(req.currency);
    let fx_quote: Option<FxProjection> = fx::quote(req.currency, destination_currency);
    let rail = rails::select(req.currency, destination_currency);
    let fee_breakdown = fees::compute(req.amount, req.currency, destination_currency);
    let total_debit = req.amount + fee_breakdown.total;

    let source_before = ledger.balance(&req.from_account, req.currency).await;
    let destination_before = ledger.balance(&req.to_account, destination_currency).await;

    let mut usage = limits::Usage {
        daily: Money::ZERO,
        monthly: Money::ZERO,
    };
    if from_account.is_some() {
        if source_before.0 < total_debit.0 {
            errors.push(crate::simulate::sim_error(
                ErrorKind::InsufficientBalance,
                "source account has insufficient available balance",
                json!({
                    "shortfall": req.amount.checked_sub(source_before).unwrap_or(Money::ZERO).to_string(),
                    "currency": req.currency,
                }),
            ));
        } else {
            ledger.debit(&req.from_account, req.currency, total_debit);
        }

        let transfers = store.list_transfers_for_account(&req.from_account).await;
        usage = limits::usage_for(&transfers, &req.from_account, req.currency, now);
        let tier = from_account.as_ref().map(|a| a.verification_tier).unwrap_or(0);
        for violation in limits::check(tier, req.amount, &usage) {
            errors.push(crate::simulate::sim_error(
                violation.error_kind(),
                format!("{} limit exceeded", violation.kind),
                violation.details(),
            ));
        }
    }

    let effective_destination_amount = match &fx_quote {
        Some(q) => Money::new((req.amount.0 * fx::effective_rate(q)).round_dp(2)),
        None => req.amount,
    };
    if to_account.is_some() && errors.iter().all(|e| e.kind != ErrorKind::InsufficientBalance) {
        ledger.credit(&req.to_account, destination_currency, effective_destination_amount);
    }
    let destination_after = destination_before + effective_destination_amount;
    let source_after = source_before.checked_sub(total_debit).unwrap_or(Money::ZERO);

    let warning_list = warnings::transfer_warnings(
        req.amount,
        source_after,
        &fee_breakdown,
        source_before,
        rail,
        from_account.as_ref().map(|a| a.verification_tier).unwrap_or(0),
        &usage,
        to_account.as_ref(),
        fx_quote.as_ref(),
        destination_currency,
    );

    let preview = TransferPreview {
        source: AccountBalanceProjection {
            balance_before: source_before,
            balance_after: source_after,
        },
        destination: AccountBalanceProjection {
            balance_before: destination_before,
            balance_after: destination_after,
        },
        fx: fx_quote,
        fees: fee_breakdown,
        timing: TimingProjection {
            rail,
            estimated_duration_seconds: rail.estimated_duration_seconds(),
            estimated_arrival: now + chrono::Duration::seconds(rail.estimated_duration_seconds()),
        },
    };

    BatchItem {
        index,
        can_execute: errors.is_empty(),
        preview: Some(preview),
        warnings: warning_list,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use crate::store::InMemoryStore;
    use crate::store::account::{Account, AccountStatus, AccountType, Balance};
    use rust_decimal_macros::dec;
    use std::collections::HashMap as Map;
    use std::time::Instant;

    fn account(id: &str, available: Money) -> Account {
        let mut balances = Map::new();
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
            verification_tier: 3,
            balances,
        }
    }

    fn req(from: &str, to: &str, amount: rust_decimal::Decimal) -> TransferRequest {
        TransferRequest {
            from_account: from.into(),
            to_account: to.into(),
            amount: Money::new(amount),
            currency: Currency::Usd,
            destination_currency: None,
        }
    }

    #[tokio::test]
    async fn cumulative_balance_rejects_second_item_that_overdraws() {
        let store = InMemoryStore::new();
        store.put_account(account("acc_1", Money::new(dec!(150)))).await;
        store.put_account(account("acc_2", Money::new(dec!(0)))).await;

        let batch = process(
            store.as_ref(),
            "t1",
            vec![req("acc_1", "acc_2", dec!(100)), req("acc_1", "acc_2", dec!(100))],
            false,
        )
        .await
        .unwrap();

        assert!(batch.items[0].can_execute);
        assert!(!batch.items[1].can_execute);
        assert!(!batch.can_execute_all);
    }

    #[tokio::test]
    async fn rejects_batch_larger_than_max_items() {
        let store = InMemoryStore::new();
        let requests: Vec<TransferRequest> = (0..1001).map(|_| req("acc_1", "acc_2", dec!(1))).collect();
        let result = process(store.as_ref(), "t1", requests, false).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn stop_on_first_error_short_circuits_remaining_items() {
        let store = InMemoryStore::new();
        store.put_account(account("acc_1", Money::new(dec!(50)))).await;
        store.put_account(account("acc_2", Money::new(dec!(0)))).await;

        let batch = process(
            store.as_ref(),
            "t1",
            vec![
                req("acc_1", "acc_2", dec!(100)),
                req("acc_1", "acc_2", dec!(1)),
                req("acc_1", "acc_2", dec!(1)),
            ],
            true,
        )
        .await
        .unwrap();

        assert_eq!(batch.items.len(), 3);
        assert_eq!(batch.total_count, 3);
        assert!(batch.items[0].can_execute);
        assert!(!batch.items[1].can_execute);
        assert!(!batch.items[2].can_execute);
        assert!(batch.items[2].preview.is_none());
        assert_eq!(batch.items[2].errors[0].kind, ErrorKind::BatchStopped);
        assert_eq!(batch.successful + batch.failed, batch.total_count);
    }

    #[tokio::test]
    async fn processes_one_thousand_items_well_under_five_seconds() {
        let store = InMemoryStore::new();
        store.put_account(account("acc_1", Money::new(dec!(10_000_000)))).await;
        store.put_account(account("acc_2", Money::new(dec!(0)))).await;
        let requests: Vec<TransferRequest> = (0..1000).map(|_| req("acc_1", "acc_2", dec!(1))).collect();

        let start = Instant::now();
        let batch = process(store.as_ref(), "t1", requests, false).await.unwrap();
        assert!(start.elapsed().as_secs() < 5);
        assert_eq!(batch.successful, 1000);
    }
}
