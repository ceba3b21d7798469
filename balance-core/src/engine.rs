//! Balance aggregation
//!
//! Pure, synchronous fold of a ledger snapshot into per-account balances.
//!
//! # Rules
//!
//! - Inactive (soft-deleted) lines contribute nothing
//! - Every account gets an entry, even with zero lines
//! - Each line is converted to the account's home currency, rounded to the
//!   home precision, then added with [`safe_add`]; rounding is never deferred
//! - The sign of the stored amount is authoritative; `AccountType` is not read
//!
//! Complexity is a single pass over the lines with hashed account lookup.

use crate::{
    currency::PrecisionTable,
    error::{Error, IntegrityError, Result},
    money::{round_to_precision, safe_add, MAX_PRECISION},
    types::{Account, AccountBalance, AccountId, BalanceMap, TransactionLine},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What to do with data-integrity problems
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IntegrityPolicy {
    /// Fail the whole aggregation on the first problem
    #[default]
    Strict,

    /// Skip offending lines and flag the result as partial.
    ///
    /// Accounts whose home currency is unknown are rounded at
    /// `fallback_precision`.
    BestEffort {
        /// Precision used for accounts with unknown home currency
        #[serde(default)]
        fallback_precision: u32,
    },
}

/// Output of [`compute_balances_with`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceReport {
    /// One entry per known account
    pub balances: BalanceMap,

    /// Problems skipped in best-effort mode
    pub issues: Vec<IntegrityError>,

    /// True if anything was skipped
    pub partial: bool,
}

impl BalanceReport {
    fn record(&mut self, issue: IntegrityError) {
        tracing::warn!(%issue, "skipping ledger data in best-effort aggregation");
        self.issues.push(issue);
        self.partial = true;
    }
}

/// Compute balances, failing on the first integrity error.
///
/// ```rust
/// use balance_core::{
///     compute_balances, Account, AccountId, AccountType, Currency, LineId,
///     PrecisionTable, TransactionLine,
/// };
///
/// let cash = Account::new(AccountId::new("cash"), "Cash", AccountType::Asset, "USD");
/// let line = TransactionLine {
///     id: LineId::generate(),
///     entry_id: uuid::Uuid::now_v7(),
///     account_id: cash.id().clone(),
///     amount: 19.99,
///     currency_code: "USD".to_string(),
///     exchange_rate: 1.0,
///     active: true,
/// };
/// let table = PrecisionTable::from_currencies(&[Currency::new("USD", 2)]).unwrap();
///
/// let balances = compute_balances(&[cash.clone()], &[line], &table).unwrap();
/// assert_eq!(balances[cash.id()].balance, 19.99);
/// ```
pub fn compute_balances(
    accounts: &[Account],
    lines: &[TransactionLine],
    precisions: &PrecisionTable,
) -> Result<BalanceMap> {
    compute_balances_with(accounts, lines, precisions, IntegrityPolicy::Strict)
        .map(|report| report.balances)
}

/// Compute balances under an explicit integrity policy.
pub fn compute_balances_with(
    accounts: &[Account],
    lines: &[TransactionLine],
    precisions: &PrecisionTable,
    policy: IntegrityPolicy,
) -> Result<BalanceReport> {
    if let IntegrityPolicy::BestEffort { fallback_precision } = policy {
        if fallback_precision > MAX_PRECISION {
            return Err(Error::Config(format!(
                "fallback precision {} exceeds {}",
                fallback_precision, MAX_PRECISION
            )));
        }
    }

    let mut report = BalanceReport {
        balances: HashMap::with_capacity(accounts.len()),
        ..Default::default()
    };
    let mut index: HashMap<&AccountId, &Account> = HashMap::with_capacity(accounts.len());

    for account in accounts {
        let precision = match precisions.account_precision(account.id(), account.currency_code())
        {
            Ok(precision) => precision,
            Err(issue) => match policy {
                IntegrityPolicy::Strict => return Err(issue.into()),
                IntegrityPolicy::BestEffort { fallback_precision } => {
                    report.record(issue);
                    fallback_precision
                }
            },
        };

        report
            .balances
            .insert(account.id().clone(), AccountBalance::zero(account, precision));
        index.insert(account.id(), account);
    }

    for line in lines.iter().filter(|line| line.active) {
        if let Err(issue) = apply_line(&mut report.balances, &index, line, precisions) {
            match policy {
                IntegrityPolicy::Strict => return Err(issue.into()),
                IntegrityPolicy::BestEffort { .. } => report.record(issue),
            }
        }
    }

    Ok(report)
}

/// Add one active line to its account's running total
fn apply_line(
    balances: &mut BalanceMap,
    index: &HashMap<&AccountId, &Account>,
    line: &TransactionLine,
    precisions: &PrecisionTable,
) -> std::result::Result<(), IntegrityError> {
    let orphaned = || IntegrityError::OrphanedLine {
        line_id: line.id,
        account_id: line.account_id.clone(),
    };

    let account = index.get(&line.account_id).ok_or_else(orphaned)?;

    if !line.amount.is_finite() || !line.exchange_rate.is_finite() {
        return Err(IntegrityError::NonFiniteAmount { line_id: line.id });
    }

    precisions.line_precision(line.id, &line.currency_code)?;

    let rate = if line.currency_code == account.currency_code() {
        1.0
    } else {
        line.exchange_rate
    };

    let converted = line.amount * rate;
    if !converted.is_finite() {
        return Err(IntegrityError::NonFiniteAmount { line_id: line.id });
    }

    let entry = balances.get_mut(&line.account_id).ok_or_else(orphaned)?;
    let contribution = round_to_precision(converted, entry.precision);
    let total = safe_add(entry.balance, contribution, entry.precision);
    if !total.is_finite() {
        return Err(IntegrityError::BalanceOverflow {
            line_id: line.id,
            account_id: line.account_id.clone(),
        });
    }

    entry.balance = total;
    entry.transaction_count += 1;

    Ok(())
}
