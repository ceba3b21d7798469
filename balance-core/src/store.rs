//! Ledger store interface
//!
//! The store is an external collaborator. It pushes full snapshots (never
//! deltas) of accounts, active transaction lines and currencies. A stream item
//! that is `Err` is a transient read failure.
//!
//! [`MemoryStore`] is the in-process implementation used by the demo binary
//! and tests. Each collection lives in a `tokio::sync::watch` channel, so
//! observers always see the latest value and bursts coalesce naturally.

use crate::{
    currency::{Currency, PrecisionTable},
    engine::{compute_balances_with, BalanceReport, IntegrityPolicy},
    error::{Error, Result},
    journal::{JournalEntry, JournalEntryBuilder},
    types::{Account, LineColumn, LineId, TransactionLine},
};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use uuid::Uuid;

/// Push stream of full snapshots
pub type SnapshotStream<T> = BoxStream<'static, Result<Vec<T>>>;

/// Everything the engine needs, read at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// All accounts
    pub accounts: Vec<Account>,

    /// Active transaction lines
    pub lines: Vec<TransactionLine>,

    /// Currency directory
    pub currencies: Vec<Currency>,
}

impl LedgerSnapshot {
    /// Precision table for this snapshot's currencies
    pub fn precision_table(&self) -> Result<PrecisionTable> {
        Ok(PrecisionTable::from_currencies(&self.currencies)?)
    }

    /// Run the engine over this snapshot
    pub fn compute(&self, policy: IntegrityPolicy) -> Result<BalanceReport> {
        let precisions = self.precision_table()?;
        compute_balances_with(&self.accounts, &self.lines, &precisions, policy)
    }
}

/// Source of ledger snapshots
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Stream of the full account set, emitting on every change
    fn observe_accounts(&self) -> SnapshotStream<Account>;

    /// Stream of active lines, restricted to `columns`
    fn observe_active_transaction_lines(
        &self,
        columns: &[LineColumn],
    ) -> SnapshotStream<TransactionLine>;

    /// Stream of the currency directory
    fn observe_currencies(&self) -> SnapshotStream<Currency>;

    /// One-off read of all three collections
    async fn snapshot(&self) -> Result<LedgerSnapshot>;
}

/// Read a snapshot and aggregate it, outside any pipeline
pub async fn compute_from_store<S>(store: &S, policy: IntegrityPolicy) -> Result<BalanceReport>
where
    S: LedgerStore + ?Sized,
{
    let snapshot = store.snapshot().await?;
    snapshot.compute(policy)
}

/// In-memory ledger store
#[derive(Debug)]
pub struct MemoryStore {
    accounts: watch::Sender<Vec<Account>>,
    currencies: watch::Sender<Vec<Currency>>,
    active_lines: watch::Sender<Vec<TransactionLine>>,

    /// All lines, including soft-deleted ones
    lines: RwLock<Vec<TransactionLine>>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        let (accounts, _) = watch::channel(Vec::new());
        let (currencies, _) = watch::channel(Vec::new());
        let (active_lines, _) = watch::channel(Vec::new());

        Self {
            accounts,
            currencies,
            active_lines,
            lines: RwLock::new(Vec::new()),
        }
    }

    /// Store seeded with a currency directory
    pub fn with_currencies(currencies: Vec<Currency>) -> Self {
        let store = Self::new();
        store.set_currencies(currencies);
        store
    }

    /// Replace the currency directory
    pub fn set_currencies(&self, currencies: Vec<Currency>) {
        tracing::debug!(count = currencies.len(), "seeding currency directory");
        self.currencies.send_replace(currencies);
    }

    /// Insert or rename an account.
    ///
    /// Changing the type or home currency of an existing account is rejected.
    pub fn upsert_account(&self, account: Account) -> Result<()> {
        let mut result = Ok(());

        self.accounts.send_if_modified(|accounts| {
            match accounts.iter_mut().find(|a| a.id() == account.id()) {
                Some(existing)
                    if existing.account_type() != account.account_type()
                        || existing.currency_code() != account.currency_code() =>
                {
                    result = Err(Error::ImmutableAccount(account.id().clone()));
                    false
                }
                Some(existing) => {
                    *existing = account.clone();
                    true
                }
                None => {
                    accounts.push(account.clone());
                    true
                }
            }
        });

        if result.is_ok() {
            tracing::debug!(account_id = %account.id(), "account upserted");
        }
        result
    }

    /// Append raw lines
    pub fn insert_lines(&self, new_lines: Vec<TransactionLine>) {
        let mut lines = self.lines.write();
        lines.extend(new_lines);
        self.publish_active(&lines);
    }

    /// Validate a journal entry against current accounts and store its lines
    pub fn post_entry(&self, builder: JournalEntryBuilder) -> Result<JournalEntry> {
        let accounts = self.accounts.borrow().clone();
        let precisions = PrecisionTable::from_currencies(&self.currencies.borrow())?;

        let entry = builder.build(&accounts, &precisions)?;
        tracing::debug!(entry_id = %entry.id, lines = entry.lines.len(), "entry posted");

        self.insert_lines(entry.lines.clone());
        Ok(entry)
    }

    /// Flip a line's soft-delete flag
    pub fn set_line_active(&self, line_id: LineId, active: bool) -> Result<()> {
        let mut lines = self.lines.write();
        let line = lines
            .iter_mut()
            .find(|line| line.id == line_id)
            .ok_or(Error::LineNotFound(line_id))?;

        if line.active != active {
            line.active = active;
            self.publish_active(&lines);
        }
        Ok(())
    }

    /// Soft-delete every line of an entry, returning how many changed
    pub fn deactivate_entry(&self, entry_id: Uuid) -> usize {
        let mut lines = self.lines.write();
        let mut changed = 0;
        for line in lines.iter_mut().filter(|l| l.entry_id == entry_id && l.active) {
            line.active = false;
            changed += 1;
        }

        if changed > 0 {
            self.publish_active(&lines);
        }
        changed
    }

    /// Number of live observers across all three collections
    pub fn observer_count(&self) -> usize {
        self.accounts.receiver_count()
            + self.currencies.receiver_count()
            + self.active_lines.receiver_count()
    }

    fn publish_active(&self, lines: &[TransactionLine]) {
        let active: Vec<TransactionLine> = lines.iter().filter(|l| l.active).cloned().collect();
        self.active_lines.send_replace(active);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    fn observe_accounts(&self) -> SnapshotStream<Account> {
        WatchStream::new(self.accounts.subscribe()).map(Ok).boxed()
    }

    fn observe_active_transaction_lines(
        &self,
        columns: &[LineColumn],
    ) -> SnapshotStream<TransactionLine> {
        // Lines are held in memory whole; the projection is not needed.
        tracing::trace!(?columns, "observing active transaction lines");
        WatchStream::new(self.active_lines.subscribe()).map(Ok).boxed()
    }

    fn observe_currencies(&self) -> SnapshotStream<Currency> {
        WatchStream::new(self.currencies.subscribe()).map(Ok).boxed()
    }

    async fn snapshot(&self) -> Result<LedgerSnapshot> {
        Ok(LedgerSnapshot {
            accounts: self.accounts.borrow().clone(),
            lines: self.active_lines.borrow().clone(),
            currencies: self.currencies.borrow().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountId, AccountType, ENGINE_COLUMNS};

    fn seeded() -> MemoryStore {
        let store = MemoryStore::with_currencies(vec![Currency::new("USD", 2)]);
        store
            .upsert_account(Account::new(AccountId::new("cash"), "Cash", AccountType::Asset, "USD"))
            .unwrap();
        store
            .upsert_account(Account::new(
                AccountId::new("salary"),
                "Salary",
                AccountType::Income,
                "USD",
            ))
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_post_entry_and_compute() {
        let store = seeded();
        store
            .post_entry(
                JournalEntryBuilder::new("USD")
                    .debit(&AccountId::new("cash"), 1250.0)
                    .credit(&AccountId::new("salary"), 1250.0),
            )
            .unwrap();

        let report = compute_from_store(&store, IntegrityPolicy::Strict).await.unwrap();

        assert!(!report.partial);
        assert_eq!(report.balances[&AccountId::new("cash")].balance, 1250.0);
        assert_eq!(report.balances[&AccountId::new("salary")].balance, 1250.0);
    }

    #[tokio::test]
    async fn test_deactivated_entry_leaves_no_residual() {
        let store = seeded();
        let entry = store
            .post_entry(
                JournalEntryBuilder::new("USD")
                    .debit(&AccountId::new("cash"), 80.15)
                    .credit(&AccountId::new("salary"), 80.15),
            )
            .unwrap();

        assert_eq!(store.deactivate_entry(entry.id), 2);
        assert_eq!(store.deactivate_entry(entry.id), 0);

        let snapshot = store.snapshot().await.unwrap();
        assert!(snapshot.lines.is_empty());

        let report = snapshot.compute(IntegrityPolicy::Strict).unwrap();
        assert_eq!(report.balances[&AccountId::new("cash")].balance, 0.0);
        assert_eq!(report.balances[&AccountId::new("cash")].transaction_count, 0);
    }

    #[tokio::test]
    async fn test_set_line_active() {
        let store = seeded();
        let entry = store
            .post_entry(
                JournalEntryBuilder::new("USD")
                    .debit(&AccountId::new("cash"), 5.0)
                    .credit(&AccountId::new("salary"), 5.0),
            )
            .unwrap();
        let line_id = entry.lines[0].id;

        store.set_line_active(line_id, false).unwrap();
        assert_eq!(store.snapshot().await.unwrap().lines.len(), 1);

        store.set_line_active(line_id, true).unwrap();
        assert_eq!(store.snapshot().await.unwrap().lines.len(), 2);

        let missing = store.set_line_active(LineId::generate(), false);
        assert!(matches!(missing, Err(Error::LineNotFound(_))));
    }

    #[test]
    fn test_account_type_and_currency_are_immutable() {
        let store = seeded();

        let retyped = Account::new(AccountId::new("cash"), "Cash", AccountType::Liability, "USD");
        assert!(matches!(store.upsert_account(retyped), Err(Error::ImmutableAccount(_))));

        let moved = Account::new(AccountId::new("cash"), "Cash", AccountType::Asset, "EUR");
        assert!(matches!(store.upsert_account(moved), Err(Error::ImmutableAccount(_))));

        let renamed = Account::new(AccountId::new("cash"), "Pocket", AccountType::Asset, "USD");
        store.upsert_account(renamed).unwrap();
        assert_eq!(store.accounts.borrow()[0].name(), "Pocket");
    }

    #[tokio::test]
    async fn test_observers_receive_latest_snapshot() {
        let store = seeded();
        let mut accounts = store.observe_accounts();
        let mut lines = store.observe_active_transaction_lines(ENGINE_COLUMNS);
        assert_eq!(store.observer_count(), 2);

        let first = accounts.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert!(lines.next().await.unwrap().unwrap().is_empty());

        store
            .post_entry(
                JournalEntryBuilder::new("USD")
                    .debit(&AccountId::new("cash"), 1.0)
                    .credit(&AccountId::new("salary"), 1.0),
            )
            .unwrap();
        assert_eq!(lines.next().await.unwrap().unwrap().len(), 2);

        drop(accounts);
        drop(lines);
        assert_eq!(store.observer_count(), 0);
    }
}
