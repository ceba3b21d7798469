//! Core types for balance aggregation
//!
//! Accounts and transaction lines are owned by the external store; the engine
//! only ever reads snapshots of them. `AccountBalance` is derived and never
//! persisted.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Account identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction line identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineId(Uuid);

impl LineId {
    /// Fresh time-ordered line ID
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Side of the books an account naturally accumulates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalSide {
    /// Debits increase the balance
    Debit,
    /// Credits increase the balance
    Credit,
}

/// Account classification, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    /// Things owned
    Asset,
    /// Things owed
    Liability,
    /// Money earned
    Income,
    /// Money spent
    Expense,
    /// Owner's stake, opening balances
    Equity,
}

impl AccountType {
    /// Normal balance side
    pub fn normal_side(&self) -> NormalSide {
        match self {
            AccountType::Asset | AccountType::Expense => NormalSide::Debit,
            AccountType::Liability | AccountType::Income | AccountType::Equity => {
                NormalSide::Credit
            }
        }
    }
}

/// Ledger account
///
/// `account_type` and `currency_code` cannot change after construction;
/// changing either would reinterpret every historical line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    name: String,
    account_type: AccountType,
    currency_code: String,
}

impl Account {
    /// Create new account
    pub fn new(
        id: AccountId,
        name: impl Into<String>,
        account_type: AccountType,
        currency_code: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            account_type,
            currency_code: currency_code.into(),
        }
    }

    /// Account ID
    pub fn id(&self) -> &AccountId {
        &self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Account type
    pub fn account_type(&self) -> AccountType {
        self.account_type
    }

    /// Home currency; balances are reported in it
    pub fn currency_code(&self) -> &str {
        &self.currency_code
    }

    /// Return a copy with a new display name
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

/// One leg of a journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLine {
    /// Line ID
    pub id: LineId,

    /// Journal entry this line belongs to
    pub entry_id: Uuid,

    /// Owning account
    pub account_id: AccountId,

    /// Signed amount in `currency_code`; positive grows the account's normal balance
    pub amount: f64,

    /// Currency the amount is denominated in
    pub currency_code: String,

    /// Factor converting `amount` into the account's home currency
    pub exchange_rate: f64,

    /// Soft-delete flag
    pub active: bool,
}

/// Columns the engine reads from transaction lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineColumn {
    /// Line ID
    Id,
    /// Owning account
    AccountId,
    /// Signed amount
    Amount,
    /// Line currency
    CurrencyCode,
    /// Conversion factor
    ExchangeRate,
    /// Soft-delete flag
    Active,
}

/// Projection requested from the store by the pipeline
pub const ENGINE_COLUMNS: &[LineColumn] = &[
    LineColumn::Id,
    LineColumn::AccountId,
    LineColumn::Amount,
    LineColumn::CurrencyCode,
    LineColumn::ExchangeRate,
    LineColumn::Active,
];

/// Computed balance of one account, in its home currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Account ID
    pub account_id: AccountId,

    /// Home currency of the account
    pub currency_code: String,

    /// Balance rounded to the home-currency precision
    pub balance: f64,

    /// Precision the balance was rounded to
    pub precision: u32,

    /// Number of active lines that contributed
    pub transaction_count: usize,
}

impl AccountBalance {
    /// Zero balance for an account
    pub fn zero(account: &Account, precision: u32) -> Self {
        Self {
            account_id: account.id().clone(),
            currency_code: account.currency_code().to_string(),
            balance: 0.0,
            precision,
            transaction_count: 0,
        }
    }

    /// Exact decimal rendering of the balance
    pub fn as_decimal(&self) -> Option<Decimal> {
        crate::money::to_decimal(self.balance, self.precision)
    }
}

impl fmt::Display for AccountBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_decimal() {
            Some(amount) => write!(f, "{} {}", amount, self.currency_code),
            None => write!(f, "{} {}", self.balance, self.currency_code),
        }
    }
}

/// Account ID → computed balance
pub type BalanceMap = HashMap<AccountId, AccountBalance>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_side() {
        assert_eq!(AccountType::Asset.normal_side(), NormalSide::Debit);
        assert_eq!(AccountType::Expense.normal_side(), NormalSide::Debit);
        assert_eq!(AccountType::Liability.normal_side(), NormalSide::Credit);
        assert_eq!(AccountType::Income.normal_side(), NormalSide::Credit);
        assert_eq!(AccountType::Equity.normal_side(), NormalSide::Credit);
    }

    #[test]
    fn test_renamed_keeps_type_and_currency() {
        let account = Account::new(AccountId::new("cash"), "Cash", AccountType::Asset, "EUR");
        let renamed = account.renamed("Wallet");
        assert_eq!(renamed.name(), "Wallet");
        assert_eq!(renamed.account_type(), AccountType::Asset);
        assert_eq!(renamed.currency_code(), "EUR");
        assert_eq!(renamed.id(), account.id());
    }

    #[test]
    fn test_balance_display_uses_precision() {
        let account = Account::new(AccountId::new("cash"), "Cash", AccountType::Asset, "USD");
        let mut balance = AccountBalance::zero(&account, 2);
        balance.balance = 12.5;
        assert_eq!(balance.to_string(), "12.50 USD");

        let yen = Account::new(AccountId::new("jp"), "Yen", AccountType::Asset, "JPY");
        let mut balance = AccountBalance::zero(&yen, 0);
        balance.balance = 1500.0;
        assert_eq!(balance.to_string(), "1500 JPY");
    }
}
