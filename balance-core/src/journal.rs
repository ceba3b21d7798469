//! Journal entry construction
//!
//! This is where the double-entry invariant is enforced: debits equal credits
//! in the entry's currency. The aggregation engine assumes it and never checks.
//!
//! Line amounts are signed relative to each account's normal side: a debit to
//! an asset is positive, a debit to a liability is negative.
//!
//! ```rust
//! use balance_core::{
//!     Account, AccountId, AccountType, Currency, JournalEntryBuilder, PrecisionTable,
//! };
//!
//! let cash = Account::new(AccountId::new("cash"), "Cash", AccountType::Asset, "USD");
//! let food = Account::new(AccountId::new("food"), "Food", AccountType::Expense, "USD");
//! let table = PrecisionTable::from_currencies(&[Currency::new("USD", 2)]).unwrap();
//!
//! let entry = JournalEntryBuilder::new("USD")
//!     .debit(food.id(), 12.5)
//!     .credit(cash.id(), 12.5)
//!     .build(&[cash.clone(), food.clone()], &table)
//!     .unwrap();
//!
//! assert_eq!(entry.lines[0].amount, 12.5);
//! assert_eq!(entry.lines[1].amount, -12.5);
//! ```

use crate::{
    currency::PrecisionTable,
    error::{Error, Result},
    money::{amounts_are_equal, round_to_precision, safe_add},
    types::{Account, AccountId, LineId, NormalSide, TransactionLine},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One side of an entry before validation
#[derive(Debug, Clone, PartialEq)]
struct Posting {
    account_id: AccountId,
    side: NormalSide,
    amount: f64,
}

/// A validated, balanced journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Entry ID, shared by all its lines
    pub id: Uuid,

    /// Currency the postings are denominated in
    pub currency_code: String,

    /// Signed lines, one per posting, in posting order
    pub lines: Vec<TransactionLine>,
}

/// Builder for [`JournalEntry`]
#[derive(Debug, Clone)]
pub struct JournalEntryBuilder {
    id: Uuid,
    currency_code: String,
    postings: Vec<Posting>,
    rates: HashMap<AccountId, f64>,
}

impl JournalEntryBuilder {
    /// Start an entry denominated in `currency_code`
    pub fn new(currency_code: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            currency_code: currency_code.into(),
            postings: Vec::new(),
            rates: HashMap::new(),
        }
    }

    /// Debit `amount` (positive) to an account
    pub fn debit(mut self, account_id: &AccountId, amount: f64) -> Self {
        self.postings.push(Posting {
            account_id: account_id.clone(),
            side: NormalSide::Debit,
            amount,
        });
        self
    }

    /// Credit `amount` (positive) to an account
    pub fn credit(mut self, account_id: &AccountId, amount: f64) -> Self {
        self.postings.push(Posting {
            account_id: account_id.clone(),
            side: NormalSide::Credit,
            amount,
        });
        self
    }

    /// Rate converting the entry currency into `account_id`'s home currency
    pub fn with_rate(mut self, account_id: &AccountId, rate: f64) -> Self {
        self.rates.insert(account_id.clone(), rate);
        self
    }

    /// Entry ID the lines will carry
    pub fn entry_id(&self) -> Uuid {
        self.id
    }

    /// Validate and emit signed lines
    pub fn build(self, accounts: &[Account], precisions: &PrecisionTable) -> Result<JournalEntry> {
        let precision = precisions.get(&self.currency_code).ok_or_else(|| {
            Error::InvalidEntry(format!("unknown currency {}", self.currency_code))
        })?;

        if self.postings.len() < 2 {
            return Err(Error::InvalidEntry(
                "entry needs at least two postings".to_string(),
            ));
        }

        let by_id: HashMap<&AccountId, &Account> =
            accounts.iter().map(|account| (account.id(), account)).collect();

        let mut debits = 0.0;
        let mut credits = 0.0;
        let mut lines = Vec::with_capacity(self.postings.len());

        for posting in &self.postings {
            if !posting.amount.is_finite() || posting.amount <= 0.0 {
                return Err(Error::InvalidEntry(format!(
                    "posting to {} must have a positive amount",
                    posting.account_id
                )));
            }

            let account = by_id.get(&posting.account_id).ok_or_else(|| {
                Error::InvalidEntry(format!("unknown account {}", posting.account_id))
            })?;

            let exchange_rate = self.rate_for(account)?;
            let amount = round_to_precision(posting.amount, precision);

            match posting.side {
                NormalSide::Debit => debits = safe_add(debits, amount, precision),
                NormalSide::Credit => credits = safe_add(credits, amount, precision),
            }

            let signed = if posting.side == account.account_type().normal_side() {
                amount
            } else {
                -amount
            };

            lines.push(TransactionLine {
                id: LineId::generate(),
                entry_id: self.id,
                account_id: posting.account_id.clone(),
                amount: signed,
                currency_code: self.currency_code.clone(),
                exchange_rate,
                active: true,
            });
        }

        if !amounts_are_equal(debits, credits, precision) {
            return Err(Error::UnbalancedEntry { debits, credits });
        }

        Ok(JournalEntry {
            id: self.id,
            currency_code: self.currency_code,
            lines,
        })
    }

    fn rate_for(&self, account: &Account) -> Result<f64> {
        if account.currency_code() == self.currency_code {
            return Ok(1.0);
        }

        match self.rates.get(account.id()) {
            Some(&rate) if rate.is_finite() && rate > 0.0 => Ok(rate),
            Some(_) => Err(Error::InvalidEntry(format!(
                "exchange rate for {} must be positive",
                account.id()
            ))),
            None => Err(Error::InvalidEntry(format!(
                "missing exchange rate {} -> {} for {}",
                self.currency_code,
                account.currency_code(),
                account.id()
            ))),
        }
    }
}
