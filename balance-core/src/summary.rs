//! Consumer-level derivations over computed balances
//!
//! Net worth counts assets positively and liabilities negatively. Income,
//! expense and equity stay out of net worth but feed the period totals.
//! Amounts in different currencies are never added together.

use crate::{
    money::safe_add,
    types::{Account, AccountType, BalanceMap},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Totals for one currency
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrencyTotals {
    /// Sum of asset balances
    pub assets: f64,
    /// Sum of liability balances
    pub liabilities: f64,
    /// Sum of income balances
    pub income: f64,
    /// Sum of expense balances
    pub expenses: f64,
    /// Sum of equity balances
    pub equity: f64,
    /// `assets - liabilities`
    pub net_worth: f64,
    /// `income - expenses`
    pub net_income: f64,
}

/// Per-currency summary of a balance snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// Currency code → totals
    pub by_currency: BTreeMap<String, CurrencyTotals>,
}

impl LedgerSummary {
    /// Summarise `balances` for `accounts`.
    ///
    /// Accounts missing from `balances` are skipped. Each currency is summed
    /// at the precision its balances were computed with, including a
    /// best-effort fallback precision.
    pub fn from_balances(accounts: &[Account], balances: &BalanceMap) -> Self {
        let mut by_currency: BTreeMap<String, CurrencyTotals> = BTreeMap::new();
        let mut precision_by_currency: BTreeMap<&str, u32> = BTreeMap::new();

        for account in accounts {
            let Some(balance) = balances.get(account.id()) else {
                continue;
            };
            let code = account.currency_code();
            let precision = precision_by_currency.entry(code).or_insert(balance.precision);
            *precision = (*precision).max(balance.precision);
            let precision = *precision;

            let totals = by_currency.entry(code.to_string()).or_default();
            let bucket = match account.account_type() {
                AccountType::Asset => &mut totals.assets,
                AccountType::Liability => &mut totals.liabilities,
                AccountType::Income => &mut totals.income,
                AccountType::Expense => &mut totals.expenses,
                AccountType::Equity => &mut totals.equity,
            };
            *bucket = add(*bucket, balance.balance, precision);
        }

        for (code, totals) in by_currency.iter_mut() {
            let precision = precision_by_currency
                .get(code.as_str())
                .copied()
                .unwrap_or_default();
            totals.net_worth = add(totals.assets, -totals.liabilities, precision);
            totals.net_income = add(totals.income, -totals.expenses, precision);
        }

        Self { by_currency }
    }

    /// Net worth in `code`, zero if no account uses it
    pub fn net_worth(&self, code: &str) -> f64 {
        self.by_currency
            .get(code)
            .map(|totals| totals.net_worth)
            .unwrap_or(0.0)
    }

    /// Totals for `code`
    pub fn totals(&self, code: &str) -> Option<&CurrencyTotals> {
        self.by_currency.get(code)
    }
}

/// Rounded sum; totals past `f64` range stay infinite
fn add(a: f64, b: f64, precision: u32) -> f64 {
    if a.is_finite() && b.is_finite() {
        safe_add(a, b, precision)
    } else {
        a + b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::{Currency, PrecisionTable};
    use crate::engine::{compute_balances_with, IntegrityPolicy};
    use crate::types::{AccountBalance, AccountId, LineId, TransactionLine};
    use uuid::Uuid;

    fn setup() -> (Vec<Account>, BalanceMap) {
        let accounts = vec![
            Account::new(AccountId::new("cash"), "Cash", AccountType::Asset, "USD"),
            Account::new(AccountId::new("bank"), "Bank", AccountType::Asset, "USD"),
            Account::new(AccountId::new("card"), "Card", AccountType::Liability, "USD"),
            Account::new(AccountId::new("salary"), "Salary", AccountType::Income, "USD"),
            Account::new(AccountId::new("food"), "Food", AccountType::Expense, "USD"),
            Account::new(AccountId::new("opening"), "Opening", AccountType::Equity, "USD"),
            Account::new(AccountId::new("euro"), "Euro cash", AccountType::Asset, "EUR"),
        ];
        let amounts = [
            ("cash", 100.1),
            ("bank", 900.2),
            ("card", 250.05),
            ("salary", 3000.0),
            ("food", 420.33),
            ("opening", 500.0),
            ("euro", 75.0),
        ];

        let mut balances = BalanceMap::new();
        for (account, (_, amount)) in accounts.iter().zip(amounts) {
            let mut balance = AccountBalance::zero(account, 2);
            balance.balance = amount;
            balances.insert(account.id().clone(), balance);
        }
        (accounts, balances)
    }

    #[test]
    fn test_net_worth_signs() {
        let (accounts, balances) = setup();
        let summary = LedgerSummary::from_balances(&accounts, &balances);

        let usd = summary.totals("USD").unwrap();
        assert_eq!(usd.assets, 1000.3);
        assert_eq!(usd.liabilities, 250.05);
        assert_eq!(usd.net_worth, 750.25);
        assert_eq!(summary.net_worth("USD"), 750.25);
    }

    #[test]
    fn test_income_and_expense_totals() {
        let (accounts, balances) = setup();
        let summary = LedgerSummary::from_balances(&accounts, &balances);

        let usd = summary.totals("USD").unwrap();
        assert_eq!(usd.income, 3000.0);
        assert_eq!(usd.expenses, 420.33);
        assert_eq!(usd.equity, 500.0);
        assert_eq!(usd.net_income, 2579.67);
    }

    #[test]
    fn test_currencies_are_not_mixed() {
        let (accounts, balances) = setup();
        let summary = LedgerSummary::from_balances(&accounts, &balances);

        assert_eq!(summary.by_currency.len(), 2);
        assert_eq!(summary.net_worth("EUR"), 75.0);
        assert_eq!(summary.net_worth("GBP"), 0.0);
    }

    #[test]
    fn test_fallback_precision_is_kept() {
        let gold = Account::new(AccountId::new("gold"), "Gold", AccountType::Asset, "XAU");
        let line = TransactionLine {
            id: LineId::generate(),
            entry_id: Uuid::now_v7(),
            account_id: gold.id().clone(),
            amount: 12.34,
            currency_code: "USD".to_string(),
            exchange_rate: 1.0,
            active: true,
        };
        let table = PrecisionTable::from_currencies(&[Currency::new("USD", 2)]).unwrap();
        let policy = IntegrityPolicy::BestEffort {
            fallback_precision: 2,
        };

        let report = compute_balances_with(&[gold.clone()], &[line], &table, policy).unwrap();
        let summary = LedgerSummary::from_balances(&[gold.clone()], &report.balances);

        assert_eq!(report.balances[gold.id()].balance, 12.34);
        assert_eq!(summary.net_worth("XAU"), 12.34);
        assert_eq!(summary.totals("XAU").unwrap().assets, 12.34);
    }

    #[test]
    fn test_overflowing_totals_do_not_panic() {
        let accounts = vec![
            Account::new(AccountId::new("a"), "A", AccountType::Asset, "USD"),
            Account::new(AccountId::new("b"), "B", AccountType::Asset, "USD"),
            Account::new(AccountId::new("c"), "C", AccountType::Liability, "USD"),
        ];
        let mut balances = BalanceMap::new();
        for account in &accounts {
            let mut balance = AccountBalance::zero(account, 2);
            balance.balance = f64::MAX;
            balances.insert(account.id().clone(), balance);
        }

        let summary = LedgerSummary::from_balances(&accounts, &balances);

        let usd = summary.totals("USD").unwrap();
        assert_eq!(usd.assets, f64::INFINITY);
        assert_eq!(usd.net_worth, f64::INFINITY);
    }
}
