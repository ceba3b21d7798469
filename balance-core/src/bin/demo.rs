//! Balance pipeline demo binary
//!
//! Seeds an in-memory ledger, runs the pipeline over it and prints the
//! balances it publishes. Pass a TOML config path as the first argument, or
//! configure through `BALANCES_*` environment variables.

use anyhow::Context;
use balance_core::{
    spawn_balance_pipeline, Account, AccountId, AccountType, Config, Currency,
    JournalEntryBuilder, LedgerStore, LedgerSummary, MemoryStore, Metrics,
};
use prometheus::Encoder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => Config::from_env().context("reading BALANCES_* environment")?,
    };
    tracing::info!(service = %config.service_name, "Starting balances demo");

    let store = seed_store()?;
    let metrics = Metrics::new()?;
    let pipeline = spawn_balance_pipeline(&store, &config, metrics.clone());
    let mut subscription = pipeline.subscribe();

    let first = subscription.wait_for_version(1).await?;
    tracing::info!(version = first.version, "initial balances ready");

    // A burst of writes settles into a single recomputation
    let cash = AccountId::new("cash");
    let groceries = AccountId::new("groceries");
    for amount in [12.40, 7.15, 3.05] {
        store.post_entry(
            JournalEntryBuilder::new("USD")
                .debit(&groceries, amount)
                .credit(&cash, amount),
        )?;
    }

    let latest = subscription.wait_for_version(first.version + 1).await?;
    if let Some(error) = &latest.last_error {
        tracing::warn!(%error, "serving stale balances");
    }

    let ledger = store.snapshot().await?;

    let mut accounts = ledger.accounts.clone();
    accounts.sort_by(|a, b| a.id().cmp(b.id()));
    println!("Balances (version {}):", latest.version);
    for account in &accounts {
        if let Some(balance) = latest.balance(account.id()) {
            println!(
                "  {:<16} {:<10} {:>14}  ({} lines)",
                account.name(),
                format!("{:?}", account.account_type()),
                balance.to_string(),
                balance.transaction_count
            );
        }
    }

    let summary = LedgerSummary::from_balances(&ledger.accounts, &latest.balances);
    println!("Summary:\n{}", serde_json::to_string_pretty(&summary)?);

    let mut buffer = Vec::new();
    prometheus::TextEncoder::new().encode(&metrics.registry().gather(), &mut buffer)?;
    println!("{}", String::from_utf8(buffer)?);

    pipeline.shutdown().await?;
    tracing::info!("Shutting down balances demo");
    Ok(())
}

fn seed_store() -> anyhow::Result<MemoryStore> {
    let store = MemoryStore::with_currencies(vec![
        Currency::new("USD", 2),
        Currency::new("EUR", 2),
        Currency::new("JPY", 0),
    ]);

    let accounts = [
        ("cash", "Cash", AccountType::Asset, "USD"),
        ("savings", "Savings", AccountType::Asset, "EUR"),
        ("card", "Credit Card", AccountType::Liability, "USD"),
        ("salary", "Salary", AccountType::Income, "USD"),
        ("groceries", "Groceries", AccountType::Expense, "USD"),
        ("travel", "Travel", AccountType::Expense, "JPY"),
        ("opening", "Opening Balance", AccountType::Equity, "USD"),
    ];
    for (id, name, account_type, currency) in accounts {
        store.upsert_account(Account::new(AccountId::new(id), name, account_type, currency))?;
    }

    let id = AccountId::new;
    store.post_entry(
        JournalEntryBuilder::new("USD")
            .debit(&id("cash"), 500.0)
            .credit(&id("opening"), 500.0),
    )?;
    store.post_entry(
        JournalEntryBuilder::new("USD")
            .debit(&id("cash"), 3200.0)
            .credit(&id("salary"), 3200.0),
    )?;
    store.post_entry(
        JournalEntryBuilder::new("USD")
            .debit(&id("savings"), 1000.0)
            .credit(&id("cash"), 1000.0)
            .with_rate(&id("savings"), 0.92),
    )?;
    store.post_entry(
        JournalEntryBuilder::new("USD")
            .debit(&id("travel"), 210.0)
            .credit(&id("card"), 210.0)
            .with_rate(&id("travel"), 149.6),
    )?;

    Ok(store)
}
