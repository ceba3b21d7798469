//! Balance Core
//!
//! Per-account balances for a double-entry personal-finance ledger, kept
//! fresh as the underlying store changes.
//!
//! # Architecture
//!
//! - **Money Arithmetic**: `f64` amounts rounded half away from zero at each
//!   currency's precision, with epsilon-tolerant comparison
//! - **Pure Engine**: One pass over active lines, converted into each account's
//!   home currency
//! - **Reactive Pipeline**: One actor per pipeline, debounced, publishing
//!   versioned snapshots through a single-slot cell
//!
//! # Invariants
//!
//! - Every account appears in the result, zero lines means zero balance
//! - Each line contribution is rounded before it is accumulated
//! - Inactive lines contribute nothing
//! - Published versions strictly increase; an older result never replaces a newer one

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod currency;
pub mod engine;
pub mod error;
pub mod journal;
pub mod metrics;
pub mod money;
pub mod pipeline;
pub mod store;
pub mod summary;
pub mod types;

// Re-exports
pub use config::{Config, PipelineConfig};
pub use currency::{Currency, PrecisionTable};
pub use engine::{compute_balances, compute_balances_with, BalanceReport, IntegrityPolicy};
pub use error::{Error, IntegrityError, Result};
pub use journal::{JournalEntry, JournalEntryBuilder};
pub use metrics::Metrics;
pub use money::{amounts_are_equal, round_to_precision, safe_add, safe_subtract};
pub use pipeline::{
    spawn_balance_pipeline, BalancePipeline, BalanceSnapshot, BalanceSubscription,
};
pub use store::{compute_from_store, LedgerSnapshot, LedgerStore, MemoryStore};
pub use summary::{CurrencyTotals, LedgerSummary};
pub use types::{
    Account, AccountBalance, AccountId, AccountType, BalanceMap, LineId, NormalSide,
    TransactionLine,
};
