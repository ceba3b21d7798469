//! Error types for balance aggregation

use crate::types::{AccountId, LineId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for balance operations
pub type Result<T> = std::result::Result<T, Error>;

/// Data-integrity failures detected while aggregating a ledger snapshot.
///
/// Every variant names the entity that caused it so the offending row can be
/// located in the store.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IntegrityError {
    /// A transaction line is denominated in a currency the directory does not know
    #[error("Line {line_id} uses unknown currency {code}")]
    UnknownLineCurrency {
        /// Offending line
        line_id: LineId,
        /// Currency code found on the line
        code: String,
    },

    /// An account's home currency is missing from the directory
    #[error("Account {account_id} has unknown home currency {code}")]
    UnknownAccountCurrency {
        /// Offending account
        account_id: AccountId,
        /// Currency code found on the account
        code: String,
    },

    /// A transaction line references an account absent from the account set
    #[error("Line {line_id} references unknown account {account_id}")]
    OrphanedLine {
        /// Offending line
        line_id: LineId,
        /// Account the line points at
        account_id: AccountId,
    },

    /// Amount or exchange rate is NaN or infinite
    #[error("Line {line_id} carries a non-finite amount or exchange rate")]
    NonFiniteAmount {
        /// Offending line
        line_id: LineId,
    },

    /// Adding a line pushed the account total beyond `f64` range
    #[error("Line {line_id} overflows the balance of account {account_id}")]
    BalanceOverflow {
        /// Line whose contribution overflowed
        line_id: LineId,
        /// Account whose total overflowed
        account_id: AccountId,
    },

    /// The directory lists a precision the arithmetic cannot represent
    #[error("Currency {code} has unsupported precision {precision}")]
    UnsupportedPrecision {
        /// Currency code
        code: String,
        /// Precision found in the directory
        precision: u32,
    },
}

/// Balance engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger data failed an integrity check
    #[error("Integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    /// Journal entry debits and credits differ
    #[error("Unbalanced entry: debits {debits} != credits {credits}")]
    UnbalancedEntry {
        /// Sum of debit postings
        debits: f64,
        /// Sum of credit postings
        credits: f64,
    },

    /// Journal entry is malformed
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    /// Attempt to change an account's type or home currency
    #[error("Account {0} cannot change type or currency")]
    ImmutableAccount(AccountId),

    /// No transaction line with this ID
    #[error("Line not found: {0}")]
    LineNotFound(LineId),

    /// Snapshot read from the store failed (transient)
    #[error("Store error: {0}")]
    Store(String),

    /// Concurrency error (pipeline mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for data-integrity failures
    pub fn is_integrity(&self) -> bool {
        matches!(self, Error::Integrity(_))
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
