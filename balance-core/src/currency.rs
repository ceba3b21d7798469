//! Currency directory and precision lookup
//!
//! The directory is seeded once by an external service. The engine builds a
//! fresh [`PrecisionTable`] from it on every aggregation and passes it by
//! reference; there is no process-wide currency state.

use crate::error::IntegrityError;
use crate::money::MAX_PRECISION;
use crate::types::{AccountId, LineId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Currency metadata from the directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
    /// Short code, e.g. `EUR`
    pub code: String,

    /// Significant decimal digits of the minor unit
    pub precision: u32,
}

impl Currency {
    /// Create new currency
    pub fn new(code: impl Into<String>, precision: u32) -> Self {
        Self {
            code: code.into(),
            precision,
        }
    }
}

/// Read-only `code -> precision` map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrecisionTable {
    precisions: HashMap<String, u32>,
}

impl PrecisionTable {
    /// Build from a directory listing. Later duplicates win.
    ///
    /// Fails on the first currency whose precision exceeds [`MAX_PRECISION`].
    pub fn from_currencies(currencies: &[Currency]) -> Result<Self, IntegrityError> {
        let mut precisions = HashMap::with_capacity(currencies.len());
        for currency in currencies {
            if currency.precision > MAX_PRECISION {
                return Err(IntegrityError::UnsupportedPrecision {
                    code: currency.code.clone(),
                    precision: currency.precision,
                });
            }
            precisions.insert(currency.code.clone(), currency.precision);
        }
        Ok(Self { precisions })
    }

    /// Precision for `code`, if known
    pub fn get(&self, code: &str) -> Option<u32> {
        self.precisions.get(code).copied()
    }

    /// True if the directory lists `code`
    pub fn contains(&self, code: &str) -> bool {
        self.precisions.contains_key(code)
    }

    /// Precision of an account's home currency
    pub fn account_precision(
        &self,
        account_id: &AccountId,
        code: &str,
    ) -> Result<u32, IntegrityError> {
        self.get(code)
            .ok_or_else(|| IntegrityError::UnknownAccountCurrency {
                account_id: account_id.clone(),
                code: code.to_string(),
            })
    }

    /// Precision of a line's currency
    pub fn line_precision(&self, line_id: LineId, code: &str) -> Result<u32, IntegrityError> {
        self.get(code)
            .ok_or_else(|| IntegrityError::UnknownLineCurrency {
                line_id,
                code: code.to_string(),
            })
    }

    /// Number of known currencies
    pub fn len(&self) -> usize {
        self.precisions.len()
    }

    /// True if no currencies are known
    pub fn is_empty(&self) -> bool {
        self.precisions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PrecisionTable {
        PrecisionTable::from_currencies(&[
            Currency::new("USD", 2),
            Currency::new("JPY", 0),
            Currency::new("BHD", 3),
        ])
        .unwrap()
    }

    #[test]
    fn test_lookup() {
        let table = table();
        assert_eq!(table.get("USD"), Some(2));
        assert_eq!(table.get("JPY"), Some(0));
        assert_eq!(table.get("BHD"), Some(3));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_unknown_code_is_integrity_error() {
        let table = table();
        let line_id = LineId::generate();

        assert_eq!(table.get("XYZ"), None);
        assert_eq!(
            table.line_precision(line_id, "XYZ"),
            Err(IntegrityError::UnknownLineCurrency {
                line_id,
                code: "XYZ".to_string(),
            })
        );
        assert!(matches!(
            table.account_precision(&AccountId::new("a"), "usd"),
            Err(IntegrityError::UnknownAccountCurrency { .. })
        ));
    }

    #[test]
    fn test_later_duplicate_wins() {
        let table =
            PrecisionTable::from_currencies(&[Currency::new("EUR", 2), Currency::new("EUR", 3)])
                .unwrap();
        assert_eq!(table.get("EUR"), Some(3));
        assert!(!table.is_empty());
    }

    #[test]
    fn test_unsupported_precision_rejected() {
        let edge = PrecisionTable::from_currencies(&[Currency::new("ETH", MAX_PRECISION)]);
        assert_eq!(edge.unwrap().get("ETH"), Some(18));

        let err = PrecisionTable::from_currencies(&[
            Currency::new("USD", 2),
            Currency::new("BAD", 309),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            IntegrityError::UnsupportedPrecision {
                code: "BAD".to_string(),
                precision: 309,
            }
        );

        assert!(PrecisionTable::from_currencies(&[Currency::new("MAX", u32::MAX)]).is_err());
    }
}
