//! Error types for the settlement engine

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settlement errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger_core::Error),

    /// Payout exceeds the settled balance
    #[error("Insufficient funds. Available: {available}, Requested: {requested}")]
    InsufficientFunds {
        /// Settled balance
        available: Decimal,
        /// Amount asked for
        requested: Decimal,
    },

    /// Invalid input (amounts, identifiers)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Order item cannot be attributed to a vendor
    #[error("Attribution error: {0}")]
    Attribution(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Scheduler error
    #[error("Schedule error: {0}")]
    Schedule(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True when a posting collided with an existing idempotency key
    pub fn is_duplicate_reference(&self) -> bool {
        matches!(self, Error::Ledger(e) if e.is_duplicate_reference())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_reference_passthrough() {
        let err: Error = ledger_core::Error::DuplicateReference("ORD_1_V_1".into()).into();
        assert!(err.is_duplicate_reference());
        assert!(!Error::Validation("x".into()).is_duplicate_reference());
    }

    #[test]
    fn test_insufficient_funds_message() {
        let err = Error::InsufficientFunds {
            available: Decimal::new(15000, 2),
            requested: Decimal::new(20000, 2),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds. Available: 150.00, Requested: 200.00"
        );
    }
}
