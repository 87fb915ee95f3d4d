//! Error types for the ledger

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Idempotency key already posted
    #[error("Duplicate reference: {0}")]
    DuplicateReference(String),

    /// Settled balance below a commit precondition
    #[error("Insufficient funds. Available: {available}, Requested: {requested}")]
    InsufficientFunds {
        /// Settled balance at commit time
        available: Decimal,
        /// Balance the batch required
        requested: Decimal,
    },

    /// Invalid entry
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    /// Disallowed state change
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Entry not found
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Payout not found
    #[error("Payout not found: {0}")]
    PayoutNotFound(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for idempotency conflicts
    pub fn is_duplicate_reference(&self) -> bool {
        matches!(self, Error::DuplicateReference(_))
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_insufficient_funds_message() {
        let err = Error::InsufficientFunds {
            available: dec!(150.00),
            requested: dec!(200.00),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds. Available: 150.00, Requested: 200.00"
        );
    }

    #[test]
    fn test_duplicate_reference_detection() {
        assert!(Error::DuplicateReference("ORD_1_V_2".into()).is_duplicate_reference());
        assert!(!Error::Other("boom".into()).is_duplicate_reference());
    }
}
