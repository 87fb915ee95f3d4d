//! Marketplace Ledger Core
//!
//! Append-only vendor ledger backing order revenue, reversals, refunds and
//! payouts.
//!
//! # Architecture
//!
//! - **Append-only**: Amounts never change; corrections are new entries
//! - **Single Writer**: One actor task serializes commits and balance checks
//! - **Atomic batches**: Entries, updates and payouts of one business action
//!   land in a single RocksDB `WriteBatch`
//!
//! # Invariants
//!
//! - Available balance == Σ amount over settled entries
//! - Uncleared balance == Σ amount over unsettled entries
//! - A `reference_id` is posted at most once

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod storage;
pub mod ledger;
pub mod error;
pub mod actor;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Error, Result};
pub use types::{
    BankDetails, CommissionRule, CommitReceipt, EntryType, EntryUpdate, ItemCommission,
    LedgerBatch, LedgerEntry, OrderId, OrderItemId, Payout, PayoutStatus, PayoutUpdate,
    Precondition, ReturnRequest, ReturnStatus, RuleScope, VendorId,
};
pub use ledger::{validate_entry, Ledger};
pub use config::Config;
pub use metrics::Metrics;
pub use storage::Storage;
