//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money)
//! - Append-only history: amounts never change once an entry exists

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Create new identifier
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get raw value
            pub const fn get(&self) -> u64 {
                self.0
            }

            /// Big-endian key bytes (sortable)
            pub fn to_key(&self) -> [u8; 8] {
                self.0.to_be_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

numeric_id!(
    /// Vendor (payee) identifier
    VendorId
);
numeric_id!(
    /// Order identifier
    OrderId
);
numeric_id!(
    /// Order line item identifier
    OrderItemId
);

/// Kind of money movement recorded by an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryType {
    /// Net order revenue credited to the vendor
    Revenue = 1,
    /// Platform commission (reserved, no operation posts it today)
    Commission = 2,
    /// Refund reversal or commission give-back
    Refund = 3,
    /// Withdrawal to the vendor's bank account
    Payout = 4,
    /// Reversal of revenue for a cancelled order
    Cancellation = 5,
}

impl EntryType {
    /// Upper-case audit label
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Revenue => "REVENUE",
            EntryType::Commission => "COMMISSION",
            EntryType::Refund => "REFUND",
            EntryType::Payout => "PAYOUT",
            EntryType::Cancellation => "CANCELLATION",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one monetary movement affecting a vendor's balance.
///
/// Only `is_settled`, `settlement_date` and `description` may change after the
/// entry is committed, and only through [`EntryUpdate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Owner of the funds movement
    pub vendor_id: VendorId,

    /// Originating order (none for payouts)
    pub order_id: Option<OrderId>,

    /// Originating order item (refunds only)
    pub order_item_id: Option<OrderItemId>,

    /// Signed net amount applied to the vendor balance
    pub amount: Decimal,

    /// Item subtotal (REVENUE / CANCELLATION)
    pub gross_amount: Decimal,

    /// Platform cut (REVENUE / CANCELLATION)
    pub commission_amount: Decimal,

    /// gross - commission (REVENUE / CANCELLATION)
    pub net_amount: Decimal,

    /// Type of entry
    pub entry_type: EntryType,

    /// Free-text audit note
    pub description: String,

    /// Counted toward available balance only when true
    pub is_settled: bool,

    /// Earliest time the entry may settle
    pub settlement_date: DateTime<Utc>,

    /// Unique idempotency key
    pub reference_id: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Create an unsettled entry with no order linkage and a zero breakdown
    pub fn new(
        vendor_id: VendorId,
        entry_type: EntryType,
        amount: Decimal,
        reference_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            vendor_id,
            order_id: None,
            order_item_id: None,
            amount,
            gross_amount: Decimal::ZERO,
            commission_amount: Decimal::ZERO,
            net_amount: Decimal::ZERO,
            entry_type,
            description: String::new(),
            is_settled: false,
            settlement_date: now,
            reference_id: reference_id.into(),
            created_at: now,
        }
    }

    /// Link to an order
    pub fn with_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    /// Link to an order item
    pub fn with_order_item(mut self, order_item_id: OrderItemId) -> Self {
        self.order_item_id = Some(order_item_id);
        self
    }

    /// Set gross / commission / net decomposition
    pub fn with_breakdown(mut self, gross: Decimal, commission: Decimal, net: Decimal) -> Self {
        self.gross_amount = gross;
        self.commission_amount = commission;
        self.net_amount = net;
        self
    }

    /// Set audit description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Hold the entry until `settlement_date`
    pub fn held_until(mut self, settlement_date: DateTime<Utc>) -> Self {
        self.is_settled = false;
        self.settlement_date = settlement_date;
        self
    }

    /// Settle at creation
    pub fn settled(mut self) -> Self {
        self.is_settled = true;
        self.settlement_date = self.created_at;
        self
    }

    /// Unsettled and past its settlement date
    pub fn is_due(&self, as_of: DateTime<Utc>) -> bool {
        !self.is_settled && self.settlement_date <= as_of
    }
}

/// One of the permitted mutations on a committed entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntryUpdate {
    /// Flip to settled
    Settle {
        /// Target entry
        entry_id: Uuid,
    },

    /// Settle a superseded entry and tag its description
    Supersede {
        /// Target entry
        entry_id: Uuid,
        /// Appended to the description, e.g. " (CANCELLED)"
        marker: String,
    },

    /// Settle only if still unsettled and due at `as_of`
    ReleaseIfDue {
        /// Target entry
        entry_id: Uuid,
        /// Sweep time
        as_of: DateTime<Utc>,
    },

    /// Force unsettled with a new settlement date
    Restamp {
        /// Target entry
        entry_id: Uuid,
        /// New settlement date
        settlement_date: DateTime<Utc>,
    },
}

impl EntryUpdate {
    /// Entry this update targets
    pub fn entry_id(&self) -> Uuid {
        match self {
            EntryUpdate::Settle { entry_id }
            | EntryUpdate::Supersede { entry_id, .. }
            | EntryUpdate::ReleaseIfDue { entry_id, .. }
            | EntryUpdate::Restamp { entry_id, .. } => *entry_id,
        }
    }

    /// Apply to an entry, returning whether anything changed
    pub fn apply(&self, entry: &mut LedgerEntry) -> bool {
        match self {
            EntryUpdate::Settle { .. } => {
                if entry.is_settled {
                    return false;
                }
                entry.is_settled = true;
                true
            }
            EntryUpdate::Supersede { marker, .. } => {
                if entry.is_settled {
                    return false;
                }
                entry.is_settled = true;
                entry.description.push_str(marker);
                true
            }
            EntryUpdate::ReleaseIfDue { as_of, .. } => {
                if !entry.is_due(*as_of) {
                    return false;
                }
                entry.is_settled = true;
                true
            }
            EntryUpdate::Restamp {
                settlement_date, ..
            } => {
                if !entry.is_settled && entry.settlement_date == *settlement_date {
                    return false;
                }
                entry.is_settled = false;
                entry.settlement_date = *settlement_date;
                true
            }
        }
    }
}

/// Payee bank data copied at payout time
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BankDetails {
    /// Account holder name
    pub holder: String,
    /// Account number
    pub account_number: String,
    /// Branch routing code (IFSC)
    pub ifsc: String,
}

/// Payout lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PayoutStatus {
    /// Requested, transfer not started
    Pending = 1,
    /// Transfer in flight
    Processing = 2,
    /// Transfer confirmed (terminal)
    Completed = 3,
    /// Transfer failed (terminal)
    Failed = 4,
}

impl PayoutStatus {
    /// Terminal states cannot change
    pub fn is_final(&self) -> bool {
        matches!(self, PayoutStatus::Completed | PayoutStatus::Failed)
    }
}

/// Vendor withdrawal record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payout {
    /// Payout ID
    pub id: Uuid,
    /// Payee
    pub vendor_id: VendorId,
    /// Amount withdrawn (positive)
    pub amount: Decimal,
    /// Current status
    pub status: PayoutStatus,
    /// Bank details at request time
    pub bank_details_snapshot: BankDetails,
    /// Bank transfer reference, once known
    pub transaction_id: Option<String>,
    /// Request timestamp
    pub created_at: DateTime<Utc>,
    /// Completion/failure timestamp
    pub processed_at: Option<DateTime<Utc>>,
}

impl Payout {
    /// Create a pending payout
    pub fn new(vendor_id: VendorId, amount: Decimal, bank_details: BankDetails) -> Self {
        Self {
            id: Uuid::now_v7(),
            vendor_id,
            amount,
            status: PayoutStatus::Pending,
            bank_details_snapshot: bank_details,
            transaction_id: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    /// Idempotency key of the matching PAYOUT entry
    pub fn reference_id(&self) -> String {
        format!("PAYOUT_{}", self.id)
    }
}

/// Status change reported by the bank transfer collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutUpdate {
    /// Target payout
    pub payout_id: Uuid,
    /// New status
    pub status: PayoutStatus,
    /// Bank transfer reference
    pub transaction_id: Option<String>,
    /// When the change happened
    pub at: DateTime<Utc>,
}

impl PayoutUpdate {
    /// Apply to a payout
    pub fn apply(&self, payout: &mut Payout) -> Result<()> {
        if payout.status.is_final() {
            return Err(Error::InvalidTransition(format!(
                "payout {} is already {:?}",
                payout.id, payout.status
            )));
        }

        payout.status = self.status;
        if self.transaction_id.is_some() {
            payout.transaction_id = self.transaction_id.clone();
        }
        if self.status.is_final() {
            payout.processed_at = Some(self.at);
        }

        Ok(())
    }
}

/// How platform commission is computed from an item's price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommissionRule {
    /// `price * percentage / 100`
    Percentage {
        /// e.g. 10.00 for 10%
        percentage: Decimal,
    },
    /// Flat amount per item line
    Fixed {
        /// Flat amount
        amount: Decimal,
    },
    /// `price * percentage / 100 + fixed_amount`
    Hybrid {
        /// e.g. 5.00 for 5%
        percentage: Decimal,
        /// Flat component
        fixed_amount: Decimal,
    },
}

impl CommissionRule {
    /// 10% of price
    pub fn default_global() -> Self {
        CommissionRule::Percentage {
            percentage: Decimal::TEN,
        }
    }
}

/// Where a commission rule applies
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleScope {
    /// System-wide default
    Global,
    /// Per-category override
    Category(String),
}

impl RuleScope {
    /// Storage key
    pub fn key(&self) -> String {
        match self {
            RuleScope::Global => "global".to_string(),
            RuleScope::Category(category) => format!("category:{}", category),
        }
    }
}

/// Commission snapshot taken when an order item was invoiced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCommission {
    /// Order item
    pub order_item_id: OrderItemId,
    /// Order
    pub order_id: OrderId,
    /// Vendor
    pub vendor_id: VendorId,
    /// unit price * quantity
    pub subtotal: Decimal,
    /// Percentage component (0 for fixed rules)
    pub commission_rate: Decimal,
    /// Commission charged
    pub commission_amount: Decimal,
    /// Snapshot time
    pub recorded_at: DateTime<Utc>,
}

/// Return request state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReturnStatus {
    /// Customer asked for a return
    Requested = 1,
    /// Return accepted
    Approved = 2,
    /// Goods received back
    Completed = 3,
    /// Return refused
    Rejected = 4,
}

impl ReturnStatus {
    /// Anything but a rejection blocks settlement
    pub fn blocks_settlement(&self) -> bool {
        !matches!(self, ReturnStatus::Rejected)
    }
}

/// Mirror of a return request owned by the order lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnRequest {
    /// Return ID
    pub return_id: u64,
    /// Order being returned
    pub order_id: OrderId,
    /// Current status
    pub status: ReturnStatus,
    /// Last change
    pub updated_at: DateTime<Utc>,
}

/// Guard evaluated inside the commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Precondition {
    /// Settled balance must be at least `at_least`
    AvailableBalance {
        /// Vendor
        vendor_id: VendorId,
        /// Required balance
        at_least: Decimal,
    },
}

/// Set of writes committed atomically
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerBatch {
    /// New entries
    pub entries: Vec<LedgerEntry>,
    /// Mutations of existing entries
    pub updates: Vec<EntryUpdate>,
    /// New payouts
    pub payouts: Vec<Payout>,
    /// Payout status changes
    pub payout_updates: Vec<PayoutUpdate>,
    /// Item commission snapshots
    pub item_commissions: Vec<ItemCommission>,
    /// Checked before anything is written
    pub preconditions: Vec<Precondition>,
}

impl LedgerBatch {
    /// Empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new entry
    pub fn entry(mut self, entry: LedgerEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Add an entry update
    pub fn update(mut self, update: EntryUpdate) -> Self {
        self.updates.push(update);
        self
    }

    /// Add a payout
    pub fn payout(mut self, payout: Payout) -> Self {
        self.payouts.push(payout);
        self
    }

    /// Add a payout status change
    pub fn payout_update(mut self, update: PayoutUpdate) -> Self {
        self.payout_updates.push(update);
        self
    }

    /// Add an item commission snapshot
    pub fn item_commission(mut self, snapshot: ItemCommission) -> Self {
        self.item_commissions.push(snapshot);
        self
    }

    /// Require a settled balance
    pub fn require(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    /// Nothing to write
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
            && self.updates.is_empty()
            && self.payouts.is_empty()
            && self.payout_updates.is_empty()
            && self.item_commissions.is_empty()
    }
}

/// Outcome of a commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Entries created
    pub entries_created: usize,
    /// Updates that changed an entry
    pub entries_updated: usize,
}
