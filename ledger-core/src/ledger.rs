//! Main ledger orchestration layer
//!
//! This module ties together storage, metrics and the writer actor into a
//! high-level API for the marketplace books.
//!
//! # Example
//!
//! ```no_run
//! use ledger_core::{Config, EntryType, Ledger, LedgerBatch, LedgerEntry, VendorId};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> ledger_core::Result<()> {
//!     let ledger = Ledger::open(Config::default()).await?;
//!
//!     let vendor = VendorId::new(7);
//!     let entry = LedgerEntry::new(vendor, EntryType::Revenue, Decimal::ZERO, "ORD_1_V_7");
//!     ledger.commit(LedgerBatch::new().entry(entry)).await?;
//!
//!     let available = ledger.settled_balance(vendor)?;
//!     println!("available: {}", available);
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    metrics::Metrics,
    types::{
        CommissionRule, CommitReceipt, EntryType, ItemCommission, LedgerBatch, LedgerEntry,
        OrderId, OrderItemId, Payout, ReturnRequest, RuleScope, VendorId,
    },
    Config, Error, Result, Storage,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    /// Actor handle for writes
    handle: LedgerHandle,

    /// Direct storage access for reads
    storage: Arc<Storage>,

    /// Metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    ///
    /// Must be called inside a Tokio runtime; the writer actor is spawned here.
    pub async fn open(config: Config) -> Result<Self> {
        // Open storage
        let storage = Arc::new(Storage::open(&config)?);

        let metrics = Metrics::new()
            .map_err(|e| Error::Other(format!("Failed to register metrics: {}", e)))?;

        // Spawn actor
        let handle = spawn_ledger_actor(storage.clone(), config.mailbox_capacity, metrics.clone());

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            "Ledger opened"
        );

        Ok(Self {
            handle,
            storage,
            metrics,
            config,
        })
    }

    /// Commit a batch atomically.
    ///
    /// Every new entry is validated first; nothing is written if any entry,
    /// reference or precondition is rejected.
    pub async fn commit(&self, batch: LedgerBatch) -> Result<CommitReceipt> {
        for entry in &batch.entries {
            validate_entry(entry)?;
        }
        for payout in &batch.payouts {
            if payout.amount <= Decimal::ZERO {
                return Err(Error::InvalidEntry(format!(
                    "Payout amount must be positive, got {}",
                    payout.amount
                )));
            }
        }

        if batch.is_empty() {
            return Ok(CommitReceipt::default());
        }

        self.handle.commit(batch).await
    }

    /// Find entry by idempotency key
    pub fn find_by_reference(&self, reference_id: &str) -> Result<Option<LedgerEntry>> {
        self.storage.find_by_reference(reference_id)
    }

    /// Entries of an order, oldest first
    pub fn order_entries(&self, order_id: OrderId) -> Result<Vec<LedgerEntry>> {
        self.storage.order_entries(order_id)
    }

    /// Entries of a vendor, oldest first
    pub fn vendor_entries(&self, vendor_id: VendorId) -> Result<Vec<LedgerEntry>> {
        self.storage.vendor_entries(vendor_id)
    }

    /// Sum of settled amounts (withdrawable)
    pub fn settled_balance(&self, vendor_id: VendorId) -> Result<Decimal> {
        self.storage.balance(vendor_id, true)
    }

    /// Sum of unsettled amounts (in hold)
    pub fn uncleared_balance(&self, vendor_id: VendorId) -> Result<Decimal> {
        self.storage.balance(vendor_id, false)
    }

    /// Unsettled entries with `settlement_date <= as_of`, earliest first
    pub fn due_entries(&self, as_of: DateTime<Utc>) -> Result<Vec<LedgerEntry>> {
        self.storage.due_entries(as_of)
    }

    /// Get payout by ID
    pub fn get_payout(&self, payout_id: Uuid) -> Result<Payout> {
        self.storage.get_payout(payout_id)
    }

    /// Payouts of a vendor, oldest first
    pub fn vendor_payouts(&self, vendor_id: VendorId) -> Result<Vec<Payout>> {
        self.storage.vendor_payouts(vendor_id)
    }

    /// Commission rule stored for a scope
    pub fn get_commission_rule(&self, scope: &RuleScope) -> Result<Option<CommissionRule>> {
        self.storage.get_commission_rule(scope)
    }

    /// Insert or replace a commission rule
    pub async fn put_commission_rule(&self, scope: RuleScope, rule: CommissionRule) -> Result<()> {
        self.handle.put_commission_rule(scope, Some(rule)).await
    }

    /// Remove a commission rule
    pub async fn remove_commission_rule(&self, scope: RuleScope) -> Result<()> {
        self.handle.put_commission_rule(scope, None).await
    }

    /// Store `rule` unless the scope already has one; returns the effective
    /// rule and whether it was inserted
    pub async fn insert_commission_rule_if_absent(
        &self,
        scope: RuleScope,
        rule: CommissionRule,
    ) -> Result<(CommissionRule, bool)> {
        self.handle.insert_commission_rule_if_absent(scope, rule).await
    }

    /// Commission snapshot of an order item
    pub fn item_commission(&self, order_item_id: OrderItemId) -> Result<Option<ItemCommission>> {
        self.storage.item_commission(order_item_id)
    }

    /// Record the state of a return request
    pub async fn record_return_request(&self, request: ReturnRequest) -> Result<()> {
        self.handle.put_return_request(request).await
    }

    /// Return requests of an order
    pub fn return_requests(&self, order_id: OrderId) -> Result<Vec<ReturnRequest>> {
        self.storage.return_requests(order_id)
    }

    /// Whether an order has a return that blocks settlement
    pub fn has_active_return(&self, order_id: OrderId) -> Result<bool> {
        self.storage.has_active_return(order_id)
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stop the writer actor
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }
}

/// Validate a new entry before it is committed
pub fn validate_entry(entry: &LedgerEntry) -> Result<()> {
    if entry.reference_id.trim().is_empty() {
        return Err(Error::InvalidEntry("reference_id must not be empty".to_string()));
    }

    match entry.entry_type {
        EntryType::Revenue | EntryType::Cancellation => {
            if entry.gross_amount - entry.commission_amount != entry.net_amount {
                return Err(Error::InvalidEntry(format!(
                    "{}: gross {} - commission {} != net {}",
                    entry.reference_id,
                    entry.gross_amount,
                    entry.commission_amount,
                    entry.net_amount
                )));
            }

            if entry.amount != entry.net_amount {
                return Err(Error::InvalidEntry(format!(
                    "{}: amount {} does not match net {}",
                    entry.reference_id, entry.amount, entry.net_amount
                )));
            }

            if entry.entry_type == EntryType::Cancellation && !entry.is_settled {
                return Err(Error::InvalidEntry(format!(
                    "{}: cancellation must be settled at creation",
                    entry.reference_id
                )));
            }
        }
        EntryType::Payout => {
            if entry.amount >= Decimal::ZERO {
                return Err(Error::InvalidEntry(format!(
                    "{}: payout amount must be negative",
                    entry.reference_id
                )));
            }
            if !entry.is_settled {
                return Err(Error::InvalidEntry(format!(
                    "{}: payout must be settled at creation",
                    entry.reference_id
                )));
            }
        }
        EntryType::Refund | EntryType::Commission => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryUpdate, ReturnStatus};
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    async fn create_test_ledger() -> (Ledger, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };
        (Ledger::open(config).await.unwrap(), temp_dir)
    }

    fn revenue(vendor: VendorId, order: u64, gross: Decimal, commission: Decimal) -> LedgerEntry {
        let net = gross - commission;
        LedgerEntry::new(vendor, EntryType::Revenue, net, format!("ORD_{}_V_{}", order, vendor))
            .with_order(OrderId::new(order))
            .with_breakdown(gross, commission, net)
            .held_until(Utc::now() + Duration::days(7))
    }

    #[tokio::test]
    async fn test_ledger_creation() {
        let (ledger, _temp) = create_test_ledger().await;
        assert_eq!(ledger.config().service_name, "ledger-core");
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_balances_follow_settlement() {
        let (ledger, _temp) = create_test_ledger().await;
        let vendor = VendorId::new(1);
        let entry = revenue(vendor, 1, dec!(1000), dec!(100));

        ledger.commit(LedgerBatch::new().entry(entry.clone())).await.unwrap();
        assert_eq!(ledger.settled_balance(vendor).unwrap(), Decimal::ZERO);
        assert_eq!(ledger.uncleared_balance(vendor).unwrap(), dec!(900));

        ledger
            .commit(LedgerBatch::new().update(EntryUpdate::Settle { entry_id: entry.id }))
            .await
            .unwrap();
        assert_eq!(ledger.settled_balance(vendor).unwrap(), dec!(900));
        assert_eq!(ledger.uncleared_balance(vendor).unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_duplicate_reference_rejected() {
        let (ledger, _temp) = create_test_ledger().await;
        let vendor = VendorId::new(2);

        ledger
            .commit(LedgerBatch::new().entry(revenue(vendor, 5, dec!(100), dec!(10))))
            .await
            .unwrap();
        let err = ledger
            .commit(LedgerBatch::new().entry(revenue(vendor, 5, dec!(100), dec!(10))))
            .await
            .unwrap_err();

        assert!(err.is_duplicate_reference());
        assert_eq!(ledger.metrics().duplicates_total.get(), 1);
        assert_eq!(ledger.vendor_entries(vendor).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_validation_rejects_bad_breakdown() {
        let (ledger, _temp) = create_test_ledger().await;
        let mut entry = revenue(VendorId::new(3), 1, dec!(100), dec!(10));
        entry.net_amount = dec!(95);

        let result = ledger.commit(LedgerBatch::new().entry(entry)).await;
        assert!(matches!(result, Err(Error::InvalidEntry(_))));
    }

    #[tokio::test]
    async fn test_cancellation_commits_and_nets_out() {
        let (ledger, _temp) = create_test_ledger().await;
        let vendor = VendorId::new(4);
        let original = revenue(vendor, 8, dec!(1000), dec!(100));
        ledger
            .commit(LedgerBatch::new().entry(original.clone()))
            .await
            .unwrap();

        let cancellation = LedgerEntry::new(
            vendor,
            EntryType::Cancellation,
            -original.amount,
            format!("CANCEL_8_V_{}", vendor),
        )
        .with_order(OrderId::new(8))
        .with_breakdown(
            -original.gross_amount,
            -original.commission_amount,
            -original.net_amount,
        )
        .settled();

        let receipt = ledger
            .commit(
                LedgerBatch::new()
                    .entry(cancellation)
                    .update(EntryUpdate::Supersede {
                        entry_id: original.id,
                        marker: " (CANCELLED)".to_string(),
                    }),
            )
            .await
            .unwrap();

        assert_eq!(receipt.entries_created, 1);
        assert_eq!(receipt.entries_updated, 1);
        assert_eq!(ledger.settled_balance(vendor).unwrap(), Decimal::ZERO);
        assert_eq!(ledger.uncleared_balance(vendor).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_validate_entry_rules() {
        let vendor = VendorId::new(1);

        let blank = LedgerEntry::new(vendor, EntryType::Refund, dec!(-1), "  ");
        assert!(validate_entry(&blank).is_err());

        let positive_payout = LedgerEntry::new(vendor, EntryType::Payout, dec!(5), "P1").settled();
        assert!(validate_entry(&positive_payout).is_err());

        let held_payout = LedgerEntry::new(vendor, EntryType::Payout, dec!(-5), "P2");
        assert!(validate_entry(&held_payout).is_err());

        let cancellation =
            LedgerEntry::new(vendor, EntryType::Cancellation, dec!(-90), "CANCEL_1_V_1")
                .with_breakdown(dec!(-100), dec!(-10), dec!(-90))
                .settled();
        assert!(validate_entry(&cancellation).is_ok());

        let unsigned_breakdown =
            LedgerEntry::new(vendor, EntryType::Cancellation, dec!(-90), "CANCEL_2_V_1")
                .with_breakdown(dec!(100), dec!(10), dec!(90))
                .settled();
        assert!(validate_entry(&unsigned_breakdown).is_err());

        // Fixed commission above the price leaves a negative net
        let underwater = LedgerEntry::new(vendor, EntryType::Revenue, dec!(-10), "ORD_9_V_1")
            .with_breakdown(dec!(10), dec!(20), dec!(-10));
        assert!(validate_entry(&underwater).is_ok());

        let unsettled_cancellation = cancellation.clone().held_until(Utc::now());
        assert!(validate_entry(&unsettled_cancellation).is_err());

        let refund = LedgerEntry::new(vendor, EntryType::Refund, dec!(-18), "REFUND_REV_ab12cd34");
        assert!(validate_entry(&refund).is_ok());
    }

    #[tokio::test]
    async fn test_commission_rule_lifecycle() {
        let (ledger, _temp) = create_test_ledger().await;
        let scope = RuleScope::Category("books".to_string());

        assert!(ledger.get_commission_rule(&scope).unwrap().is_none());

        let rule = CommissionRule::Fixed { amount: dec!(15) };
        ledger
            .put_commission_rule(scope.clone(), rule.clone())
            .await
            .unwrap();
        assert_eq!(ledger.get_commission_rule(&scope).unwrap(), Some(rule));

        ledger.remove_commission_rule(scope.clone()).await.unwrap();
        assert!(ledger.get_commission_rule(&scope).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_return_requests_mirror() {
        let (ledger, _temp) = create_test_ledger().await;
        let order = OrderId::new(44);

        ledger
            .record_return_request(ReturnRequest {
                return_id: 9,
                order_id: order,
                status: ReturnStatus::Approved,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(ledger.has_active_return(order).unwrap());
        assert_eq!(ledger.return_requests(order).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let (ledger, _temp) = create_test_ledger().await;
        let receipt = ledger.commit(LedgerBatch::new()).await.unwrap();
        assert_eq!(receipt, CommitReceipt::default());
    }
}
