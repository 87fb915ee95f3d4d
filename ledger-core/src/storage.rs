//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `entries` - Ledger entries (key: entry_id)
//! - `references` - Idempotency keys (key: reference_id, value: entry_id)
//! - `indices` - Secondary indices for fast lookups
//! - `payouts` - Payout records (key: payout_id)
//! - `commission` - Commission rules (key: rule scope)
//! - `items` - Item commission snapshots (key: order_item_id)
//! - `returns` - Return request mirror (key: order_id || return_id)
//!
//! # Index layout
//!
//! ```text
//! V | vendor(8) | settled(1) | entry_id(16)   balance aggregation
//! O | order(8)  | entry_id(16)                entries of an order
//! S | settlement_ms(8) | entry_id(16)         unsettled entries by date
//! P | vendor(8) | payout_id(16)               payouts of a vendor
//! ```

use crate::{
    error::{Error, Result},
    types::{
        CommissionRule, CommitReceipt, ItemCommission, LedgerBatch, LedgerEntry, OrderId,
        OrderItemId, Payout, Precondition, ReturnRequest, RuleScope, VendorId,
    },
    Config,
};
use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use rust_decimal::Decimal;
use std::collections::{hash_map, HashMap, HashSet};
use uuid::Uuid;

/// Column family names
const CF_ENTRIES: &str = "entries";
const CF_REFERENCES: &str = "references";
const CF_INDICES: &str = "indices";
const CF_PAYOUTS: &str = "payouts";
const CF_COMMISSION: &str = "commission";
const CF_ITEMS: &str = "items";
const CF_RETURNS: &str = "returns";

/// Index tags
const IDX_VENDOR: u8 = b'V';
const IDX_ORDER: u8 = b'O';
const IDX_SETTLEMENT: u8 = b'S';
const IDX_PAYOUT: u8 = b'P';

type KeyValue = (Box<[u8]>, Box<[u8]>);

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_level_zero_file_num_compaction_trigger(
            config.rocksdb.level0_file_num_compaction_trigger,
        );

        // Append-heavy workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ENTRIES, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_REFERENCES, Self::cf_options_lookup()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_lookup()),
            ColumnFamilyDescriptor::new(CF_PAYOUTS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_COMMISSION, Options::default()),
            ColumnFamilyDescriptor::new(CF_ITEMS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_RETURNS, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened ledger storage");

        Ok(Self { db })
    }

    // Column family options

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_lookup() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Point lookups on every commit
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn scan_prefix(&self, cf: &ColumnFamily, prefix: &[u8]) -> Result<Vec<KeyValue>> {
        let mut out = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key, value));
        }

        Ok(out)
    }

    // Entry reads

    /// Get entry by ID
    pub fn get_entry(&self, entry_id: Uuid) -> Result<LedgerEntry> {
        self.try_get_entry(entry_id)?
            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))
    }

    fn try_get_entry(&self, entry_id: Uuid) -> Result<Option<LedgerEntry>> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        match self.db.get_cf(cf, entry_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Get entry by idempotency key
    pub fn find_by_reference(&self, reference_id: &str) -> Result<Option<LedgerEntry>> {
        let cf = self.cf_handle(CF_REFERENCES)?;
        match self.db.get_cf(cf, reference_id.as_bytes())? {
            Some(value) => {
                let entry_id = Uuid::from_slice(&value)
                    .map_err(|e| Error::Storage(format!("Malformed reference value: {}", e)))?;
                self.try_get_entry(entry_id)
            }
            None => Ok(None),
        }
    }

    /// All entries of an order, oldest first
    pub fn order_entries(&self, order_id: OrderId) -> Result<Vec<LedgerEntry>> {
        let prefix = Self::order_key(order_id, None);
        self.entries_from_index(&prefix)
    }

    /// All entries of a vendor, oldest first
    pub fn vendor_entries(&self, vendor_id: VendorId) -> Result<Vec<LedgerEntry>> {
        let mut prefix = vec![IDX_VENDOR];
        prefix.extend_from_slice(&vendor_id.to_key());

        let mut entries = self.entries_from_index(&prefix)?;
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(entries)
    }

    /// Sum of `amount` over a vendor's settled (or unsettled) entries
    pub fn balance(&self, vendor_id: VendorId, settled: bool) -> Result<Decimal> {
        let prefix = Self::vendor_key(vendor_id, settled, None);
        let total = self
            .entries_from_index(&prefix)?
            .iter()
            .filter(|entry| entry.is_settled == settled)
            .map(|entry| entry.amount)
            .sum();
        Ok(total)
    }

    /// Unsettled entries whose settlement date is at or before `as_of`
    pub fn due_entries(&self, as_of: DateTime<Utc>) -> Result<Vec<LedgerEntry>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let limit = Self::millis_key(as_of);
        let start = [IDX_SETTLEMENT];

        let mut entries = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&start, Direction::Forward))
        {
            let (key, _) = item?;
            if key.first() != Some(&IDX_SETTLEMENT) || key.len() < 9 {
                break;
            }

            let mut millis = [0u8; 8];
            millis.copy_from_slice(&key[1..9]);
            if u64::from_be_bytes(millis) > limit {
                break;
            }

            let entry = self.get_entry(Self::entry_id_from_key(&key)?)?;
            if entry.is_due(as_of) {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    fn entries_from_index(&self, prefix: &[u8]) -> Result<Vec<LedgerEntry>> {
        let cf = self.cf_handle(CF_INDICES)?;
        self.scan_prefix(cf, prefix)?
            .iter()
            .map(|(key, _)| self.get_entry(Self::entry_id_from_key(key)?))
            .collect()
    }

    // Payout reads

    /// Get payout by ID
    pub fn get_payout(&self, payout_id: Uuid) -> Result<Payout> {
        let cf = self.cf_handle(CF_PAYOUTS)?;
        let value = self
            .db
            .get_cf(cf, payout_id.as_bytes())?
            .ok_or_else(|| Error::PayoutNotFound(payout_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// All payouts of a vendor, oldest first
    pub fn vendor_payouts(&self, vendor_id: VendorId) -> Result<Vec<Payout>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let prefix = Self::payout_key(vendor_id, None);
        self.scan_prefix(cf, &prefix)?
            .iter()
            .map(|(key, _)| self.get_payout(Self::entry_id_from_key(key)?))
            .collect()
    }

    // Commit

    /// Apply a batch atomically.
    ///
    /// Preconditions, reference uniqueness and update targets are all checked
    /// before the single `WriteBatch` is written, so a failure leaves the
    /// database untouched.
    pub fn commit(&self, batch: &LedgerBatch) -> Result<CommitReceipt> {
        for precondition in &batch.preconditions {
            match precondition {
                Precondition::AvailableBalance {
                    vendor_id,
                    at_least,
                } => {
                    let available = self.balance(*vendor_id, true)?;
                    if available < *at_least {
                        return Err(Error::InsufficientFunds {
                            available,
                            requested: *at_least,
                        });
                    }
                }
            }
        }

        let cf_entries = self.cf_handle(CF_ENTRIES)?;
        let cf_references = self.cf_handle(CF_REFERENCES)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let cf_payouts = self.cf_handle(CF_PAYOUTS)?;
        let cf_items = self.cf_handle(CF_ITEMS)?;

        let mut seen = HashSet::new();
        for entry in &batch.entries {
            let taken = self
                .db
                .get_pinned_cf(cf_references, entry.reference_id.as_bytes())?
                .is_some();
            if taken || !seen.insert(entry.reference_id.as_str()) {
                return Err(Error::DuplicateReference(entry.reference_id.clone()));
            }
        }

        let mut write = WriteBatch::default();

        // 1. New entries, idempotency keys, indices
        for entry in &batch.entries {
            write.put_cf(cf_entries, entry.id.as_bytes(), bincode::serialize(entry)?);
            write.put_cf(cf_references, entry.reference_id.as_bytes(), entry.id.as_bytes());
            Self::index_entry(&mut write, cf_indices, entry);
        }

        // 2. Updates: (as stored, as updated)
        let mut touched: HashMap<Uuid, (LedgerEntry, LedgerEntry)> = HashMap::new();
        let mut entries_updated = 0;
        for update in &batch.updates {
            let slot = match touched.entry(update.entry_id()) {
                hash_map::Entry::Occupied(slot) => slot.into_mut(),
                hash_map::Entry::Vacant(slot) => {
                    let stored = self.get_entry(update.entry_id())?;
                    slot.insert((stored.clone(), stored))
                }
            };
            if update.apply(&mut slot.1) {
                entries_updated += 1;
            }
        }

        for (stored, updated) in touched.values() {
            if stored == updated {
                continue;
            }
            Self::unindex_entry(&mut write, cf_indices, stored);
            Self::index_entry(&mut write, cf_indices, updated);
            write.put_cf(cf_entries, updated.id.as_bytes(), bincode::serialize(updated)?);
        }

        // 3. Payouts
        for payout in &batch.payouts {
            if self.db.get_pinned_cf(cf_payouts, payout.id.as_bytes())?.is_some() {
                return Err(Error::InvalidEntry(format!(
                    "Payout {} already exists",
                    payout.id
                )));
            }
            write.put_cf(cf_payouts, payout.id.as_bytes(), bincode::serialize(payout)?);
            write.put_cf(
                cf_indices,
                Self::payout_key(payout.vendor_id, Some(payout.id)),
                b"",
            );
        }

        for update in &batch.payout_updates {
            let mut payout = self.get_payout(update.payout_id)?;
            update.apply(&mut payout)?;
            write.put_cf(cf_payouts, payout.id.as_bytes(), bincode::serialize(&payout)?);
        }

        // 4. Item commission snapshots
        for snapshot in &batch.item_commissions {
            write.put_cf(
                cf_items,
                snapshot.order_item_id.to_key(),
                bincode::serialize(snapshot)?,
            );
        }

        // Atomic commit
        self.db.write(write)?;

        let receipt = CommitReceipt {
            entries_created: batch.entries.len(),
            entries_updated,
        };

        tracing::debug!(
            entries_created = receipt.entries_created,
            entries_updated = receipt.entries_updated,
            payouts = batch.payouts.len(),
            "Batch committed"
        );

        Ok(receipt)
    }

    fn index_entry(write: &mut WriteBatch, cf: &ColumnFamily, entry: &LedgerEntry) {
        write.put_cf(
            cf,
            Self::vendor_key(entry.vendor_id, entry.is_settled, Some(entry.id)),
            b"",
        );
        if let Some(order_id) = entry.order_id {
            write.put_cf(cf, Self::order_key(order_id, Some(entry.id)), b"");
        }
        if !entry.is_settled {
            write.put_cf(
                cf,
                Self::settlement_key(entry.settlement_date, Some(entry.id)),
                b"",
            );
        }
    }

    fn unindex_entry(write: &mut WriteBatch, cf: &ColumnFamily, entry: &LedgerEntry) {
        write.delete_cf(
            cf,
            Self::vendor_key(entry.vendor_id, entry.is_settled, Some(entry.id)),
        );
        if let Some(order_id) = entry.order_id {
            write.delete_cf(cf, Self::order_key(order_id, Some(entry.id)));
        }
        if !entry.is_settled {
            write.delete_cf(
                cf,
                Self::settlement_key(entry.settlement_date, Some(entry.id)),
            );
        }
    }

    // Commission rules

    /// Get rule for a scope
    pub fn get_commission_rule(&self, scope: &RuleScope) -> Result<Option<CommissionRule>> {
        let cf = self.cf_handle(CF_COMMISSION)?;
        match self.db.get_cf(cf, scope.key().as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Insert or replace rule
    pub fn put_commission_rule(&self, scope: &RuleScope, rule: &CommissionRule) -> Result<()> {
        let cf = self.cf_handle(CF_COMMISSION)?;
        self.db
            .put_cf(cf, scope.key().as_bytes(), bincode::serialize(rule)?)?;
        Ok(())
    }

    /// Insert rule unless one exists; returns the stored rule and whether it was inserted
    pub fn insert_commission_rule_if_absent(
        &self,
        scope: &RuleScope,
        rule: &CommissionRule,
    ) -> Result<(CommissionRule, bool)> {
        if let Some(existing) = self.get_commission_rule(scope)? {
            return Ok((existing, false));
        }
        self.put_commission_rule(scope, rule)?;
        Ok((rule.clone(), true))
    }

    /// Remove rule
    pub fn delete_commission_rule(&self, scope: &RuleScope) -> Result<()> {
        let cf = self.cf_handle(CF_COMMISSION)?;
        self.db.delete_cf(cf, scope.key().as_bytes())?;
        Ok(())
    }

    // Item snapshots

    /// Commission snapshot for an order item
    pub fn item_commission(&self, order_item_id: OrderItemId) -> Result<Option<ItemCommission>> {
        let cf = self.cf_handle(CF_ITEMS)?;
        match self.db.get_cf(cf, order_item_id.to_key())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    // Return requests

    /// Insert or replace a return request
    pub fn put_return_request(&self, request: &ReturnRequest) -> Result<()> {
        let cf = self.cf_handle(CF_RETURNS)?;
        let mut key = request.order_id.to_key().to_vec();
        key.extend_from_slice(&request.return_id.to_be_bytes());
        self.db.put_cf(cf, key, bincode::serialize(request)?)?;
        Ok(())
    }

    /// Return requests of an order
    pub fn return_requests(&self, order_id: OrderId) -> Result<Vec<ReturnRequest>> {
        let cf = self.cf_handle(CF_RETURNS)?;
        self.scan_prefix(cf, &order_id.to_key())?
            .iter()
            .map(|(_, value)| Ok(bincode::deserialize(value)?))
            .collect()
    }

    /// Any return not in a rejected state
    pub fn has_active_return(&self, order_id: OrderId) -> Result<bool> {
        Ok(self
            .return_requests(order_id)?
            .iter()
            .any(|request| request.status.blocks_settlement()))
    }

    // Index key helpers

    fn vendor_key(vendor_id: VendorId, settled: bool, entry_id: Option<Uuid>) -> Vec<u8> {
        let mut key = vec![IDX_VENDOR];
        key.extend_from_slice(&vendor_id.to_key());
        key.push(settled as u8);
        if let Some(id) = entry_id {
            key.extend_from_slice(id.as_bytes());
        }
        key
    }

    fn order_key(order_id: OrderId, entry_id: Option<Uuid>) -> Vec<u8> {
        let mut key = vec![IDX_ORDER];
        key.extend_from_slice(&order_id.to_key());
        if let Some(id) = entry_id {
            key.extend_from_slice(id.as_bytes());
        }
        key
    }

    fn settlement_key(date: DateTime<Utc>, entry_id: Option<Uuid>) -> Vec<u8> {
        let mut key = vec![IDX_SETTLEMENT];
        key.extend_from_slice(&Self::millis_key(date).to_be_bytes());
        if let Some(id) = entry_id {
            key.extend_from_slice(id.as_bytes());
        }
        key
    }

    fn payout_key(vendor_id: VendorId, payout_id: Option<Uuid>) -> Vec<u8> {
        let mut key = vec![IDX_PAYOUT];
        key.extend_from_slice(&vendor_id.to_key());
        if let Some(id) = payout_id {
            key.extend_from_slice(id.as_bytes());
        }
        key
    }

    fn millis_key(date: DateTime<Utc>) -> u64 {
        u64::try_from(date.timestamp_millis()).unwrap_or(0)
    }

    /// Trailing 16 bytes of an index key
    fn entry_id_from_key(key: &[u8]) -> Result<Uuid> {
        if key.len() < 16 {
            return Err(Error::Storage("Malformed index key".to_string()));
        }
        Uuid::from_slice(&key[key.len() - 16..])
            .map_err(|e| Error::Storage(format!("Malformed index key: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        BankDetails, EntryType, EntryUpdate, PayoutStatus, PayoutUpdate, ReturnStatus,
    };
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn revenue(vendor: u64, order: u64, net: Decimal) -> LedgerEntry {
        LedgerEntry::new(
            VendorId::new(vendor),
            EntryType::Revenue,
            net,
            format!("ORD_{}_V_{}", order, vendor),
        )
        .with_order(OrderId::new(order))
        .with_breakdown(net, Decimal::ZERO, net)
        .held_until(Utc::now() + Duration::days(7))
    }

    #[test]
    fn test_storage_open() {
        let (storage, _temp) = test_storage();
        assert!(storage.db.cf_handle(CF_ENTRIES).is_some());
        assert!(storage.db.cf_handle(CF_REFERENCES).is_some());
        assert!(storage.db.cf_handle(CF_RETURNS).is_some());
    }

    #[test]
    fn test_commit_and_lookup() {
        let (storage, _temp) = test_storage();
        let entry = revenue(1, 10, dec!(90));

        let receipt = storage
            .commit(&LedgerBatch::new().entry(entry.clone()))
            .unwrap();
        assert_eq!(receipt.entries_created, 1);

        assert_eq!(storage.get_entry(entry.id).unwrap(), entry);
        assert_eq!(
            storage.find_by_reference("ORD_10_V_1").unwrap().unwrap().id,
            entry.id
        );
        assert_eq!(storage.order_entries(OrderId::new(10)).unwrap().len(), 1);
        assert_eq!(storage.balance(VendorId::new(1), false).unwrap(), dec!(90));
        assert_eq!(storage.balance(VendorId::new(1), true).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_duplicate_reference_aborts_whole_batch() {
        let (storage, _temp) = test_storage();
        storage
            .commit(&LedgerBatch::new().entry(revenue(1, 10, dec!(90))))
            .unwrap();

        let fresh = revenue(2, 10, dec!(50));
        let duplicate = revenue(1, 10, dec!(90));
        let result = storage.commit(&LedgerBatch::new().entry(fresh.clone()).entry(duplicate));

        assert!(matches!(result, Err(Error::DuplicateReference(ref r)) if r == "ORD_10_V_1"));
        assert!(storage.find_by_reference(&fresh.reference_id).unwrap().is_none());
        assert_eq!(storage.order_entries(OrderId::new(10)).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_within_batch() {
        let (storage, _temp) = test_storage();
        let result = storage.commit(
            &LedgerBatch::new()
                .entry(revenue(1, 10, dec!(90)))
                .entry(revenue(1, 10, dec!(90))),
        );
        assert!(matches!(result, Err(Error::DuplicateReference(_))));
        assert_eq!(storage.vendor_entries(VendorId::new(1)).unwrap().len(), 0);
    }

    #[test]
    fn test_update_moves_entry_between_balances() {
        let (storage, _temp) = test_storage();
        let entry = revenue(3, 11, dec!(120));
        storage.commit(&LedgerBatch::new().entry(entry.clone())).unwrap();

        let receipt = storage
            .commit(&LedgerBatch::new().update(EntryUpdate::Settle { entry_id: entry.id }))
            .unwrap();
        assert_eq!(receipt.entries_updated, 1);

        assert_eq!(storage.balance(VendorId::new(3), true).unwrap(), dec!(120));
        assert_eq!(storage.balance(VendorId::new(3), false).unwrap(), Decimal::ZERO);
        assert!(storage
            .due_entries(Utc::now() + Duration::days(30))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_due_entries_ordered_and_bounded() {
        let (storage, _temp) = test_storage();
        let now = Utc::now();
        let early = revenue(1, 1, dec!(10)).held_until(now - Duration::days(2));
        let late = revenue(1, 2, dec!(20)).held_until(now - Duration::days(1));
        let future = revenue(1, 3, dec!(30)).held_until(now + Duration::days(1));

        storage
            .commit(&LedgerBatch::new().entry(future).entry(late.clone()).entry(early.clone()))
            .unwrap();

        let due = storage.due_entries(now).unwrap();
        let ids: Vec<_> = due.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);
    }

    #[test]
    fn test_restamp_reindexes_settlement_date() {
        let (storage, _temp) = test_storage();
        let now = Utc::now();
        let entry = revenue(1, 1, dec!(10)).held_until(now - Duration::days(1));
        storage.commit(&LedgerBatch::new().entry(entry.clone())).unwrap();

        storage
            .commit(&LedgerBatch::new().update(EntryUpdate::Restamp {
                entry_id: entry.id,
                settlement_date: now + Duration::days(3),
            }))
            .unwrap();

        assert!(storage.due_entries(now).unwrap().is_empty());
        assert_eq!(
            storage.due_entries(now + Duration::days(4)).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_precondition_blocks_commit() {
        let (storage, _temp) = test_storage();
        let vendor = VendorId::new(9);
        storage
            .commit(&LedgerBatch::new().entry(revenue(9, 1, dec!(100)).settled()))
            .unwrap();

        let payout = Payout::new(vendor, dec!(150), BankDetails::default());
        let debit = LedgerEntry::new(vendor, EntryType::Payout, dec!(-150), payout.reference_id())
            .settled();
        let result = storage.commit(
            &LedgerBatch::new()
                .require(Precondition::AvailableBalance {
                    vendor_id: vendor,
                    at_least: dec!(150),
                })
                .payout(payout.clone())
                .entry(debit),
        );

        assert!(matches!(
            result,
            Err(Error::InsufficientFunds { available, requested })
                if available == dec!(100) && requested == dec!(150)
        ));
        assert!(storage.get_payout(payout.id).is_err());
        assert_eq!(storage.balance(vendor, true).unwrap(), dec!(100));
    }

    #[test]
    fn test_payout_update_persisted() {
        let (storage, _temp) = test_storage();
        let vendor = VendorId::new(4);
        let payout = Payout::new(vendor, dec!(10), BankDetails::default());
        storage.commit(&LedgerBatch::new().payout(payout.clone())).unwrap();

        storage
            .commit(&LedgerBatch::new().payout_update(PayoutUpdate {
                payout_id: payout.id,
                status: PayoutStatus::Processing,
                transaction_id: None,
                at: Utc::now(),
            }))
            .unwrap();

        let payouts = storage.vendor_payouts(vendor).unwrap();
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].status, PayoutStatus::Processing);
    }

    #[test]
    fn test_commission_rule_insert_if_absent() {
        let (storage, _temp) = test_storage();
        let first = CommissionRule::default_global();
        let second = CommissionRule::Fixed { amount: dec!(20) };

        let (stored, inserted) = storage
            .insert_commission_rule_if_absent(&RuleScope::Global, &first)
            .unwrap();
        assert!(inserted);
        assert_eq!(stored, first);

        let (stored, inserted) = storage
            .insert_commission_rule_if_absent(&RuleScope::Global, &second)
            .unwrap();
        assert!(!inserted);
        assert_eq!(stored, first);
    }

    #[test]
    fn test_active_returns() {
        let (storage, _temp) = test_storage();
        let order = OrderId::new(5);
        assert!(!storage.has_active_return(order).unwrap());

        let mut request = ReturnRequest {
            return_id: 1,
            order_id: order,
            status: ReturnStatus::Requested,
            updated_at: Utc::now(),
        };
        storage.put_return_request(&request).unwrap();
        assert!(storage.has_active_return(order).unwrap());
        assert!(!storage.has_active_return(OrderId::new(6)).unwrap());

        request.status = ReturnStatus::Rejected;
        storage.put_return_request(&request).unwrap();
        assert!(!storage.has_active_return(order).unwrap());
    }
}
