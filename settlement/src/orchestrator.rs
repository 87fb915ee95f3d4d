//! Transaction orchestrator
//!
//! Turns order lifecycle events into ledger batches. Each operation builds one
//! [`LedgerBatch`] and commits it through the ledger's single writer, so either
//! every entry of the operation is visible or none is.
//!
//! Idempotency keys:
//!
//! | Event        | Key                              |
//! |--------------|----------------------------------|
//! | sale         | `ORD_{order_number}_V_{vendor}`  |
//! | cancellation | `CANCEL_{order_number}_V_{vendor}` |
//! | refund       | `REFUND_REV_{hex8}` / `REFUND_COM_{hex8}` |

use crate::commission::{round_money, CommissionResolver};
use crate::config::HoldConfig;
use crate::orders::{Order, OrderItem};
use crate::{Error, Result};
use chrono::Utc;
use ledger_core::{
    EntryType, EntryUpdate, ItemCommission, Ledger, LedgerBatch, LedgerEntry, OrderItemId,
    VendorId,
};
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Marker appended to superseded revenue
const CANCELLED_MARKER: &str = " (CANCELLED)";

/// Result of a posting operation
#[derive(Debug, Clone, PartialEq)]
pub enum PostingOutcome {
    /// New entries were committed and/or existing ones updated
    Posted {
        /// Entries created
        entries: Vec<LedgerEntry>,
        /// Existing entries changed
        updated: usize,
    },
    /// The idempotency key already exists; nothing was written
    AlreadyApplied {
        /// Key that was found
        reference_id: String,
    },
}

impl PostingOutcome {
    fn nothing() -> Self {
        PostingOutcome::Posted {
            entries: Vec::new(),
            updated: 0,
        }
    }

    /// Entries created by this call
    pub fn entries(&self) -> &[LedgerEntry] {
        match self {
            PostingOutcome::Posted { entries, .. } => entries,
            PostingOutcome::AlreadyApplied { .. } => &[],
        }
    }

    /// True when the call was a no-op retry
    pub fn is_already_applied(&self) -> bool {
        matches!(self, PostingOutcome::AlreadyApplied { .. })
    }
}

#[derive(Debug, Default)]
struct VendorTotals {
    gross: Decimal,
    commission: Decimal,
    item_names: Vec<String>,
}

/// Item commission to write back after commit
struct ItemSnapshot {
    index: usize,
    rate: Decimal,
    amount: Decimal,
}

/// Builds and commits the ledger writes of order events
#[derive(Debug)]
pub struct TransactionOrchestrator {
    ledger: Arc<Ledger>,
    commission: Arc<CommissionResolver>,
    holds: HoldConfig,
}

impl TransactionOrchestrator {
    /// Create orchestrator
    pub fn new(ledger: Arc<Ledger>, commission: Arc<CommissionResolver>, holds: HoldConfig) -> Self {
        Self {
            ledger,
            commission,
            holds,
        }
    }

    /// Post one REVENUE entry per vendor for a paid order.
    ///
    /// Items without a product or vendor are skipped. On success the
    /// commission snapshot is written onto `order.items`.
    pub async fn record_order_financials(&self, order: &mut Order) -> Result<PostingOutcome> {
        let now = Utc::now();
        let mut totals: BTreeMap<VendorId, VendorTotals> = BTreeMap::new();
        let mut snapshots: BTreeMap<VendorId, Vec<ItemSnapshot>> = BTreeMap::new();

        for (index, item) in order.items.iter().enumerate() {
            let Some(vendor_id) = item.vendor_id() else {
                warn!(
                    order = %order.order_number,
                    item_id = %item.id,
                    "Skipping order item without product or vendor"
                );
                continue;
            };

            let subtotal = item.subtotal();
            let quote = self.commission.compute(subtotal, item.category()).await?;
            debug!(
                order = %order.order_number,
                item_id = %item.id,
                %subtotal,
                commission = %quote.amount,
                rate = %quote.rate_description,
                "Item commission computed"
            );

            let vendor = totals.entry(vendor_id).or_default();
            vendor.gross += subtotal;
            vendor.commission += quote.amount;
            vendor.item_names.push(item.product_name.clone());

            snapshots.entry(vendor_id).or_default().push(ItemSnapshot {
                index,
                rate: quote.rate,
                amount: quote.amount,
            });
        }

        if totals.is_empty() {
            warn!(order = %order.order_number, "No attributable items, nothing recorded");
            return Ok(PostingOutcome::nothing());
        }

        let mut batch = LedgerBatch::new();
        let mut posted_vendors = Vec::new();
        let mut first_existing = None;

        for (vendor_id, vendor) in &totals {
            let reference_id = revenue_reference(&order.order_number, *vendor_id);
            if self.ledger.find_by_reference(&reference_id)?.is_some() {
                debug!(reference_id = %reference_id, "Revenue already recorded");
                first_existing.get_or_insert(reference_id);
                continue;
            }

            let net = vendor.gross - vendor.commission;
            batch = batch.entry(
                LedgerEntry::new(*vendor_id, EntryType::Revenue, net, reference_id)
                    .with_order(order.id)
                    .with_breakdown(vendor.gross, vendor.commission, net)
                    .with_description(format!(
                        "Unified entry for Order {}: Items: {}",
                        order.order_number,
                        vendor.item_names.join(", ")
                    ))
                    .held_until(now + self.holds.post_sale()),
            );

            for snapshot in snapshots.get(vendor_id).into_iter().flatten() {
                let item = &order.items[snapshot.index];
                batch = batch.item_commission(ItemCommission {
                    order_item_id: item.id,
                    order_id: order.id,
                    vendor_id: *vendor_id,
                    subtotal: item.subtotal(),
                    commission_rate: snapshot.rate,
                    commission_amount: snapshot.amount,
                    recorded_at: now,
                });
            }
            posted_vendors.push(*vendor_id);
        }

        if posted_vendors.is_empty() {
            if let Some(reference_id) = first_existing {
                return Ok(PostingOutcome::AlreadyApplied { reference_id });
            }
        }

        let entries = batch.entries.clone();
        match self.ledger.commit(batch).await {
            Ok(_) => {}
            Err(ledger_core::Error::DuplicateReference(reference_id)) => {
                info!(reference_id = %reference_id, "Order financials already recorded");
                return Ok(PostingOutcome::AlreadyApplied { reference_id });
            }
            Err(e) => return Err(e.into()),
        }

        // Snapshot onto the caller's items only once committed
        for vendor_id in &posted_vendors {
            for snapshot in snapshots.get(vendor_id).into_iter().flatten() {
                let item = &mut order.items[snapshot.index];
                item.commission_rate = snapshot.rate;
                item.commission_amount = snapshot.amount;
            }
        }

        info!(
            order = %order.order_number,
            vendors = entries.len(),
            "Order financials recorded"
        );

        Ok(PostingOutcome::Posted {
            entries,
            updated: 0,
        })
    }

    /// Reverse every REVENUE entry of a cancelled order
    pub async fn cancel_order_financials(&self, order: &Order) -> Result<PostingOutcome> {
        let existing = self.ledger.order_entries(order.id)?;
        let mut batch = LedgerBatch::new();
        let mut first_existing = None;

        for revenue in existing
            .iter()
            .filter(|e| e.entry_type == EntryType::Revenue)
        {
            let reference_id = cancel_reference(&order.order_number, revenue.vendor_id);
            if self.ledger.find_by_reference(&reference_id)?.is_some() {
                first_existing.get_or_insert(reference_id);
                continue;
            }

            batch = batch
                .entry(
                    LedgerEntry::new(
                        revenue.vendor_id,
                        EntryType::Cancellation,
                        -revenue.amount,
                        reference_id,
                    )
                    .with_order(order.id)
                    .with_breakdown(
                        -revenue.gross_amount,
                        -revenue.commission_amount,
                        -revenue.net_amount,
                    )
                    .with_description(format!(
                        "Cancellation reversal for Order {}",
                        order.order_number
                    ))
                    .settled(),
                )
                .update(EntryUpdate::Supersede {
                    entry_id: revenue.id,
                    marker: CANCELLED_MARKER.to_string(),
                });
        }

        if batch.entries.is_empty() {
            return Ok(match first_existing {
                Some(reference_id) => PostingOutcome::AlreadyApplied { reference_id },
                None => {
                    debug!(order = %order.order_number, "No revenue to cancel");
                    PostingOutcome::nothing()
                }
            });
        }

        let entries = batch.entries.clone();
        let receipt = match self.ledger.commit(batch).await {
            Ok(receipt) => receipt,
            Err(ledger_core::Error::DuplicateReference(reference_id)) => {
                return Ok(PostingOutcome::AlreadyApplied { reference_id });
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            order = %order.order_number,
            reversed = entries.len(),
            superseded = receipt.entries_updated,
            "Order financials cancelled"
        );

        Ok(PostingOutcome::Posted {
            entries,
            updated: receipt.entries_updated,
        })
    }

    /// Re-stamp an order's revenue with the post-delivery hold
    pub async fn settle_order_financials(&self, order: &Order) -> Result<PostingOutcome> {
        let existing = self.ledger.order_entries(order.id)?;

        if existing
            .iter()
            .any(|e| e.entry_type == EntryType::Cancellation)
        {
            info!(order = %order.order_number, "Order cancelled, delivery hold not applied");
            return Ok(PostingOutcome::nothing());
        }

        let settlement_date = Utc::now() + self.holds.post_delivery();
        let batch = existing
            .iter()
            .filter(|e| e.entry_type == EntryType::Revenue)
            .fold(LedgerBatch::new(), |batch, entry| {
                batch.update(EntryUpdate::Restamp {
                    entry_id: entry.id,
                    settlement_date,
                })
            });

        let receipt = self.ledger.commit(batch).await?;
        info!(
            order = %order.order_number,
            restamped = receipt.entries_updated,
            settlement_date = %settlement_date.to_rfc3339(),
            "Delivery hold applied"
        );

        Ok(PostingOutcome::Posted {
            entries: Vec::new(),
            updated: receipt.entries_updated,
        })
    }

    /// Post a refund and its proportional commission give-back
    pub async fn process_refund(
        &self,
        order: &Order,
        item_id: OrderItemId,
        refund_amount: Decimal,
        reason: &str,
    ) -> Result<PostingOutcome> {
        let item = order.item(item_id).ok_or_else(|| {
            Error::Validation(format!(
                "Item {} is not part of order {}",
                item_id, order.order_number
            ))
        })?;
        let vendor_id = item.vendor_id().ok_or_else(|| {
            Error::Attribution(format!("Item {} has no resolvable vendor", item.id))
        })?;

        let (subtotal, item_commission) = self.commission_basis(item)?;
        if refund_amount <= Decimal::ZERO || refund_amount > subtotal {
            return Err(Error::Validation(format!(
                "Refund amount {} must be positive and at most the item subtotal {}",
                refund_amount, subtotal
            )));
        }

        let commission_reversal = round_money(refund_amount / subtotal * item_commission);
        let settlement_date = Utc::now() + self.holds.post_sale();

        let revenue_reversal = LedgerEntry::new(
            vendor_id,
            EntryType::Refund,
            -refund_amount,
            format!("REFUND_REV_{}", random_suffix()),
        )
        .with_order(order.id)
        .with_order_item(item.id)
        .with_description(format!(
            "Refund Reversal for {}: {}",
            order.order_number, reason
        ))
        .held_until(settlement_date);

        let commission_giveback = LedgerEntry::new(
            vendor_id,
            EntryType::Refund,
            commission_reversal,
            format!("REFUND_COM_{}", random_suffix()),
        )
        .with_order(order.id)
        .with_order_item(item.id)
        .with_description(format!(
            "Commission Reversal for {}: {}",
            order.order_number, reason
        ))
        .held_until(settlement_date);

        let entries = vec![revenue_reversal, commission_giveback];
        self.ledger
            .commit(LedgerBatch {
                entries: entries.clone(),
                ..LedgerBatch::default()
            })
            .await?;

        info!(
            order = %order.order_number,
            item_id = %item.id,
            %refund_amount,
            %commission_reversal,
            "Refund posted"
        );

        Ok(PostingOutcome::Posted {
            entries,
            updated: 0,
        })
    }

    /// Subtotal and commission as invoiced, preferring the ledger snapshot
    fn commission_basis(&self, item: &OrderItem) -> Result<(Decimal, Decimal)> {
        Ok(match self.ledger.item_commission(item.id)? {
            Some(snapshot) => (snapshot.subtotal, snapshot.commission_amount),
            None => (item.subtotal(), item.commission_amount),
        })
    }
}

fn revenue_reference(order_number: &str, vendor_id: VendorId) -> String {
    format!("ORD_{}_V_{}", order_number, vendor_id)
}

fn cancel_reference(order_number: &str, vendor_id: VendorId) -> String {
    format!("CANCEL_{}_V_{}", order_number, vendor_id)
}

fn random_suffix() -> String {
    format!("{:08x}", rand::thread_rng().gen::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_formats() {
        assert_eq!(revenue_reference("SS-1001", VendorId::new(7)), "ORD_SS-1001_V_7");
        assert_eq!(cancel_reference("SS-1001", VendorId::new(7)), "CANCEL_SS-1001_V_7");
    }

    #[test]
    fn test_random_suffix_shape() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_outcome_accessors() {
        let applied = PostingOutcome::AlreadyApplied {
            reference_id: "ORD_1_V_1".to_string(),
        };
        assert!(applied.is_already_applied());
        assert!(applied.entries().is_empty());
        assert!(!PostingOutcome::nothing().is_already_applied());
    }
}
