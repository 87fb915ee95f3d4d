//! Payout processor
//!
//! A payout is a `Payout` record plus a settled PAYOUT debit, committed in one
//! batch guarded by an `AvailableBalance` precondition. The ledger's single
//! writer evaluates that guard and applies the debit as one step, so two
//! concurrent requests cannot both spend the same balance.

use crate::orders::VendorProfile;
use crate::{Error, Result};
use chrono::Utc;
use ledger_core::{
    EntryType, Ledger, LedgerBatch, LedgerEntry, Payout, PayoutStatus, PayoutUpdate, Precondition,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Executes vendor withdrawals
#[derive(Debug)]
pub struct PayoutProcessor {
    ledger: Arc<Ledger>,
}

impl PayoutProcessor {
    /// Create processor
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    /// Debit `amount` from the vendor's settled balance and open a pending payout
    pub async fn process_payout(&self, vendor: &VendorProfile, amount: Decimal) -> Result<Payout> {
        if amount <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "Payout amount must be positive, got {}",
                amount
            )));
        }

        let payout = Payout::new(vendor.id, amount, vendor.bank_details.clone());
        let debit = LedgerEntry::new(vendor.id, EntryType::Payout, -amount, payout.reference_id())
            .with_description(format!("Payout Execution: ID {}", payout.id))
            .settled();

        let batch = LedgerBatch::new()
            .require(Precondition::AvailableBalance {
                vendor_id: vendor.id,
                at_least: amount,
            })
            .payout(payout.clone())
            .entry(debit);

        match self.ledger.commit(batch).await {
            Ok(_) => {}
            Err(ledger_core::Error::InsufficientFunds {
                available,
                requested,
            }) => {
                tracing::warn!(
                    vendor_id = %vendor.id,
                    %available,
                    %requested,
                    "Payout rejected"
                );
                return Err(Error::InsufficientFunds {
                    available,
                    requested,
                });
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            vendor_id = %vendor.id,
            payout_id = %payout.id,
            %amount,
            "Payout created"
        );

        Ok(payout)
    }

    /// Record the bank transfer outcome for a payout
    pub async fn update_payout_status(
        &self,
        payout_id: Uuid,
        status: PayoutStatus,
        transaction_id: Option<String>,
    ) -> Result<Payout> {
        self.ledger
            .commit(LedgerBatch::new().payout_update(PayoutUpdate {
                payout_id,
                status,
                transaction_id,
                at: Utc::now(),
            }))
            .await?;

        let payout = self.ledger.get_payout(payout_id)?;
        tracing::info!(payout_id = %payout_id, status = ?payout.status, "Payout status updated");
        Ok(payout)
    }

    /// Payouts of a vendor, oldest first
    pub async fn vendor_payouts(&self, vendor: &VendorProfile) -> Result<Vec<Payout>> {
        Ok(self.ledger.vendor_payouts(vendor.id)?)
    }
}
