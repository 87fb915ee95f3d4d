//! Settlement engine
//!
//! Derives vendor balances from the ledger and advances held entries to
//! settled once their hold expires.

use crate::Result;
use chrono::{DateTime, Duration, Utc};
use ledger_core::{
    EntryType, EntryUpdate, Ledger, LedgerBatch, LedgerEntry, OrderId, PayoutStatus,
    ReturnRequest, VendorId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Number of entries shown in the earnings summary
const RECENT_ACTIVITY_LIMIT: usize = 10;

/// Outcome of one release sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Sweep cutoff
    pub as_of: Option<DateTime<Utc>>,
    /// Due REVENUE entries submitted for release
    pub revenue_candidates: usize,
    /// Due REVENUE entries held back by an active return
    pub blocked_by_returns: usize,
    /// Entries actually flipped to settled
    pub released: usize,
}

/// Dashboard summary for a vendor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsSummary {
    /// Settled balance
    pub available_balance: Decimal,
    /// Unsettled balance
    pub uncleared_balance: Decimal,
    /// Σ amount over REVENUE and COMMISSION entries
    pub lifetime_earnings: Decimal,
    /// Number of REVENUE entries
    pub total_orders: usize,
    /// Σ amount over pending payouts
    pub pending_payouts: Decimal,
    /// Latest entries, newest first
    pub recent_activities: Vec<LedgerEntry>,
    /// Σ gross over REVENUE entries
    pub total_gross: Decimal,
    /// Σ commission over REVENUE entries
    pub total_commission: Decimal,
    /// Σ net over REVENUE entries
    pub total_net: Decimal,
}

/// Chart period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsPeriod {
    /// Since midnight UTC, by hour
    Today,
    /// Last 7 days, by day
    Weekly,
    /// Last 30 days, by day
    Monthly,
    /// Last 365 days, by day
    Yearly,
}

/// One chart bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsPoint {
    /// "09AM" or "2026-10-19"
    pub name: String,
    /// Σ amount of entries in the bucket
    pub earnings: Decimal,
}

/// Settlement engine
#[derive(Debug)]
pub struct SettlementEngine {
    /// Ledger core
    ledger: Arc<Ledger>,
}

impl SettlementEngine {
    /// Create engine over a ledger
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    /// Release due entries now; returns how many were settled
    pub async fn release_expired_funds(&self) -> Result<usize> {
        Ok(self.sweep().await?.released)
    }

    /// Release due entries now
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.release_expired_funds_at(Utc::now()).await
    }

    /// Release REVENUE entries due at `as_of`.
    ///
    /// Revenue of an order with an active return stays held. Other entry
    /// types are never touched. Releases are `ReleaseIfDue` updates, so an
    /// entry re-stamped between the scan and the commit is left alone.
    pub async fn release_expired_funds_at(&self, as_of: DateTime<Utc>) -> Result<SweepReport> {
        let due = self.ledger.due_entries(as_of)?;
        let mut report = SweepReport {
            as_of: Some(as_of),
            ..SweepReport::default()
        };
        let mut returns: HashMap<OrderId, bool> = HashMap::new();
        let mut batch = LedgerBatch::new();

        for entry in due.iter().filter(|e| e.entry_type == EntryType::Revenue) {
            if let Some(order_id) = entry.order_id {
                let blocked = match returns.get(&order_id) {
                    Some(blocked) => *blocked,
                    None => {
                        let blocked = self.ledger.has_active_return(order_id)?;
                        returns.insert(order_id, blocked);
                        blocked
                    }
                };
                if blocked {
                    tracing::warn!(
                        entry_id = %entry.id,
                        order_id = %order_id,
                        "Release blocked by active return"
                    );
                    report.blocked_by_returns += 1;
                    continue;
                }
            }

            report.revenue_candidates += 1;
            batch = batch.update(EntryUpdate::ReleaseIfDue {
                entry_id: entry.id,
                as_of,
            });
        }

        if !batch.is_empty() {
            report.released = self.ledger.commit(batch).await?.entries_updated;
        }

        tracing::info!(
            as_of = %as_of.to_rfc3339(),
            released = report.released,
            blocked = report.blocked_by_returns,
            "Release sweep finished"
        );

        Ok(report)
    }

    /// Withdrawable balance (Σ settled amounts)
    pub async fn get_vendor_balance(&self, vendor_id: VendorId) -> Result<Decimal> {
        Ok(self.ledger.settled_balance(vendor_id)?)
    }

    /// Held balance (Σ unsettled amounts)
    pub async fn get_uncleared_balance(&self, vendor_id: VendorId) -> Result<Decimal> {
        Ok(self.ledger.uncleared_balance(vendor_id)?)
    }

    /// Consolidated numbers for the vendor dashboard
    pub async fn get_vendor_earnings_summary(&self, vendor_id: VendorId) -> Result<EarningsSummary> {
        let entries = self.ledger.vendor_entries(vendor_id)?;
        let payouts = self.ledger.vendor_payouts(vendor_id)?;

        let mut available_balance = Decimal::ZERO;
        let mut uncleared_balance = Decimal::ZERO;
        let mut lifetime_earnings = Decimal::ZERO;
        let mut total_orders = 0;
        let mut total_gross = Decimal::ZERO;
        let mut total_commission = Decimal::ZERO;
        let mut total_net = Decimal::ZERO;

        for entry in &entries {
            if entry.is_settled {
                available_balance += entry.amount;
            } else {
                uncleared_balance += entry.amount;
            }

            match entry.entry_type {
                EntryType::Revenue => {
                    lifetime_earnings += entry.amount;
                    total_orders += 1;
                    total_gross += entry.gross_amount;
                    total_commission += entry.commission_amount;
                    total_net += entry.net_amount;
                }
                EntryType::Commission => lifetime_earnings += entry.amount,
                _ => {}
            }
        }

        let pending_payouts = payouts
            .iter()
            .filter(|p| p.status == PayoutStatus::Pending)
            .map(|p| p.amount)
            .sum();

        let recent_activities = entries
            .iter()
            .rev()
            .take(RECENT_ACTIVITY_LIMIT)
            .cloned()
            .collect();

        Ok(EarningsSummary {
            available_balance,
            uncleared_balance,
            lifetime_earnings,
            total_orders,
            pending_payouts,
            recent_activities,
            total_gross,
            total_commission,
            total_net,
        })
    }

    /// Earnings buckets for charts
    pub async fn get_vendor_analytics(
        &self,
        vendor_id: VendorId,
        period: AnalyticsPeriod,
    ) -> Result<Vec<EarningsPoint>> {
        self.get_vendor_analytics_at(vendor_id, period, Utc::now())
            .await
    }

    /// Earnings buckets for charts, relative to `now`
    pub async fn get_vendor_analytics_at(
        &self,
        vendor_id: VendorId,
        period: AnalyticsPeriod,
        now: DateTime<Utc>,
    ) -> Result<Vec<EarningsPoint>> {
        let (start, format) = match period {
            AnalyticsPeriod::Today => (
                now.date_naive().and_time(chrono::NaiveTime::MIN).and_utc(),
                "%I%p",
            ),
            AnalyticsPeriod::Weekly => (now - Duration::days(7), "%Y-%m-%d"),
            AnalyticsPeriod::Monthly => (now - Duration::days(30), "%Y-%m-%d"),
            AnalyticsPeriod::Yearly => (now - Duration::days(365), "%Y-%m-%d"),
        };

        // Entries arrive oldest first; buckets keep first-seen order
        let mut points: Vec<EarningsPoint> = Vec::new();
        for entry in self
            .ledger
            .vendor_entries(vendor_id)?
            .iter()
            .filter(|e| e.created_at >= start)
        {
            let name = entry.created_at.format(format).to_string();
            match points.last_mut() {
                Some(point) if point.name == name => point.earnings += entry.amount,
                _ => points.push(EarningsPoint {
                    name,
                    earnings: entry.amount,
                }),
            }
        }

        Ok(points)
    }

    /// Mirror a return request from the order lifecycle
    pub async fn record_return_request(&self, request: ReturnRequest) -> Result<()> {
        tracing::info!(
            order_id = %request.order_id,
            return_id = request.return_id,
            status = ?request.status,
            "Return request recorded"
        );
        Ok(self.ledger.record_return_request(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_wire_names() {
        let period: AnalyticsPeriod = serde_json::from_str("\"weekly\"").unwrap();
        assert_eq!(period, AnalyticsPeriod::Weekly);
        assert!(serde_json::from_str::<AnalyticsPeriod>("\"hourly\"").is_err());
    }

    #[test]
    fn test_report_defaults_to_empty() {
        let report = SweepReport::default();
        assert_eq!(report.released, 0);
        assert!(report.as_of.is_none());
    }
}
