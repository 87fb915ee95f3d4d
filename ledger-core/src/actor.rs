//! Actor-based concurrency for the ledger
//!
//! Every write goes through one task. Balance preconditions are evaluated
//! inside that task, so a payout's balance check and its debit observe the
//! same ledger state. Reads go to storage directly.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │       Orchestrator / Settlement / Payouts             │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │       check preconditions → Storage::commit()        │
//! │          (one WriteBatch, all or nothing)             │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::metrics::Metrics;
use crate::types::{CommissionRule, CommitReceipt, LedgerBatch, ReturnRequest, RuleScope};
use crate::{Error, Result, Storage};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Commit a batch atomically
    Commit {
        /// Batch to commit
        batch: LedgerBatch,
        /// Reply channel
        response: oneshot::Sender<Result<CommitReceipt>>,
    },

    /// Store a commission rule
    PutCommissionRule {
        /// Scope
        scope: RuleScope,
        /// Rule, or `None` to remove
        rule: Option<CommissionRule>,
        /// Reply channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Store a commission rule unless one exists
    InsertCommissionRuleIfAbsent {
        /// Scope
        scope: RuleScope,
        /// Rule to insert
        rule: CommissionRule,
        /// Reply channel: stored rule and whether it was inserted
        response: oneshot::Sender<Result<(CommissionRule, bool)>>,
    },

    /// Record a return request state
    PutReturnRequest {
        /// Request
        request: ReturnRequest,
        /// Reply channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes ledger messages
#[derive(Debug)]
pub struct LedgerActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Metrics
    metrics: Metrics,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        mailbox: mpsc::Receiver<LedgerMessage>,
        metrics: Metrics,
    ) -> Self {
        Self {
            storage,
            mailbox,
            metrics,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if let LedgerMessage::Shutdown = msg {
                tracing::info!("Ledger actor shutting down");
                break;
            }
            self.handle_message(msg);
        }
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::Commit { batch, response } => {
                let _ = response.send(self.commit(&batch));
            }

            LedgerMessage::PutCommissionRule {
                scope,
                rule,
                response,
            } => {
                let result = match rule {
                    Some(rule) => self.storage.put_commission_rule(&scope, &rule),
                    None => self.storage.delete_commission_rule(&scope),
                };
                let _ = response.send(result);
            }

            LedgerMessage::InsertCommissionRuleIfAbsent {
                scope,
                rule,
                response,
            } => {
                let _ = response.send(self.storage.insert_commission_rule_if_absent(&scope, &rule));
            }

            LedgerMessage::PutReturnRequest { request, response } => {
                let _ = response.send(self.storage.put_return_request(&request));
            }

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    fn commit(&self, batch: &LedgerBatch) -> Result<CommitReceipt> {
        let start = Instant::now();
        let result = self.storage.commit(batch);
        self.metrics
            .record_commit_duration(start.elapsed().as_secs_f64());

        match &result {
            Ok(receipt) => self
                .metrics
                .record_commit(receipt.entries_created, receipt.entries_updated),
            Err(e) => {
                self.metrics.record_rejection(e);
                tracing::debug!(error = %e, "Commit rejected");
            }
        }

        result
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Commit a batch
    pub async fn commit(&self, batch: LedgerBatch) -> Result<CommitReceipt> {
        self.request(|response| LedgerMessage::Commit { batch, response })
            .await
    }

    /// Store or remove a commission rule
    pub async fn put_commission_rule(
        &self,
        scope: RuleScope,
        rule: Option<CommissionRule>,
    ) -> Result<()> {
        self.request(|response| LedgerMessage::PutCommissionRule {
            scope,
            rule,
            response,
        })
        .await
    }

    /// Store a commission rule unless one exists
    pub async fn insert_commission_rule_if_absent(
        &self,
        scope: RuleScope,
        rule: CommissionRule,
    ) -> Result<(CommissionRule, bool)> {
        self.request(|response| LedgerMessage::InsertCommissionRuleIfAbsent {
            scope,
            rule,
            response,
        })
        .await
    }

    /// Record a return request state
    pub async fn put_return_request(&self, request: ReturnRequest) -> Result<()> {
        self.request(|response| LedgerMessage::PutReturnRequest { request, response })
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    storage: Arc<Storage>,
    mailbox_capacity: usize,
    metrics: Metrics,
) -> LedgerHandle {
    // Bounded channel for backpressure
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
    let actor = LedgerActor::new(storage, rx, metrics);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryType, LedgerEntry, Precondition, VendorId};
    use crate::Config;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn spawn_test_actor() -> (LedgerHandle, Arc<Storage>, Metrics, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let storage = Arc::new(Storage::open(&config).unwrap());
        let metrics = Metrics::new().unwrap();
        let handle = spawn_ledger_actor(storage.clone(), 16, metrics.clone());
        (handle, storage, metrics, temp_dir)
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (handle, _storage, _metrics, _temp) = spawn_test_actor();
        handle.shutdown().await.unwrap();

        // Mailbox closes once the actor exits
        tokio::task::yield_now().await;
        let result = handle.commit(LedgerBatch::new()).await;
        assert!(matches!(result, Err(Error::Concurrency(_))));
    }

    #[tokio::test]
    async fn test_actor_commit_and_balance() {
        let (handle, storage, metrics, _temp) = spawn_test_actor();
        let vendor = VendorId::new(2);

        let entry = LedgerEntry::new(vendor, EntryType::Revenue, dec!(40), "ORD_1_V_2")
            .with_breakdown(dec!(40), Decimal::ZERO, dec!(40))
            .settled();
        let receipt = handle.commit(LedgerBatch::new().entry(entry)).await.unwrap();

        assert_eq!(receipt.entries_created, 1);
        assert_eq!(storage.balance(vendor, true).unwrap(), dec!(40));
        assert_eq!(storage.vendor_entries(vendor).unwrap().len(), 1);
        assert_eq!(metrics.entries_total.get(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_records_rejections() {
        let (handle, _storage, metrics, _temp) = spawn_test_actor();

        let result = handle
            .commit(LedgerBatch::new().require(Precondition::AvailableBalance {
                vendor_id: VendorId::new(3),
                at_least: dec!(1),
            }))
            .await;

        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));
        assert_eq!(metrics.insufficient_funds_total.get(), 1);

        handle.shutdown().await.unwrap();
    }
}
