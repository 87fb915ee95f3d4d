//! Wiring of the settlement components over one ledger

use crate::{
    commission::CommissionResolver, engine::SettlementEngine,
    orchestrator::TransactionOrchestrator, payout::PayoutProcessor, scheduler::SweepScheduler,
    Config, Result,
};
use ledger_core::Ledger;
use std::sync::Arc;

/// All settlement components sharing one ledger
#[derive(Debug)]
pub struct FinanceService {
    /// Ledger
    pub ledger: Arc<Ledger>,
    /// Commission policy
    pub commission: Arc<CommissionResolver>,
    /// Order event postings
    pub orchestrator: TransactionOrchestrator,
    /// Balances and sweep
    pub engine: Arc<SettlementEngine>,
    /// Withdrawals
    pub payouts: PayoutProcessor,
    config: Config,
}

impl FinanceService {
    /// Open the ledger, seed configured commission rules and build components
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let ledger = Arc::new(Ledger::open(config.ledger.clone()).await?);

        let commission = Arc::new(CommissionResolver::new(ledger.clone(), &config.commission));
        commission.seed(&config.commission).await?;

        let orchestrator =
            TransactionOrchestrator::new(ledger.clone(), commission.clone(), config.holds);
        let engine = Arc::new(SettlementEngine::new(ledger.clone()));
        let payouts = PayoutProcessor::new(ledger.clone());

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            "Finance service ready"
        );

        Ok(Self {
            ledger,
            commission,
            orchestrator,
            engine,
            payouts,
            config,
        })
    }

    /// Sweep scheduler driven by the configured windows
    pub fn scheduler(&self) -> SweepScheduler {
        SweepScheduler::new(self.engine.clone(), self.config.schedule.clone())
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stop the ledger writer
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down finance service");
        Ok(self.ledger.shutdown().await?)
    }
}
