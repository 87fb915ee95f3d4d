//! Marketplace Settlement
//!
//! Commission, order postings, escrow release and payouts on top of the
//! append-only vendor ledger.
//!
//! # Flow
//!
//! 1. **Record**: a paid order posts one held REVENUE entry per vendor
//! 2. **Hold**: revenue stays uncleared for 7 days (3 after delivery)
//! 3. **Sweep**: the scheduler releases due entries unless a return is open
//! 4. **Payout**: vendors withdraw from the settled balance
//!
//! Cancellations and refunds never edit history; they post opposite entries.
//!
//! # Example
//!
//! ```no_run
//! use settlement::{Config, FinanceService};
//!
//! #[tokio::main]
//! async fn main() -> settlement::Result<()> {
//!     let service = FinanceService::open(Config::default()).await?;
//!
//!     let released = service.engine.release_expired_funds().await?;
//!     println!("Released {} entries", released);
//!
//!     service.shutdown().await
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod commission;
pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod orders;
pub mod payout;
pub mod scheduler;
pub mod service;

// Re-exports
pub use commission::{CommissionQuote, CommissionResolver, RuleSource};
pub use config::{CommissionConfig, CommissionRuleConfig, Config, HoldConfig};
pub use engine::{AnalyticsPeriod, EarningsPoint, EarningsSummary, SettlementEngine, SweepReport};
pub use error::{Error, Result};
pub use orchestrator::{PostingOutcome, TransactionOrchestrator};
pub use orders::{Order, OrderItem, Product, VendorProfile};
pub use payout::PayoutProcessor;
pub use scheduler::{ScheduleConfig, SweepScheduler};
pub use service::FinanceService;
