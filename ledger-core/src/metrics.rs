//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `ledger_entries_total` - Total number of entries appended
//! - `ledger_entry_updates_total` - Updates that changed an entry
//! - `ledger_duplicate_references_total` - Commits rejected on an existing reference
//! - `ledger_insufficient_funds_total` - Commits rejected by a balance precondition
//! - `ledger_commit_duration_seconds` - Histogram of commit latencies

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Total entries appended
    pub entries_total: IntCounter,

    /// Updates that changed an entry
    pub updates_total: IntCounter,

    /// Commits rejected with a duplicate reference
    pub duplicates_total: IntCounter,

    /// Commits rejected by a balance precondition
    pub insufficient_funds_total: IntCounter,

    /// Commit duration histogram
    pub commit_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let entries_total =
            IntCounter::new("ledger_entries_total", "Total number of entries appended")?;
        registry.register(Box::new(entries_total.clone()))?;

        let updates_total = IntCounter::new(
            "ledger_entry_updates_total",
            "Total number of updates that changed an entry",
        )?;
        registry.register(Box::new(updates_total.clone()))?;

        let duplicates_total = IntCounter::new(
            "ledger_duplicate_references_total",
            "Commits rejected because a reference was already posted",
        )?;
        registry.register(Box::new(duplicates_total.clone()))?;

        let insufficient_funds_total = IntCounter::new(
            "ledger_insufficient_funds_total",
            "Commits rejected by a balance precondition",
        )?;
        registry.register(Box::new(insufficient_funds_total.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_commit_duration_seconds",
                "Histogram of commit latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        Ok(Self {
            entries_total,
            updates_total,
            duplicates_total,
            insufficient_funds_total,
            commit_duration,
            registry,
        })
    }

    /// Record a successful commit
    pub fn record_commit(&self, entries_created: usize, entries_updated: usize) {
        self.entries_total.inc_by(entries_created as u64);
        self.updates_total.inc_by(entries_updated as u64);
    }

    /// Record a rejected commit
    pub fn record_rejection(&self, err: &crate::Error) {
        match err {
            crate::Error::DuplicateReference(_) => self.duplicates_total.inc(),
            crate::Error::InsufficientFunds { .. } => self.insufficient_funds_total.inc(),
            _ => {}
        }
    }

    /// Record commit duration
    pub fn record_commit_duration(&self, duration_seconds: f64) {
        self.commit_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in Prometheus text format
    pub fn export(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = vec![];
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
