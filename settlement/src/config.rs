//! Configuration for the settlement engine

use crate::scheduler::ScheduleConfig;
use crate::{Error, Result};
use ledger_core::CommissionRule;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Settlement engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Ledger configuration
    pub ledger: ledger_core::Config,

    /// Hold windows
    pub holds: HoldConfig,

    /// Commission policy
    pub commission: CommissionConfig,

    /// Sweep schedule
    pub schedule: ScheduleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "settlement-engine".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            ledger: ledger_core::Config::default(),
            holds: HoldConfig::default(),
            commission: CommissionConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

/// Longest accepted hold, in days
pub const MAX_HOLD_DAYS: i64 = 3650;

/// Holding periods before revenue becomes withdrawable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoldConfig {
    /// Hold after sale and for refunds (days)
    pub post_sale_days: i64,

    /// Hold after delivery confirmation (days)
    pub post_delivery_days: i64,
}

impl Default for HoldConfig {
    fn default() -> Self {
        Self {
            post_sale_days: 7,
            post_delivery_days: 3,
        }
    }
}

impl HoldConfig {
    /// Post-sale hold as a duration
    pub fn post_sale(&self) -> chrono::Duration {
        chrono::Duration::days(self.post_sale_days.clamp(0, MAX_HOLD_DAYS))
    }

    /// Post-delivery hold as a duration
    pub fn post_delivery(&self) -> chrono::Duration {
        chrono::Duration::days(self.post_delivery_days.clamp(0, MAX_HOLD_DAYS))
    }
}

/// Commission policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionConfig {
    /// Create the 10% global rule on first read when none exists
    pub lazy_default: bool,

    /// Global rule seeded at startup (if absent in the ledger)
    pub global: Option<CommissionRuleConfig>,

    /// Category rules seeded at startup (if absent in the ledger)
    pub categories: BTreeMap<String, CommissionRuleConfig>,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            lazy_default: true,
            global: None,
            categories: BTreeMap::new(),
        }
    }
}

/// Commission rule as written in a config file
///
/// ```toml
/// [commission.categories.electronics]
/// commission_type = "hybrid"
/// percentage = "5"
/// fixed_amount = "20"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRuleConfig {
    /// "percentage", "fixed" or "hybrid"
    pub commission_type: String,

    /// Percentage component
    #[serde(default)]
    pub percentage: Decimal,

    /// Fixed component
    #[serde(default)]
    pub fixed_amount: Decimal,
}

impl TryFrom<&CommissionRuleConfig> for CommissionRule {
    type Error = Error;

    fn try_from(config: &CommissionRuleConfig) -> Result<Self> {
        if config.percentage < Decimal::ZERO || config.fixed_amount < Decimal::ZERO {
            return Err(Error::Config(
                "Commission components must not be negative".to_string(),
            ));
        }

        match config.commission_type.to_ascii_lowercase().as_str() {
            "percentage" => Ok(CommissionRule::Percentage {
                percentage: config.percentage,
            }),
            "fixed" => Ok(CommissionRule::Fixed {
                amount: config.fixed_amount,
            }),
            "hybrid" => Ok(CommissionRule::Hybrid {
                percentage: config.percentage,
                fixed_amount: config.fixed_amount,
            }),
            other => Err(Error::Config(format!(
                "Unknown commission type '{}'",
                other
            ))),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config {
            ledger: ledger_core::Config::from_env()?,
            ..Config::default()
        };

        if let Ok(dir) = std::env::var("SETTLEMENT_LEDGER_DIR") {
            config.ledger.data_dir = PathBuf::from(dir);
        }

        if let Ok(windows) = std::env::var("SETTLEMENT_WINDOWS") {
            config.schedule.window_times = windows
                .split(',')
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty())
                .collect();
        }

        if let Ok(days) = std::env::var("SETTLEMENT_HOLD_DAYS") {
            config.holds.post_sale_days = parse_days("SETTLEMENT_HOLD_DAYS", &days)?;
        }

        if let Ok(days) = std::env::var("SETTLEMENT_DELIVERY_HOLD_DAYS") {
            config.holds.post_delivery_days = parse_days("SETTLEMENT_DELIVERY_HOLD_DAYS", &days)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        for days in [self.holds.post_sale_days, self.holds.post_delivery_days] {
            if !(0..=MAX_HOLD_DAYS).contains(&days) {
                return Err(Error::Config(format!(
                    "Hold period must be between 0 and {} days, got {}",
                    MAX_HOLD_DAYS, days
                )));
            }
        }

        self.schedule.parse_times()?;

        if let Some(global) = &self.commission.global {
            CommissionRule::try_from(global)?;
        }
        for rule in self.commission.categories.values() {
            CommissionRule::try_from(rule)?;
        }

        Ok(())
    }
}

fn parse_days(var: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("Invalid {}: {}", var, e)))
}
