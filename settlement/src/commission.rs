//! Commission policy resolution
//!
//! Resolution order: category rule → global rule → hardcoded 10%.
//!
//! Rules live in the ledger's `commission` column family and are cached here.
//! Admin writes go through this resolver so the cache stays coherent; writes
//! made by another process become visible after [`CommissionResolver::invalidate`].

use crate::config::CommissionConfig;
use crate::{Error, Result};
use dashmap::DashMap;
use ledger_core::{CommissionRule, Ledger, RuleScope};
use parking_lot::RwLock;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Round a monetary amount to 2 decimal places, half-up
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Unrounded commission for `price` under `rule`
pub fn calculate(rule: &CommissionRule, price: Decimal) -> Decimal {
    match rule {
        CommissionRule::Percentage { percentage } => price * percentage / Decimal::ONE_HUNDRED,
        CommissionRule::Fixed { amount } => *amount,
        CommissionRule::Hybrid {
            percentage,
            fixed_amount,
        } => price * percentage / Decimal::ONE_HUNDRED + fixed_amount,
    }
}

/// Human-readable rate, e.g. "5% + Fixed ₹20"
pub fn describe(rule: &CommissionRule) -> String {
    match rule {
        CommissionRule::Percentage { percentage } => format!("{}%", percentage.normalize()),
        CommissionRule::Fixed { amount } => format!("Fixed ₹{}", amount.normalize()),
        CommissionRule::Hybrid {
            percentage,
            fixed_amount,
        } => format!(
            "{}% + Fixed ₹{}",
            percentage.normalize(),
            fixed_amount.normalize()
        ),
    }
}

/// Reject rules with negative components
pub fn validate_rule(rule: &CommissionRule) -> Result<()> {
    let negative = match rule {
        CommissionRule::Percentage { percentage } => *percentage < Decimal::ZERO,
        CommissionRule::Fixed { amount } => *amount < Decimal::ZERO,
        CommissionRule::Hybrid {
            percentage,
            fixed_amount,
        } => *percentage < Decimal::ZERO || *fixed_amount < Decimal::ZERO,
    };
    if negative {
        return Err(Error::Validation(format!(
            "Commission components must not be negative: {}",
            describe(rule)
        )));
    }
    Ok(())
}

/// Where a resolved rule came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleSource {
    /// Category override
    Category(String),
    /// Global rule stored in the ledger
    Global,
    /// Nothing configured; hardcoded 10%
    Fallback,
}

/// Rule plus its origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRule {
    /// Effective rule
    pub rule: CommissionRule,
    /// Origin
    pub source: RuleSource,
}

/// Commission computed for one price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionQuote {
    /// Commission, rounded half-up to 2 dp, never above the price
    pub amount: Decimal,
    /// e.g. "10%", "Fixed ₹20", "10% (Default)"
    pub rate_description: String,
    /// Percentage component to snapshot on the item (0 for fixed rules)
    pub rate: Decimal,
    /// Origin of the rule
    pub source: RuleSource,
}

impl CommissionQuote {
    /// Quote `price` under a resolved rule
    pub fn new(resolved: ResolvedRule, price: Decimal) -> Self {
        let amount = round_money(calculate(&resolved.rule, price));

        let rate = match &resolved.rule {
            CommissionRule::Percentage { percentage }
            | CommissionRule::Hybrid { percentage, .. } => *percentage,
            CommissionRule::Fixed { .. } => Decimal::ZERO,
        };

        let rate_description = match resolved.source {
            RuleSource::Fallback => format!("{} (Default)", describe(&resolved.rule)),
            _ => describe(&resolved.rule),
        };

        Self {
            amount,
            rate_description,
            rate,
            source: resolved.source,
        }
    }
}

/// Resolves and caches commission rules
#[derive(Debug)]
pub struct CommissionResolver {
    ledger: Arc<Ledger>,
    lazy_default: bool,
    /// `None` caches a miss
    categories: DashMap<String, Option<CommissionRule>>,
    global: RwLock<Option<CommissionRule>>,
}

impl CommissionResolver {
    /// Create resolver over the ledger's rule store
    pub fn new(ledger: Arc<Ledger>, config: &CommissionConfig) -> Self {
        Self {
            ledger,
            lazy_default: config.lazy_default,
            categories: DashMap::new(),
            global: RwLock::new(None),
        }
    }

    /// Store configured rules that are not yet in the ledger
    pub async fn seed(&self, config: &CommissionConfig) -> Result<()> {
        if let Some(global) = &config.global {
            let rule = CommissionRule::try_from(global)?;
            let (_, inserted) = self
                .ledger
                .insert_commission_rule_if_absent(RuleScope::Global, rule)
                .await?;
            if inserted {
                tracing::info!("Seeded global commission rule");
            }
        }

        for (category, rule) in &config.categories {
            let rule = CommissionRule::try_from(rule)?;
            let (_, inserted) = self
                .ledger
                .insert_commission_rule_if_absent(RuleScope::Category(category.clone()), rule)
                .await?;
            if inserted {
                tracing::info!(category = %category, "Seeded category commission rule");
            }
        }

        self.invalidate();
        Ok(())
    }

    /// Effective rule for a category
    pub async fn resolve(&self, category: Option<&str>) -> Result<ResolvedRule> {
        if let Some(category) = category {
            if let Some(rule) = self.category_rule(category)? {
                return Ok(ResolvedRule {
                    rule,
                    source: RuleSource::Category(category.to_string()),
                });
            }
        }

        match self.global_rule().await? {
            Some(rule) => Ok(ResolvedRule {
                rule,
                source: RuleSource::Global,
            }),
            None => {
                tracing::debug!("No commission rule configured, using fallback");
                Ok(ResolvedRule {
                    rule: CommissionRule::default_global(),
                    source: RuleSource::Fallback,
                })
            }
        }
    }

    /// Commission for `price` in `category`
    pub async fn compute(&self, price: Decimal, category: Option<&str>) -> Result<CommissionQuote> {
        let resolved = self.resolve(category).await?;
        Ok(CommissionQuote::new(resolved, price))
    }

    fn category_rule(&self, category: &str) -> Result<Option<CommissionRule>> {
        let cached = self.categories.get(category).map(|r| r.value().clone());
        if let Some(rule) = cached {
            return Ok(rule);
        }

        let stored = self
            .ledger
            .get_commission_rule(&RuleScope::Category(category.to_string()))?;
        self.categories.insert(category.to_string(), stored.clone());
        Ok(stored)
    }

    async fn global_rule(&self) -> Result<Option<CommissionRule>> {
        if let Some(rule) = self.global.read().clone() {
            return Ok(Some(rule));
        }

        let rule = match self.ledger.get_commission_rule(&RuleScope::Global)? {
            Some(rule) => Some(rule),
            None if self.lazy_default => {
                let (rule, inserted) = self
                    .ledger
                    .insert_commission_rule_if_absent(
                        RuleScope::Global,
                        CommissionRule::default_global(),
                    )
                    .await?;
                if inserted {
                    tracing::info!("Created default global commission rule (10%)");
                }
                Some(rule)
            }
            None => None,
        };

        if let Some(rule) = &rule {
            *self.global.write() = Some(rule.clone());
        }
        Ok(rule)
    }

    /// Set or replace a category override
    pub async fn set_category_rule(&self, category: &str, rule: CommissionRule) -> Result<()> {
        validate_rule(&rule)?;
        self.ledger
            .put_commission_rule(RuleScope::Category(category.to_string()), rule.clone())
            .await?;
        self.categories.insert(category.to_string(), Some(rule));
        tracing::info!(category, "Category commission rule updated");
        Ok(())
    }

    /// Remove a category override
    pub async fn remove_category_rule(&self, category: &str) -> Result<()> {
        self.ledger
            .remove_commission_rule(RuleScope::Category(category.to_string()))
            .await?;
        self.categories.insert(category.to_string(), None);
        tracing::info!(category, "Category commission rule removed");
        Ok(())
    }

    /// Set or replace the global rule
    pub async fn set_global_rule(&self, rule: CommissionRule) -> Result<()> {
        validate_rule(&rule)?;
        self.ledger
            .put_commission_rule(RuleScope::Global, rule.clone())
            .await?;
        *self.global.write() = Some(rule);
        tracing::info!("Global commission rule updated");
        Ok(())
    }

    /// Drop every cached rule
    pub fn invalidate(&self) {
        self.categories.clear();
        *self.global.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::Config as LedgerConfig;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    async fn resolver(lazy_default: bool) -> (CommissionResolver, Arc<Ledger>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let ledger = Arc::new(
            Ledger::open(LedgerConfig {
                data_dir: temp_dir.path().to_path_buf(),
                ..LedgerConfig::default()
            })
            .await
            .unwrap(),
        );
        let config = CommissionConfig {
            lazy_default,
            ..CommissionConfig::default()
        };
        (CommissionResolver::new(ledger.clone(), &config), ledger, temp_dir)
    }

    #[test]
    fn test_calculate_variants() {
        let price = dec!(1000);
        assert_eq!(
            calculate(&CommissionRule::Percentage { percentage: dec!(10) }, price),
            dec!(100)
        );
        assert_eq!(
            calculate(&CommissionRule::Fixed { amount: dec!(25) }, price),
            dec!(25)
        );
        assert_eq!(
            calculate(
                &CommissionRule::Hybrid {
                    percentage: dec!(5),
                    fixed_amount: dec!(20)
                },
                price
            ),
            dec!(70)
        );
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_money(dec!(0.125)), dec!(0.13));
        assert_eq!(round_money(dec!(0.124)), dec!(0.12));
        assert_eq!(round_money(dec!(2.675)), dec!(2.68));
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(
            describe(&CommissionRule::Percentage { percentage: dec!(10.00) }),
            "10%"
        );
        assert_eq!(
            describe(&CommissionRule::Fixed { amount: dec!(20) }),
            "Fixed ₹20"
        );
        assert_eq!(
            describe(&CommissionRule::Hybrid {
                percentage: dec!(5),
                fixed_amount: dec!(20)
            }),
            "5% + Fixed ₹20"
        );
    }

    #[test]
    fn test_fixed_commission_above_price() {
        let quote = CommissionQuote::new(
            ResolvedRule {
                rule: CommissionRule::Fixed { amount: dec!(20) },
                source: RuleSource::Global,
            },
            dec!(10),
        );
        assert_eq!(quote.amount, dec!(20.00));
        assert_eq!(quote.rate, Decimal::ZERO);
    }

    #[test]
    fn test_negative_components_rejected() {
        assert!(validate_rule(&CommissionRule::Percentage { percentage: dec!(-1) }).is_err());
        assert!(validate_rule(&CommissionRule::Fixed { amount: dec!(-0.01) }).is_err());
        assert!(validate_rule(&CommissionRule::Hybrid {
            percentage: dec!(5),
            fixed_amount: dec!(-20)
        })
        .is_err());
        assert!(validate_rule(&CommissionRule::Hybrid {
            percentage: dec!(5),
            fixed_amount: dec!(20)
        })
        .is_ok());
    }

    #[tokio::test]
    async fn test_lazy_default_created_once() {
        let (resolver, ledger, _temp) = resolver(true).await;

        let quote = resolver.compute(dec!(1000), Some("books")).await.unwrap();
        assert_eq!(quote.amount, dec!(100.00));
        assert_eq!(quote.source, RuleSource::Global);
        assert_eq!(quote.rate_description, "10%");
        assert_eq!(
            ledger.get_commission_rule(&RuleScope::Global).unwrap(),
            Some(CommissionRule::default_global())
        );
    }

    #[tokio::test]
    async fn test_fallback_without_lazy_default() {
        let (resolver, ledger, _temp) = resolver(false).await;

        let quote = resolver.compute(dec!(200), None).await.unwrap();
        assert_eq!(quote.amount, dec!(20.00));
        assert_eq!(quote.source, RuleSource::Fallback);
        assert_eq!(quote.rate_description, "10% (Default)");
        assert!(ledger.get_commission_rule(&RuleScope::Global).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_category_override_and_removal() {
        let (resolver, _ledger, _temp) = resolver(true).await;
        let hybrid = CommissionRule::Hybrid {
            percentage: dec!(5),
            fixed_amount: dec!(20),
        };

        // Cache a miss first
        let before = resolver.resolve(Some("electronics")).await.unwrap();
        assert_eq!(before.source, RuleSource::Global);

        resolver
            .set_category_rule("electronics", hybrid.clone())
            .await
            .unwrap();
        let quote = resolver.compute(dec!(1000), Some("electronics")).await.unwrap();
        assert_eq!(quote.amount, dec!(70.00));
        assert_eq!(quote.rate, dec!(5));
        assert_eq!(quote.source, RuleSource::Category("electronics".to_string()));

        resolver.remove_category_rule("electronics").await.unwrap();
        let after = resolver.resolve(Some("electronics")).await.unwrap();
        assert_eq!(after.source, RuleSource::Global);
    }

    #[tokio::test]
    async fn test_admin_write_rejects_negative_rule() {
        let (resolver, ledger, _temp) = resolver(true).await;

        let result = resolver
            .set_category_rule("toys", CommissionRule::Fixed { amount: dec!(-5) })
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(ledger
            .get_commission_rule(&RuleScope::Category("toys".to_string()))
            .unwrap()
            .is_none());

        let result = resolver
            .set_global_rule(CommissionRule::Percentage { percentage: dec!(-10) })
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(
            resolver.resolve(None).await.unwrap().rule,
            CommissionRule::default_global()
        );
    }

    #[tokio::test]
    async fn test_invalidate_sees_external_writes() {
        let (resolver, ledger, _temp) = resolver(true).await;
        assert_eq!(
            resolver.resolve(Some("toys")).await.unwrap().source,
            RuleSource::Global
        );

        // Written behind the resolver's back
        ledger
            .put_commission_rule(
                RuleScope::Category("toys".to_string()),
                CommissionRule::Percentage { percentage: dec!(15) },
            )
            .await
            .unwrap();
        assert_eq!(
            resolver.resolve(Some("toys")).await.unwrap().source,
            RuleSource::Global
        );

        resolver.invalidate();
        assert_eq!(
            resolver.resolve(Some("toys")).await.unwrap().source,
            RuleSource::Category("toys".to_string())
        );
    }

    #[tokio::test]
    async fn test_seed_keeps_existing_rules() {
        let (resolver, ledger, _temp) = resolver(true).await;
        resolver
            .set_global_rule(CommissionRule::Percentage { percentage: dec!(8) })
            .await
            .unwrap();

        let mut config = CommissionConfig::default();
        config.global = Some(crate::config::CommissionRuleConfig {
            commission_type: "percentage".to_string(),
            percentage: dec!(12),
            fixed_amount: Decimal::ZERO,
        });
        resolver.seed(&config).await.unwrap();

        assert_eq!(
            ledger.get_commission_rule(&RuleScope::Global).unwrap(),
            Some(CommissionRule::Percentage { percentage: dec!(8) })
        );
    }
}
