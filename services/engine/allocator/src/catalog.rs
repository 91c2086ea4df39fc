//! Strategy catalog with allocation bands

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use types::{AssetId, StrategyId, VaultError};
use vault_config::StrategyConfig;

/// One allocatable strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySpec {
    pub id: StrategyId,
    pub name: String,
    pub asset: AssetId,
    pub min_allocation: Decimal,
    pub max_allocation: Decimal,
    pub risk_score: u8,
    pub expected_yield: Decimal,
}

impl StrategySpec {
    /// Upper bound implied by the author-assigned risk score: `(101 - score) / 100`
    ///
    /// A score of 1 allows the whole account, a score of 100 allows 1%.
    pub fn risk_score_cap(&self) -> Decimal {
        let score = self.risk_score.clamp(1, 100);
        Decimal::from(101 - u32::from(score)) / Decimal::ONE_HUNDRED
    }

    /// Largest fraction the optimizer may assign
    pub fn eligible_cap(&self) -> Decimal {
        self.max_allocation.min(self.risk_score_cap())
    }

    /// Whether `fraction` is an admissible explicit target
    pub fn admits(&self, fraction: Decimal) -> bool {
        fraction.is_zero()
            || (fraction >= self.min_allocation && fraction <= self.eligible_cap())
    }
}

impl From<&StrategyConfig> for StrategySpec {
    fn from(config: &StrategyConfig) -> Self {
        Self {
            id: config.id,
            name: config.name.clone(),
            asset: config.asset,
            min_allocation: config.min_allocation,
            max_allocation: config.max_allocation,
            risk_score: config.risk_score,
            expected_yield: config.expected_yield,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StrategyCatalog {
    strategies: BTreeMap<StrategyId, StrategySpec>,
}

impl StrategyCatalog {
    pub fn from_config(strategies: &[StrategyConfig]) -> Result<Self, VaultError> {
        let mut catalog = Self::default();
        for config in strategies {
            catalog.insert(StrategySpec::from(config))?;
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, spec: StrategySpec) -> Result<(), VaultError> {
        if spec.id.is_null() {
            return Err(VaultError::invalid_config("strategy id cannot be null"));
        }
        if spec.min_allocation < Decimal::ZERO
            || spec.min_allocation > spec.max_allocation
            || spec.max_allocation > Decimal::ONE
        {
            return Err(VaultError::invalid_config(format!(
                "{} band [{}, {}] is not inside [0, 1]",
                spec.id, spec.min_allocation, spec.max_allocation
            )));
        }
        if spec.min_allocation > spec.eligible_cap() {
            return Err(VaultError::invalid_config(format!(
                "{} minimum {} exceeds its risk-score cap {}",
                spec.id,
                spec.min_allocation,
                spec.risk_score_cap()
            )));
        }
        if self.strategies.contains_key(&spec.id) {
            return Err(VaultError::invalid_config(format!(
                "{} listed twice",
                spec.id
            )));
        }
        self.strategies.insert(spec.id, spec);
        Ok(())
    }

    pub fn get(&self, id: StrategyId) -> Result<&StrategySpec, VaultError> {
        self.strategies
            .get(&id)
            .ok_or(VaultError::StrategyNotFound { strategy: id })
    }

    pub fn iter(&self) -> impl Iterator<Item = &StrategySpec> {
        self.strategies.values()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn spec(id: u64, min: Decimal, max: Decimal, risk_score: u8) -> StrategySpec {
        StrategySpec {
            id: StrategyId::new(id),
            name: format!("strategy-{id}"),
            asset: AssetId::new(id),
            min_allocation: min,
            max_allocation: max,
            risk_score,
            expected_yield: dec!(0.05),
        }
    }

    #[test]
    fn test_risk_score_caps_allocation() {
        assert_eq!(spec(1, dec!(0), dec!(1), 1).eligible_cap(), dec!(1));
        assert_eq!(spec(1, dec!(0), dec!(1), 41).eligible_cap(), dec!(0.6));
        assert_eq!(spec(1, dec!(0), dec!(0.3), 41).eligible_cap(), dec!(0.3));
        assert_eq!(spec(1, dec!(0), dec!(1), 100).eligible_cap(), dec!(0.01));
    }

    #[test]
    fn test_admits_zero_or_band() {
        let s = spec(1, dec!(0.1), dec!(0.5), 10);
        assert!(s.admits(dec!(0)));
        assert!(s.admits(dec!(0.1)));
        assert!(s.admits(dec!(0.5)));
        assert!(!s.admits(dec!(0.05)));
        assert!(!s.admits(dec!(0.55)));
    }

    #[test]
    fn test_catalog_rejects_bad_bands() {
        let mut catalog = StrategyCatalog::default();
        assert!(catalog.insert(spec(1, dec!(0.6), dec!(0.5), 10)).is_err());
        assert!(catalog.insert(spec(1, dec!(0.5), dec!(0.9), 61)).is_err());
        assert!(catalog.insert(spec(1, dec!(0.1), dec!(0.5), 10)).is_ok());
        assert!(catalog.insert(spec(1, dec!(0.1), dec!(0.5), 10)).is_err());
        assert!(matches!(
            catalog.get(StrategyId::new(9)),
            Err(VaultError::StrategyNotFound { .. })
        ));
    }
}
