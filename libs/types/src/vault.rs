//! Account vaults and strategy positions
//!
//! An [`AccountVault`] is the ledger record for one depositor: total value in the
//! accounting unit plus one [`StrategyPosition`] per strategy the account ever
//! allocated to. Positions are deactivated, never removed.

use crate::common::errors::VaultError;
use crate::common::identifiers::{AccountId, AssetId, StrategyId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Allocation of one account to one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPosition {
    pub strategy_id: StrategyId,
    /// Underlying asset the strategy holds
    pub asset: AssetId,
    /// Fraction of the account's total value, in [0, 1]
    pub allocation: Decimal,
    /// Author-assigned risk score, 1 (safest) to 100
    pub risk_score: u8,
    /// Expected annual yield rate (0.05 = 5%)
    pub expected_yield: Decimal,
    pub active: bool,
    pub last_rebalance_ns: u64,
}

impl StrategyPosition {
    pub fn new(
        strategy_id: StrategyId,
        asset: AssetId,
        risk_score: u8,
        expected_yield: Decimal,
    ) -> Self {
        Self {
            strategy_id,
            asset,
            allocation: Decimal::ZERO,
            risk_score,
            expected_yield,
            active: true,
            last_rebalance_ns: 0,
        }
    }

    /// Full withdrawal: the position keeps its history but holds nothing
    pub fn deactivate(&mut self) {
        self.allocation = Decimal::ZERO;
        self.active = false;
    }

    /// Active positions with something allocated
    pub fn is_held(&self) -> bool {
        self.active && self.allocation > Decimal::ZERO
    }
}

/// Per-account ceilings on the computed risk dimensions, each in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskBudget {
    pub concentration_ceiling: Decimal,
    pub correlation_ceiling: Decimal,
}

impl Default for RiskBudget {
    fn default() -> Self {
        Self {
            concentration_ceiling: Decimal::from(60),
            correlation_ceiling: Decimal::from(80),
        }
    }
}

/// Outstanding integrity problem that blocks further actions on an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationNotice {
    pub reason: String,
    pub flagged_at_ns: u64,
    /// Ledger value when the problem was detected
    pub last_known_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountVault {
    pub account_id: AccountId,
    /// Asset idle capital and withdrawals settle into
    pub base_asset: AssetId,
    /// Total deposited value in the accounting unit
    pub total_value: Decimal,
    pub positions: BTreeMap<StrategyId, StrategyPosition>,
    pub last_rebalance_ns: u64,
    pub risk_budget: RiskBudget,
    /// Incremented on every committed mutation
    pub version: u64,
    pub reconciliation: Option<ReconciliationNotice>,
}

impl AccountVault {
    pub fn new(account_id: AccountId, base_asset: AssetId, risk_budget: RiskBudget) -> Self {
        Self {
            account_id,
            base_asset,
            total_value: Decimal::ZERO,
            positions: BTreeMap::new(),
            last_rebalance_ns: 0,
            risk_budget,
            version: 0,
            reconciliation: None,
        }
    }

    pub fn active_positions(&self) -> impl Iterator<Item = &StrategyPosition> {
        self.positions.values().filter(|p| p.active)
    }

    /// Sum of active allocation fractions
    pub fn active_allocation(&self) -> Decimal {
        self.active_positions().map(|p| p.allocation).sum()
    }

    /// Fraction of value not allocated to any strategy (held in the base asset)
    pub fn idle_fraction(&self) -> Decimal {
        (Decimal::ONE - self.active_allocation()).max(Decimal::ZERO)
    }

    /// Current fraction allocated to `strategy`, zero when absent or inactive
    pub fn allocation_of(&self, strategy: StrategyId) -> Decimal {
        self.positions
            .get(&strategy)
            .filter(|p| p.active)
            .map(|p| p.allocation)
            .unwrap_or(Decimal::ZERO)
    }

    /// Value of a position in the accounting unit
    pub fn value_of(&self, strategy: StrategyId) -> Decimal {
        self.allocation_of(strategy) * self.total_value
    }

    /// Nanoseconds left before a normal rebalance is allowed, if any
    pub fn cooldown_remaining(&self, now_ns: u64, min_interval_ns: u64) -> Option<u64> {
        if self.last_rebalance_ns == 0 {
            return None;
        }
        let elapsed = now_ns.saturating_sub(self.last_rebalance_ns);
        (elapsed < min_interval_ns).then(|| min_interval_ns - elapsed)
    }

    /// Fails while a reconciliation notice is outstanding
    pub fn ensure_actionable(&self) -> Result<(), VaultError> {
        match &self.reconciliation {
            Some(notice) => Err(VaultError::ReconciliationRequired {
                account: self.account_id,
                reason: notice.reason.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn flag_reconciliation(&mut self, reason: impl Into<String>, now_ns: u64) {
        self.reconciliation = Some(ReconciliationNotice {
            reason: reason.into(),
            flagged_at_ns: now_ns,
            last_known_value: self.total_value,
        });
        self.version += 1;
    }
}
