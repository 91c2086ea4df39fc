//! Rebalance plans
//!
//! A [`RebalancePlan`] is a pure value object: target allocation deltas plus the
//! asset conversions needed to realize them. Dropping a plan has no side effects.
//! A plan expires with the snapshot it was computed from.

use crate::common::identifiers::{AccountId, AssetId, StrategyId};
use crate::risk::RiskVector;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Change of one strategy's allocation fraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationDelta {
    pub strategy: StrategyId,
    pub asset: AssetId,
    pub from: Decimal,
    pub to: Decimal,
}

impl AllocationDelta {
    /// Signed change in allocation fraction
    pub fn change(&self) -> Decimal {
        self.to - self.from
    }
}

/// Asset movement required by a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetConversion {
    pub from_asset: AssetId,
    pub to_asset: AssetId,
    /// Amount of `from_asset` to sell
    pub amount_in: Decimal,
    /// Value moved, in the accounting unit
    pub value: Decimal,
    pub max_slippage: Decimal,
    /// Hop limit for routing; `None` uses the routing default
    pub max_hops: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalancePlan {
    pub account: AccountId,
    /// Ledger version the plan was computed against
    pub account_version: u64,
    pub snapshot_timestamp_ns: u64,
    /// Last instant the plan may be applied; its snapshot's horizon
    pub valid_until_ns: u64,
    pub risk_before: RiskVector,
    pub risk_after: RiskVector,
    pub deltas: Vec<AllocationDelta>,
    pub conversions: Vec<AssetConversion>,
    pub expected_yield_before: Decimal,
    pub expected_yield_after: Decimal,
    pub created_at_ns: u64,
}

impl RebalancePlan {
    pub fn is_expired(&self, now_ns: u64) -> bool {
        now_ns > self.valid_until_ns
    }

    /// A plan that leaves every allocation where it is
    pub fn is_noop(&self) -> bool {
        self.deltas.iter().all(|d| d.change().is_zero())
    }

    /// Sum of target fractions across all deltas
    pub fn target_allocation(&self) -> Decimal {
        self.deltas.iter().map(|d| d.to).sum()
    }

    /// Total value the plan moves between assets
    pub fn conversion_value(&self) -> Decimal {
        self.conversions.iter().map(|c| c.value).sum()
    }
}
