//! Four-dimensional account risk vector

use crate::vault::RiskBudget;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const MAX_SCORE: Decimal = Decimal::ONE_HUNDRED;

/// Clamp a raw score into [0, 100]
pub fn clamp_score(score: Decimal) -> Decimal {
    score.max(Decimal::ZERO).min(MAX_SCORE)
}

/// Derived per-account risk; each score is in [0, 100], higher is riskier.
///
/// Never persisted: it is a function of current positions and the current
/// snapshot, recomputed whenever either changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RiskVector {
    pub volatility: Decimal,
    pub liquidity_depth: Decimal,
    pub correlation: Decimal,
    pub concentration: Decimal,
}

impl RiskVector {
    /// True when the budgeted dimensions sit at or under their ceilings
    pub fn within_budget(&self, budget: &RiskBudget) -> bool {
        self.concentration <= budget.concentration_ceiling
            && self.correlation <= budget.correlation_ceiling
    }

    /// Largest overshoot of a budgeted dimension past its ceiling, zero when within budget
    pub fn budget_excess(&self, budget: &RiskBudget) -> Decimal {
        (self.concentration - budget.concentration_ceiling)
            .max(self.correlation - budget.correlation_ceiling)
            .max(Decimal::ZERO)
    }
}

impl std::fmt::Display for RiskVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "vol={} liq={} corr={} conc={}",
            self.volatility.round_dp(2),
            self.liquidity_depth.round_dp(2),
            self.correlation.round_dp(2),
            self.concentration.round_dp(2)
        )
    }
}
