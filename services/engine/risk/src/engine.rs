use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use types::{
    clamp_score, AccountVault, AssetId, Clock, MarketSnapshot, RiskVector, StrategyId,
    VaultError, MAX_SCORE,
};
use vault_config::RiskConfig;

/// One allocation the engine scores, actual or hypothetical
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Holding {
    pub strategy: StrategyId,
    pub asset: AssetId,
    /// Fraction of the account's total value
    pub fraction: Decimal,
}

impl Holding {
    /// Active, non-empty positions of an account
    pub fn from_account(account: &AccountVault) -> Vec<Holding> {
        account
            .active_positions()
            .filter(|p| p.allocation > Decimal::ZERO)
            .map(|p| Holding {
                strategy: p.strategy_id,
                asset: p.asset,
                fraction: p.allocation,
            })
            .collect()
    }
}

pub struct RiskAssessmentEngine {
    config: RiskConfig,
    clock: Arc<dyn Clock>,
}

impl RiskAssessmentEngine {
    pub fn new(config: RiskConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Risk vector of `account` against `snapshot` at the current clock time
    pub fn assess(
        &self,
        account: &AccountVault,
        snapshot: &MarketSnapshot,
    ) -> Result<RiskVector, VaultError> {
        self.assess_at(account, snapshot, self.clock.now_ns())
    }

    /// Pure core of [`assess`](Self::assess) with an explicit evaluation time
    pub fn assess_at(
        &self,
        account: &AccountVault,
        snapshot: &MarketSnapshot,
        now_ns: u64,
    ) -> Result<RiskVector, VaultError> {
        snapshot.ensure_fresh(now_ns, self.config.max_snapshot_age_ns())?;
        let holdings = Holding::from_account(account);
        let risk = self.project(&holdings, account.total_value, snapshot)?;
        debug!(account = %account.account_id, %risk, "Assessed account risk");
        Ok(risk)
    }

    /// Score a hypothetical allocation against an already validated snapshot
    pub fn project(
        &self,
        holdings: &[Holding],
        total_value: Decimal,
        snapshot: &MarketSnapshot,
    ) -> Result<RiskVector, VaultError> {
        let held: Vec<&Holding> = holdings
            .iter()
            .filter(|h| h.fraction > Decimal::ZERO)
            .collect();

        // Every held asset must be fully priced before any score is produced
        for holding in &held {
            snapshot.price(holding.asset)?;
        }

        if held.is_empty() {
            return Ok(RiskVector::default());
        }

        Ok(RiskVector {
            volatility: self.volatility_score(&held, snapshot)?,
            liquidity_depth: liquidity_score(&held, total_value, snapshot)?,
            correlation: correlation_score(&held, snapshot),
            concentration: concentration_score(&held),
        })
    }

    fn volatility_score(
        &self,
        held: &[&Holding],
        snapshot: &MarketSnapshot,
    ) -> Result<Decimal, VaultError> {
        let total: Decimal = held.iter().map(|h| h.fraction).sum();
        let mut weighted = Decimal::ZERO;
        for holding in held {
            let quote = snapshot.quote(holding.asset)?;
            weighted += holding.fraction / total * quote.volatility;
        }
        Ok(clamp_score(
            weighted / self.config.volatility_full_scale * MAX_SCORE,
        ))
    }
}

fn liquidity_score(
    held: &[&Holding],
    total_value: Decimal,
    snapshot: &MarketSnapshot,
) -> Result<Decimal, VaultError> {
    // Positions sharing an asset exit through the same venues
    let mut value_by_asset: BTreeMap<AssetId, Decimal> = BTreeMap::new();
    for holding in held {
        *value_by_asset.entry(holding.asset).or_default() += holding.fraction * total_value;
    }

    let mut min_ratio: Option<Decimal> = None;
    for (asset, value) in value_by_asset {
        let amount = value / snapshot.price(asset)?;
        if amount <= Decimal::ZERO {
            continue;
        }
        let ratio = snapshot.exit_depth(asset) / amount;
        min_ratio = Some(min_ratio.map_or(ratio, |current| current.min(ratio)));
    }

    Ok(match min_ratio {
        Some(ratio) => clamp_score(MAX_SCORE / (Decimal::ONE + ratio)),
        None => Decimal::ZERO,
    })
}

fn correlation_score(held: &[&Holding], snapshot: &MarketSnapshot) -> Decimal {
    if held.len() < 2 {
        return Decimal::ZERO;
    }

    let mut weighted = Decimal::ZERO;
    let mut weights = Decimal::ZERO;
    for (i, a) in held.iter().enumerate() {
        for b in &held[i + 1..] {
            let weight = a.fraction * b.fraction;
            let rho = snapshot
                .correlation(a.asset, b.asset)
                .unwrap_or(Decimal::ONE);
            weighted += weight * rho;
            weights += weight;
        }
    }

    if weights.is_zero() {
        return Decimal::ZERO;
    }
    let mean = weighted / weights;
    clamp_score((mean + Decimal::ONE) * (MAX_SCORE / Decimal::TWO))
}

fn concentration_score(held: &[&Holding]) -> Decimal {
    let herfindahl: Decimal = held.iter().map(|h| h.fraction * h.fraction).sum();
    clamp_score(herfindahl * MAX_SCORE)
}
