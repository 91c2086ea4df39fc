use crate::catalog::StrategyCatalog;
use crate::converter::{Converter, Urgency};
use crate::ledger::VaultLedger;
use crate::optimizer::{Candidate, HillClimber, SearchParams};
use risk_engine::{Holding, RiskAssessmentEngine};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use types::{
    AccountId, AccountVault, AllocationDelta, AssetConversion, AssetId, Clock, ExecutionReceipt,
    MarketSnapshot, RebalancePlan, RiskVector, StepFill, StrategyId, StrategyPosition,
    VaultError,
};
use vault_config::AllocatorConfig;

/// Ledger state after a committed plan
#[derive(Debug, Clone, Serialize)]
pub struct AppliedPlan {
    pub account: AccountVault,
    pub receipts: Vec<ExecutionReceipt>,
    /// Planned value minus realized value across all conversions
    pub realized_loss: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiquidatedPosition {
    pub strategy: StrategyId,
    pub asset: AssetId,
    /// Position value before liquidation
    pub value: Decimal,
    /// `None` when the position already sat in the base asset or was dust
    pub receipt: Option<ExecutionReceipt>,
}

#[derive(Debug, Clone)]
pub struct FailedLiquidation {
    pub strategy: StrategyId,
    pub asset: AssetId,
    pub error: VaultError,
}

/// Per-position outcome of an emergency withdrawal
#[derive(Debug, Clone)]
pub struct EmergencyReport {
    pub account: AccountId,
    pub liquidated: Vec<LiquidatedPosition>,
    pub failed: Vec<FailedLiquidation>,
    pub realized_loss: Decimal,
}

impl EmergencyReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalOutcome {
    pub account: AccountVault,
    pub receipt: Option<ExecutionReceipt>,
}

pub struct StrategyAllocator {
    config: AllocatorConfig,
    catalog: StrategyCatalog,
    risk: Arc<RiskAssessmentEngine>,
    ledger: Arc<VaultLedger>,
    clock: Arc<dyn Clock>,
}

impl StrategyAllocator {
    pub fn new(
        config: AllocatorConfig,
        catalog: StrategyCatalog,
        risk: Arc<RiskAssessmentEngine>,
        ledger: Arc<VaultLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            catalog,
            risk,
            ledger,
            clock,
        }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    pub fn catalog(&self) -> &StrategyCatalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &Arc<VaultLedger> {
        &self.ledger
    }

    /// Plans the highest-yield allocation that stays inside the account's risk budget
    pub fn rebalance(
        &self,
        account: &AccountVault,
        risk: &RiskVector,
        snapshot: &MarketSnapshot,
    ) -> Result<RebalancePlan, VaultError> {
        let now_ns = self.clock.now_ns();
        self.check_preconditions(account, snapshot, now_ns)?;

        let candidates = self.candidates(account)?;
        let previous: BTreeMap<StrategyId, Decimal> = account
            .active_positions()
            .filter(|p| p.allocation > Decimal::ZERO)
            .map(|p| (p.strategy_id, p.allocation))
            .collect();

        let climber = HillClimber::new(
            &candidates,
            &previous,
            SearchParams {
                step: self.config.allocation_step,
                max_iterations: self.config.max_iterations,
            },
        );
        let allocation = climber.search(|fractions| {
            let holdings: Vec<Holding> = candidates
                .iter()
                .zip(fractions)
                .map(|(c, &fraction)| Holding {
                    strategy: c.strategy,
                    asset: c.asset,
                    fraction,
                })
                .collect();
            let projected = self.risk.project(&holdings, account.total_value, snapshot)?;
            Ok(projected.budget_excess(&account.risk_budget))
        })?;

        let Some(allocation) = allocation else {
            return Err(VaultError::RiskBudgetExceeded {
                account: account.account_id,
                detail: format!(
                    "no allocation of {} strategies within their bands fits concentration {} / correlation {}",
                    candidates.len(),
                    account.risk_budget.concentration_ceiling,
                    account.risk_budget.correlation_ceiling
                ),
            });
        };
        debug!(
            "{}: hill climbing settled after {} moves at yield {}",
            account.account_id, allocation.iterations, allocation.expected_yield
        );

        self.build_plan(account, risk, &allocation.fractions, snapshot, now_ns)
    }

    /// Plans an explicit target allocation
    ///
    /// Targets must sit in their strategy's band (or be zero), may reactivate a
    /// withdrawn strategy, and must keep the account inside its risk budget.
    /// Active positions absent from `targets` keep their current fraction.
    pub fn rebalance_to_targets(
        &self,
        account: &AccountVault,
        targets: &BTreeMap<StrategyId, Decimal>,
        risk: &RiskVector,
        snapshot: &MarketSnapshot,
    ) -> Result<RebalancePlan, VaultError> {
        let now_ns = self.clock.now_ns();
        self.check_preconditions(account, snapshot, now_ns)?;

        let mut fractions: BTreeMap<StrategyId, Decimal> = account
            .active_positions()
            .map(|p| (p.strategy_id, p.allocation))
            .collect();
        for (&strategy, &target) in targets {
            let spec = self.catalog.get(strategy)?;
            if !spec.admits(target) {
                return Err(VaultError::invalid_request(format!(
                    "{} target {} outside [{}, {}]",
                    strategy,
                    target,
                    spec.min_allocation,
                    spec.eligible_cap()
                )));
            }
            fractions.insert(strategy, target);
        }

        let total: Decimal = fractions.values().copied().sum();
        if total > Decimal::ONE {
            return Err(VaultError::invalid_request(format!(
                "targets allocate {total} of the account"
            )));
        }

        let holdings = self.holdings(account, &fractions)?;
        let projected = self.risk.project(&holdings, account.total_value, snapshot)?;
        if !projected.within_budget(&account.risk_budget) {
            return Err(VaultError::RiskBudgetExceeded {
                account: account.account_id,
                detail: format!("targets project to {projected}"),
            });
        }

        self.build_plan(account, risk, &fractions, snapshot, now_ns)
    }

    /// Executes every conversion of `plan` and commits it, or commits nothing
    pub async fn apply_plan(
        &self,
        plan: &RebalancePlan,
        converter: &dyn Converter,
        snapshot: &MarketSnapshot,
    ) -> Result<AppliedPlan, VaultError> {
        let account = self.ledger.get(plan.account)?;
        account.ensure_actionable()?;
        self.ensure_plan_current(plan, snapshot)?;
        if account.version != plan.account_version {
            return Err(VaultError::StalePlan {
                account: plan.account,
                planned_version: plan.account_version,
                current_version: account.version,
            });
        }

        let mut receipts: Vec<ExecutionReceipt> = Vec::with_capacity(plan.conversions.len());
        for (index, conversion) in plan.conversions.iter().enumerate() {
            match converter.convert(conversion, snapshot, Urgency::Normal).await {
                Ok(receipt) => receipts.push(receipt),
                Err(cause) => {
                    return Err(self.conversion_failed(plan.account, index, &receipts, cause));
                }
            }
        }

        let realized_loss = realized_loss(&plan.conversions, &receipts, snapshot);
        let now_ns = self.clock.now_ns();
        let settled = !receipts.is_empty();
        let committed = self.commit(plan.account, plan.account_version, settled, now_ns, |vault| {
            for delta in &plan.deltas {
                let position = self.position_entry(vault, delta.strategy, delta.asset);
                if delta.to.is_zero() {
                    position.deactivate();
                } else {
                    position.allocation = delta.to;
                    position.active = true;
                }
                position.last_rebalance_ns = now_ns;
            }
            vault.total_value = (vault.total_value - realized_loss).max(Decimal::ZERO);
            vault.last_rebalance_ns = now_ns;
            Ok(())
        })?;

        info!(
            "{} rebalanced: {} conversions, value {} -> {}, yield {} -> {}",
            plan.account,
            receipts.len(),
            account.total_value,
            committed.total_value,
            plan.expected_yield_before,
            plan.expected_yield_after
        );
        Ok(AppliedPlan {
            account: committed,
            receipts,
            realized_loss,
        })
    }

    /// Liquidates every active position into the base asset
    ///
    /// No cooldown or risk budget applies. Each position is
    /// converted through a single hop with the emergency slippage bound and
    /// committed on its own, so one failed liquidation never blocks the others.
    pub async fn emergency_withdraw(
        &self,
        account_id: AccountId,
        converter: &dyn Converter,
        snapshot: &MarketSnapshot,
    ) -> Result<EmergencyReport, VaultError> {
        let now_ns = self.clock.now_ns();
        let max_snapshot_age_ns = self.config.emergency_max_snapshot_age_ns();
        snapshot.ensure_fresh(now_ns, max_snapshot_age_ns)?;

        let account = self.ledger.get(account_id)?;
        let positions: Vec<StrategyPosition> = account.active_positions().cloned().collect();
        warn!(
            "🚨 Emergency withdrawal for {}: {} active positions",
            account_id,
            positions.len()
        );

        let mut report = EmergencyReport {
            account: account_id,
            liquidated: Vec::new(),
            failed: Vec::new(),
            realized_loss: Decimal::ZERO,
        };

        for position in positions {
            let current = self.ledger.get(account_id)?;
            let value = current.value_of(position.strategy_id);
            let needs_conversion =
                position.asset != current.base_asset && value >= self.config.min_conversion_value;

            let receipt = if needs_conversion {
                let outcome = match self.liquidation(&current, &position, value, snapshot) {
                    Ok(conversion) => {
                        converter
                            .convert(
                                &conversion,
                                snapshot,
                                Urgency::Emergency {
                                    max_snapshot_age_ns,
                                },
                            )
                            .await
                    }
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(receipt) => Some(receipt),
                    Err(error) => {
                        if error.requires_reconciliation() {
                            self.ledger
                                .flag_reconciliation(account_id, &error.to_string(), now_ns);
                        }
                        warn!(
                            "Emergency liquidation of {} failed: {}",
                            position.strategy_id, error
                        );
                        report.failed.push(FailedLiquidation {
                            strategy: position.strategy_id,
                            asset: position.asset,
                            error,
                        });
                        continue;
                    }
                }
            } else {
                None
            };

            let loss = receipt
                .as_ref()
                .map(|r| value - received_value(r, snapshot, value))
                .unwrap_or(Decimal::ZERO);
            let committed = self.ledger.update(account_id, |vault| {
                if let Some(held) = vault.positions.get_mut(&position.strategy_id) {
                    held.deactivate();
                    held.last_rebalance_ns = now_ns;
                }
                vault.total_value = (vault.total_value - loss).max(Decimal::ZERO);
                vault.version += 1;
                Ok(())
            });
            if let Err(error) = committed {
                report.failed.push(FailedLiquidation {
                    strategy: position.strategy_id,
                    asset: position.asset,
                    error,
                });
                continue;
            }

            report.realized_loss += loss;
            report.liquidated.push(LiquidatedPosition {
                strategy: position.strategy_id,
                asset: position.asset,
                value,
                receipt,
            });
        }

        info!(
            "Emergency withdrawal for {} finished: {} liquidated, {} failed, loss {}",
            account_id,
            report.liquidated.len(),
            report.failed.len(),
            report.realized_loss
        );
        Ok(report)
    }

    /// Fully withdraws one strategy into the base asset and deactivates it
    pub async fn withdraw_strategy(
        &self,
        account_id: AccountId,
        strategy: StrategyId,
        converter: &dyn Converter,
        snapshot: &MarketSnapshot,
    ) -> Result<WithdrawalOutcome, VaultError> {
        let now_ns = self.clock.now_ns();
        snapshot.ensure_fresh(now_ns, self.risk.config().max_snapshot_age_ns())?;

        let account = self.ledger.get(account_id)?;
        account.ensure_actionable()?;
        let position = account
            .positions
            .get(&strategy)
            .filter(|p| p.active)
            .cloned()
            .ok_or(VaultError::StrategyNotFound { strategy })?;

        let value = account.value_of(strategy);
        let receipt =
            if position.asset != account.base_asset && value >= self.config.min_conversion_value {
                let mut conversion = self.liquidation(&account, &position, value, snapshot)?;
                conversion.max_slippage = self.config.max_slippage;
                conversion.max_hops = None;
                match converter.convert(&conversion, snapshot, Urgency::Normal).await {
                    Ok(receipt) => Some(receipt),
                    Err(cause) => return Err(self.conversion_failed(account_id, 0, &[], cause)),
                }
            } else {
                None
            };

        let loss = receipt
            .as_ref()
            .map(|r| value - received_value(r, snapshot, value))
            .unwrap_or(Decimal::ZERO);
        let committed = self.commit(
            account_id,
            account.version,
            receipt.is_some(),
            now_ns,
            |vault| {
                if let Some(held) = vault.positions.get_mut(&strategy) {
                    held.deactivate();
                    held.last_rebalance_ns = now_ns;
                }
                vault.total_value = (vault.total_value - loss).max(Decimal::ZERO);
                Ok(())
            },
        )?;

        info!("{} withdrew {} worth {}", account_id, strategy, value);
        Ok(WithdrawalOutcome {
            account: committed,
            receipt,
        })
    }

    /// Refuses plans whose market assumptions have aged out
    ///
    /// The plan expires with its snapshot, and execution may only price
    /// against a snapshot at least as new as the one the plan was built on.
    fn ensure_plan_current(
        &self,
        plan: &RebalancePlan,
        snapshot: &MarketSnapshot,
    ) -> Result<(), VaultError> {
        let now_ns = self.clock.now_ns();
        if plan.is_expired(now_ns) {
            return Err(VaultError::StaleSnapshot {
                age_ns: now_ns.saturating_sub(plan.snapshot_timestamp_ns),
                max_age_ns: plan.valid_until_ns.saturating_sub(plan.snapshot_timestamp_ns),
            });
        }
        if snapshot.timestamp_ns < plan.snapshot_timestamp_ns {
            return Err(VaultError::StaleSnapshot {
                age_ns: now_ns.saturating_sub(snapshot.timestamp_ns),
                max_age_ns: now_ns.saturating_sub(plan.snapshot_timestamp_ns),
            });
        }
        snapshot.ensure_fresh(now_ns, self.risk.config().max_snapshot_age_ns())
    }

    fn check_preconditions(
        &self,
        account: &AccountVault,
        snapshot: &MarketSnapshot,
        now_ns: u64,
    ) -> Result<(), VaultError> {
        account.ensure_actionable()?;
        if let Some(remaining_ns) =
            account.cooldown_remaining(now_ns, self.config.min_rebalance_interval_ns())
        {
            return Err(VaultError::CooldownActive {
                account: account.account_id,
                remaining_ns,
            });
        }
        snapshot.ensure_fresh(now_ns, self.risk.config().max_snapshot_age_ns())
    }

    /// Catalog strategies the optimizer may allocate to
    fn candidates(&self, account: &AccountVault) -> Result<Vec<Candidate>, VaultError> {
        for position in account.active_positions() {
            self.catalog.get(position.strategy_id)?;
        }
        Ok(self
            .catalog
            .iter()
            .filter(|spec| {
                account
                    .positions
                    .get(&spec.id)
                    .map_or(true, |p| p.active)
            })
            .map(|spec| Candidate {
                strategy: spec.id,
                asset: spec.asset,
                min: spec.min_allocation,
                cap: spec.eligible_cap(),
                expected_yield: spec.expected_yield,
            })
            .collect())
    }

    fn asset_of(&self, account: &AccountVault, strategy: StrategyId) -> Result<AssetId, VaultError> {
        match self.catalog.get(strategy) {
            Ok(spec) => Ok(spec.asset),
            Err(e) => account
                .positions
                .get(&strategy)
                .map(|p| p.asset)
                .ok_or(e),
        }
    }

    fn yield_of(&self, account: &AccountVault, strategy: StrategyId) -> Decimal {
        match self.catalog.get(strategy) {
            Ok(spec) => spec.expected_yield,
            Err(_) => account
                .positions
                .get(&strategy)
                .map(|p| p.expected_yield)
                .unwrap_or(Decimal::ZERO),
        }
    }

    fn holdings(
        &self,
        account: &AccountVault,
        fractions: &BTreeMap<StrategyId, Decimal>,
    ) -> Result<Vec<Holding>, VaultError> {
        fractions
            .iter()
            .map(|(&strategy, &fraction)| {
                Ok(Holding {
                    strategy,
                    asset: self.asset_of(account, strategy)?,
                    fraction,
                })
            })
            .collect()
    }

    fn build_plan(
        &self,
        account: &AccountVault,
        risk_before: &RiskVector,
        targets: &BTreeMap<StrategyId, Decimal>,
        snapshot: &MarketSnapshot,
        now_ns: u64,
    ) -> Result<RebalancePlan, VaultError> {
        let mut strategies: Vec<StrategyId> = targets.keys().copied().collect();
        for position in account.active_positions() {
            if !targets.contains_key(&position.strategy_id) {
                strategies.push(position.strategy_id);
            }
        }
        strategies.sort();

        let mut deltas = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            let from = account.allocation_of(strategy);
            let to = targets.get(&strategy).copied().unwrap_or(Decimal::ZERO);
            if from.is_zero() && to.is_zero() {
                continue;
            }
            deltas.push(AllocationDelta {
                strategy,
                asset: self.asset_of(account, strategy)?,
                from,
                to,
            });
        }

        let holdings = self.holdings(account, targets)?;
        let risk_after = self.risk.project(&holdings, account.total_value, snapshot)?;
        let expected_yield_before = account
            .active_positions()
            .map(|p| p.allocation * p.expected_yield)
            .sum();
        let expected_yield_after = deltas
            .iter()
            .map(|d| d.to * self.yield_of(account, d.strategy))
            .sum();
        let conversions = self.derive_conversions(account, &deltas, snapshot)?;

        let plan = RebalancePlan {
            account: account.account_id,
            account_version: account.version,
            snapshot_timestamp_ns: snapshot.timestamp_ns,
            valid_until_ns: snapshot
                .timestamp_ns
                .saturating_add(self.risk.config().max_snapshot_age_ns()),
            risk_before: *risk_before,
            risk_after,
            deltas,
            conversions,
            expected_yield_before,
            expected_yield_after,
            created_at_ns: now_ns,
        };
        debug!(
            "{} plan: {} deltas, {} conversions worth {}, risk {} -> {}",
            plan.account,
            plan.deltas.len(),
            plan.conversions.len(),
            plan.conversion_value(),
            plan.risk_before,
            plan.risk_after
        );
        Ok(plan)
    }

    /// Nets value changes per asset and pairs sellers with buyers, largest first
    ///
    /// Idle capital lives in the base asset, so allocation growth is funded from
    /// it and allocation cuts settle into it.
    fn derive_conversions(
        &self,
        account: &AccountVault,
        deltas: &[AllocationDelta],
        snapshot: &MarketSnapshot,
    ) -> Result<Vec<AssetConversion>, VaultError> {
        let mut net: BTreeMap<AssetId, Decimal> = BTreeMap::new();
        let mut allocated_change = Decimal::ZERO;
        for delta in deltas {
            let value = delta.change() * account.total_value;
            *net.entry(delta.asset).or_default() += value;
            allocated_change += value;
        }
        *net.entry(account.base_asset).or_default() -= allocated_change;

        let mut sources: Vec<(AssetId, Decimal)> = net
            .iter()
            .filter(|(_, v)| **v < Decimal::ZERO)
            .map(|(&asset, &v)| (asset, -v))
            .collect();
        let mut sinks: Vec<(AssetId, Decimal)> = net
            .iter()
            .filter(|(_, v)| **v > Decimal::ZERO)
            .map(|(&asset, &v)| (asset, v))
            .collect();
        sources.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        sinks.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut conversions = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < sources.len() && j < sinks.len() {
            let moved = sources[i].1.min(sinks[j].1);
            let (from_asset, to_asset) = (sources[i].0, sinks[j].0);

            if moved >= self.config.min_conversion_value {
                let price = snapshot.price(from_asset)?;
                snapshot.price(to_asset)?;
                conversions.push(AssetConversion {
                    from_asset,
                    to_asset,
                    amount_in: moved / price,
                    value: moved,
                    max_slippage: self.config.max_slippage,
                    max_hops: None,
                });
            } else if moved > Decimal::ZERO {
                debug!("Skipping dust conversion {} -> {} worth {}", from_asset, to_asset, moved);
            }

            sources[i].1 -= moved;
            sinks[j].1 -= moved;
            if sources[i].1.is_zero() {
                i += 1;
            }
            if sinks[j].1.is_zero() {
                j += 1;
            }
        }
        Ok(conversions)
    }

    fn liquidation(
        &self,
        account: &AccountVault,
        position: &StrategyPosition,
        value: Decimal,
        snapshot: &MarketSnapshot,
    ) -> Result<AssetConversion, VaultError> {
        let price = snapshot.price(position.asset)?;
        Ok(AssetConversion {
            from_asset: position.asset,
            to_asset: account.base_asset,
            amount_in: value / price,
            value,
            max_slippage: self.config.emergency_max_slippage,
            max_hops: Some(1),
        })
    }

    fn position_entry<'v>(
        &self,
        vault: &'v mut AccountVault,
        strategy: StrategyId,
        asset: AssetId,
    ) -> &'v mut StrategyPosition {
        let spec = self.catalog.get(strategy).ok();
        vault.positions.entry(strategy).or_insert_with(|| match spec {
            Some(spec) => {
                StrategyPosition::new(spec.id, spec.asset, spec.risk_score, spec.expected_yield)
            }
            None => StrategyPosition::new(strategy, asset, 100, Decimal::ZERO),
        })
    }

    /// Commits under the account lock if nothing landed since `planned_version`
    ///
    /// When conversions already settled, a moved ledger can no longer be
    /// reconciled automatically and the account is flagged.
    fn commit<F>(
        &self,
        account: AccountId,
        planned_version: u64,
        settled: bool,
        now_ns: u64,
        apply: F,
    ) -> Result<AccountVault, VaultError>
    where
        F: FnOnce(&mut AccountVault) -> Result<(), VaultError>,
    {
        self.ledger.update(account, |vault| {
            if vault.version != planned_version {
                if !settled {
                    return Err(VaultError::StalePlan {
                        account,
                        planned_version,
                        current_version: vault.version,
                    });
                }
                let reason = format!(
                    "conversions settled against version {planned_version} but ledger is at {}",
                    vault.version
                );
                vault.flag_reconciliation(reason.clone(), now_ns);
                return Err(VaultError::ReconciliationRequired { account, reason });
            }
            apply(vault)?;
            vault.version += 1;
            Ok(vault.clone())
        })
    }

    fn conversion_failed(
        &self,
        account: AccountId,
        index: usize,
        settled: &[ExecutionReceipt],
        cause: VaultError,
    ) -> VaultError {
        let now_ns = self.clock.now_ns();
        if settled.is_empty() {
            if cause.requires_reconciliation() {
                self.ledger
                    .flag_reconciliation(account, &cause.to_string(), now_ns);
            }
            return cause;
        }

        let fills: Vec<StepFill> = settled.iter().flat_map(|r| r.fills.clone()).collect();
        let error = VaultError::PartialExecution {
            failed_step: index,
            fills,
            cause: cause.to_string(),
        };
        self.ledger
            .flag_reconciliation(account, &error.to_string(), now_ns);
        error
    }
}

/// Accounting-unit value received by a conversion, `fallback` when unpriced
fn received_value(receipt: &ExecutionReceipt, snapshot: &MarketSnapshot, fallback: Decimal) -> Decimal {
    match snapshot.price(receipt.token_out) {
        Ok(price) => receipt.amount_out * price,
        Err(_) => fallback,
    }
}

fn realized_loss(
    conversions: &[AssetConversion],
    receipts: &[ExecutionReceipt],
    snapshot: &MarketSnapshot,
) -> Decimal {
    conversions
        .iter()
        .zip(receipts)
        .map(|(conversion, receipt)| {
            conversion.value - received_value(receipt, snapshot, conversion.value)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StrategySpec;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use types::{ManualClock, RiskBudget, NANOS_PER_SECOND};
    use vault_config::RiskConfig;

    const ACCOUNT: AccountId = AccountId::new(7);
    const USD: AssetId = AssetId::new(1);
    const ETH: AssetId = AssetId::new(2);
    const BTC: AssetId = AssetId::new(3);
    const LENDING: StrategyId = StrategyId::new(1);
    const STAKING: StrategyId = StrategyId::new(2);
    const NOW: u64 = 100_000 * NANOS_PER_SECOND;

    /// Converts at snapshot prices; fails the conversions listed in `fail_at`
    struct MockConverter {
        calls: Mutex<Vec<(AssetConversion, Urgency)>>,
        fail_at: Vec<(usize, VaultError)>,
        haircut: Decimal,
    }

    impl MockConverter {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_at: Vec::new(),
                haircut: Decimal::ZERO,
            }
        }

        fn failing(index: usize, error: VaultError) -> Self {
            Self {
                fail_at: vec![(index, error)],
                ..Self::new()
            }
        }

        fn calls(&self) -> Vec<(AssetConversion, Urgency)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl Converter for MockConverter {
        async fn convert(
            &self,
            conversion: &AssetConversion,
            snapshot: &MarketSnapshot,
            urgency: Urgency,
        ) -> Result<ExecutionReceipt, VaultError> {
            let index = {
                let mut calls = self.calls.lock();
                calls.push((conversion.clone(), urgency));
                calls.len() - 1
            };
            if let Some((_, error)) = self.fail_at.iter().find(|(i, _)| *i == index) {
                return Err(error.clone());
            }
            let out_price = snapshot.price(conversion.to_asset)?;
            let amount_out = conversion.value / out_price * (Decimal::ONE - self.haircut);
            Ok(ExecutionReceipt {
                token_in: conversion.from_asset,
                token_out: conversion.to_asset,
                amount_in: conversion.amount_in,
                amount_out,
                fills: vec![StepFill {
                    step: 0,
                    venue: types::VenueId::new(1),
                    pool: types::PoolId::new(1),
                    token_in: conversion.from_asset,
                    token_out: conversion.to_asset,
                    amount_in: conversion.amount_in,
                    amount_out,
                }],
                commitment_bound: amount_out,
                realized_slippage: self.haircut,
                executed_at_ns: NOW,
            })
        }
    }

    fn spec(id: StrategyId, asset: AssetId, min: Decimal, max: Decimal, yld: Decimal) -> StrategySpec {
        StrategySpec {
            id,
            name: format!("{id}"),
            asset,
            min_allocation: min,
            max_allocation: max,
            risk_score: 20,
            expected_yield: yld,
        }
    }

    fn catalog() -> StrategyCatalog {
        let mut catalog = StrategyCatalog::default();
        catalog
            .insert(spec(LENDING, ETH, dec!(0), dec!(0.8), dec!(0.04)))
            .unwrap();
        catalog
            .insert(spec(STAKING, BTC, dec!(0), dec!(0.8), dec!(0.06)))
            .unwrap();
        catalog
    }

    fn snapshot() -> MarketSnapshot {
        snapshot_at(NOW)
    }

    fn snapshot_at(timestamp_ns: u64) -> MarketSnapshot {
        MarketSnapshot::new(timestamp_ns)
            .with_asset(USD, dec!(1), dec!(0))
            .with_asset(ETH, dec!(1), dec!(0.6))
            .with_asset(BTC, dec!(1), dec!(0.5))
            .with_correlation(ETH, BTC, dec!(0.2))
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        ledger: Arc<VaultLedger>,
        allocator: StrategyAllocator,
    }

    fn fixture_with(catalog: StrategyCatalog, budget: RiskBudget) -> Fixture {
        let clock = Arc::new(ManualClock::new(NOW));
        let ledger = Arc::new(VaultLedger::new(budget));
        let risk = Arc::new(RiskAssessmentEngine::new(RiskConfig::default(), clock.clone()));
        let allocator = StrategyAllocator::new(
            AllocatorConfig::default(),
            catalog,
            risk,
            ledger.clone(),
            clock.clone(),
        );
        Fixture {
            clock,
            ledger,
            allocator,
        }
    }

    /// 100 units split 60/40 between lending (ETH) and staking (BTC)
    fn fixture_60_40() -> Fixture {
        let fixture = fixture_with(catalog(), RiskBudget::default());
        fixture.ledger.open_account(ACCOUNT, USD).unwrap();
        fixture.ledger.deposit(ACCOUNT, dec!(100)).unwrap();
        fixture
            .ledger
            .update(ACCOUNT, |vault| {
                for (id, asset, fraction, yld) in [
                    (LENDING, ETH, dec!(0.6), dec!(0.04)),
                    (STAKING, BTC, dec!(0.4), dec!(0.06)),
                ] {
                    let mut position = StrategyPosition::new(id, asset, 20, yld);
                    position.allocation = fraction;
                    vault.positions.insert(id, position);
                }
                Ok(())
            })
            .unwrap();
        fixture
    }

    fn assess(fixture: &Fixture) -> (AccountVault, RiskVector) {
        let account = fixture.ledger.get(ACCOUNT).unwrap();
        let risk = fixture
            .allocator
            .risk
            .assess_at(&account, &snapshot_at(fixture.clock.now_ns()), fixture.clock.now_ns())
            .unwrap();
        (account, risk)
    }

    fn fifty_fifty() -> BTreeMap<StrategyId, Decimal> {
        BTreeMap::from([(LENDING, dec!(0.5)), (STAKING, dec!(0.5))])
    }

    #[tokio::test]
    async fn test_sixty_forty_to_fifty_fifty() {
        let fixture = fixture_60_40();
        let (account, risk) = assess(&fixture);

        let plan = fixture
            .allocator
            .rebalance_to_targets(&account, &fifty_fifty(), &risk, &snapshot())
            .unwrap();
        assert_eq!(plan.conversions.len(), 1);
        let conversion = &plan.conversions[0];
        assert_eq!(conversion.from_asset, ETH);
        assert_eq!(conversion.to_asset, BTC);
        assert_eq!(conversion.value, dec!(10));
        assert_eq!(conversion.amount_in, dec!(10));

        let converter = MockConverter::new();
        let applied = fixture
            .allocator
            .apply_plan(&plan, &converter, &snapshot())
            .await
            .unwrap();
        assert_eq!(applied.account.allocation_of(LENDING), dec!(0.5));
        assert_eq!(applied.account.allocation_of(STAKING), dec!(0.5));
        assert_eq!(applied.account.total_value, dec!(100));
        assert_eq!(applied.account.last_rebalance_ns, NOW);
        assert_eq!(applied.realized_loss, dec!(0));
        assert_eq!(applied.account.version, account.version + 1);
    }

    #[tokio::test]
    async fn test_cooldown_blocks_rebalance_but_not_emergency() {
        let fixture = fixture_60_40();
        let (account, risk) = assess(&fixture);
        let plan = fixture
            .allocator
            .rebalance_to_targets(&account, &fifty_fifty(), &risk, &snapshot())
            .unwrap();
        fixture
            .allocator
            .apply_plan(&plan, &MockConverter::new(), &snapshot())
            .await
            .unwrap();

        fixture.clock.advance_secs(10);
        let (account, risk) = assess(&fixture);
        let err = fixture
            .allocator
            .rebalance(&account, &risk, &snapshot())
            .unwrap_err();
        assert!(matches!(err, VaultError::CooldownActive { .. }));

        let converter = MockConverter::new();
        let report = fixture
            .allocator
            .emergency_withdraw(ACCOUNT, &converter, &snapshot())
            .await
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.liquidated.len(), 2);
        for (conversion, urgency) in converter.calls() {
            assert_eq!(conversion.to_asset, USD);
            assert_eq!(conversion.max_hops, Some(1));
            assert_eq!(conversion.max_slippage, dec!(0.05));
            assert!(matches!(urgency, Urgency::Emergency { .. }));
        }

        let vault = fixture.ledger.get(ACCOUNT).unwrap();
        assert_eq!(vault.active_allocation(), dec!(0));
        assert!(vault.positions.values().all(|p| !p.active));
        assert_eq!(vault.total_value, dec!(100));
    }

    #[tokio::test]
    async fn test_emergency_tolerates_older_snapshot() {
        let fixture = fixture_60_40();
        fixture.clock.advance_secs(120);

        let account = fixture.ledger.get(ACCOUNT).unwrap();
        let stale = fixture
            .allocator
            .rebalance(&account, &RiskVector::default(), &snapshot())
            .unwrap_err();
        assert!(matches!(stale, VaultError::StaleSnapshot { .. }));

        let report = fixture
            .allocator
            .emergency_withdraw(ACCOUNT, &MockConverter::new(), &snapshot())
            .await
            .unwrap();
        assert!(report.is_complete());

        fixture.clock.advance_secs(300);
        let err = fixture
            .allocator
            .emergency_withdraw(ACCOUNT, &MockConverter::new(), &snapshot())
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::StaleSnapshot { .. }));
    }

    #[tokio::test]
    async fn test_emergency_continues_past_failed_position() {
        let fixture = fixture_60_40();
        let converter = MockConverter::failing(
            0,
            VaultError::VenueUnavailable {
                venue: types::VenueId::new(1),
                pool: None,
                reason: "down".into(),
            },
        );
        let report = fixture
            .allocator
            .emergency_withdraw(ACCOUNT, &converter, &snapshot())
            .await
            .unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.liquidated.len(), 1);
        assert_eq!(report.failed[0].strategy, LENDING);

        let vault = fixture.ledger.get(ACCOUNT).unwrap();
        assert!(vault.positions[&LENDING].active);
        assert!(!vault.positions[&STAKING].active);
        assert!(vault.reconciliation.is_some());
    }

    #[tokio::test]
    async fn test_failed_first_conversion_leaves_ledger_untouched() {
        let fixture = fixture_60_40();
        let (account, risk) = assess(&fixture);
        let plan = fixture
            .allocator
            .rebalance_to_targets(&account, &fifty_fifty(), &risk, &snapshot())
            .unwrap();

        let slip = VaultError::SlippageExceeded {
            step: 0,
            actual: dec!(9),
            minimum: dec!(9.9),
        };
        let err = fixture
            .allocator
            .apply_plan(&plan, &MockConverter::failing(0, slip.clone()), &snapshot())
            .await
            .unwrap_err();
        assert_eq!(err, slip);

        let after = fixture.ledger.get(ACCOUNT).unwrap();
        assert_eq!(after, account);
    }

    #[tokio::test]
    async fn test_failure_after_settled_conversion_is_partial() {
        let fixture = fixture_60_40();
        let (account, risk) = assess(&fixture);

        // Both strategies shrink into idle USD: two conversions
        let targets = BTreeMap::from([(LENDING, dec!(0.3)), (STAKING, dec!(0.3))]);
        let plan = fixture
            .allocator
            .rebalance_to_targets(&account, &targets, &risk, &snapshot())
            .unwrap();
        assert_eq!(plan.conversions.len(), 2);

        let converter = MockConverter::failing(
            1,
            VaultError::SlippageExceeded {
                step: 0,
                actual: dec!(1),
                minimum: dec!(2),
            },
        );
        let err = fixture
            .allocator
            .apply_plan(&plan, &converter, &snapshot())
            .await
            .unwrap_err();
        match &err {
            VaultError::PartialExecution {
                failed_step, fills, ..
            } => {
                assert_eq!(*failed_step, 1);
                assert_eq!(fills.len(), 1);
            }
            other => panic!("expected PartialExecution, got {other:?}"),
        }

        let after = fixture.ledger.get(ACCOUNT).unwrap();
        assert_eq!(after.allocation_of(LENDING), dec!(0.6));
        assert_eq!(after.allocation_of(STAKING), dec!(0.4));
        assert!(matches!(
            after.ensure_actionable(),
            Err(VaultError::ReconciliationRequired { .. })
        ));
    }

    #[tokio::test]
    async fn test_plan_is_stale_after_another_action() {
        let fixture = fixture_60_40();
        let (account, risk) = assess(&fixture);
        let plan = fixture
            .allocator
            .rebalance_to_targets(&account, &fifty_fifty(), &risk, &snapshot())
            .unwrap();

        fixture.ledger.deposit(ACCOUNT, dec!(50)).unwrap();
        let converter = MockConverter::new();
        let err = fixture
            .allocator
            .apply_plan(&plan, &converter, &snapshot())
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::StalePlan { .. }));
        assert!(converter.calls().is_empty());
    }

    #[test]
    fn test_rebalance_maximizes_yield_within_budget() {
        let fixture = fixture_60_40();
        fixture.clock.advance_secs(3600);
        let (account, risk) = assess(&fixture);
        let snapshot = snapshot_at(fixture.clock.now_ns());

        let plan = fixture
            .allocator
            .rebalance(&account, &risk, &snapshot)
            .unwrap();
        assert!(plan.target_allocation() <= Decimal::ONE);
        assert!(plan.expected_yield_after >= plan.expected_yield_before);
        assert!(plan.risk_after.within_budget(&account.risk_budget));

        // Staking yields more; concentration (HHI x 100 <= 60) limits how far it goes
        let staking = plan
            .deltas
            .iter()
            .find(|d| d.strategy == STAKING)
            .map(|d| d.to)
            .unwrap();
        let lending = plan
            .deltas
            .iter()
            .find(|d| d.strategy == LENDING)
            .map(|d| d.to)
            .unwrap();
        assert!(staking > lending);
        assert!(staking * staking * dec!(100) <= dec!(60));
    }

    #[test]
    fn test_infeasible_minimums_exceed_budget() {
        let mut catalog = StrategyCatalog::default();
        catalog
            .insert(spec(LENDING, ETH, dec!(0.7), dec!(0.8), dec!(0.04)))
            .unwrap();
        let fixture = fixture_with(
            catalog,
            RiskBudget {
                concentration_ceiling: dec!(40),
                correlation_ceiling: dec!(80),
            },
        );
        fixture.ledger.open_account(ACCOUNT, USD).unwrap();
        fixture.ledger.deposit(ACCOUNT, dec!(100)).unwrap();
        let account = fixture.ledger.get(ACCOUNT).unwrap();

        let err = fixture
            .allocator
            .rebalance(&account, &RiskVector::default(), &snapshot())
            .unwrap_err();
        assert!(matches!(err, VaultError::RiskBudgetExceeded { .. }));
    }

    #[test]
    fn test_hedge_repairs_correlated_minimums() {
        const GOLD: AssetId = AssetId::new(4);
        const HEDGE: StrategyId = StrategyId::new(3);

        let mut catalog = StrategyCatalog::default();
        catalog
            .insert(spec(LENDING, ETH, dec!(0.3), dec!(0.4), dec!(0.04)))
            .unwrap();
        catalog
            .insert(spec(STAKING, BTC, dec!(0.3), dec!(0.4), dec!(0.06)))
            .unwrap();
        catalog
            .insert(spec(HEDGE, GOLD, dec!(0), dec!(0.4), dec!(0.01)))
            .unwrap();
        let fixture = fixture_with(catalog, RiskBudget::default());
        fixture.ledger.open_account(ACCOUNT, USD).unwrap();
        fixture.ledger.deposit(ACCOUNT, dec!(100)).unwrap();
        let account = fixture.ledger.get(ACCOUNT).unwrap();

        let snapshot = snapshot()
            .with_asset(GOLD, dec!(1), dec!(0.2))
            .with_correlation(ETH, BTC, dec!(0.9))
            .with_correlation(ETH, GOLD, dec!(-0.5))
            .with_correlation(BTC, GOLD, dec!(-0.5));

        // ETH and BTC at their minimums alone score correlation 95
        let minimums = [
            Holding {
                strategy: LENDING,
                asset: ETH,
                fraction: dec!(0.3),
            },
            Holding {
                strategy: STAKING,
                asset: BTC,
                fraction: dec!(0.3),
            },
        ];
        let alone = fixture
            .allocator
            .risk
            .project(&minimums, account.total_value, &snapshot)
            .unwrap();
        assert!(!alone.within_budget(&account.risk_budget));

        let plan = fixture
            .allocator
            .rebalance(&account, &RiskVector::default(), &snapshot)
            .unwrap();
        let target = |strategy: StrategyId| {
            plan.deltas
                .iter()
                .find(|d| d.strategy == strategy)
                .map(|d| d.to)
                .unwrap_or_default()
        };
        assert!(target(LENDING) >= dec!(0.3));
        assert!(target(STAKING) >= dec!(0.3));
        assert!(target(HEDGE) > dec!(0));
        assert!(plan.target_allocation() <= Decimal::ONE);
        assert!(plan.risk_after.within_budget(&account.risk_budget));
    }

    #[tokio::test]
    async fn test_expired_plan_is_refused_before_converting() {
        let fixture = fixture_60_40();
        let (account, risk) = assess(&fixture);
        let plan = fixture
            .allocator
            .rebalance_to_targets(&account, &fifty_fifty(), &risk, &snapshot())
            .unwrap();
        assert_eq!(plan.valid_until_ns, NOW + 30 * NANOS_PER_SECOND);

        fixture.clock.advance_secs(7200);
        let converter = MockConverter::new();
        let err = fixture
            .allocator
            .apply_plan(&plan, &converter, &snapshot_at(fixture.clock.now_ns()))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::StaleSnapshot { .. }));
        assert!(converter.calls().is_empty());
        assert_eq!(fixture.ledger.get(ACCOUNT).unwrap(), account);
    }

    #[tokio::test]
    async fn test_plan_cannot_execute_against_older_snapshot() {
        let fixture = fixture_60_40();
        fixture.clock.advance_secs(10);
        let (account, risk) = assess(&fixture);
        let plan = fixture
            .allocator
            .rebalance_to_targets(
                &account,
                &fifty_fifty(),
                &risk,
                &snapshot_at(fixture.clock.now_ns()),
            )
            .unwrap();

        // Still inside the horizon, but older than what the plan priced against
        let converter = MockConverter::new();
        let err = fixture
            .allocator
            .apply_plan(&plan, &converter, &snapshot())
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::StaleSnapshot { .. }));
        assert!(converter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rebalance_to_zero_deactivates_position() {
        let fixture = fixture_60_40();
        let (account, risk) = assess(&fixture);
        let targets = BTreeMap::from([(LENDING, dec!(0.6)), (STAKING, dec!(0))]);
        let plan = fixture
            .allocator
            .rebalance_to_targets(&account, &targets, &risk, &snapshot())
            .unwrap();
        let applied = fixture
            .allocator
            .apply_plan(&plan, &MockConverter::new(), &snapshot())
            .await
            .unwrap();

        let staking = &applied.account.positions[&STAKING];
        assert!(!staking.active);
        assert_eq!(staking.allocation, dec!(0));
        assert_eq!(applied.account.idle_fraction(), dec!(0.4));

        let candidates = fixture.allocator.candidates(&applied.account).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].strategy, LENDING);
    }

    #[test]
    fn test_targets_are_validated() {
        let fixture = fixture_60_40();
        let (account, risk) = assess(&fixture);

        let unknown = BTreeMap::from([(StrategyId::new(99), dec!(0.1))]);
        assert!(matches!(
            fixture
                .allocator
                .rebalance_to_targets(&account, &unknown, &risk, &snapshot()),
            Err(VaultError::StrategyNotFound { .. })
        ));

        let over = BTreeMap::from([(LENDING, dec!(0.7)), (STAKING, dec!(0.4))]);
        assert!(matches!(
            fixture
                .allocator
                .rebalance_to_targets(&account, &over, &risk, &snapshot()),
            Err(VaultError::InvalidRequest { .. })
        ));

        // All in one strategy breaches concentration
        let concentrated = BTreeMap::from([(LENDING, dec!(0.8)), (STAKING, dec!(0))]);
        assert!(matches!(
            fixture
                .allocator
                .rebalance_to_targets(&account, &concentrated, &risk, &snapshot()),
            Err(VaultError::RiskBudgetExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_withdrawn_strategy_is_excluded_until_targeted() {
        let fixture = fixture_60_40();
        let outcome = fixture
            .allocator
            .withdraw_strategy(ACCOUNT, STAKING, &MockConverter::new(), &snapshot())
            .await
            .unwrap();
        assert!(outcome.receipt.is_some());
        assert!(!outcome.account.positions[&STAKING].active);
        assert_eq!(outcome.account.idle_fraction(), dec!(0.4));

        let account = fixture.ledger.get(ACCOUNT).unwrap();
        let candidates = fixture.allocator.candidates(&account).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].strategy, LENDING);

        // Explicit targets bring it back
        let (account, risk) = assess(&fixture);
        let plan = fixture
            .allocator
            .rebalance_to_targets(&account, &fifty_fifty(), &risk, &snapshot())
            .unwrap();
        let applied = fixture
            .allocator
            .apply_plan(&plan, &MockConverter::new(), &snapshot())
            .await
            .unwrap();
        assert!(applied.account.positions[&STAKING].active);
        assert_eq!(applied.account.allocation_of(STAKING), dec!(0.5));
    }

    #[tokio::test]
    async fn test_conversion_loss_is_debited() {
        let fixture = fixture_60_40();
        let (account, risk) = assess(&fixture);
        let plan = fixture
            .allocator
            .rebalance_to_targets(&account, &fifty_fifty(), &risk, &snapshot())
            .unwrap();
        let converter = MockConverter {
            haircut: dec!(0.01),
            ..MockConverter::new()
        };
        let applied = fixture
            .allocator
            .apply_plan(&plan, &converter, &snapshot())
            .await
            .unwrap();
        assert_eq!(applied.realized_loss, dec!(0.1));
        assert_eq!(applied.account.total_value, dec!(99.9));
        assert_eq!(applied.account.allocation_of(STAKING), dec!(0.5));
    }

    proptest! {
        #[test]
        fn prop_plans_never_allocate_more_than_everything(
            lending_yield in 0u32..20,
            staking_yield in 0u32..20,
            lending_max in 10u32..=80,
            staking_max in 10u32..=80,
            rho in -100i64..=100,
        ) {
            let mut catalog = StrategyCatalog::default();
            catalog.insert(spec(LENDING, ETH, dec!(0), Decimal::new(i64::from(lending_max), 2), Decimal::new(i64::from(lending_yield), 2))).unwrap();
            catalog.insert(spec(STAKING, BTC, dec!(0), Decimal::new(i64::from(staking_max), 2), Decimal::new(i64::from(staking_yield), 2))).unwrap();
            let fixture = fixture_with(catalog, RiskBudget::default());
            fixture.ledger.open_account(ACCOUNT, USD).unwrap();
            fixture.ledger.deposit(ACCOUNT, dec!(1000)).unwrap();
            let account = fixture.ledger.get(ACCOUNT).unwrap();
            let snapshot = snapshot().with_correlation(ETH, BTC, Decimal::new(rho, 2));

            match fixture.allocator.rebalance(&account, &RiskVector::default(), &snapshot) {
                Ok(plan) => {
                    prop_assert!(plan.target_allocation() <= Decimal::ONE);
                    prop_assert!(plan.risk_after.within_budget(&account.risk_budget));
                    let converted: Decimal = plan.conversions.iter().map(|c| c.value).sum();
                    prop_assert!(converted <= account.total_value);
                }
                Err(e) => {
                    let over_budget = matches!(e, VaultError::RiskBudgetExceeded { .. });
                    prop_assert!(over_budget, "unexpected error {:?}", e);
                }
            }
        }
    }
}
