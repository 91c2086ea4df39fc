//! Vault orchestration
//!
//! Pulls a snapshot, scores the account, plans, then routes and executes every
//! conversion the plan needs before committing it to the ledger.

use crate::converter::RouteConverter;
use crate::metrics::VaultMetrics;
use execution_coordinator::{ExecutionCoordinator, ExecutionStatsSnapshot, VenueRegistry};
use risk_engine::RiskAssessmentEngine;
use routing_engine::RoutingEngine;
use rust_decimal::Decimal;
use serde::Serialize;
use state_market::MarketSnapshotProvider;
use std::collections::BTreeMap;
use std::sync::Arc;
use strategy_allocator::{
    AppliedPlan, EmergencyReport, StrategyAllocator, StrategyCatalog, VaultLedger,
    WithdrawalOutcome,
};
use tracing::{debug, warn};
use types::{
    AccountId, AccountVault, AssetId, Clock, RebalancePlan, RiskVector, StrategyId, VaultError,
};
use vault_config::VaultConfig;

/// Result of one rebalance request
#[derive(Debug, Clone, Serialize)]
pub struct RebalanceOutcome {
    pub plan: RebalancePlan,
    /// `None` when the plan left every allocation where it was
    pub applied: Option<AppliedPlan>,
}

impl RebalanceOutcome {
    pub fn is_applied(&self) -> bool {
        self.applied.is_some()
    }
}

pub struct VaultService {
    provider: Arc<dyn MarketSnapshotProvider>,
    risk: Arc<RiskAssessmentEngine>,
    allocator: StrategyAllocator,
    converter: RouteConverter,
    ledger: Arc<VaultLedger>,
    metrics: Arc<VaultMetrics>,
}

impl VaultService {
    pub fn new(
        config: &VaultConfig,
        provider: Arc<dyn MarketSnapshotProvider>,
        venues: Arc<VenueRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, VaultError> {
        let catalog = StrategyCatalog::from_config(&config.strategies)?;
        let ledger = Arc::new(VaultLedger::new(config.default_risk_budget));
        let risk = Arc::new(RiskAssessmentEngine::new(config.risk.clone(), clock.clone()));
        let allocator = StrategyAllocator::new(
            config.allocator.clone(),
            catalog,
            risk.clone(),
            ledger.clone(),
            clock.clone(),
        );
        let routing = Arc::new(RoutingEngine::new(config.routing.clone(), clock.clone()));
        let execution = Arc::new(ExecutionCoordinator::new(
            config.execution.clone(),
            venues,
            clock,
        ));

        Ok(Self {
            provider,
            risk,
            allocator,
            converter: RouteConverter::new(routing, execution),
            ledger,
            metrics: Arc::new(VaultMetrics::new()),
        })
    }

    pub fn ledger(&self) -> &Arc<VaultLedger> {
        &self.ledger
    }

    pub fn metrics(&self) -> &Arc<VaultMetrics> {
        &self.metrics
    }

    pub fn allocator(&self) -> &StrategyAllocator {
        &self.allocator
    }

    pub fn execution_stats(&self) -> ExecutionStatsSnapshot {
        self.converter.execution().stats()
    }

    pub fn open_account(&self, account: AccountId, base_asset: AssetId) -> Result<(), VaultError> {
        self.ledger.open_account(account, base_asset)
    }

    pub fn deposit(&self, account: AccountId, value: Decimal) -> Result<AccountVault, VaultError> {
        self.ledger.deposit(account, value)
    }

    pub fn reconcile(
        &self,
        account: AccountId,
        observed_value: Decimal,
    ) -> Result<AccountVault, VaultError> {
        self.ledger.reconcile(account, observed_value)
    }

    /// Current risk vector of an account against the latest snapshot
    pub fn assess(&self, account: AccountId) -> Result<RiskVector, VaultError> {
        let snapshot = self.provider.get_snapshot()?;
        let vault = self.ledger.get(account)?;
        self.risk.assess(&vault, &snapshot)
    }

    /// Optimizes and applies the account's allocation
    pub async fn rebalance_account(
        &self,
        account: AccountId,
    ) -> Result<RebalanceOutcome, VaultError> {
        let result = self.rebalance_with(account, None).await;
        self.observe(account, &result);
        result
    }

    /// Applies explicit target fractions
    pub async fn rebalance_to_targets(
        &self,
        account: AccountId,
        targets: &BTreeMap<StrategyId, Decimal>,
    ) -> Result<RebalanceOutcome, VaultError> {
        let result = self.rebalance_with(account, Some(targets)).await;
        self.observe(account, &result);
        result
    }

    /// Liquidates every active position into the account's base asset
    pub async fn emergency_withdraw(
        &self,
        account: AccountId,
    ) -> Result<EmergencyReport, VaultError> {
        self.metrics.increment_emergency_withdrawals();
        crate::log_emergency!("Emergency withdrawal requested for {}", account);

        let snapshot = match self.provider.get_snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.metrics.record_failure(&e);
                return Err(e);
            }
        };
        let report = match self
            .allocator
            .emergency_withdraw(account, &self.converter, &snapshot)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                self.metrics.record_failure(&e);
                crate::log_error!("Emergency withdrawal for {} failed: {}", account, e);
                return Err(e);
            }
        };

        let converted = report
            .liquidated
            .iter()
            .filter(|p| p.receipt.is_some())
            .count();
        self.metrics.add_conversions(converted);
        for failure in &report.failed {
            self.metrics.record_failure(&failure.error);
            if failure.error.requires_reconciliation() {
                crate::log_error!(
                    "{} liquidation of {} needs reconciliation: {}",
                    account,
                    failure.strategy,
                    failure.error
                );
            }
        }
        if report.is_complete() {
            crate::log_success!(
                "{} fully liquidated: {} positions, loss {}",
                account,
                report.liquidated.len(),
                report.realized_loss
            );
        } else {
            warn!(
                "{} partially liquidated: {} of {} positions failed",
                account,
                report.failed.len(),
                report.failed.len() + report.liquidated.len()
            );
        }
        Ok(report)
    }

    /// Fully exits one strategy
    pub async fn withdraw_strategy(
        &self,
        account: AccountId,
        strategy: StrategyId,
    ) -> Result<WithdrawalOutcome, VaultError> {
        let result = async {
            let snapshot = self.provider.get_snapshot()?;
            self.allocator
                .withdraw_strategy(account, strategy, &self.converter, &snapshot)
                .await
        }
        .await;

        match &result {
            Ok(outcome) => {
                self.metrics
                    .add_conversions(usize::from(outcome.receipt.is_some()));
                crate::log_success!("{} withdrew from {}", account, strategy);
            }
            Err(e) => {
                self.metrics.record_failure(e);
                self.log_failure(account, e);
            }
        }
        result
    }

    async fn rebalance_with(
        &self,
        account: AccountId,
        targets: Option<&BTreeMap<StrategyId, Decimal>>,
    ) -> Result<RebalanceOutcome, VaultError> {
        let snapshot = self.provider.get_snapshot()?;
        let vault = self.ledger.get(account)?;
        let risk = self.risk.assess(&vault, &snapshot)?;

        let plan = match targets {
            Some(targets) => self
                .allocator
                .rebalance_to_targets(&vault, targets, &risk, &snapshot)?,
            None => self.allocator.rebalance(&vault, &risk, &snapshot)?,
        };
        self.metrics.increment_plans_built();

        if plan.is_noop() {
            debug!("{} already at its target allocation", account);
            return Ok(RebalanceOutcome {
                plan,
                applied: None,
            });
        }

        crate::log_rebalance!(
            "{} plan: {} deltas, {} conversions worth {}, yield {} -> {}",
            account,
            plan.deltas.len(),
            plan.conversions.len(),
            plan.conversion_value(),
            plan.expected_yield_before,
            plan.expected_yield_after
        );
        let applied = self
            .allocator
            .apply_plan(&plan, &self.converter, &snapshot)
            .await?;
        Ok(RebalanceOutcome {
            plan,
            applied: Some(applied),
        })
    }

    fn observe(&self, account: AccountId, result: &Result<RebalanceOutcome, VaultError>) {
        match result {
            Ok(outcome) => match &outcome.applied {
                Some(applied) => {
                    self.metrics.increment_plans_committed();
                    self.metrics.add_conversions(applied.receipts.len());
                    crate::log_success!(
                        "{} committed at version {}, value {}",
                        account,
                        applied.account.version,
                        applied.account.total_value
                    );
                }
                None => self.metrics.increment_plans_unchanged(),
            },
            Err(e) => {
                self.metrics.record_failure(e);
                self.log_failure(account, e);
            }
        }
    }

    fn log_failure(&self, account: AccountId, error: &VaultError) {
        match error {
            VaultError::CooldownActive { .. } => debug!("{}: {}", account, error),
            e if e.requires_reconciliation() => {
                crate::log_error!("{} needs reconciliation: {}", account, e)
            }
            e => warn!("{} action failed ({}): {}", account, e.class().as_str(), e),
        }
    }
}
