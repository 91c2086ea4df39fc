//! End-to-end scenarios: snapshot → risk → allocator → routing → execution → ledger

use execution_coordinator::{SimulatedVenue, VenueRegistry};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use state_market::StaticSnapshotProvider;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use types::{
    AccountId, AccountVault, AssetId, Clock, ManualClock, MarketSnapshot, PoolId, PoolLiquidity,
    PoolSnapshot, RiskBudget, StrategyId, StrategyPosition, VaultError, VenueId,
    NANOS_PER_SECOND,
};
use vault_config::{StrategyConfig, VaultConfig};
use vault_service::{RebalanceScheduler, VaultService};

const NOW: u64 = 1_000_000 * NANOS_PER_SECOND;
const USD: AssetId = AssetId::new(1);
const ETH: AssetId = AssetId::new(2);
const BTC: AssetId = AssetId::new(3);
const LENDING: StrategyId = StrategyId::new(1);
const STAKING: StrategyId = StrategyId::new(2);
const ACCOUNT: AccountId = AccountId::new(42);

fn cp(id: u64, venue: u64, token0: AssetId, token1: AssetId) -> PoolSnapshot {
    PoolSnapshot {
        pool_id: PoolId::new(id),
        venue: VenueId::new(venue),
        token0,
        token1,
        liquidity: PoolLiquidity::ConstantProduct {
            reserve0: dec!(1000000),
            reserve1: dec!(1000000),
            fee_bps: 30,
        },
        gas_units: 100_000,
    }
}

fn market(timestamp_ns: u64) -> MarketSnapshot {
    MarketSnapshot::new(timestamp_ns)
        .with_asset(USD, dec!(1), dec!(0))
        .with_asset(ETH, dec!(1), dec!(0.6))
        .with_asset(BTC, dec!(1), dec!(0.5))
        .with_correlation(ETH, BTC, dec!(0.2))
        .with_pool(cp(1, 1, USD, ETH))
        .with_pool(cp(2, 2, USD, BTC))
        .with_pool(cp(3, 3, ETH, BTC))
}

fn strategy(id: StrategyId, name: &str, asset: AssetId, expected_yield: Decimal) -> StrategyConfig {
    StrategyConfig {
        id,
        name: name.to_string(),
        asset,
        min_allocation: dec!(0),
        max_allocation: dec!(0.8),
        risk_score: 20,
        expected_yield,
    }
}

fn config() -> VaultConfig {
    let mut config = VaultConfig::default();
    config.strategies = vec![
        strategy(LENDING, "eth-lending", ETH, dec!(0.04)),
        strategy(STAKING, "btc-staking", BTC, dec!(0.06)),
    ];
    config
}

struct Harness {
    clock: Arc<ManualClock>,
    provider: Arc<StaticSnapshotProvider>,
    venues: BTreeMap<u64, Arc<SimulatedVenue>>,
    service: Arc<VaultService>,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new(NOW));
        let snapshot = market(NOW);
        let provider = Arc::new(StaticSnapshotProvider::new(snapshot.clone()));
        let registry = Arc::new(VenueRegistry::new());
        let mut venues = BTreeMap::new();
        for id in 1..=3 {
            let venue = Arc::new(SimulatedVenue::from_snapshot(VenueId::new(id), &snapshot));
            registry.register(venue.clone());
            venues.insert(id, venue);
        }
        let service = Arc::new(
            VaultService::new(&config(), provider.clone(), registry, clock.clone()).unwrap(),
        );
        Self {
            clock,
            provider,
            venues,
            service,
        }
    }

    /// 100 units, 60% lending (ETH) and 40% staking (BTC)
    fn seed_60_40(&self) {
        let mut vault = AccountVault::new(ACCOUNT, USD, RiskBudget::default());
        vault.total_value = dec!(100);
        for (id, asset, fraction, expected_yield) in [
            (LENDING, ETH, dec!(0.6), dec!(0.04)),
            (STAKING, BTC, dec!(0.4), dec!(0.06)),
        ] {
            let mut position = StrategyPosition::new(id, asset, 20, expected_yield);
            position.allocation = fraction;
            vault.positions.insert(id, position);
        }
        self.service.ledger().insert(vault).unwrap();
    }

    fn seed_idle(&self) {
        self.service.open_account(ACCOUNT, USD).unwrap();
        self.service.deposit(ACCOUNT, dec!(100)).unwrap();
    }

    fn advance_secs(&self, secs: u64) {
        self.clock.advance_secs(secs);
        self.provider.replace(market(self.clock.now_ns()));
    }
}

fn fifty_fifty() -> BTreeMap<StrategyId, Decimal> {
    BTreeMap::from([(LENDING, dec!(0.5)), (STAKING, dec!(0.5))])
}

#[tokio::test]
async fn test_sixty_forty_to_fifty_fifty_through_venues() {
    let harness = Harness::new();
    harness.seed_60_40();

    let outcome = harness
        .service
        .rebalance_to_targets(ACCOUNT, &fifty_fifty())
        .await
        .unwrap();
    assert_eq!(outcome.plan.conversions.len(), 1);
    let conversion = &outcome.plan.conversions[0];
    assert_eq!((conversion.from_asset, conversion.to_asset), (ETH, BTC));
    assert_eq!(conversion.value, dec!(10));

    let applied = outcome.applied.unwrap();
    assert_eq!(applied.receipts.len(), 1);
    // Direct ETH/BTC pool, not a hop through USD
    assert_eq!(applied.receipts[0].fills.len(), 1);
    assert_eq!(applied.receipts[0].fills[0].venue, VenueId::new(3));

    let vault = harness.service.ledger().get(ACCOUNT).unwrap();
    assert_eq!(vault.allocation_of(LENDING), dec!(0.5));
    assert_eq!(vault.allocation_of(STAKING), dec!(0.5));
    assert!(applied.realized_loss > dec!(0) && applied.realized_loss < dec!(0.05));
    assert_eq!(vault.total_value, dec!(100) - applied.realized_loss);
    assert_eq!(vault.last_rebalance_ns, NOW);

    let metrics = harness.service.metrics().snapshot();
    assert_eq!(metrics.plans_committed, 1);
    assert_eq!(metrics.conversions_executed, 1);
    assert_eq!(harness.service.execution_stats().routes_executed, 1);
    assert_eq!(harness.venues[&3].swap_count(), 1);
}

#[tokio::test]
async fn test_emergency_withdraw_succeeds_during_cooldown() {
    let harness = Harness::new();
    harness.seed_60_40();
    harness
        .service
        .rebalance_to_targets(ACCOUNT, &fifty_fifty())
        .await
        .unwrap();

    harness.advance_secs(60);
    let err = harness.service.rebalance_account(ACCOUNT).await.unwrap_err();
    assert!(matches!(err, VaultError::CooldownActive { .. }));

    let report = harness.service.emergency_withdraw(ACCOUNT).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.liquidated.len(), 2);
    for liquidated in &report.liquidated {
        let receipt = liquidated.receipt.as_ref().unwrap();
        assert_eq!(receipt.token_out, USD);
        assert_eq!(receipt.fills.len(), 1);
    }

    let vault = harness.service.ledger().get(ACCOUNT).unwrap();
    assert_eq!(vault.active_allocation(), dec!(0));
    assert!(vault.positions.values().all(|p| !p.active));
    // The emergency exit does not restart the cooldown clock
    assert_eq!(vault.last_rebalance_ns, NOW);

    let metrics = harness.service.metrics().snapshot();
    assert_eq!(metrics.emergency_withdrawals, 1);
    assert_eq!(metrics.input_errors, 1);
}

#[tokio::test]
async fn test_scheduler_sweep_invests_idle_capital_then_cools_down() {
    let harness = Harness::new();
    harness.seed_idle();
    let scheduler = RebalanceScheduler::new(harness.service.clone(), Duration::from_secs(300));

    let first = scheduler.sweep().await;
    assert_eq!(first.rebalanced, 1);

    let vault = harness.service.ledger().get(ACCOUNT).unwrap();
    assert!(vault.active_allocation() > dec!(0));
    assert!(vault.active_allocation() <= dec!(1));
    // Higher-yield staking leads, held back by the concentration ceiling
    assert!(vault.allocation_of(STAKING) > vault.allocation_of(LENDING));
    let risk = harness.service.assess(ACCOUNT).unwrap();
    assert!(risk.within_budget(&vault.risk_budget));

    let second = scheduler.sweep().await;
    assert_eq!(second.cooling_down, 1);
    assert_eq!(second.rebalanced, 0);
}

#[tokio::test]
async fn test_partial_rebalance_requires_reconciliation() {
    let harness = Harness::new();
    harness.seed_idle();
    harness.venues[&2].fail_swaps(PoolId::new(2), "market halted");

    // USD funds ETH first, then BTC through the halted pool
    let targets = BTreeMap::from([(LENDING, dec!(0.3)), (STAKING, dec!(0.3))]);
    let err = harness
        .service
        .rebalance_to_targets(ACCOUNT, &targets)
        .await
        .unwrap_err();
    match &err {
        VaultError::PartialExecution {
            failed_step, fills, ..
        } => {
            assert_eq!(*failed_step, 1);
            assert_eq!(fills.len(), 1);
            assert_eq!(fills[0].token_out, ETH);
        }
        other => panic!("expected PartialExecution, got {other:?}"),
    }

    // Nothing committed, and the account is frozen until reconciled
    let vault = harness.service.ledger().get(ACCOUNT).unwrap();
    assert_eq!(vault.active_allocation(), dec!(0));
    assert!(vault.reconciliation.is_some());
    let blocked = harness.service.rebalance_account(ACCOUNT).await.unwrap_err();
    assert!(matches!(blocked, VaultError::ReconciliationRequired { .. }));
    assert_eq!(harness.service.metrics().snapshot().integrity_errors, 2);

    harness.venues[&2].clear_failures();
    let reconciled = harness.service.reconcile(ACCOUNT, dec!(100)).unwrap();
    assert!(reconciled.reconciliation.is_none());
    let outcome = harness
        .service
        .rebalance_to_targets(ACCOUNT, &targets)
        .await
        .unwrap();
    assert!(outcome.is_applied());
}
