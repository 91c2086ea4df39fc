//! Routes found by the routing engine, executed against simulated venues

use execution_coordinator::{ExecutionCoordinator, SimulatedVenue, VenueRegistry};
use routing_engine::{RouteRequest, RoutingEngine};
use rust_decimal_macros::dec;
use std::sync::Arc;
use types::{
    AssetId, ManualClock, MarketSnapshot, PoolId, PoolLiquidity, PoolSnapshot, VaultError,
    VenueId, NANOS_PER_SECOND,
};
use vault_config::{ExecutionConfig, RoutingConfig};

const NOW: u64 = 10_000 * NANOS_PER_SECOND;
const USDC: AssetId = AssetId::new(1);
const WETH: AssetId = AssetId::new(2);
const WBTC: AssetId = AssetId::new(3);

fn cp(id: u64, venue: u64, token0: AssetId, token1: AssetId, r0: u64, r1: u64) -> PoolSnapshot {
    PoolSnapshot {
        pool_id: PoolId::new(id),
        venue: VenueId::new(venue),
        token0,
        token1,
        liquidity: PoolLiquidity::ConstantProduct {
            reserve0: r0.into(),
            reserve1: r1.into(),
            fee_bps: 30,
        },
        gas_units: 120_000,
    }
}

fn market() -> MarketSnapshot {
    MarketSnapshot::new(NOW)
        .with_pool(cp(1, 1, USDC, WETH, 10_000, 10_000))
        .with_pool(cp(2, 2, WETH, WBTC, 50_000, 50_000))
        .with_pool(cp(3, 2, USDC, WETH, 2_000, 2_000))
}

fn wire(snapshot: &MarketSnapshot) -> (Arc<SimulatedVenue>, Arc<SimulatedVenue>, ExecutionCoordinator) {
    let registry = Arc::new(VenueRegistry::new());
    let first = Arc::new(SimulatedVenue::from_snapshot(VenueId::new(1), snapshot));
    let second = Arc::new(SimulatedVenue::from_snapshot(VenueId::new(2), snapshot));
    registry.register(first.clone());
    registry.register(second.clone());
    let coordinator = ExecutionCoordinator::new(
        ExecutionConfig::default(),
        registry,
        Arc::new(ManualClock::new(NOW)),
    );
    (first, second, coordinator)
}

#[tokio::test]
async fn test_cross_venue_route_executes() {
    let snapshot = market();
    let routing = RoutingEngine::new(RoutingConfig::default(), Arc::new(ManualClock::new(NOW)));
    let (first, second, coordinator) = wire(&snapshot);

    let request = RouteRequest::new(USDC, WBTC, dec!(100), dec!(0.02));
    let route = routing.find_route(&request, &snapshot).unwrap();
    assert_eq!(route.hop_count(), 2);
    // The deep pool on venue 1 wins the first hop
    assert_eq!(route.steps()[0].pool, PoolId::new(1));

    let receipt = coordinator.execute(&route).await.unwrap();
    assert_eq!(receipt.fills.len(), 2);
    assert_eq!(receipt.amount_out, route.projected_out());
    assert_eq!(first.swap_count(), 1);
    assert_eq!(second.swap_count(), 1);
}

#[tokio::test]
async fn test_replayed_route_fails_closed() {
    let snapshot = market();
    let routing = RoutingEngine::new(RoutingConfig::default(), Arc::new(ManualClock::new(NOW)));
    let (first, _second, coordinator) = wire(&snapshot);

    let request = RouteRequest::new(USDC, WETH, dec!(500), dec!(0.06));
    let route = routing.find_route(&request, &snapshot).unwrap();
    assert_eq!(route.hop_count(), 1);

    coordinator.execute(&route).await.unwrap();

    // The pool moved; the same route no longer clears its bound
    let err = coordinator.execute(&route).await.unwrap_err();
    assert!(matches!(err, VaultError::SlippageExceeded { .. }), "{err:?}");
    assert_eq!(first.swap_count(), 1);
}
