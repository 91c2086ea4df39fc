//! Demo market and ledger seeding from a JSON file
//!
//! The file lists market events (pool registrations, oracle quotes,
//! correlations) and opening account balances. Each pool's venue is backed by
//! an in-process [`SimulatedVenue`], and a [`DemoFeed`] republishes the market
//! at the current time so snapshots stay within their horizon. Pool state is
//! read back from the simulated venues, so executed swaps show up in later
//! snapshots. Every published event carries the next sequence number, so the
//! market state can be persisted on shutdown and resumed on the next start.

use crate::service::VaultService;
use anyhow::{Context, Result};
use execution_coordinator::{SimulatedVenue, VenueRegistry};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use state_market::{
    MarketEvent, MarketStateError, MarketStateManager, SequencedStateful, Stateful,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use types::{
    AccountId, AccountVault, AssetId, RiskBudget, StrategyId, StrategyPosition, VaultError,
    VenueId,
};
use vault_config::VaultConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSeed {
    pub strategy: StrategyId,
    pub allocation: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSeed {
    pub account: AccountId,
    pub base_asset: AssetId,
    pub deposit: Decimal,
    #[serde(default)]
    pub positions: Vec<PositionSeed>,
    /// Overrides the configured default budget
    #[serde(default)]
    pub risk_budget: Option<RiskBudget>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bootstrap {
    #[serde(default)]
    pub market: Vec<MarketEvent>,
    #[serde(default)]
    pub accounts: Vec<AccountSeed>,
}

impl Bootstrap {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse bootstrap file {}", path.display()))
    }

    /// One simulated venue per venue referenced by a registered pool
    pub fn simulated_venues(&self) -> BTreeMap<VenueId, Arc<SimulatedVenue>> {
        let mut venues: BTreeMap<VenueId, Arc<SimulatedVenue>> = BTreeMap::new();
        for event in &self.market {
            if let MarketEvent::PoolRegistered { pool, .. } = event {
                venues
                    .entry(pool.venue)
                    .or_insert_with(|| Arc::new(SimulatedVenue::new(pool.venue)))
                    .add_pool(pool.clone());
            }
        }
        venues
    }

    pub fn register_venues(&self, registry: &VenueRegistry) -> DemoFeed {
        let venues = self.simulated_venues();
        for venue in venues.values() {
            registry.register(venue.clone());
        }
        info!("Registered {} simulated venues", venues.len());
        DemoFeed {
            events: self.market.clone(),
            venues,
        }
    }

    /// Opens every seeded account with its opening positions
    pub fn seed_accounts(
        &self,
        service: &VaultService,
        config: &VaultConfig,
    ) -> Result<usize, VaultError> {
        for seed in &self.accounts {
            let budget = seed.risk_budget.unwrap_or(config.default_risk_budget);
            let mut vault = AccountVault::new(seed.account, seed.base_asset, budget);
            vault.total_value = seed.deposit;
            for position in &seed.positions {
                let strategy = config
                    .strategy(position.strategy)
                    .ok_or(VaultError::StrategyNotFound {
                        strategy: position.strategy,
                    })?;
                let mut held = StrategyPosition::new(
                    strategy.id,
                    strategy.asset,
                    strategy.risk_score,
                    strategy.expected_yield,
                );
                held.allocation = position.allocation;
                vault.positions.insert(held.strategy_id, held);
            }
            service.ledger().insert(vault)?;
        }
        Ok(self.accounts.len())
    }
}

/// Loads persisted market state into `manager`; `false` when no file exists yet
pub fn restore_market(manager: &mut MarketStateManager, path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    manager
        .restore(&bytes)
        .with_context(|| format!("Failed to restore market state from {}", path.display()))?;
    info!(
        "Restored market state at sequence {} from {}",
        manager.last_sequence(),
        path.display()
    );
    Ok(true)
}

pub fn persist_market(manager: &MarketStateManager, path: &Path) -> Result<()> {
    std::fs::write(path, manager.snapshot())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(
        "Persisted market state at sequence {} to {}",
        manager.last_sequence(),
        path.display()
    );
    Ok(())
}

/// Republishes the bootstrap market at the current time
pub struct DemoFeed {
    events: Vec<MarketEvent>,
    venues: BTreeMap<VenueId, Arc<SimulatedVenue>>,
}

impl DemoFeed {
    /// Publishes every event in order, continuing the manager's sequence
    pub fn publish(&self, manager: &MarketStateManager, now_ns: u64) -> Result<usize, MarketStateError> {
        let mut sequence = manager.last_sequence();
        for event in &self.events {
            sequence += 1;
            manager.apply_sequenced_shared(sequence, self.current(event, now_ns))?;
        }
        Ok(self.events.len())
    }

    fn current(&self, event: &MarketEvent, now_ns: u64) -> MarketEvent {
        let mut event = event.clone();
        match &mut event {
            MarketEvent::PoolRegistered { pool, timestamp_ns } => {
                if let Some(live) = self
                    .venues
                    .get(&pool.venue)
                    .and_then(|venue| venue.pool(pool.pool_id))
                {
                    *pool = live;
                }
                *timestamp_ns = now_ns;
            }
            MarketEvent::ReserveSync { timestamp_ns, .. }
            | MarketEvent::OrderBookUpdate { timestamp_ns, .. }
            | MarketEvent::AssetQuote { timestamp_ns, .. }
            | MarketEvent::Correlation { timestamp_ns, .. } => *timestamp_ns = now_ns,
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use state_market::MarketSnapshotProvider;
    use types::{PoolId, PoolLiquidity, PoolSnapshot};

    const BOOTSTRAP: &str = r#"{
        "market": [
            { "PoolRegistered": { "timestamp_ns": 0, "pool": {
                "pool_id": 1, "venue": 7, "token0": 1, "token1": 2, "gas_units": 90000,
                "liquidity": { "ConstantProduct": { "reserve0": "10000", "reserve1": "10000", "fee_bps": 30 } }
            } } },
            { "AssetQuote": { "asset": 1, "price": "1", "volatility": "0", "timestamp_ns": 0 } },
            { "AssetQuote": { "asset": 2, "price": "1", "volatility": "0.4", "timestamp_ns": 0 } }
        ],
        "accounts": [
            { "account": 1, "base_asset": 1, "deposit": "100" }
        ]
    }"#;

    #[test]
    fn test_load_reads_file_and_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("bootstrap.json");
        std::fs::write(&good, BOOTSTRAP).unwrap();
        let loaded = Bootstrap::load(&good).unwrap();
        assert_eq!(loaded.market.len(), 3);
        assert_eq!(loaded.accounts[0].account, AccountId::new(1));
        assert!(loaded.accounts[0].positions.is_empty());

        let bad = dir.path().join("broken.json");
        std::fs::write(&bad, "{ \"market\": [").unwrap();
        let err = Bootstrap::load(&bad).unwrap_err();
        assert!(err.to_string().contains("broken.json"));

        assert!(Bootstrap::load(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_feed_restamps_and_reads_live_venue_state() {
        let bootstrap: Bootstrap = serde_json::from_str(BOOTSTRAP).unwrap();
        assert_eq!(bootstrap.accounts[0].deposit, dec!(100));

        let registry = VenueRegistry::new();
        let feed = bootstrap.register_venues(&registry);
        assert_eq!(registry.venues(), vec![VenueId::new(7)]);

        let manager = MarketStateManager::new();
        assert_eq!(feed.publish(&manager, 42).unwrap(), 3);
        assert_eq!(manager.last_sequence(), 3);
        let snapshot = manager.get_snapshot().unwrap();
        assert_eq!(snapshot.timestamp_ns, 42);
        assert_eq!(snapshot.price(AssetId::new(2)).unwrap(), dec!(1));

        let venue = &feed.venues[&VenueId::new(7)];
        assert!(venue.set_reserves(PoolId::new(1), dec!(9000), dec!(11000)));
        feed.publish(&manager, 43).unwrap();
        assert_eq!(manager.last_sequence(), 6);
        let pool: PoolSnapshot = manager.get_pool(PoolId::new(1)).unwrap();
        assert_eq!(
            pool.liquidity,
            PoolLiquidity::ConstantProduct {
                reserve0: dec!(9000),
                reserve1: dec!(11000),
                fee_bps: 30
            }
        );
    }

    #[test]
    fn test_persisted_market_resumes_its_sequence() {
        let bootstrap: Bootstrap = serde_json::from_str(BOOTSTRAP).unwrap();
        let feed = bootstrap.register_venues(&VenueRegistry::new());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market.bin");

        let mut fresh = MarketStateManager::new();
        assert!(!restore_market(&mut fresh, &path).unwrap());

        let manager = MarketStateManager::new();
        feed.publish(&manager, 42).unwrap();
        persist_market(&manager, &path).unwrap();

        let mut resumed = MarketStateManager::new();
        assert!(restore_market(&mut resumed, &path).unwrap());
        assert_eq!(resumed.last_sequence(), 3);
        assert_eq!(resumed.build_snapshot(), manager.build_snapshot());

        // A feed that restarted from scratch would replay sequence 1
        assert!(resumed.apply_sequenced_shared(1, bootstrap.market[0].clone()).is_err());
        assert_eq!(feed.publish(&resumed, 50).unwrap(), 3);
        assert_eq!(resumed.last_sequence(), 6);
        assert_eq!(resumed.stats().sequence_gaps, 1);
    }
}
