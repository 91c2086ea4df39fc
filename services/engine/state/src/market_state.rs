//! Event-driven market state
//!
//! [`MarketStateManager`] folds pool, orderbook and oracle events into live state
//! and cuts immutable [`MarketSnapshot`]s from it on demand. A snapshot is stamped
//! with the time of its *oldest* contributing update, so one lagging input is
//! enough to make the whole snapshot stale for downstream horizon checks.

use crate::provider::MarketSnapshotProvider;
use crate::traits::{SequenceTracker, SequencedStateful, StateError, Stateful};
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use types::{
    pair_key, AssetId, AssetQuote, MarketSnapshot, PoolId, PoolLiquidity, PoolSnapshot,
    PriceLevel, VaultError,
};

/// Events that can update market state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketEvent {
    /// New pool or market, or a full replacement of a known one
    PoolRegistered { pool: PoolSnapshot, timestamp_ns: u64 },
    /// Constant-product reserve update
    ReserveSync {
        pool_id: PoolId,
        reserve0: Decimal,
        reserve1: Decimal,
        timestamp_ns: u64,
    },
    /// Full orderbook depth replacement
    OrderBookUpdate {
        pool_id: PoolId,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        timestamp_ns: u64,
    },
    /// Oracle price and volatility
    AssetQuote {
        asset: AssetId,
        price: Decimal,
        volatility: Decimal,
        timestamp_ns: u64,
    },
    Correlation {
        a: AssetId,
        b: AssetId,
        rho: Decimal,
        timestamp_ns: u64,
    },
}

/// Market state specific errors
#[derive(Debug, thiserror::Error)]
pub enum MarketStateError {
    #[error("Unknown pool {0}")]
    UnknownPool(PoolId),

    #[error("Pool {pool} is not a {expected} pool")]
    ShapeMismatch { pool: PoolId, expected: &'static str },

    #[error("Invalid reserves: {0}")]
    InvalidReserves(String),

    #[error("Invalid quote for {asset}: {reason}")]
    InvalidQuote { asset: AssetId, reason: String },

    #[error("Correlation {0} outside [-1, 1]")]
    InvalidCorrelation(Decimal),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("State error: {0}")]
    State(#[from] StateError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PoolRecord {
    pool: PoolSnapshot,
    last_update_ns: u64,
    fresh: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct QuoteRecord {
    quote: AssetQuote,
    last_update_ns: u64,
    fresh: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct CorrelationRecord {
    rho: Decimal,
    last_update_ns: u64,
    fresh: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerStats {
    pub total_pools: usize,
    pub constant_product_pools: usize,
    pub orderbook_pools: usize,
    pub tracked_assets: usize,
    pub total_events: u64,
    pub rejected_events: u64,
    pub sequence_gaps: u64,
    pub last_update_ns: u64,
}

/// Manages live state for all pools, quotes and correlations
pub struct MarketStateManager {
    pools: DashMap<PoolId, Arc<RwLock<PoolRecord>>>,
    quotes: DashMap<AssetId, QuoteRecord>,
    correlations: DashMap<(AssetId, AssetId), CorrelationRecord>,

    stats: Arc<RwLock<ManagerStats>>,

    sequence_tracker: Arc<RwLock<SequenceTracker>>,

    /// Recovery callback for gap handling
    gap_handler: Option<Box<dyn Fn(u64, u64) + Send + Sync>>,
}

impl Default for MarketStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketStateManager {
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
            quotes: DashMap::new(),
            correlations: DashMap::new(),
            stats: Arc::new(RwLock::new(ManagerStats::default())),
            sequence_tracker: Arc::new(RwLock::new(SequenceTracker::new())),
            gap_handler: None,
        }
    }

    /// Manager that reports sequence gaps to a recovery callback
    pub fn with_gap_handler<F>(gap_handler: F) -> Self
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        Self {
            gap_handler: Some(Box::new(gap_handler)),
            ..Self::new()
        }
    }

    /// Apply an event through shared access
    pub fn apply_event_shared(&self, event: MarketEvent) -> Result<(), MarketStateError> {
        let timestamp_ns = event_timestamp(&event);
        let result = match event {
            MarketEvent::PoolRegistered { pool, timestamp_ns } => {
                self.register_pool(pool, timestamp_ns)
            }
            MarketEvent::ReserveSync {
                pool_id,
                reserve0,
                reserve1,
                timestamp_ns,
            } => self.process_reserve_sync(pool_id, reserve0, reserve1, timestamp_ns),
            MarketEvent::OrderBookUpdate {
                pool_id,
                bids,
                asks,
                timestamp_ns,
            } => self.process_orderbook(pool_id, bids, asks, timestamp_ns),
            MarketEvent::AssetQuote {
                asset,
                price,
                volatility,
                timestamp_ns,
            } => self.process_quote(asset, price, volatility, timestamp_ns),
            MarketEvent::Correlation {
                a,
                b,
                rho,
                timestamp_ns,
            } => self.process_correlation(a, b, rho, timestamp_ns),
        };

        let mut stats = self.stats.write();
        match &result {
            Ok(()) => {
                stats.total_events += 1;
                stats.last_update_ns = stats.last_update_ns.max(timestamp_ns);
            }
            Err(e) => {
                stats.rejected_events += 1;
                warn!(error = %e, "Rejected market event");
            }
        }
        result
    }

    /// Apply a sequenced event through shared access
    pub fn apply_sequenced_shared(
        &self,
        sequence: u64,
        event: MarketEvent,
    ) -> Result<(), MarketStateError> {
        let check = self.sequence_tracker.read().check(sequence);
        if let Err(gap) = check {
            self.handle_sequence_gap(&gap);
            return Err(gap.into());
        }

        self.apply_event_shared(event)?;
        self.sequence_tracker.write().track(sequence)?;
        Ok(())
    }

    /// Accept `sequence` as the new baseline after an external full resync
    pub fn resync(&self, sequence: u64) {
        info!(sequence, "Market state resynchronized");
        self.sequence_tracker.write().set_last_sequence(sequence);
    }

    fn handle_sequence_gap(&self, gap: &StateError) {
        let StateError::SequenceGap { expected, actual } = *gap else {
            return;
        };
        self.stats.write().sequence_gaps += 1;

        match gap.gap_size() {
            0 => {
                warn!(expected, actual, "Replayed or out-of-order market event rejected");
            }
            1..=5 => {
                info!(
                    "Small sequence gap detected: {} to {}. Requesting recovery",
                    expected, actual
                );
            }
            6..=50 => {
                warn!(
                    "Medium sequence gap detected: {} to {}. Selective resync needed",
                    expected, actual
                );
            }
            _ => {
                error!(
                    "Large sequence gap detected: {} to {}. Full resync required",
                    expected, actual
                );
                self.mark_all_stale();
            }
        }

        if let Some(ref handler) = self.gap_handler {
            handler(expected, actual);
        }
    }

    /// Exclude every record from snapshots until it is updated again
    fn mark_all_stale(&self) {
        for entry in self.pools.iter() {
            entry.value().write().fresh = false;
        }
        for mut entry in self.quotes.iter_mut() {
            entry.value_mut().fresh = false;
        }
        for mut entry in self.correlations.iter_mut() {
            entry.value_mut().fresh = false;
        }
        warn!(
            pools = self.pools.len(),
            assets = self.quotes.len(),
            "Marked market state stale due to large sequence gap"
        );
    }

    fn register_pool(&self, pool: PoolSnapshot, timestamp_ns: u64) -> Result<(), MarketStateError> {
        if pool.token0 == pool.token1 {
            return Err(MarketStateError::InvalidReserves(format!(
                "{} trades {} against itself",
                pool.pool_id, pool.token0
            )));
        }
        let liquidity = match pool.liquidity {
            PoolLiquidity::ConstantProduct {
                reserve0,
                reserve1,
                fee_bps,
            } => {
                validate_reserves(pool.pool_id, reserve0, reserve1)?;
                PoolLiquidity::ConstantProduct {
                    reserve0,
                    reserve1,
                    fee_bps,
                }
            }
            PoolLiquidity::OrderBook { bids, asks, fee_bps } => {
                let (bids, asks) = normalize_book(bids, asks);
                PoolLiquidity::OrderBook { bids, asks, fee_bps }
            }
        };

        let pool_id = pool.pool_id;
        let record = PoolRecord {
            pool: PoolSnapshot { liquidity, ..pool },
            last_update_ns: timestamp_ns,
            fresh: true,
        };
        let replaced = self
            .pools
            .insert(pool_id, Arc::new(RwLock::new(record)))
            .is_some();
        if !replaced {
            info!(pool = %pool_id, "Registered pool");
        }
        self.refresh_pool_stats();
        Ok(())
    }

    fn process_reserve_sync(
        &self,
        pool_id: PoolId,
        reserve0: Decimal,
        reserve1: Decimal,
        timestamp_ns: u64,
    ) -> Result<(), MarketStateError> {
        validate_reserves(pool_id, reserve0, reserve1)?;
        let pool = self
            .pools
            .get(&pool_id)
            .map(|entry| entry.value().clone())
            .ok_or(MarketStateError::UnknownPool(pool_id))?;

        let mut record = pool.write();
        match &mut record.pool.liquidity {
            PoolLiquidity::ConstantProduct {
                reserve0: r0,
                reserve1: r1,
                ..
            } => {
                *r0 = reserve0;
                *r1 = reserve1;
            }
            PoolLiquidity::OrderBook { .. } => {
                return Err(MarketStateError::ShapeMismatch {
                    pool: pool_id,
                    expected: "constant-product",
                })
            }
        }
        touch(&mut record, timestamp_ns);
        debug!(pool = %pool_id, %reserve0, %reserve1, "Reserve sync applied");
        Ok(())
    }

    fn process_orderbook(
        &self,
        pool_id: PoolId,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        timestamp_ns: u64,
    ) -> Result<(), MarketStateError> {
        let pool = self
            .pools
            .get(&pool_id)
            .map(|entry| entry.value().clone())
            .ok_or(MarketStateError::UnknownPool(pool_id))?;

        let mut record = pool.write();
        match &mut record.pool.liquidity {
            PoolLiquidity::OrderBook {
                bids: current_bids,
                asks: current_asks,
                ..
            } => {
                let (bids, asks) = normalize_book(bids, asks);
                *current_bids = bids;
                *current_asks = asks;
            }
            PoolLiquidity::ConstantProduct { .. } => {
                return Err(MarketStateError::ShapeMismatch {
                    pool: pool_id,
                    expected: "orderbook",
                })
            }
        }
        touch(&mut record, timestamp_ns);
        Ok(())
    }

    fn process_quote(
        &self,
        asset: AssetId,
        price: Decimal,
        volatility: Decimal,
        timestamp_ns: u64,
    ) -> Result<(), MarketStateError> {
        if price <= Decimal::ZERO {
            return Err(MarketStateError::InvalidQuote {
                asset,
                reason: format!("non-positive price {price}"),
            });
        }
        if volatility < Decimal::ZERO {
            return Err(MarketStateError::InvalidQuote {
                asset,
                reason: format!("negative volatility {volatility}"),
            });
        }

        let record = QuoteRecord {
            quote: AssetQuote { price, volatility },
            last_update_ns: timestamp_ns,
            fresh: true,
        };
        self.quotes
            .entry(asset)
            .and_modify(|existing| {
                if timestamp_ns >= existing.last_update_ns {
                    *existing = record;
                }
            })
            .or_insert(record);
        self.stats.write().tracked_assets = self.quotes.len();
        Ok(())
    }

    fn process_correlation(
        &self,
        a: AssetId,
        b: AssetId,
        rho: Decimal,
        timestamp_ns: u64,
    ) -> Result<(), MarketStateError> {
        if rho < Decimal::NEGATIVE_ONE || rho > Decimal::ONE {
            return Err(MarketStateError::InvalidCorrelation(rho));
        }
        self.correlations.insert(
            pair_key(a, b),
            CorrelationRecord {
                rho,
                last_update_ns: timestamp_ns,
                fresh: true,
            },
        );
        Ok(())
    }

    fn refresh_pool_stats(&self) {
        let mut constant_product = 0;
        let mut orderbook = 0;
        for entry in self.pools.iter() {
            match entry.value().read().pool.liquidity {
                PoolLiquidity::ConstantProduct { .. } => constant_product += 1,
                PoolLiquidity::OrderBook { .. } => orderbook += 1,
            }
        }
        let mut stats = self.stats.write();
        stats.total_pools = self.pools.len();
        stats.constant_product_pools = constant_product;
        stats.orderbook_pools = orderbook;
    }

    pub fn get_pool(&self, pool_id: PoolId) -> Option<PoolSnapshot> {
        self.pools
            .get(&pool_id)
            .map(|entry| entry.value().read().pool.clone())
    }

    pub fn stats(&self) -> ManagerStats {
        self.stats.read().clone()
    }

    /// Cut an immutable snapshot from the fresh part of the state
    pub fn build_snapshot(&self) -> MarketSnapshot {
        let mut oldest: Option<u64> = None;
        let mut observe = |ts: u64| {
            oldest = Some(oldest.map_or(ts, |current| current.min(ts)));
        };

        let mut snapshot = MarketSnapshot::default();
        for entry in self.pools.iter() {
            let record = entry.value().read();
            if record.fresh {
                observe(record.last_update_ns);
                snapshot.pools.insert(*entry.key(), record.pool.clone());
            }
        }
        for entry in self.quotes.iter() {
            if entry.value().fresh {
                observe(entry.value().last_update_ns);
                snapshot.assets.insert(*entry.key(), entry.value().quote);
            }
        }
        for entry in self.correlations.iter() {
            if entry.value().fresh {
                observe(entry.value().last_update_ns);
                snapshot.correlations.insert(*entry.key(), entry.value().rho);
            }
        }

        snapshot.timestamp_ns = oldest.unwrap_or(0);
        snapshot
    }
}

impl MarketSnapshotProvider for MarketStateManager {
    fn get_snapshot(&self) -> Result<MarketSnapshot, VaultError> {
        Ok(self.build_snapshot())
    }
}

impl Stateful for MarketStateManager {
    type Event = MarketEvent;
    type Error = MarketStateError;

    fn apply_event(&mut self, event: Self::Event) -> Result<(), Self::Error> {
        self.apply_event_shared(event)
    }

    fn snapshot(&self) -> Vec<u8> {
        let snapshot_data = SnapshotData {
            pools: self
                .pools
                .iter()
                .map(|entry| entry.value().read().clone())
                .collect(),
            quotes: self
                .quotes
                .iter()
                .map(|entry| (*entry.key(), *entry.value()))
                .collect(),
            correlations: self
                .correlations
                .iter()
                .map(|entry| (entry.key().0, entry.key().1, *entry.value()))
                .collect(),
            stats: self.stats.read().clone(),
            last_sequence: self.sequence_tracker.read().last_sequence(),
        };

        bincode::serialize(&snapshot_data).unwrap_or_default()
    }

    fn restore(&mut self, snapshot: &[u8]) -> Result<(), Self::Error> {
        let snapshot_data: SnapshotData = bincode::deserialize(snapshot)?;

        self.pools.clear();
        self.quotes.clear();
        self.correlations.clear();

        for record in snapshot_data.pools {
            self.pools
                .insert(record.pool.pool_id, Arc::new(RwLock::new(record)));
        }
        for (asset, record) in snapshot_data.quotes {
            self.quotes.insert(asset, record);
        }
        for (a, b, record) in snapshot_data.correlations {
            self.correlations.insert(pair_key(a, b), record);
        }

        *self.stats.write() = snapshot_data.stats;
        self.sequence_tracker
            .write()
            .set_last_sequence(snapshot_data.last_sequence);

        Ok(())
    }
}

impl SequencedStateful for MarketStateManager {
    fn apply_sequenced(&mut self, sequence: u64, event: Self::Event) -> Result<(), Self::Error> {
        self.apply_sequenced_shared(sequence, event)
    }

    fn last_sequence(&self) -> u64 {
        self.sequence_tracker.read().last_sequence()
    }
}

/// Helper struct for serialization
#[derive(Serialize, Deserialize)]
struct SnapshotData {
    pools: Vec<PoolRecord>,
    quotes: Vec<(AssetId, QuoteRecord)>,
    correlations: Vec<(AssetId, AssetId, CorrelationRecord)>,
    stats: ManagerStats,
    last_sequence: u64,
}

fn event_timestamp(event: &MarketEvent) -> u64 {
    match event {
        MarketEvent::PoolRegistered { timestamp_ns, .. }
        | MarketEvent::ReserveSync { timestamp_ns, .. }
        | MarketEvent::OrderBookUpdate { timestamp_ns, .. }
        | MarketEvent::AssetQuote { timestamp_ns, .. }
        | MarketEvent::Correlation { timestamp_ns, .. } => *timestamp_ns,
    }
}

fn touch(record: &mut PoolRecord, timestamp_ns: u64) {
    record.last_update_ns = record.last_update_ns.max(timestamp_ns);
    record.fresh = true;
}

fn validate_reserves(
    pool_id: PoolId,
    reserve0: Decimal,
    reserve1: Decimal,
) -> Result<(), MarketStateError> {
    if reserve0 <= Decimal::ZERO || reserve1 <= Decimal::ZERO {
        return Err(MarketStateError::InvalidReserves(format!(
            "{pool_id} reserves must be positive ({reserve0}, {reserve1})"
        )));
    }
    Ok(())
}

/// Drop empty levels; bids best (highest) first, asks best (lowest) first
fn normalize_book(
    mut bids: Vec<PriceLevel>,
    mut asks: Vec<PriceLevel>,
) -> (Vec<PriceLevel>, Vec<PriceLevel>) {
    bids.retain(|l| l.price > Decimal::ZERO && l.quantity > Decimal::ZERO);
    asks.retain(|l| l.price > Decimal::ZERO && l.quantity > Decimal::ZERO);
    bids.sort_by(|a, b| b.price.cmp(&a.price));
    asks.sort_by(|a, b| a.price.cmp(&b.price));
    (bids, asks)
}
