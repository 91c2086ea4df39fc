//! In-process venue with mutable liquidity
//!
//! Swaps move constant-product reserves the way a live pool would, so a later
//! swap or re-quote sees the impact of an earlier one. Orderbook pools quote
//! against static levels. Failures can be injected per pool or for the whole
//! venue.

use crate::venue::{VenueAdapter, VenueError};
use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;
use types::{AssetId, MarketSnapshot, PoolId, PoolLiquidity, PoolSnapshot, VenueId};
use vault_amm::quote_pool;

pub struct SimulatedVenue {
    venue: VenueId,
    pools: RwLock<HashMap<PoolId, PoolSnapshot>>,
    swap_failures: RwLock<HashMap<PoolId, String>>,
    offline: AtomicBool,
    swaps: AtomicU64,
}

impl SimulatedVenue {
    pub fn new(venue: VenueId) -> Self {
        Self {
            venue,
            pools: RwLock::new(HashMap::new()),
            swap_failures: RwLock::new(HashMap::new()),
            offline: AtomicBool::new(false),
            swaps: AtomicU64::new(0),
        }
    }

    /// Venue seeded with every snapshot pool that belongs to `venue`
    pub fn from_snapshot(venue: VenueId, snapshot: &MarketSnapshot) -> Self {
        let sim = Self::new(venue);
        for pool in snapshot.pools.values().filter(|p| p.venue == venue) {
            sim.add_pool(pool.clone());
        }
        sim
    }

    pub fn add_pool(&self, pool: PoolSnapshot) {
        self.pools.write().insert(pool.pool_id, pool);
    }

    pub fn pool(&self, pool: PoolId) -> Option<PoolSnapshot> {
        self.pools.read().get(&pool).cloned()
    }

    /// Overwrites constant-product reserves, simulating other actors trading first
    pub fn set_reserves(&self, pool: PoolId, reserve0: Decimal, reserve1: Decimal) -> bool {
        let mut pools = self.pools.write();
        match pools.get_mut(&pool).map(|p| &mut p.liquidity) {
            Some(PoolLiquidity::ConstantProduct {
                reserve0: r0,
                reserve1: r1,
                ..
            }) => {
                *r0 = reserve0;
                *r1 = reserve1;
                true
            }
            _ => false,
        }
    }

    /// Makes every swap through `pool` fail; quotes keep working
    pub fn fail_swaps(&self, pool: PoolId, reason: impl Into<String>) {
        self.swap_failures.write().insert(pool, reason.into());
    }

    pub fn clear_failures(&self) {
        self.swap_failures.write().clear();
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    pub fn swap_count(&self) -> u64 {
        self.swaps.load(Ordering::Relaxed)
    }

    fn ensure_online(&self) -> Result<(), VenueError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(VenueError::Unreachable {
                reason: format!("{} is offline", self.venue),
            });
        }
        Ok(())
    }

    fn simulate(
        pool: &PoolSnapshot,
        token_in: AssetId,
        amount_in: Decimal,
    ) -> Result<Decimal, VenueError> {
        quote_pool(pool, token_in, amount_in).map_err(|e| VenueError::Rejected {
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl VenueAdapter for SimulatedVenue {
    fn venue_id(&self) -> VenueId {
        self.venue
    }

    async fn quote(
        &self,
        pool: PoolId,
        token_in: AssetId,
        amount_in: Decimal,
    ) -> Result<Decimal, VenueError> {
        self.ensure_online()?;
        let pools = self.pools.read();
        let snapshot = pools.get(&pool).ok_or(VenueError::UnknownPool { pool })?;
        Self::simulate(snapshot, token_in, amount_in)
    }

    async fn swap(
        &self,
        pool: PoolId,
        token_in: AssetId,
        amount_in: Decimal,
        min_out: Decimal,
    ) -> Result<Decimal, VenueError> {
        self.ensure_online()?;
        if let Some(reason) = self.swap_failures.read().get(&pool) {
            return Err(VenueError::Rejected {
                reason: reason.clone(),
            });
        }

        let mut pools = self.pools.write();
        let snapshot = pools.get_mut(&pool).ok_or(VenueError::UnknownPool { pool })?;
        let out = Self::simulate(snapshot, token_in, amount_in)?;
        if out < min_out {
            return Err(VenueError::SlippageExceeded {
                actual: out,
                minimum: min_out,
            });
        }

        let sell_token0 = token_in == snapshot.token0;
        if let PoolLiquidity::ConstantProduct {
            reserve0, reserve1, ..
        } = &mut snapshot.liquidity
        {
            if sell_token0 {
                *reserve0 += amount_in;
                *reserve1 -= out;
            } else {
                *reserve1 += amount_in;
                *reserve0 -= out;
            }
        }

        self.swaps.fetch_add(1, Ordering::Relaxed);
        debug!(
            "{} swapped {} {} for {} in {}",
            self.venue, amount_in, token_in, out, pool
        );
        Ok(out)
    }
}
