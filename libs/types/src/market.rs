//! Immutable point-in-time market view
//!
//! A [`MarketSnapshot`] carries prices, volatility, pairwise correlations and
//! per-pool liquidity as of `timestamp_ns`. Components never mutate a snapshot; a
//! newer view is a new value.

use crate::common::errors::VaultError;
use crate::common::identifiers::{AssetId, PoolId, VenueId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Oracle data for one asset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetQuote {
    /// Price in the accounting unit
    pub price: Decimal,
    /// Annualized volatility (0.8 = 80%)
    pub volatility: Decimal,
}

/// One orderbook level; `price` is quote per base, `quantity` is in base units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Liquidity shape of a pool; token0 is the base side, token1 the quote side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PoolLiquidity {
    ConstantProduct {
        reserve0: Decimal,
        reserve1: Decimal,
        fee_bps: u32,
    },
    /// Bids sorted best (highest) first, asks sorted best (lowest) first
    OrderBook {
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        fee_bps: u32,
    },
}

impl PoolLiquidity {
    pub fn fee_bps(&self) -> u32 {
        match self {
            PoolLiquidity::ConstantProduct { fee_bps, .. } => *fee_bps,
            PoolLiquidity::OrderBook { fee_bps, .. } => *fee_bps,
        }
    }

    /// Amount of the input token the pool can absorb when selling token0 (or token1)
    pub fn input_depth(&self, sell_token0: bool) -> Decimal {
        match self {
            PoolLiquidity::ConstantProduct {
                reserve0, reserve1, ..
            } => {
                if sell_token0 {
                    *reserve0
                } else {
                    *reserve1
                }
            }
            PoolLiquidity::OrderBook { bids, asks, .. } => {
                if sell_token0 {
                    bids.iter().map(|l| l.quantity).sum()
                } else {
                    asks.iter().map(|l| l.price * l.quantity).sum()
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub pool_id: PoolId,
    pub venue: VenueId,
    pub token0: AssetId,
    pub token1: AssetId,
    pub liquidity: PoolLiquidity,
    /// Gas units a swap through this pool consumes
    pub gas_units: u64,
}

impl PoolSnapshot {
    pub fn contains(&self, asset: AssetId) -> bool {
        self.token0 == asset || self.token1 == asset
    }

    /// The token received when selling `asset` into this pool
    pub fn counterpart(&self, asset: AssetId) -> Option<AssetId> {
        if asset == self.token0 {
            Some(self.token1)
        } else if asset == self.token1 {
            Some(self.token0)
        } else {
            None
        }
    }

    /// Exit depth for `asset`, zero when the pool does not trade it
    pub fn depth_for(&self, asset: AssetId) -> Decimal {
        if asset == self.token0 {
            self.liquidity.input_depth(true)
        } else if asset == self.token1 {
            self.liquidity.input_depth(false)
        } else {
            Decimal::ZERO
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub timestamp_ns: u64,
    pub assets: BTreeMap<AssetId, AssetQuote>,
    /// Pairwise return correlations in [-1, 1], keyed by (lower id, higher id)
    #[serde(with = "correlation_entries")]
    pub correlations: BTreeMap<(AssetId, AssetId), Decimal>,
    pub pools: BTreeMap<PoolId, PoolSnapshot>,
}

impl MarketSnapshot {
    pub fn new(timestamp_ns: u64) -> Self {
        Self {
            timestamp_ns,
            ..Default::default()
        }
    }

    pub fn with_asset(mut self, asset: AssetId, price: Decimal, volatility: Decimal) -> Self {
        self.assets.insert(asset, AssetQuote { price, volatility });
        self
    }

    pub fn with_correlation(mut self, a: AssetId, b: AssetId, rho: Decimal) -> Self {
        self.correlations.insert(pair_key(a, b), rho);
        self
    }

    pub fn with_pool(mut self, pool: PoolSnapshot) -> Self {
        self.pools.insert(pool.pool_id, pool);
        self
    }

    pub fn age_ns(&self, now_ns: u64) -> u64 {
        now_ns.saturating_sub(self.timestamp_ns)
    }

    /// Fails with `StaleSnapshot` once the snapshot is older than `max_age_ns`
    pub fn ensure_fresh(&self, now_ns: u64, max_age_ns: u64) -> Result<(), VaultError> {
        let age_ns = self.age_ns(now_ns);
        if age_ns > max_age_ns {
            return Err(VaultError::StaleSnapshot { age_ns, max_age_ns });
        }
        Ok(())
    }

    pub fn quote(&self, asset: AssetId) -> Result<&AssetQuote, VaultError> {
        self.assets.get(&asset).ok_or(VaultError::IncompleteData {
            asset,
            missing: "quote",
        })
    }

    /// Price in the accounting unit; a non-positive price counts as missing
    pub fn price(&self, asset: AssetId) -> Result<Decimal, VaultError> {
        let quote = self.quote(asset)?;
        if quote.price <= Decimal::ZERO {
            return Err(VaultError::IncompleteData {
                asset,
                missing: "price",
            });
        }
        Ok(quote.price)
    }

    /// Correlation of two assets; an asset is perfectly correlated with itself
    pub fn correlation(&self, a: AssetId, b: AssetId) -> Option<Decimal> {
        if a == b {
            return Some(Decimal::ONE);
        }
        self.correlations.get(&pair_key(a, b)).copied()
    }

    /// Total amount of `asset` all pools can absorb on exit
    pub fn exit_depth(&self, asset: AssetId) -> Decimal {
        self.pools_for(asset).map(|p| p.depth_for(asset)).sum()
    }

    pub fn pools_for(&self, asset: AssetId) -> impl Iterator<Item = &PoolSnapshot> {
        self.pools.values().filter(move |p| p.contains(asset))
    }
}

/// Canonical key for an unordered asset pair
pub fn pair_key(a: AssetId, b: AssetId) -> (AssetId, AssetId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

// Tuple keys are not valid map keys in JSON, so correlations travel as entry lists
mod correlation_entries {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(
        map: &BTreeMap<(AssetId, AssetId), Decimal>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let entries: Vec<(AssetId, AssetId, Decimal)> =
            map.iter().map(|(&(a, b), &rho)| (a, b, rho)).collect();
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<(AssetId, AssetId), Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = Vec::<(AssetId, AssetId, Decimal)>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|(a, b, rho)| (pair_key(a, b), rho))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const A: AssetId = AssetId::new(1);
    const B: AssetId = AssetId::new(2);
    const C: AssetId = AssetId::new(3);

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot::new(1_000)
            .with_asset(A, dec!(1), dec!(0.1))
            .with_asset(B, dec!(2), dec!(0.5))
            .with_correlation(B, A, dec!(0.3))
            .with_pool(PoolSnapshot {
                pool_id: PoolId::new(10),
                venue: VenueId::new(1),
                token0: A,
                token1: B,
                liquidity: PoolLiquidity::ConstantProduct {
                    reserve0: dec!(1000),
                    reserve1: dec!(500),
                    fee_bps: 30,
                },
                gas_units: 100_000,
            })
            .with_pool(PoolSnapshot {
                pool_id: PoolId::new(11),
                venue: VenueId::new(2),
                token0: B,
                token1: A,
                liquidity: PoolLiquidity::OrderBook {
                    bids: vec![PriceLevel::new(dec!(2), dec!(50))],
                    asks: vec![PriceLevel::new(dec!(2.1), dec!(40))],
                    fee_bps: 10,
                },
                gas_units: 60_000,
            })
    }

    #[test]
    fn test_freshness_horizon() {
        let snap = snapshot();
        assert!(snap.ensure_fresh(1_500, 500).is_ok());
        assert_eq!(
            snap.ensure_fresh(1_501, 500),
            Err(VaultError::StaleSnapshot {
                age_ns: 501,
                max_age_ns: 500
            })
        );
        // Clock behind the snapshot is not stale
        assert_eq!(snap.age_ns(10), 0);
    }

    #[test]
    fn test_correlation_lookup_is_symmetric() {
        let snap = snapshot();
        assert_eq!(snap.correlation(A, B), Some(dec!(0.3)));
        assert_eq!(snap.correlation(B, A), Some(dec!(0.3)));
        assert_eq!(snap.correlation(C, C), Some(dec!(1)));
        assert_eq!(snap.correlation(A, C), None);
    }

    #[test]
    fn test_missing_asset_is_incomplete_data() {
        let snap = snapshot();
        assert_eq!(snap.price(B), Ok(dec!(2)));
        assert!(matches!(
            snap.price(C),
            Err(VaultError::IncompleteData { asset, .. }) if asset == C
        ));
    }

    #[test]
    fn test_exit_depth_sums_pools() {
        let snap = snapshot();
        // Pool 10: A is token0 -> reserve0. Pool 11: A is quote -> asks notional 2.1 * 40
        assert_eq!(snap.exit_depth(A), dec!(1000) + dec!(84.0));
        // Pool 10: B reserve1 = 500. Pool 11: B is base -> bid quantity 50
        assert_eq!(snap.exit_depth(B), dec!(550));
        assert_eq!(snap.exit_depth(C), dec!(0));
        assert_eq!(snap.pools_for(A).count(), 2);
    }

    #[test]
    fn test_json_round_trip_keeps_correlations() {
        let snap = snapshot();
        let json = serde_json::to_string(&snap).unwrap();
        let back: MarketSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
