//! Unified price-impact interface over every pool shape

use crate::constant_product::ConstantProductMath;
use crate::orderbook::OrderBookMath;
use anyhow::{bail, Result};
use rust_decimal::Decimal;
use types::{AssetId, PoolLiquidity, PoolSnapshot};

/// Simulates the output of a conversion against current venue liquidity
pub trait PriceImpactModel {
    /// Output for selling `amount_in` of token0 (or token1), after fee and impact
    fn quote(&self, sell_token0: bool, amount_in: Decimal) -> Result<Decimal>;

    /// Output per unit input with no fee and no impact
    fn spot_rate(&self, sell_token0: bool) -> Result<Decimal>;

    /// Input the venue can absorb on this side
    fn depth(&self, sell_token0: bool) -> Decimal;

    fn fee_bps(&self) -> u32;
}

impl PriceImpactModel for PoolLiquidity {
    fn quote(&self, sell_token0: bool, amount_in: Decimal) -> Result<Decimal> {
        match self {
            PoolLiquidity::ConstantProduct {
                reserve0,
                reserve1,
                fee_bps,
            } => {
                let (reserve_in, reserve_out) = orient(sell_token0, *reserve0, *reserve1);
                ConstantProductMath::output_amount(amount_in, reserve_in, reserve_out, *fee_bps)
            }
            PoolLiquidity::OrderBook {
                bids,
                asks,
                fee_bps,
            } => {
                if sell_token0 {
                    OrderBookMath::sell_base(amount_in, bids, *fee_bps)
                } else {
                    OrderBookMath::buy_base(amount_in, asks, *fee_bps)
                }
            }
        }
    }

    fn spot_rate(&self, sell_token0: bool) -> Result<Decimal> {
        match self {
            PoolLiquidity::ConstantProduct {
                reserve0, reserve1, ..
            } => {
                let (reserve_in, reserve_out) = orient(sell_token0, *reserve0, *reserve1);
                ConstantProductMath::spot_rate(reserve_in, reserve_out)
            }
            PoolLiquidity::OrderBook { bids, asks, .. } => {
                OrderBookMath::spot_rate(sell_token0, bids, asks)
            }
        }
    }

    fn depth(&self, sell_token0: bool) -> Decimal {
        self.input_depth(sell_token0)
    }

    fn fee_bps(&self) -> u32 {
        PoolLiquidity::fee_bps(self)
    }
}

fn orient(sell_token0: bool, reserve0: Decimal, reserve1: Decimal) -> (Decimal, Decimal) {
    if sell_token0 {
        (reserve0, reserve1)
    } else {
        (reserve1, reserve0)
    }
}

fn sells_token0(pool: &PoolSnapshot, token_in: AssetId) -> Result<bool> {
    if token_in == pool.token0 {
        Ok(true)
    } else if token_in == pool.token1 {
        Ok(false)
    } else {
        bail!("{} does not trade {}", pool.pool_id, token_in)
    }
}

/// Simulated output of selling `amount_in` of `token_in` into `pool`
pub fn quote_pool(pool: &PoolSnapshot, token_in: AssetId, amount_in: Decimal) -> Result<Decimal> {
    let sell_token0 = sells_token0(pool, token_in)?;
    pool.liquidity.quote(sell_token0, amount_in)
}

/// Spot rate of `pool` for selling `token_in`
pub fn spot_rate_of(pool: &PoolSnapshot, token_in: AssetId) -> Result<Decimal> {
    let sell_token0 = sells_token0(pool, token_in)?;
    pool.liquidity.spot_rate(sell_token0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use types::{PoolId, PriceLevel, VenueId};

    fn cp_pool() -> PoolSnapshot {
        PoolSnapshot {
            pool_id: PoolId::new(1),
            venue: VenueId::new(1),
            token0: AssetId::new(1),
            token1: AssetId::new(2),
            liquidity: PoolLiquidity::ConstantProduct {
                reserve0: dec!(1000),
                reserve1: dec!(2000),
                fee_bps: 30,
            },
            gas_units: 100_000,
        }
    }

    #[test]
    fn test_quote_orients_reserves() {
        let pool = cp_pool();
        let forward = quote_pool(&pool, AssetId::new(1), dec!(100)).unwrap();
        assert!((forward - dec!(181.32)).abs() < dec!(0.01));

        let backward = quote_pool(&pool, AssetId::new(2), dec!(100)).unwrap();
        assert!(backward < dec!(50));
        assert_eq!(spot_rate_of(&pool, AssetId::new(2)).unwrap(), dec!(0.5));
    }

    #[test]
    fn test_unknown_token_is_rejected() {
        assert!(quote_pool(&cp_pool(), AssetId::new(9), dec!(1)).is_err());
    }

    #[test]
    fn test_orderbook_model_matches_walks() {
        let book = PoolLiquidity::OrderBook {
            bids: vec![PriceLevel::new(dec!(2), dec!(10))],
            asks: vec![PriceLevel::new(dec!(2.5), dec!(10))],
            fee_bps: 0,
        };
        assert_eq!(book.quote(true, dec!(5)).unwrap(), dec!(10));
        assert_eq!(book.quote(false, dec!(5)).unwrap(), dec!(2));
        assert_eq!(book.depth(true), dec!(10));
        assert_eq!(book.depth(false), dec!(25.0));
    }
}
