//! Orderbook depth walks
//!
//! Selling base consumes bids from the best price down; buying base spends quote
//! against asks from the best price up. A walk that runs out of levels fails
//! rather than returning a partial fill.

use crate::constant_product::ConstantProductMath;
use anyhow::{bail, Result};
use rust_decimal::Decimal;
use types::PriceLevel;

pub struct OrderBookMath;

impl OrderBookMath {
    /// Quote received for selling `amount_base`, after fee
    pub fn sell_base(amount_base: Decimal, bids: &[PriceLevel], fee_bps: u32) -> Result<Decimal> {
        if amount_base <= Decimal::ZERO {
            bail!("Input amount must be positive");
        }

        let mut remaining = amount_base;
        let mut proceeds = Decimal::ZERO;
        for level in bids {
            if remaining.is_zero() {
                break;
            }
            let filled = remaining.min(level.quantity);
            proceeds += filled * level.price;
            remaining -= filled;
        }

        if remaining > Decimal::ZERO {
            bail!(
                "Insufficient bid depth: {} of {} base unfilled",
                remaining,
                amount_base
            );
        }

        Ok(proceeds * ConstantProductMath::fee_multiplier(fee_bps)?)
    }

    /// Base received for spending `amount_quote`; the fee is taken from the input
    pub fn buy_base(amount_quote: Decimal, asks: &[PriceLevel], fee_bps: u32) -> Result<Decimal> {
        if amount_quote <= Decimal::ZERO {
            bail!("Input amount must be positive");
        }

        let mut remaining = amount_quote * ConstantProductMath::fee_multiplier(fee_bps)?;
        let mut acquired = Decimal::ZERO;
        for level in asks {
            if remaining.is_zero() {
                break;
            }
            if level.price <= Decimal::ZERO {
                continue;
            }
            let level_notional = level.price * level.quantity;
            if remaining >= level_notional {
                acquired += level.quantity;
                remaining -= level_notional;
            } else {
                acquired += remaining / level.price;
                remaining = Decimal::ZERO;
            }
        }

        if remaining > Decimal::ZERO {
            bail!(
                "Insufficient ask depth: {} of {} quote unspent",
                remaining,
                amount_quote
            );
        }

        Ok(acquired)
    }

    /// Output per unit input at the top of book, before fee
    pub fn spot_rate(sell_base: bool, bids: &[PriceLevel], asks: &[PriceLevel]) -> Result<Decimal> {
        if sell_base {
            match bids.first() {
                Some(best) if best.price > Decimal::ZERO => Ok(best.price),
                _ => bail!("Orderbook has no bids"),
            }
        } else {
            match asks.first() {
                Some(best) if best.price > Decimal::ZERO => Ok(Decimal::ONE / best.price),
                _ => bail!("Orderbook has no asks"),
            }
        }
    }
}
