//! Constant-product (x*y=k) pool math with exact calculations
//!
//! Preserves full precision using Decimal so routed projections compound
//! exactly across hops.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const BPS_DENOMINATOR: Decimal = dec!(10000);

/// Constant-product math functions with zero precision loss
pub struct ConstantProductMath;

impl ConstantProductMath {
    /// Fraction of input kept after the pool fee (30 bps = 0.997)
    pub fn fee_multiplier(fee_bps: u32) -> Result<Decimal> {
        if fee_bps >= 10_000 {
            bail!("Fee of {} bps consumes the whole input", fee_bps);
        }
        Ok((BPS_DENOMINATOR - Decimal::from(fee_bps)) / BPS_DENOMINATOR)
    }

    /// Calculate exact output amount using the x*y=k formula
    ///
    /// # Arguments
    /// * `amount_in` - Input token amount
    /// * `reserve_in` - Input token reserve
    /// * `reserve_out` - Output token reserve
    /// * `fee_bps` - Fee in basis points (30 = 0.3%)
    pub fn output_amount(
        amount_in: Decimal,
        reserve_in: Decimal,
        reserve_out: Decimal,
        fee_bps: u32,
    ) -> Result<Decimal> {
        if amount_in <= dec!(0) {
            bail!("Input amount must be positive");
        }
        if reserve_in <= dec!(0) || reserve_out <= dec!(0) {
            bail!("Reserves must be positive");
        }

        let amount_in_after_fee = amount_in * Self::fee_multiplier(fee_bps)?;

        // output = (amount_in_after_fee * reserve_out) / (reserve_in + amount_in_after_fee)
        let numerator = amount_in_after_fee
            .checked_mul(reserve_out)
            .context("Overflow computing swap output")?;
        let denominator = reserve_in + amount_in_after_fee;

        Ok(numerator / denominator)
    }

    /// Marginal output per unit of input before fee and impact
    pub fn spot_rate(reserve_in: Decimal, reserve_out: Decimal) -> Result<Decimal> {
        if reserve_in <= dec!(0) || reserve_out <= dec!(0) {
            bail!("Reserves must be positive");
        }
        Ok(reserve_out / reserve_in)
    }
}
