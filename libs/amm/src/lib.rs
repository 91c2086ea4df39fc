//! # Vault AMM Library - Venue Price-Impact Models
//!
//! ## Purpose
//!
//! Exact arithmetic for simulating conversions against venue liquidity. Constant-product
//! pools use the x*y=k formula; orderbook venues walk price levels. Both shapes sit
//! behind [`PriceImpactModel`] so the routing engine and simulated venues price a
//! conversion identically.
//!
//! ## Integration Points
//!
//! - **Input Sources**: `PoolSnapshot` liquidity from the market snapshot
//! - **Output Destinations**: routing engine path simulation, execution re-quotes,
//!   simulated venues
//! - **Precision**: Decimal arithmetic end to end, no floating point
//!
//! Leaf math reports failures with `anyhow`; callers translate them into domain errors.

pub mod constant_product;
pub mod orderbook;
pub mod pool_traits;

pub use constant_product::ConstantProductMath;
pub use orderbook::OrderBookMath;
pub use pool_traits::{quote_pool, spot_rate_of, PriceImpactModel};

pub use rust_decimal::Decimal;
pub use rust_decimal_macros::dec;

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    prop_compose! {
        fn reserves()(r0 in 1_000u64..10_000_000, r1 in 1_000u64..10_000_000) -> (Decimal, Decimal) {
            (Decimal::from(r0), Decimal::from(r1))
        }
    }

    proptest! {
        #[test]
        fn prop_output_never_beats_spot((r_in, r_out) in reserves(), amount in 1u64..1_000_000, fee in 0u32..100) {
            let amount = Decimal::from(amount);
            let out = ConstantProductMath::output_amount(amount, r_in, r_out, fee).unwrap();
            let ideal = amount * ConstantProductMath::spot_rate(r_in, r_out).unwrap();
            prop_assert!(out <= ideal);
            prop_assert!(out < r_out);
        }

        #[test]
        fn prop_larger_trades_get_worse_rates((r_in, r_out) in reserves(), small in 1u64..10_000, extra in 1u64..10_000) {
            let small = Decimal::from(small);
            let large = small + Decimal::from(extra);
            let out_small = ConstantProductMath::output_amount(small, r_in, r_out, 30).unwrap();
            let out_large = ConstantProductMath::output_amount(large, r_in, r_out, 30).unwrap();
            prop_assert!(out_large >= out_small);
            prop_assert!(out_large / large <= out_small / small);
        }
    }
}
