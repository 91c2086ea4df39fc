//! # Vault Core Types
//!
//! Shared value objects for the yield-optimization vault: typed identifiers, the
//! account ledger record, market snapshots, risk vectors, routes, rebalance plans,
//! execution receipts and the [`VaultError`] taxonomy.
//!
//! ## Design Philosophy
//!
//! - **Pure Value Objects**: `RiskVector`, `RebalancePlan` and `Route` carry no behaviour
//!   that touches shared state; components communicate only through them
//! - **No Floating Point**: every amount, price, fraction and score is a `Decimal`
//! - **Type Safety**: distinct ID types prevent mixing accounts, strategies, assets,
//!   venues and pools
//! - **Injectable Time**: staleness and cooldowns read a [`Clock`]
//!
//! ## Quick Start
//! ```rust
//! use types::{AssetId, MarketSnapshot};
//! use rust_decimal_macros::dec;
//!
//! let snapshot = MarketSnapshot::new(1_000)
//!     .with_asset(AssetId::new(1), dec!(1), dec!(0.05));
//! assert!(snapshot.ensure_fresh(1_500, 1_000).is_ok());
//! ```

pub mod clock;
pub mod common;
pub mod execution;
pub mod market;
pub mod plan;
pub mod risk;
pub mod route;
pub mod vault;

pub use clock::{secs_to_ns, Clock, ManualClock, SystemClock, NANOS_PER_SECOND};
pub use common::{
    AccountId, AssetId, ErrorClass, PoolId, StrategyId, ValidationError, VaultError,
    VaultResult, VenueId,
};
pub use execution::{ExecutionReceipt, StepFill};
pub use market::{pair_key, AssetQuote, MarketSnapshot, PoolLiquidity, PoolSnapshot, PriceLevel};
pub use plan::{AllocationDelta, AssetConversion, RebalancePlan};
pub use risk::{clamp_score, RiskVector, MAX_SCORE};
pub use route::{Route, RouteStep, RouteTerms};
pub use vault::{AccountVault, ReconciliationNotice, RiskBudget, StrategyPosition};

pub use rust_decimal::Decimal;
