//! # Strategy Allocator
//!
//! ## Purpose
//!
//! Decides how each account's value is split across yield strategies and
//! carries those decisions through to the ledger. Plans are produced against an
//! account version and a market snapshot; applying a plan either commits every
//! allocation change or none of them.
//!
//! ## Planning
//!
//! - **Optimizer**: discretized hill climbing from the band minimums, one
//!   `allocation_step` at a time, maximizing blended yield while the projected
//!   risk vector stays inside the account's budget
//! - **Explicit targets**: validated against strategy bands, the unit sum and
//!   the risk budget, then planned the same way
//! - **Conversions**: value changes are netted per asset (idle capital is held
//!   in the account's base asset) and matched largest seller to largest buyer
//!
//! ## Applying
//!
//! Conversions run sequentially through a [`Converter`]. A failure before any
//! conversion settles is returned as is and the ledger is untouched. A failure
//! after one settled becomes `PartialExecution` and the account is flagged for
//! reconciliation. Commits check the account version under the account lock,
//! so two actions on one account never both land.
//!
//! Emergency withdrawal skips planning and the cooldown entirely, and
//! commits each liquidated position independently.

pub mod allocator;
pub mod catalog;
pub mod converter;
pub mod ledger;
mod optimizer;

pub use allocator::{
    AppliedPlan, EmergencyReport, FailedLiquidation, LiquidatedPosition, StrategyAllocator,
    WithdrawalOutcome,
};
pub use catalog::{StrategyCatalog, StrategySpec};
pub use converter::{Converter, Urgency};
pub use ledger::VaultLedger;
