//! # Market State - Snapshot Provider and Live Venue State
//!
//! ## Purpose
//!
//! Supplies the immutable [`types::MarketSnapshot`]s every planning component works
//! against. The core consumes snapshots through the pull-only
//! [`MarketSnapshotProvider`] contract; [`MarketStateManager`] is the in-process
//! implementation that folds venue and oracle events into live state.
//!
//! ## Architecture Role
//!
//! ```text
//! Reserve syncs      ─┐
//! Orderbook depth    ─┼→ [MarketStateManager] → get_snapshot() → Risk / Allocator / Routing
//! Oracle quotes      ─┤         ↓
//! Correlations       ─┘   bincode snapshot/restore
//! ```
//!
//! Sequenced feeds are gap-checked: small and medium gaps are reported to the
//! recovery handler, large gaps additionally mark all state stale so no snapshot
//! is cut from it until fresh data arrives.

pub mod market_state;
pub mod provider;
pub mod traits;

pub use market_state::{ManagerStats, MarketEvent, MarketStateError, MarketStateManager};
pub use provider::{MarketSnapshotProvider, StaticSnapshotProvider};

// Re-export core traits for convenience
pub use traits::{SequenceTracker, SequencedStateful, StateError, Stateful};
