//! # Vault Service
//!
//! ## Purpose
//!
//! Wires the vault core components into one request/response service and
//! drives them from an external rebalance schedule.
//!
//! ## Control Flow
//!
//! ```text
//! get_snapshot() → assess → rebalance → [RebalancePlan]
//!                                            ↓ per conversion
//!                          find_route → execute → receipts → commit
//! ```
//!
//! Every action pulls its own snapshot. Plans and routes carry the snapshot
//! they were computed against; execution re-validates against live venue state
//! and the ledger commit re-validates the account version.

pub mod bootstrap;
pub mod converter;
pub mod logging;
pub mod metrics;
pub mod scheduler;
pub mod service;

pub use bootstrap::{persist_market, restore_market, AccountSeed, Bootstrap, DemoFeed, PositionSeed};
pub use converter::RouteConverter;
pub use metrics::{VaultMetrics, VaultMetricsSnapshot};
pub use scheduler::{RebalanceScheduler, SweepSummary};
pub use service::{RebalanceOutcome, VaultService};
