//! # Routing Engine
//!
//! ## Purpose
//!
//! Finds the execution path for one asset conversion across every pool in a market
//! snapshot and attaches the commitment bound the execution coordinator enforces.
//!
//! ## Search
//!
//! ```text
//! pools → asset graph → simple paths (≤ max_hops) → sequential simulation → rank
//! ```
//!
//! - Paths never revisit an asset and are capped at a few hops
//! - Each hop is quoted with the running amount of the previous hop through the
//!   `vault-amm` price-impact models
//! - Path slippage is measured against the fee-free spot output
//! - Ranking: projected output, then hop count, then worst single-step slippage
//!
//! ## Commitment Bound
//!
//! `bound = projected × (1 − max_slippage)`. The bound derives from the simulated
//! output after impact, so a route handed to execution either lands inside the
//! tolerance or is rejected.
//!
//! ## Failure Modes
//!
//! - `NoPathFound`: nothing connects the assets within the hop and gas limits
//! - `SlippageUnattainable`: candidates exist but none holds the tolerance or the
//!   caller's minimum; the best observed slippage is reported

pub mod engine;
mod graph;
pub mod protection;
mod simulation;

pub use engine::{RouteRequest, RoutingEngine};
pub use protection::{slippage_between, CommitmentPolicy};
