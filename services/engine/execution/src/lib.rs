//! # Execution Coordinator
//!
//! ## Purpose
//!
//! Submits a [`Route`](types::Route) step by step through venue adapters and refuses
//! to declare success unless every step met its minimum and the final output
//! cleared the commitment bound.
//!
//! ## Execution Flow
//!
//! ```text
//! route → freshness → resolve venues → live re-quote → swap 1..n → receipt
//!            │              │                 │              │
//!      StaleSnapshot  VenueUnavailable  SlippageExceeded  PartialExecution
//! ```
//!
//! Checks that can fail without moving funds run first. Once a swap has filled, a
//! later failure is always reported as `PartialExecution` carrying the completed
//! fills so the caller can reconcile the account.
//!
//! ## Venues
//!
//! [`VenueAdapter`] is the uniform async capability every venue implements.
//! [`SimulatedVenue`] is an in-process constant-product venue with failure injection.

pub mod coordinator;
pub mod simulated;
pub mod venue;

pub use coordinator::{ExecutionCoordinator, ExecutionStatsSnapshot, StageTiming};
pub use simulated::SimulatedVenue;
pub use venue::{VenueAdapter, VenueError, VenueRegistry};
