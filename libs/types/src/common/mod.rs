//! Identifiers and errors shared by every vault component

pub mod errors;
pub mod identifiers;

pub use errors::{ErrorClass, ValidationError, VaultError, VaultResult};
pub use identifiers::{AccountId, AssetId, PoolId, StrategyId, VenueId};
