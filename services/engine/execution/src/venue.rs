//! Venue adapter contract
//!
//! One adapter per liquidity venue. The coordinator only ever talks to venues
//! through this trait, so connectivity details stay outside the core.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use types::{AssetId, PoolId, VaultError, VenueId};

/// Failure reported by a venue adapter
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VenueError {
    #[error("pool {pool} is not served by this venue")]
    UnknownPool { pool: PoolId },

    #[error("venue unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("output {actual} below minimum {minimum}")]
    SlippageExceeded { actual: Decimal, minimum: Decimal },

    #[error("swap rejected: {reason}")]
    Rejected { reason: String },
}

impl VenueError {
    /// Domain error for a failure at route step `step`
    pub fn into_vault_error(self, venue: VenueId, pool: PoolId, step: usize) -> VaultError {
        match self {
            VenueError::SlippageExceeded { actual, minimum } => VaultError::SlippageExceeded {
                step,
                actual,
                minimum,
            },
            other => VaultError::VenueUnavailable {
                venue,
                pool: Some(pool),
                reason: other.to_string(),
            },
        }
    }
}

#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn venue_id(&self) -> VenueId;

    /// Output for selling `amount_in` of `token_in` into `pool` at current venue state
    async fn quote(
        &self,
        pool: PoolId,
        token_in: AssetId,
        amount_in: Decimal,
    ) -> Result<Decimal, VenueError>;

    /// Executes the conversion; fails instead of filling below `min_out`
    async fn swap(
        &self,
        pool: PoolId,
        token_in: AssetId,
        amount_in: Decimal,
        min_out: Decimal,
    ) -> Result<Decimal, VenueError>;
}

/// Adapters keyed by venue
#[derive(Default)]
pub struct VenueRegistry {
    adapters: DashMap<VenueId, Arc<dyn VenueAdapter>>,
}

impl VenueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter, replacing any previous adapter for the same venue
    pub fn register(&self, adapter: Arc<dyn VenueAdapter>) {
        self.adapters.insert(adapter.venue_id(), adapter);
    }

    pub fn get(&self, venue: VenueId) -> Option<Arc<dyn VenueAdapter>> {
        self.adapters.get(&venue).map(|entry| Arc::clone(entry.value()))
    }

    pub fn venues(&self) -> Vec<VenueId> {
        let mut venues: Vec<VenueId> = self.adapters.iter().map(|e| *e.key()).collect();
        venues.sort();
        venues
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
