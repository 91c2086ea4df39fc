//! Market Snapshot Provider contract
//!
//! The core only ever pulls snapshots; it never pushes to a provider.

use parking_lot::RwLock;
use std::sync::Arc;
use types::{MarketSnapshot, VaultError};

pub trait MarketSnapshotProvider: Send + Sync {
    /// Current immutable view of venue reserves, prices and volatility
    fn get_snapshot(&self) -> Result<MarketSnapshot, VaultError>;
}

impl<T: MarketSnapshotProvider + ?Sized> MarketSnapshotProvider for Arc<T> {
    fn get_snapshot(&self) -> Result<MarketSnapshot, VaultError> {
        (**self).get_snapshot()
    }
}

/// Serves a fixed snapshot; replaced wholesale for replays and tests
#[derive(Debug, Default)]
pub struct StaticSnapshotProvider {
    snapshot: RwLock<MarketSnapshot>,
}

impl StaticSnapshotProvider {
    pub fn new(snapshot: MarketSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
        }
    }

    pub fn replace(&self, snapshot: MarketSnapshot) {
        *self.snapshot.write() = snapshot;
    }
}

impl MarketSnapshotProvider for StaticSnapshotProvider {
    fn get_snapshot(&self) -> Result<MarketSnapshot, VaultError> {
        Ok(self.snapshot.read().clone())
    }
}
