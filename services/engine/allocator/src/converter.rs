//! Conversion seam between the allocator and routing/execution

use async_trait::async_trait;
use types::{AssetConversion, ExecutionReceipt, MarketSnapshot, VaultError};

/// How much degradation a conversion may tolerate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    /// Rebalances and withdrawals under normal snapshot horizons
    Normal,
    /// Emergency liquidation: single hop, older snapshots accepted
    Emergency {
        max_snapshot_age_ns: u64,
    },
}

/// Performs one asset conversion end to end
///
/// Implementations route the conversion against `snapshot` and execute it.
/// Errors are surfaced verbatim; an integrity error means venue state may have
/// diverged from the ledger.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(
        &self,
        conversion: &AssetConversion,
        snapshot: &MarketSnapshot,
        urgency: Urgency,
    ) -> Result<ExecutionReceipt, VaultError>;
}
