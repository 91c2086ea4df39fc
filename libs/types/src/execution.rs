//! Execution results reported back for ledger reconciliation

use crate::common::identifiers::{AssetId, PoolId, VenueId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Realized result of one route step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFill {
    pub step: usize,
    pub venue: VenueId,
    pub pool: PoolId,
    pub token_in: AssetId,
    pub token_out: AssetId,
    pub amount_in: Decimal,
    pub amount_out: Decimal,
}

/// Successful, fully completed route execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    pub token_in: AssetId,
    pub token_out: AssetId,
    pub amount_in: Decimal,
    pub amount_out: Decimal,
    pub fills: Vec<StepFill>,
    pub commitment_bound: Decimal,
    /// 1 - actual / projected; negative when execution beat the projection
    pub realized_slippage: Decimal,
    pub executed_at_ns: u64,
}

impl ExecutionReceipt {
    /// Realized output per unit of input
    pub fn effective_rate(&self) -> Decimal {
        if self.amount_in.is_zero() {
            return Decimal::ZERO;
        }
        self.amount_out / self.amount_in
    }
}
