//! Routes: validated, immutable multi-hop conversion paths
//!
//! A [`Route`] can only be built through [`Route::try_new`], which enforces the
//! chaining invariants. It exposes no mutating API once built; the execution
//! coordinator consumes it by reference.

use crate::common::errors::VaultError;
use crate::common::identifiers::{AssetId, PoolId, VenueId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Relative tolerance when matching one step's output to the next step's input
pub const CONTINUITY_TOLERANCE: Decimal = dec!(0.000000001);

/// One hop of a route
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteStep {
    pub venue: VenueId,
    pub pool: PoolId,
    pub token_in: AssetId,
    pub token_out: AssetId,
    pub amount_in: Decimal,
    pub expected_out: Decimal,
    /// Lowest output this step may realize
    pub min_out: Decimal,
    pub max_slippage: Decimal,
}

/// Route-level terms computed alongside the steps
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteTerms {
    pub commitment_bound: Decimal,
    pub max_slippage: Decimal,
    pub worst_step_slippage: Decimal,
    pub estimated_gas_units: u64,
    pub snapshot_timestamp_ns: u64,
    pub valid_until_ns: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    steps: Vec<RouteStep>,
    token_in: AssetId,
    token_out: AssetId,
    amount_in: Decimal,
    projected_out: Decimal,
    commitment_bound: Decimal,
    max_slippage: Decimal,
    worst_step_slippage: Decimal,
    estimated_gas_units: u64,
    snapshot_timestamp_ns: u64,
    valid_until_ns: u64,
}

impl Route {
    /// Builds a route if the steps chain and the final minimum honours the commitment bound
    pub fn try_new(steps: Vec<RouteStep>, terms: RouteTerms) -> Result<Self, VaultError> {
        let (first, last) = match (steps.first(), steps.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(VaultError::invalid_route("route has no steps")),
        };

        if terms.max_slippage < Decimal::ZERO || terms.max_slippage >= Decimal::ONE {
            return Err(VaultError::invalid_route(format!(
                "max slippage {} outside [0, 1)",
                terms.max_slippage
            )));
        }

        for (index, step) in steps.iter().enumerate() {
            if step.amount_in <= Decimal::ZERO || step.expected_out <= Decimal::ZERO {
                return Err(VaultError::invalid_route(format!(
                    "step {index} has non-positive amounts"
                )));
            }
            if step.min_out > step.expected_out || step.min_out < Decimal::ZERO {
                return Err(VaultError::invalid_route(format!(
                    "step {index} minimum {} outside [0, expected {}]",
                    step.min_out, step.expected_out
                )));
            }
        }

        for (index, pair) in steps.windows(2).enumerate() {
            if let [prev, next] = pair {
                if prev.token_out != next.token_in {
                    return Err(VaultError::invalid_route(format!(
                        "step {} emits {} but step {} consumes {}",
                        index,
                        prev.token_out,
                        index + 1,
                        next.token_in
                    )));
                }
                let drift = (prev.expected_out - next.amount_in).abs();
                if drift > prev.expected_out * CONTINUITY_TOLERANCE {
                    return Err(VaultError::invalid_route(format!(
                        "step {} input {} does not match previous output {}",
                        index + 1,
                        next.amount_in,
                        prev.expected_out
                    )));
                }
            }
        }

        if terms.commitment_bound <= Decimal::ZERO || terms.commitment_bound > last.expected_out {
            return Err(VaultError::invalid_route(format!(
                "commitment bound {} outside (0, projected {}]",
                terms.commitment_bound, last.expected_out
            )));
        }
        if last.min_out < terms.commitment_bound {
            return Err(VaultError::invalid_route(format!(
                "final minimum {} below commitment bound {}",
                last.min_out, terms.commitment_bound
            )));
        }

        Ok(Self {
            token_in: first.token_in,
            token_out: last.token_out,
            amount_in: first.amount_in,
            projected_out: last.expected_out,
            commitment_bound: terms.commitment_bound,
            max_slippage: terms.max_slippage,
            worst_step_slippage: terms.worst_step_slippage,
            estimated_gas_units: terms.estimated_gas_units,
            snapshot_timestamp_ns: terms.snapshot_timestamp_ns,
            valid_until_ns: terms.valid_until_ns,
            steps,
        })
    }

    pub fn steps(&self) -> &[RouteStep] {
        &self.steps
    }

    pub fn hop_count(&self) -> usize {
        self.steps.len()
    }

    pub fn token_in(&self) -> AssetId {
        self.token_in
    }

    pub fn token_out(&self) -> AssetId {
        self.token_out
    }

    pub fn amount_in(&self) -> Decimal {
        self.amount_in
    }

    /// Output after simulated price impact along the whole path
    pub fn projected_out(&self) -> Decimal {
        self.projected_out
    }

    /// Minimum final output execution must achieve
    pub fn commitment_bound(&self) -> Decimal {
        self.commitment_bound
    }

    pub fn max_slippage(&self) -> Decimal {
        self.max_slippage
    }

    pub fn worst_step_slippage(&self) -> Decimal {
        self.worst_step_slippage
    }

    pub fn estimated_gas_units(&self) -> u64 {
        self.estimated_gas_units
    }

    pub fn snapshot_timestamp_ns(&self) -> u64 {
        self.snapshot_timestamp_ns
    }

    pub fn valid_until_ns(&self) -> u64 {
        self.valid_until_ns
    }

    pub fn is_expired(&self, now_ns: u64) -> bool {
        now_ns > self.valid_until_ns
    }
}
