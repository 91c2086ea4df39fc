//! Commitment bounds
//!
//! The bound a route commits to is derived from the *projected* output after
//! simulated price impact, never from the nominal quote. Adverse movement between
//! planning and execution either stays inside the tolerance or the execution is
//! rejected.

use rust_decimal::Decimal;
use types::VaultError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommitmentPolicy {
    max_slippage: Decimal,
}

impl CommitmentPolicy {
    pub fn new(max_slippage: Decimal) -> Result<Self, VaultError> {
        if max_slippage < Decimal::ZERO || max_slippage >= Decimal::ONE {
            return Err(VaultError::invalid_request(format!(
                "max slippage {max_slippage} outside [0, 1)"
            )));
        }
        Ok(Self { max_slippage })
    }

    pub fn max_slippage(&self) -> Decimal {
        self.max_slippage
    }

    /// Minimum acceptable output for an expected output
    pub fn protected_min_output(&self, expected_output: Decimal) -> Decimal {
        expected_output * (Decimal::ONE - self.max_slippage)
    }

    pub fn within_tolerance(&self, slippage: Decimal) -> bool {
        slippage <= self.max_slippage
    }
}

/// Fractional shortfall of `actual` against `ideal`; zero when `ideal` is not positive
pub fn slippage_between(ideal: Decimal, actual: Decimal) -> Decimal {
    if ideal <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    Decimal::ONE - actual / ideal
}
