//! Error taxonomy for the vault core
//!
//! Every failure a component can surface is a structured [`VaultError`] variant.
//! Variants fall into three classes that drive caller behaviour:
//!
//! - **Input/config** errors are fixed by the caller changing parameters or waiting.
//!   They are never retried automatically.
//! - **Market-condition** errors may be retried against a *fresh* snapshot, but never
//!   by widening slippage tolerance.
//! - **Integrity** errors are fatal to the current action. The account's real venue
//!   state may differ from the ledger and must be reconciled before anything else runs.

use crate::common::identifiers::{AccountId, AssetId, PoolId, StrategyId, VenueId};
use crate::execution::StepFill;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur during typed ID validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// ID value is null/zero when non-null required
    #[error("ID cannot be null/zero")]
    NullId,

    /// Decimal value is not within allowed range
    #[error("value {value} is not in allowed range [{min}, {max}]")]
    ValueOutOfRange {
        value: Decimal,
        min: Decimal,
        max: Decimal,
    },
}

/// Error class per the recovery policy of the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    InputConfig,
    MarketCondition,
    Integrity,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::InputConfig => "input_config",
            ErrorClass::MarketCondition => "market_condition",
            ErrorClass::Integrity => "integrity",
        }
    }
}

/// Domain error for every vault core operation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VaultError {
    #[error("Risk budget exceeded for {account}: {detail}")]
    RiskBudgetExceeded { account: AccountId, detail: String },

    #[error("Rebalance cooldown active for {account}: {remaining_ns}ns remaining")]
    CooldownActive { account: AccountId, remaining_ns: u64 },

    #[error("Market snapshot is stale: age {age_ns}ns exceeds horizon {max_age_ns}ns")]
    StaleSnapshot { age_ns: u64, max_age_ns: u64 },

    #[error("Market snapshot has no usable {missing} for {asset}")]
    IncompleteData {
        asset: AssetId,
        missing: &'static str,
    },

    #[error(
        "No route {token_in} -> {token_out} within max slippage {max_slippage} (best candidate: {best_slippage:?})"
    )]
    SlippageUnattainable {
        token_in: AssetId,
        token_out: AssetId,
        max_slippage: Decimal,
        best_slippage: Option<Decimal>,
    },

    #[error("Slippage exceeded at step {step}: output {actual} below minimum {minimum}")]
    SlippageExceeded {
        step: usize,
        actual: Decimal,
        minimum: Decimal,
    },

    #[error("No path {token_in} -> {token_out} within {max_hops} hops")]
    NoPathFound {
        token_in: AssetId,
        token_out: AssetId,
        max_hops: usize,
    },

    #[error("Partial execution: step {failed_step} failed after {} completed step(s): {cause}", fills.len())]
    PartialExecution {
        failed_step: usize,
        fills: Vec<StepFill>,
        cause: String,
    },

    #[error("Venue {venue} unavailable (pool {pool:?}): {reason}")]
    VenueUnavailable {
        venue: VenueId,
        pool: Option<PoolId>,
        reason: String,
    },

    #[error("Account {account} requires reconciliation: {reason}")]
    ReconciliationRequired { account: AccountId, reason: String },

    #[error("Plan for {account} was built at version {planned_version}, ledger is at {current_version}")]
    StalePlan {
        account: AccountId,
        planned_version: u64,
        current_version: u64,
    },

    #[error("Account {account} not found")]
    AccountNotFound { account: AccountId },

    #[error("Strategy {strategy} not found")]
    StrategyNotFound { strategy: StrategyId },

    #[error("Invalid route: {reason}")]
    InvalidRoute { reason: String },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl VaultError {
    /// Recovery class of this error
    pub fn class(&self) -> ErrorClass {
        match self {
            VaultError::RiskBudgetExceeded { .. }
            | VaultError::CooldownActive { .. }
            | VaultError::AccountNotFound { .. }
            | VaultError::StrategyNotFound { .. }
            | VaultError::InvalidRoute { .. }
            | VaultError::InvalidRequest { .. }
            | VaultError::InvalidConfig { .. } => ErrorClass::InputConfig,

            VaultError::StaleSnapshot { .. }
            | VaultError::IncompleteData { .. }
            | VaultError::SlippageUnattainable { .. }
            | VaultError::SlippageExceeded { .. }
            | VaultError::NoPathFound { .. }
            | VaultError::StalePlan { .. } => ErrorClass::MarketCondition,

            VaultError::PartialExecution { .. }
            | VaultError::VenueUnavailable { .. }
            | VaultError::ReconciliationRequired { .. } => ErrorClass::Integrity,
        }
    }

    /// True when re-planning against a fresh snapshot may succeed
    pub fn is_retryable_with_fresh_snapshot(&self) -> bool {
        self.class() == ErrorClass::MarketCondition
    }

    /// True when the account's ledger may no longer match venue state
    pub fn requires_reconciliation(&self) -> bool {
        self.class() == ErrorClass::Integrity
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        VaultError::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn invalid_route(reason: impl Into<String>) -> Self {
        VaultError::InvalidRoute {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        VaultError::InvalidConfig {
            reason: reason.into(),
        }
    }
}

pub type VaultResult<T> = Result<T, VaultError>;
