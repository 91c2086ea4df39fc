//! # Vault Configuration
//!
//! Constructed configuration objects for every vault core component, loaded from
//! TOML (with environment-specific overlays and `VAULT_` environment variables) or
//! JSON, and validated before any component sees them.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use vault_config::VaultConfig;
//!
//! let config = VaultConfig::load(None, Some("staging"))?;
//! let horizon_ns = config.risk.max_snapshot_age_ns();
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod vault_config;

pub use vault_config::{
    AllocatorConfig, ExecutionConfig, LoggingConfig, RiskConfig, RoutingConfig, SchedulerConfig,
    StrategyConfig, VaultConfig,
};
