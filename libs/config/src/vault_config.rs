//! # Vault Configuration - Component Parameter Management
//!
//! ## Purpose
//!
//! Every tunable of the vault core lives here: snapshot horizons, the allocator's
//! step size and slippage tolerances, routing hop limits, the strategy catalog with
//! its allocation bands, default per-account risk ceilings and the external
//! scheduler cadence. Components receive constructed config objects; none of them
//! read the environment themselves.
//!
//! ## Loading
//!
//! ```text
//! config/vault.toml  →  config/environments/<env>.toml  →  VAULT_* env vars  →  validate()
//! ```
//!
//! `from_file` (JSON) and `from_env` cover single-file and container deployments.
//! Durations are configured in seconds; components use the `*_ns()` accessors.

use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};
use types::{secs_to_ns, AssetId, RiskBudget, StrategyId};

/// Complete configuration for the vault core
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub risk: RiskConfig,
    pub allocator: AllocatorConfig,
    pub routing: RoutingConfig,
    pub execution: ExecutionConfig,
    /// Strategy catalog with allocation bands
    pub strategies: Vec<StrategyConfig>,
    /// Ceilings applied to newly opened accounts
    pub default_risk_budget: RiskBudget,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

/// Risk assessment parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Snapshots older than this are refused (seconds)
    pub max_snapshot_age_secs: u64,
    /// Annualized volatility that maps to a score of 100 (1.0 = 100%)
    pub volatility_full_scale: Decimal,
}

/// Strategy allocator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Minimum time between normal rebalances of one account (seconds)
    pub min_rebalance_interval_secs: u64,
    /// Discretization of the allocation search (0.05 = 5% steps)
    pub allocation_step: Decimal,
    /// Upper bound on hill-climbing iterations
    pub max_iterations: u32,
    /// Conversions worth less than this (accounting unit) are skipped as dust
    pub min_conversion_value: Decimal,
    /// Slippage tolerance for rebalance conversions
    pub max_slippage: Decimal,
    /// Slippage tolerance for emergency withdrawals, never narrower than `max_slippage`
    pub emergency_max_slippage: Decimal,
    /// Oldest snapshot an emergency withdrawal may act on (seconds)
    pub emergency_max_snapshot_age_secs: u64,
}

/// Routing engine parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Maximum number of hops a path may take
    pub max_hops: usize,
    /// Routes estimated above this many gas units are discarded
    pub max_gas_units: Option<u64>,
    /// Snapshot horizon for route computation; also bounds route validity (seconds)
    pub max_snapshot_age_secs: u64,
}

/// Execution coordinator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Re-quote the whole route against live venues before moving funds
    pub requote_before_execution: bool,
}

/// One strategy of the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub id: StrategyId,
    #[serde(default)]
    pub name: String,
    /// Underlying asset the strategy holds
    pub asset: AssetId,
    pub min_allocation: Decimal,
    pub max_allocation: Decimal,
    /// Author-assigned risk score (1-100)
    pub risk_score: u8,
    /// Expected annual yield (0.05 = 5%)
    pub expected_yield: Decimal,
}

/// External rebalance cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Emit JSON log lines
    pub json: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_snapshot_age_secs: 30,
            volatility_full_scale: dec!(1.0), // 100% annualized
        }
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            min_rebalance_interval_secs: 3600, // 1 hour
            allocation_step: dec!(0.05),
            max_iterations: 1000,
            min_conversion_value: dec!(0.01),
            max_slippage: dec!(0.01),           // 1%
            emergency_max_slippage: dec!(0.05), // 5%
            emergency_max_snapshot_age_secs: 300,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_hops: 3,
            max_gas_units: None,
            max_snapshot_age_secs: 30,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            requote_before_execution: true,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300, // 5 minutes
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl RiskConfig {
    pub fn max_snapshot_age_ns(&self) -> u64 {
        secs_to_ns(self.max_snapshot_age_secs)
    }
}

impl AllocatorConfig {
    pub fn min_rebalance_interval_ns(&self) -> u64 {
        secs_to_ns(self.min_rebalance_interval_secs)
    }

    pub fn emergency_max_snapshot_age_ns(&self) -> u64 {
        secs_to_ns(self.emergency_max_snapshot_age_secs)
    }
}

impl RoutingConfig {
    pub fn max_snapshot_age_ns(&self) -> u64 {
        secs_to_ns(self.max_snapshot_age_secs)
    }
}

impl VaultConfig {
    /// Load configuration from TOML files with environment overrides
    pub fn load(base_path: Option<&Path>, environment: Option<&str>) -> Result<Self> {
        let base = base_path.unwrap_or(Path::new("config/vault.toml"));

        let mut builder = Config::builder().add_source(File::from(base).required(true));

        if let Some(env) = environment {
            let env_file = base
                .parent()
                .unwrap_or(Path::new("config"))
                .join("environments")
                .join(format!("{}.toml", env));

            if env_file.exists() {
                info!("Loading environment config: {:?}", env_file);
                builder = builder.add_source(File::from(env_file));
            } else {
                warn!("Environment config not found: {:?}", env_file);
            }
        }

        // VAULT_ALLOCATOR__MAX_SLIPPAGE=0.02 overrides allocator.max_slippage
        builder = builder.add_source(
            Environment::with_prefix("VAULT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(value) = env_decimal("VAULT_MAX_SLIPPAGE") {
            config.allocator.max_slippage = value;
        }

        if let Some(value) = env_decimal("VAULT_EMERGENCY_MAX_SLIPPAGE") {
            config.allocator.emergency_max_slippage = value;
        }

        if let Some(value) = env_decimal("VAULT_ALLOCATION_STEP") {
            config.allocator.allocation_step = value;
        }

        if let Some(value) = env_parse::<u64>("VAULT_MIN_REBALANCE_INTERVAL_SECS") {
            config.allocator.min_rebalance_interval_secs = value;
        }

        if let Some(value) = env_parse::<u64>("VAULT_MAX_SNAPSHOT_AGE_SECS") {
            config.risk.max_snapshot_age_secs = value;
            config.routing.max_snapshot_age_secs = value;
        }

        if let Some(value) = env_parse::<usize>("VAULT_MAX_HOPS") {
            config.routing.max_hops = value;
        }

        if let Ok(level) = std::env::var("VAULT_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(json) = std::env::var("VAULT_LOG_JSON") {
            config.logging.json = json.to_lowercase() == "true";
        }

        config
    }

    /// Save configuration to a JSON file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Render as TOML, suitable as a base file for `load`
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration as TOML")
    }

    /// Default location of the base configuration file
    pub fn default_path() -> PathBuf {
        PathBuf::from("config/vault.toml")
    }

    pub fn strategy(&self, id: StrategyId) -> Option<&StrategyConfig> {
        self.strategies.iter().find(|s| s.id == id)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        let unit = Decimal::ZERO..=Decimal::ONE;
        let score = Decimal::ZERO..=Decimal::ONE_HUNDRED;

        // Risk
        if self.risk.max_snapshot_age_secs == 0 {
            bail!("risk.max_snapshot_age_secs must be positive");
        }
        if self.risk.volatility_full_scale <= dec!(0) {
            bail!("risk.volatility_full_scale must be positive");
        }

        // Allocator
        let allocator = &self.allocator;
        if allocator.allocation_step <= dec!(0) || allocator.allocation_step > dec!(1) {
            bail!("allocator.allocation_step must be in (0, 1]");
        }
        if allocator.max_iterations == 0 {
            bail!("allocator.max_iterations must be positive");
        }
        if allocator.min_conversion_value < dec!(0) {
            bail!("allocator.min_conversion_value must be non-negative");
        }
        if allocator.max_slippage < dec!(0) || allocator.max_slippage >= dec!(1) {
            bail!("allocator.max_slippage must be in [0, 1)");
        }
        if allocator.emergency_max_slippage >= dec!(1) {
            bail!("allocator.emergency_max_slippage must be below 1");
        }
        if allocator.emergency_max_slippage < allocator.max_slippage {
            bail!("allocator.emergency_max_slippage must not be narrower than allocator.max_slippage");
        }
        if allocator.emergency_max_snapshot_age_secs < self.risk.max_snapshot_age_secs {
            bail!("allocator.emergency_max_snapshot_age_secs must be at least risk.max_snapshot_age_secs");
        }

        // Routing
        if self.routing.max_hops == 0 {
            bail!("routing.max_hops must be positive");
        }
        if self.routing.max_snapshot_age_secs == 0 {
            bail!("routing.max_snapshot_age_secs must be positive");
        }

        // Strategy catalog
        let mut seen = HashSet::new();
        let mut min_total = Decimal::ZERO;
        for strategy in &self.strategies {
            if !seen.insert(strategy.id) {
                bail!("duplicate strategy id {}", strategy.id);
            }
            if !unit.contains(&strategy.min_allocation) || !unit.contains(&strategy.max_allocation) {
                bail!("{} allocation band must lie within [0, 1]", strategy.id);
            }
            if strategy.min_allocation > strategy.max_allocation {
                bail!("{} min_allocation exceeds max_allocation", strategy.id);
            }
            if !(1..=100).contains(&strategy.risk_score) {
                bail!("{} risk_score must be in [1, 100]", strategy.id);
            }
            min_total += strategy.min_allocation;
        }
        if min_total > dec!(1) {
            bail!("strategy min_allocation bands sum to {} (> 1)", min_total);
        }

        // Default risk budget
        if !score.contains(&self.default_risk_budget.concentration_ceiling)
            || !score.contains(&self.default_risk_budget.correlation_ceiling)
        {
            bail!("default_risk_budget ceilings must be in [0, 100]");
        }

        if self.scheduler.enabled && self.scheduler.interval_secs == 0 {
            bail!("scheduler.interval_secs must be positive when the scheduler is enabled");
        }

        Ok(())
    }
}

fn env_decimal(key: &str) -> Option<Decimal> {
    std::env::var(key)
        .ok()
        .and_then(|raw| Decimal::from_str(raw.trim()).ok())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|raw| raw.trim().parse().ok())
}
