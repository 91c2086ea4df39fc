//! Standardized emoji logging for the vault service
//!
//! Keeps operational log lines consistent across the service components.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vault_config::LoggingConfig;

/// Standard emoji set for vault logging
pub struct LogEmoji;

impl LogEmoji {
    // Status indicators
    pub const SUCCESS: &'static str = "✅"; // Operation succeeded
    pub const ERROR: &'static str = "❌"; // Operation failed
    pub const WARNING: &'static str = "⚠️"; // Warning or caution

    // Module-specific
    pub const CHART: &'static str = "📊"; // Data/statistics/metrics
    pub const EXECUTE: &'static str = "⚡"; // Execution/action
    pub const REBALANCE: &'static str = "⚖️"; // Allocation changes
    pub const EMERGENCY: &'static str = "🚨"; // Emergency withdrawal
    pub const CLOCK: &'static str = "⏱️"; // Scheduling/cooldowns
}

#[macro_export]
macro_rules! log_success {
    ($($arg:tt)*) => {
        tracing::info!("{} {}", $crate::logging::LogEmoji::SUCCESS, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        tracing::error!("{} {}", $crate::logging::LogEmoji::ERROR, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_metrics {
    ($($arg:tt)*) => {
        tracing::info!("{} {}", $crate::logging::LogEmoji::CHART, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_execution {
    ($($arg:tt)*) => {
        tracing::info!("{} {}", $crate::logging::LogEmoji::EXECUTE, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_rebalance {
    ($($arg:tt)*) => {
        tracing::info!("{} {}", $crate::logging::LogEmoji::REBALANCE, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_emergency {
    ($($arg:tt)*) => {
        tracing::warn!("{} {}", $crate::logging::LogEmoji::EMERGENCY, format!($($arg)*))
    };
}

/// Installs the global subscriber
///
/// `RUST_LOG` wins over `config.level`.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))?;

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }
    Ok(())
}
