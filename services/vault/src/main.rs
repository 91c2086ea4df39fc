//! Vault service entry point

use anyhow::{Context, Result};
use clap::Parser;
use execution_coordinator::VenueRegistry;
use state_market::MarketStateManager;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use types::{Clock, SystemClock};
use vault_config::VaultConfig;
use vault_service::logging::init_tracing;
use vault_service::{
    log_metrics, log_success, persist_market, restore_market, Bootstrap, RebalanceScheduler,
    VaultService,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base TOML configuration; falls back to VAULT_* environment variables
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Environment overlay under config/environments/
    #[arg(short, long)]
    environment: Option<String>,

    /// JSON file seeding the demo market and accounts
    #[arg(short, long)]
    bootstrap: Option<PathBuf>,

    /// Market state file, restored at startup and written on shutdown
    #[arg(long)]
    market_state: Option<PathBuf>,

    /// Overrides scheduler.interval_secs
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Run a single sweep, print metrics as JSON and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => VaultConfig::load(Some(path.as_path()), args.environment.as_deref())?,
        None => VaultConfig::from_env(),
    };
    if let Some(interval_secs) = args.interval_secs {
        config.scheduler.interval_secs = interval_secs;
    }
    config.validate()?;
    init_tracing(&config.logging)?;

    info!("🚀 Starting Vault Service v{}", env!("CARGO_PKG_VERSION"));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut market = MarketStateManager::with_gap_handler(|expected, actual| {
        warn!(expected, actual, "Market feed sequence gap");
    });
    if let Some(path) = &args.market_state {
        restore_market(&mut market, path)?;
    }
    let market = Arc::new(market);
    let venues = Arc::new(VenueRegistry::new());

    let bootstrap = match &args.bootstrap {
        Some(path) => Bootstrap::load(path)?,
        None => {
            warn!("No bootstrap file given, starting with an empty market and ledger");
            Bootstrap::default()
        }
    };
    let feed = bootstrap.register_venues(&venues);
    feed.publish(&market, clock.now_ns())
        .context("Failed to publish bootstrap market")?;

    let service = Arc::new(VaultService::new(
        &config,
        market.clone(),
        venues,
        clock.clone(),
    )?);
    let accounts = bootstrap.seed_accounts(&service, &config)?;
    log_success!(
        "Vault service initialized: {} strategies, {} accounts",
        config.strategies.len(),
        accounts
    );

    let scheduler = RebalanceScheduler::new(
        service.clone(),
        Duration::from_secs(config.scheduler.interval_secs.max(1)),
    );

    if args.once {
        let summary = scheduler.sweep().await;
        let report = serde_json::json!({
            "sweep": summary,
            "metrics": service.metrics().snapshot(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        if let Some(path) = &args.market_state {
            persist_market(&market, path)?;
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Keeps the demo market inside the snapshot horizon
    let feed_interval = Duration::from_secs((config.risk.max_snapshot_age_secs / 2).max(1));
    let feed_market = market.clone();
    let feed_clock = clock.clone();
    let mut feed_shutdown = shutdown_rx.clone();
    let feed_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(feed_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = feed.publish(&feed_market, feed_clock.now_ns()) {
                        warn!("Demo feed publish failed: {}", e);
                    }
                }
                _ = feed_shutdown.changed() => break,
            }
        }
    });

    let scheduler_task = if config.scheduler.enabled {
        Some(tokio::spawn(scheduler.run(shutdown_rx)))
    } else {
        info!("Scheduler disabled; rebalances only run on request");
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl-C handler")?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    if let Some(task) = scheduler_task {
        task.await.context("Scheduler task panicked")?;
    }
    feed_task.await.context("Feed task panicked")?;
    if let Some(path) = &args.market_state {
        persist_market(&market, path)?;
    }

    let metrics = service.metrics().snapshot();
    log_metrics!(
        "Final: {} plans built, {} committed, {} conversions, {} failures, uptime {:?}",
        metrics.plans_built,
        metrics.plans_committed,
        metrics.conversions_executed,
        metrics.failures(),
        service.metrics().uptime()
    );
    Ok(())
}
