//! External rebalance cadence
//!
//! The engine never owns timers; this scheduler sits outside it and calls
//! `rebalance_account` for every account on a fixed interval. A failed sweep
//! is never retried with wider tolerances, the next tick simply plans again.

use crate::service::VaultService;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use types::VaultError;

/// Per-sweep tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub rebalanced: usize,
    pub unchanged: usize,
    pub cooling_down: usize,
    pub failed: usize,
}

pub struct RebalanceScheduler {
    service: Arc<VaultService>,
    interval: Duration,
}

impl RebalanceScheduler {
    pub fn new(service: Arc<VaultService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Rebalances every account once, sequentially
    pub async fn sweep(&self) -> SweepSummary {
        let mut summary = SweepSummary::default();
        for account in self.service.ledger().accounts() {
            match self.service.rebalance_account(account).await {
                Ok(outcome) if outcome.is_applied() => summary.rebalanced += 1,
                Ok(_) => summary.unchanged += 1,
                Err(VaultError::CooldownActive { remaining_ns, .. }) => {
                    debug!("{} cooling down for {}ns", account, remaining_ns);
                    summary.cooling_down += 1;
                }
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }

    /// Sweeps on every tick until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!("Rebalance scheduler started, every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.sweep().await;
                    crate::log_metrics!(
                        "Sweep: {} rebalanced, {} unchanged, {} cooling down, {} failed",
                        summary.rebalanced,
                        summary.unchanged,
                        summary.cooling_down,
                        summary.failed
                    );
                    if summary.failed > 0 {
                        warn!("{} accounts failed to rebalance this sweep", summary.failed);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Rebalance scheduler stopped");
    }
}
