use crate::venue::{VenueAdapter, VenueRegistry};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use types::{Clock, ExecutionReceipt, Route, StepFill, VaultError};
use vault_config::ExecutionConfig;

/// Timing of one execution stage
#[derive(Debug, Clone)]
pub struct StageTiming {
    pub stage: &'static str,
    pub duration_us: u64,
    pub success: bool,
}

/// Counters for routes handled by one coordinator
#[derive(Debug, Default)]
pub struct ExecutionStats {
    routes_executed: AtomicU64,
    routes_rejected: AtomicU64,
    partial_executions: AtomicU64,
    steps_filled: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStatsSnapshot {
    pub routes_executed: u64,
    pub routes_rejected: u64,
    pub partial_executions: u64,
    pub steps_filled: u64,
}

impl ExecutionStats {
    pub fn snapshot(&self) -> ExecutionStatsSnapshot {
        ExecutionStatsSnapshot {
            routes_executed: self.routes_executed.load(Ordering::Relaxed),
            routes_rejected: self.routes_rejected.load(Ordering::Relaxed),
            partial_executions: self.partial_executions.load(Ordering::Relaxed),
            steps_filled: self.steps_filled.load(Ordering::Relaxed),
        }
    }
}

pub struct ExecutionCoordinator {
    config: ExecutionConfig,
    venues: Arc<VenueRegistry>,
    clock: Arc<dyn Clock>,
    stats: ExecutionStats,
}

impl ExecutionCoordinator {
    pub fn new(config: ExecutionConfig, venues: Arc<VenueRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            venues,
            clock,
            stats: ExecutionStats::default(),
        }
    }

    pub fn venues(&self) -> &Arc<VenueRegistry> {
        &self.venues
    }

    pub fn stats(&self) -> ExecutionStatsSnapshot {
        self.stats.snapshot()
    }

    /// Executes every step of `route` or reports why it could not
    ///
    /// Nothing moves before the route is known to be fresh, every venue resolves,
    /// and the live re-quote still clears the commitment bound. Once the first
    /// swap has filled, any later failure surfaces as `PartialExecution` with the
    /// fills completed so far.
    pub async fn execute(&self, route: &Route) -> Result<ExecutionReceipt, VaultError> {
        let started = Instant::now();
        let mut timings: Vec<StageTiming> = Vec::with_capacity(4);

        let result = self.run(route, &mut timings).await;

        for timing in &timings {
            debug!(
                "  {} {}us {}",
                timing.stage,
                timing.duration_us,
                if timing.success { "ok" } else { "failed" }
            );
        }

        match &result {
            Ok(receipt) => {
                self.stats.routes_executed.fetch_add(1, Ordering::Relaxed);
                info!(
                    "✅ Executed {} {} -> {} {} in {} steps ({}us, slippage {})",
                    receipt.amount_in,
                    receipt.token_in,
                    receipt.amount_out,
                    receipt.token_out,
                    receipt.fills.len(),
                    started.elapsed().as_micros(),
                    receipt.realized_slippage
                );
            }
            Err(e @ VaultError::PartialExecution { .. }) => {
                self.stats.partial_executions.fetch_add(1, Ordering::Relaxed);
                error!("❌ {}", e);
            }
            Err(e) => {
                self.stats.routes_rejected.fetch_add(1, Ordering::Relaxed);
                warn!("⚠️ Route {} -> {} rejected: {}", route.token_in(), route.token_out(), e);
            }
        }
        result
    }

    async fn run(
        &self,
        route: &Route,
        timings: &mut Vec<StageTiming>,
    ) -> Result<ExecutionReceipt, VaultError> {
        let now_ns = self.clock.now_ns();
        if route.is_expired(now_ns) {
            return Err(VaultError::StaleSnapshot {
                age_ns: now_ns.saturating_sub(route.snapshot_timestamp_ns()),
                max_age_ns: route
                    .valid_until_ns()
                    .saturating_sub(route.snapshot_timestamp_ns()),
            });
        }

        let stage = Instant::now();
        let adapters = self.resolve_venues(route);
        record(timings, "resolve_venues", stage, adapters.is_ok());
        let adapters = adapters?;

        if self.config.requote_before_execution {
            let stage = Instant::now();
            let requote = self.requote(route, &adapters).await;
            record(timings, "requote", stage, requote.is_ok());
            requote?;
        }

        let stage = Instant::now();
        let swaps = self.swap_all(route, &adapters).await;
        record(timings, "swap", stage, swaps.is_ok());
        let fills = swaps?;

        let amount_out = fills
            .last()
            .map(|fill| fill.amount_out)
            .unwrap_or(Decimal::ZERO);
        let realized_slippage = if route.projected_out() > Decimal::ZERO {
            Decimal::ONE - amount_out / route.projected_out()
        } else {
            Decimal::ZERO
        };

        Ok(ExecutionReceipt {
            token_in: route.token_in(),
            token_out: route.token_out(),
            amount_in: route.amount_in(),
            amount_out,
            fills,
            commitment_bound: route.commitment_bound(),
            realized_slippage,
            executed_at_ns: self.clock.now_ns(),
        })
    }

    fn resolve_venues(&self, route: &Route) -> Result<Vec<Arc<dyn VenueAdapter>>, VaultError> {
        route
            .steps()
            .iter()
            .map(|step| {
                self.venues
                    .get(step.venue)
                    .ok_or_else(|| VaultError::VenueUnavailable {
                        venue: step.venue,
                        pool: Some(step.pool),
                        reason: "no adapter registered".to_string(),
                    })
            })
            .collect()
    }

    /// Simulates the whole path against live venue state without moving funds
    async fn requote(
        &self,
        route: &Route,
        adapters: &[Arc<dyn VenueAdapter>],
    ) -> Result<(), VaultError> {
        let mut running = route.amount_in();
        for (index, (step, adapter)) in route.steps().iter().zip(adapters).enumerate() {
            running = adapter
                .quote(step.pool, step.token_in, running)
                .await
                .map_err(|e| e.into_vault_error(step.venue, step.pool, index))?;
            if running < step.min_out {
                return Err(VaultError::SlippageExceeded {
                    step: index,
                    actual: running,
                    minimum: step.min_out,
                });
            }
        }

        if running < route.commitment_bound() {
            return Err(VaultError::SlippageExceeded {
                step: route.hop_count() - 1,
                actual: running,
                minimum: route.commitment_bound(),
            });
        }
        debug!(
            "Re-quote {} clears bound {}",
            running,
            route.commitment_bound()
        );
        Ok(())
    }

    async fn swap_all(
        &self,
        route: &Route,
        adapters: &[Arc<dyn VenueAdapter>],
    ) -> Result<Vec<StepFill>, VaultError> {
        let mut fills: Vec<StepFill> = Vec::with_capacity(route.hop_count());
        let mut running = route.amount_in();

        for (index, (step, adapter)) in route.steps().iter().zip(adapters).enumerate() {
            let outcome = adapter
                .swap(step.pool, step.token_in, running, step.min_out)
                .await
                .map_err(|e| e.into_vault_error(step.venue, step.pool, index))
                .and_then(|out| {
                    if out < step.min_out {
                        Err(VaultError::SlippageExceeded {
                            step: index,
                            actual: out,
                            minimum: step.min_out,
                        })
                    } else {
                        Ok(out)
                    }
                });

            let out = match outcome {
                Ok(out) => out,
                Err(cause) if fills.is_empty() => return Err(cause),
                Err(cause) => {
                    return Err(VaultError::PartialExecution {
                        failed_step: index,
                        fills,
                        cause: cause.to_string(),
                    })
                }
            };

            self.stats.steps_filled.fetch_add(1, Ordering::Relaxed);
            fills.push(StepFill {
                step: index,
                venue: step.venue,
                pool: step.pool,
                token_in: step.token_in,
                token_out: step.token_out,
                amount_in: running,
                amount_out: out,
            });
            running = out;
        }

        if running < route.commitment_bound() {
            let cause = VaultError::SlippageExceeded {
                step: route.hop_count() - 1,
                actual: running,
                minimum: route.commitment_bound(),
            };
            return Err(VaultError::PartialExecution {
                failed_step: route.hop_count() - 1,
                fills,
                cause: cause.to_string(),
            });
        }
        Ok(fills)
    }
}

fn record(timings: &mut Vec<StageTiming>, stage: &'static str, started: Instant, success: bool) {
    timings.push(StageTiming {
        stage,
        duration_us: started.elapsed().as_micros() as u64,
        success,
    });
}
