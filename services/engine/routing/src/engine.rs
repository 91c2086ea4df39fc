use crate::graph::{Hop, PoolGraph};
use crate::protection::CommitmentPolicy;
use crate::simulation::{path_gas, simulate, SimulatedPath};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info};
use types::{AssetId, Clock, MarketSnapshot, Route, RouteStep, RouteTerms, VaultError};
use vault_config::RoutingConfig;

/// A conversion the routing engine is asked to price
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteRequest {
    pub token_in: AssetId,
    pub token_out: AssetId,
    pub amount_in: Decimal,
    pub max_slippage: Decimal,
    /// Caller's floor on the committed output
    pub min_amount_out: Decimal,
    /// Overrides the configured hop limit
    pub max_hops: Option<usize>,
}

impl RouteRequest {
    pub fn new(
        token_in: AssetId,
        token_out: AssetId,
        amount_in: Decimal,
        max_slippage: Decimal,
    ) -> Self {
        Self {
            token_in,
            token_out,
            amount_in,
            max_slippage,
            min_amount_out: Decimal::ZERO,
            max_hops: None,
        }
    }

    pub fn with_min_amount_out(mut self, min_amount_out: Decimal) -> Self {
        self.min_amount_out = min_amount_out;
        self
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = Some(max_hops);
        self
    }

    fn validate(&self) -> Result<(), VaultError> {
        if self.token_in.is_null() || self.token_out.is_null() {
            return Err(VaultError::invalid_request("null asset in route request"));
        }
        if self.token_in == self.token_out {
            return Err(VaultError::invalid_request(format!(
                "{} converts to itself",
                self.token_in
            )));
        }
        if self.amount_in <= Decimal::ZERO {
            return Err(VaultError::invalid_request(format!(
                "amount in {} must be positive",
                self.amount_in
            )));
        }
        if self.min_amount_out < Decimal::ZERO {
            return Err(VaultError::invalid_request(format!(
                "minimum output {} is negative",
                self.min_amount_out
            )));
        }
        Ok(())
    }
}

pub struct RoutingEngine {
    config: RoutingConfig,
    clock: Arc<dyn Clock>,
}

impl RoutingEngine {
    pub fn new(config: RoutingConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Best path for `request` within the configured hop limit
    pub fn find_route(
        &self,
        request: &RouteRequest,
        snapshot: &MarketSnapshot,
    ) -> Result<Route, VaultError> {
        let max_hops = request.max_hops.unwrap_or(self.config.max_hops);
        self.search(request, snapshot, max_hops, self.config.max_snapshot_age_ns())
    }

    /// Single-hop route for liquidations, accepting snapshots up to `max_age_ns` old
    pub fn find_emergency_route(
        &self,
        request: &RouteRequest,
        snapshot: &MarketSnapshot,
        max_age_ns: u64,
    ) -> Result<Route, VaultError> {
        self.search(request, snapshot, 1, max_age_ns)
    }

    fn search(
        &self,
        request: &RouteRequest,
        snapshot: &MarketSnapshot,
        max_hops: usize,
        max_age_ns: u64,
    ) -> Result<Route, VaultError> {
        request.validate()?;
        let policy = CommitmentPolicy::new(request.max_slippage)?;
        if max_hops == 0 {
            return Err(VaultError::invalid_request("hop limit must be at least 1"));
        }
        snapshot.ensure_fresh(self.clock.now_ns(), max_age_ns)?;

        let no_path = || VaultError::NoPathFound {
            token_in: request.token_in,
            token_out: request.token_out,
            max_hops,
        };

        let graph = PoolGraph::from_snapshot(snapshot);
        let paths: Vec<Vec<Hop<'_>>> = graph
            .paths(request.token_in, request.token_out, max_hops)
            .into_iter()
            .filter(|path| match self.config.max_gas_units {
                Some(limit) => path_gas(path) <= limit,
                None => true,
            })
            .collect();
        if paths.is_empty() {
            debug!(
                "No path {} -> {} within {} hops",
                request.token_in, request.token_out, max_hops
            );
            return Err(no_path());
        }

        let mut best_slippage: Option<Decimal> = None;
        let mut acceptable: Vec<SimulatedPath<'_>> = Vec::new();
        for path in &paths {
            let simulated = match simulate(path, request.amount_in) {
                Ok(simulated) => simulated,
                Err(e) => {
                    debug!("Path simulation failed: {}", e);
                    continue;
                }
            };
            best_slippage = Some(match best_slippage {
                Some(best) => best.min(simulated.slippage),
                None => simulated.slippage,
            });

            if !policy.within_tolerance(simulated.slippage) {
                continue;
            }
            if policy.protected_min_output(simulated.projected_out) < request.min_amount_out {
                continue;
            }
            acceptable.push(simulated);
        }

        acceptable.sort_by(rank);
        let Some(best) = acceptable.into_iter().next() else {
            debug!(
                "{} candidate paths {} -> {} all exceed slippage {}",
                paths.len(),
                request.token_in,
                request.token_out,
                request.max_slippage
            );
            return Err(VaultError::SlippageUnattainable {
                token_in: request.token_in,
                token_out: request.token_out,
                max_slippage: request.max_slippage,
                best_slippage,
            });
        };

        let route = build_route(&best, &policy, snapshot.timestamp_ns, max_age_ns)?;
        info!(
            "Route {} {} -> {} {} via {} hops (bound {}, slippage {})",
            route.amount_in(),
            route.token_in(),
            route.projected_out(),
            route.token_out(),
            route.hop_count(),
            route.commitment_bound(),
            best.slippage
        );
        Ok(route)
    }
}

/// Higher projected output first, then fewer hops, then lower worst step slippage
fn rank(a: &SimulatedPath<'_>, b: &SimulatedPath<'_>) -> Ordering {
    b.projected_out
        .cmp(&a.projected_out)
        .then_with(|| a.hop_count().cmp(&b.hop_count()))
        .then_with(|| a.worst_step_slippage.cmp(&b.worst_step_slippage))
}

fn build_route(
    path: &SimulatedPath<'_>,
    policy: &CommitmentPolicy,
    snapshot_timestamp_ns: u64,
    max_age_ns: u64,
) -> Result<Route, VaultError> {
    let steps = path
        .steps
        .iter()
        .map(|step| RouteStep {
            venue: step.hop.pool.venue,
            pool: step.hop.pool.pool_id,
            token_in: step.hop.token_in,
            token_out: step.hop.token_out,
            amount_in: step.amount_in,
            expected_out: step.expected_out,
            min_out: policy.protected_min_output(step.expected_out),
            max_slippage: policy.max_slippage(),
        })
        .collect();

    Route::try_new(
        steps,
        RouteTerms {
            commitment_bound: policy.protected_min_output(path.projected_out),
            max_slippage: policy.max_slippage(),
            worst_step_slippage: path.worst_step_slippage,
            estimated_gas_units: path.gas_units,
            snapshot_timestamp_ns,
            valid_until_ns: snapshot_timestamp_ns.saturating_add(max_age_ns),
        },
    )
}
