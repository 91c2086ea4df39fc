//! Allocator conversions carried out by the routing engine and execution coordinator

use async_trait::async_trait;
use execution_coordinator::ExecutionCoordinator;
use routing_engine::{RouteRequest, RoutingEngine};
use std::sync::Arc;
use strategy_allocator::{Converter, Urgency};
use tracing::debug;
use types::{AssetConversion, ExecutionReceipt, MarketSnapshot, VaultError};

/// Finds a route for each conversion, then executes it
pub struct RouteConverter {
    routing: Arc<RoutingEngine>,
    execution: Arc<ExecutionCoordinator>,
}

impl RouteConverter {
    pub fn new(routing: Arc<RoutingEngine>, execution: Arc<ExecutionCoordinator>) -> Self {
        Self { routing, execution }
    }

    pub fn routing(&self) -> &Arc<RoutingEngine> {
        &self.routing
    }

    pub fn execution(&self) -> &Arc<ExecutionCoordinator> {
        &self.execution
    }
}

#[async_trait]
impl Converter for RouteConverter {
    async fn convert(
        &self,
        conversion: &AssetConversion,
        snapshot: &MarketSnapshot,
        urgency: Urgency,
    ) -> Result<ExecutionReceipt, VaultError> {
        let mut request = RouteRequest::new(
            conversion.from_asset,
            conversion.to_asset,
            conversion.amount_in,
            conversion.max_slippage,
        );
        if let Some(max_hops) = conversion.max_hops {
            request = request.with_max_hops(max_hops);
        }

        let route = match urgency {
            Urgency::Normal => self.routing.find_route(&request, snapshot)?,
            Urgency::Emergency {
                max_snapshot_age_ns,
            } => self
                .routing
                .find_emergency_route(&request, snapshot, max_snapshot_age_ns)?,
        };
        debug!(
            "Routed {} -> {}: {} hops, bound {}",
            conversion.from_asset,
            conversion.to_asset,
            route.hop_count(),
            route.commitment_bound()
        );

        self.execution.execute(&route).await
    }
}
