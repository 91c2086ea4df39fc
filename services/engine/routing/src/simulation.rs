//! Sequential path simulation
//!
//! Each hop is quoted with the running amount produced by the previous hop, so
//! price impact compounds in path order.

use crate::graph::Hop;
use crate::protection::slippage_between;
use anyhow::{bail, Result};
use rust_decimal::Decimal;
use vault_amm::{quote_pool, spot_rate_of};

#[derive(Debug, Clone)]
pub(crate) struct SimulatedStep<'a> {
    pub hop: Hop<'a>,
    pub amount_in: Decimal,
    pub expected_out: Decimal,
    pub slippage: Decimal,
}

#[derive(Debug, Clone)]
pub(crate) struct SimulatedPath<'a> {
    pub steps: Vec<SimulatedStep<'a>>,
    pub projected_out: Decimal,
    /// Shortfall of the projected output against the fee-free spot output
    pub slippage: Decimal,
    pub worst_step_slippage: Decimal,
    pub gas_units: u64,
}

impl SimulatedPath<'_> {
    pub fn hop_count(&self) -> usize {
        self.steps.len()
    }
}

pub(crate) fn path_gas(path: &[Hop<'_>]) -> u64 {
    path.iter()
        .fold(0u64, |gas, hop| gas.saturating_add(hop.pool.gas_units))
}

pub(crate) fn simulate<'a>(path: &[Hop<'a>], amount_in: Decimal) -> Result<SimulatedPath<'a>> {
    if path.is_empty() {
        bail!("empty path");
    }

    let mut steps = Vec::with_capacity(path.len());
    let mut running = amount_in;
    let mut ideal = amount_in;
    let mut worst_step_slippage = Decimal::ZERO;

    for hop in path {
        let spot = spot_rate_of(hop.pool, hop.token_in)?;
        let out = quote_pool(hop.pool, hop.token_in, running)?;
        if out <= Decimal::ZERO {
            bail!("{} returns nothing for {} {}", hop.pool.pool_id, running, hop.token_in);
        }

        let slippage = slippage_between(running * spot, out);
        worst_step_slippage = worst_step_slippage.max(slippage);
        ideal *= spot;

        steps.push(SimulatedStep {
            hop: *hop,
            amount_in: running,
            expected_out: out,
            slippage,
        });
        running = out;
    }

    Ok(SimulatedPath {
        steps,
        projected_out: running,
        slippage: slippage_between(ideal, running),
        worst_step_slippage,
        gas_units: path_gas(path),
    })
}
