//! Asset graph over snapshot pools
//!
//! Nodes are assets, edges are pools. Every pool is traversable in both
//! directions. Enumeration is depth-bounded and never revisits an asset, so the
//! number of candidate paths stays small for the hop limits routing allows.

use std::collections::BTreeMap;
use types::{AssetId, MarketSnapshot, PoolSnapshot};

/// One directed traversal of a pool
#[derive(Debug, Clone, Copy)]
pub(crate) struct Hop<'a> {
    pub pool: &'a PoolSnapshot,
    pub token_in: AssetId,
    pub token_out: AssetId,
}

pub(crate) struct PoolGraph<'a> {
    adjacency: BTreeMap<AssetId, Vec<Hop<'a>>>,
}

impl<'a> PoolGraph<'a> {
    pub fn from_snapshot(snapshot: &'a MarketSnapshot) -> Self {
        let mut adjacency: BTreeMap<AssetId, Vec<Hop<'a>>> = BTreeMap::new();
        for pool in snapshot.pools.values() {
            if pool.token0 == pool.token1 {
                continue;
            }
            adjacency.entry(pool.token0).or_default().push(Hop {
                pool,
                token_in: pool.token0,
                token_out: pool.token1,
            });
            adjacency.entry(pool.token1).or_default().push(Hop {
                pool,
                token_in: pool.token1,
                token_out: pool.token0,
            });
        }
        Self { adjacency }
    }

    /// Every simple path from `start` to `target` with at most `max_hops` hops
    pub fn paths(&self, start: AssetId, target: AssetId, max_hops: usize) -> Vec<Vec<Hop<'a>>> {
        let mut found = Vec::new();
        if start == target || max_hops == 0 {
            return found;
        }
        let mut visited = vec![start];
        let mut path = Vec::with_capacity(max_hops);
        self.extend(start, target, max_hops, &mut visited, &mut path, &mut found);
        found
    }

    fn extend(
        &self,
        current: AssetId,
        target: AssetId,
        max_hops: usize,
        visited: &mut Vec<AssetId>,
        path: &mut Vec<Hop<'a>>,
        found: &mut Vec<Vec<Hop<'a>>>,
    ) {
        let Some(edges) = self.adjacency.get(&current) else {
            return;
        };
        for hop in edges {
            if visited.contains(&hop.token_out) {
                continue;
            }
            path.push(*hop);
            if hop.token_out == target {
                found.push(path.clone());
            } else if path.len() < max_hops {
                visited.push(hop.token_out);
                self.extend(hop.token_out, target, max_hops, visited, path, found);
                visited.pop();
            }
            path.pop();
        }
    }
}
