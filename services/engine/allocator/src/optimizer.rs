//! Discretized hill climbing over allocation fractions
//!
//! Starts from every candidate's band minimum and repeatedly applies the best
//! feasible move of one step: add a step to a strategy out of idle capital, or
//! shift a step from one strategy to another. Moves stop at band caps with a
//! partial step. A move is taken only when it raises blended yield, or keeps
//! yield equal while moving closer to the previous allocation.
//!
//! When the band minimums themselves sit outside the budget, a repair phase
//! first walks the same moves toward the budget, taking whichever step shrinks
//! the overshoot most. A hedging strategy can pull a correlated minimum set
//! back inside its ceiling this way.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use types::{AssetId, StrategyId, VaultError};

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub strategy: StrategyId,
    pub asset: AssetId,
    pub min: Decimal,
    pub cap: Decimal,
    pub expected_yield: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub step: Decimal,
    pub max_iterations: u32,
}

/// Result of a search
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub fractions: BTreeMap<StrategyId, Decimal>,
    pub expected_yield: Decimal,
    pub distance: Decimal,
    pub iterations: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Score {
    expected_yield: Decimal,
    distance: Decimal,
}

impl Score {
    fn improves_on(&self, other: &Score) -> bool {
        self.expected_yield > other.expected_yield
            || (self.expected_yield == other.expected_yield && self.distance < other.distance)
    }
}

pub struct HillClimber<'a> {
    candidates: &'a [Candidate],
    previous: &'a BTreeMap<StrategyId, Decimal>,
    params: SearchParams,
}

impl<'a> HillClimber<'a> {
    pub fn new(
        candidates: &'a [Candidate],
        previous: &'a BTreeMap<StrategyId, Decimal>,
        params: SearchParams,
    ) -> Self {
        Self {
            candidates,
            previous,
            params,
        }
    }

    /// Best allocation reachable inside the budget, or `None` when no sequence
    /// of moves from the band minimums gets there
    ///
    /// `excess` sees candidate fractions in candidate order and returns how far
    /// they overshoot the budget, zero when inside it. It may fail with a domain
    /// error, which aborts the search.
    pub fn search<F>(&self, mut excess: F) -> Result<Option<Allocation>, VaultError>
    where
        F: FnMut(&[Decimal]) -> Result<Decimal, VaultError>,
    {
        if self.params.step <= Decimal::ZERO {
            return Err(VaultError::invalid_config("allocation step must be positive"));
        }

        let mut current: Vec<Decimal> = self.candidates.iter().map(|c| c.min.min(c.cap)).collect();
        if current.iter().copied().sum::<Decimal>() > Decimal::ONE {
            return Ok(None);
        }

        let mut iterations = 0;
        let mut overshoot = excess(&current)?;
        while overshoot > Decimal::ZERO {
            if iterations >= self.params.max_iterations {
                return Ok(None);
            }
            let mut best: Option<(Decimal, Score, Vec<Decimal>)> = None;
            for next in self.neighbours(&current) {
                let next_overshoot = excess(&next)?;
                if next_overshoot >= overshoot {
                    continue;
                }
                let next_score = self.score(&next);
                let better = match &best {
                    None => true,
                    Some((best_overshoot, best_score, _)) => {
                        next_overshoot < *best_overshoot
                            || (next_overshoot == *best_overshoot
                                && next_score.improves_on(best_score))
                    }
                };
                if better {
                    best = Some((next_overshoot, next_score, next));
                }
            }
            let Some((next_overshoot, _, next)) = best else {
                return Ok(None);
            };
            current = next;
            overshoot = next_overshoot;
            iterations += 1;
        }

        let mut score = self.score(&current);

        while iterations < self.params.max_iterations {
            let mut moves: Vec<(Score, Vec<Decimal>)> = self
                .neighbours(&current)
                .into_iter()
                .map(|next| (self.score(&next), next))
                .filter(|(next_score, _)| next_score.improves_on(&score))
                .collect();
            if moves.is_empty() {
                break;
            }

            // Best first; the first feasible move wins
            moves.sort_by(|(a, _), (b, _)| {
                b.expected_yield
                    .cmp(&a.expected_yield)
                    .then_with(|| a.distance.cmp(&b.distance))
            });
            let mut accepted = None;
            for (next_score, next) in moves {
                if excess(&next)?.is_zero() {
                    accepted = Some((next_score, next));
                    break;
                }
            }

            match accepted {
                Some((next_score, next)) => {
                    current = next;
                    score = next_score;
                    iterations += 1;
                }
                None => break,
            }
        }

        Ok(Some(Allocation {
            fractions: self
                .candidates
                .iter()
                .zip(&current)
                .map(|(c, &fraction)| (c.strategy, fraction))
                .collect(),
            expected_yield: score.expected_yield,
            distance: score.distance,
            iterations,
        }))
    }

    fn score(&self, fractions: &[Decimal]) -> Score {
        let mut expected_yield = Decimal::ZERO;
        let mut distance = Decimal::ZERO;
        for (candidate, &fraction) in self.candidates.iter().zip(fractions) {
            expected_yield += fraction * candidate.expected_yield;
            let previous = self
                .previous
                .get(&candidate.strategy)
                .copied()
                .unwrap_or(Decimal::ZERO);
            distance += (fraction - previous).abs();
        }
        // Previous holdings outside the candidate set are sold regardless
        for (strategy, previous) in self.previous {
            if !self.candidates.iter().any(|c| c.strategy == *strategy) {
                distance += previous.abs();
            }
        }
        Score {
            expected_yield,
            distance,
        }
    }

    fn neighbours(&self, current: &[Decimal]) -> Vec<Vec<Decimal>> {
        let step = self.params.step;
        let idle = Decimal::ONE - current.iter().copied().sum::<Decimal>();
        let mut out = Vec::new();

        for (i, candidate) in self.candidates.iter().enumerate() {
            let room = candidate.cap - current[i];
            if room <= Decimal::ZERO {
                continue;
            }

            let add = step.min(room).min(idle);
            if add > Decimal::ZERO {
                let mut next = current.to_vec();
                next[i] += add;
                out.push(next);
            }

            for (j, source) in self.candidates.iter().enumerate() {
                if i == j {
                    continue;
                }
                let available = current[j] - source.min;
                let shift = step.min(room).min(available);
                if shift > Decimal::ZERO {
                    let mut next = current.to_vec();
                    next[j] -= shift;
                    next[i] += shift;
                    out.push(next);
                }
            }
        }
        out
    }
}
