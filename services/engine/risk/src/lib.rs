//! # Risk Assessment Engine
//!
//! ## Purpose
//!
//! Computes the four-dimensional [`RiskVector`] of an account from its active
//! positions and a market snapshot. Assessment is a pure function of its inputs:
//! no caching, no side effects, no shared state. The allocator calls it
//! repeatedly while searching without any transactional isolation.
//!
//! ## Scores (each in [0, 100], higher is riskier)
//!
//! - **Volatility**: value-weighted asset volatility, scaled by `volatility_full_scale`
//! - **Liquidity depth**: `100 / (1 + r)` where `r` is the smallest exit-depth to
//!   holding ratio across held assets, so one large illiquid holding dominates
//! - **Correlation**: size-weighted mean pairwise correlation of held assets,
//!   mapped from [-1, 1]; unknown pairs count as perfectly correlated
//! - **Concentration**: Herfindahl sum of squared allocation fractions

pub mod engine;

pub use engine::{Holding, RiskAssessmentEngine};
