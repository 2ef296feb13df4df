//! Weight-space grid search.
//!
//! Enumerates weight vectors on a discretized simplex, blends the strategy
//! curves under each of them and ranks the allocations by Sharpe ratio.
//!
//! # Example
//!
//! ```no_run
//! use mosaic::data::CsvCurveStore;
//! use mosaic::optimizer::{Optimizer, OptimizerConfig};
//! use mosaic::types::StrategyRef;
//!
//! let strategies: Vec<StrategyRef> = ["0005.HK:Aggressive", "0288.HK:Conservative"]
//!     .iter()
//!     .map(|s| s.parse().unwrap())
//!     .collect();
//!
//! let optimizer = Optimizer::new(CsvCurveStore::new("trading_results"), OptimizerConfig::default());
//! let report = optimizer.run(&strategies, None).unwrap();
//! for result in &report.results {
//!     println!("#{} {:.4} {}", result.rank, result.metrics.sharpe_ratio, result.allocation.composition());
//! }
//! ```
//!
//! The candidate set is the Cartesian product of `{0, s, 2s, ..., 1}` over
//! all strategies, filtered to tuples whose raw sum is within 0.01 of 1 and
//! renormalized to sum to exactly 1. It is generated depth-first with pruning
//! of partial sums that can no longer reach the band, which yields the same
//! candidates in the same order as filtering the full product.

use crate::analytics::{MetricsConfig, PerformanceMetrics};
use crate::data::CurveSource;
use crate::error::{MosaicError, Result};
use crate::portfolio::{validate_capital, AlignedCurves, BlendedCurve, Combiner};
use crate::types::{PortfolioAllocation, StrategyRef, WeightVector, WEIGHT_SUM_TOLERANCE};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use tracing::{debug, info, warn};

/// Largest number of weight levels per strategy, i.e. the smallest step is 1e-4.
pub const MAX_GRID_LEVELS: usize = 10_001;

/// Discretized weight simplex over `n` strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightGrid {
    strategies: usize,
    step: f64,
    levels: Vec<f64>,
}

/// Size of a grid, computed before any sweep runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridEstimate {
    /// Distinct weight values per strategy.
    pub levels: usize,
    /// Size of the full Cartesian product, saturating at `u128::MAX`.
    pub raw_size: u128,
    /// Tuples that pass the sum filter.
    pub candidates: usize,
}

impl WeightGrid {
    /// Create a grid for `strategies` weights with increments of `step`.
    ///
    /// Levels are `i * step` for every `i` with `i * step <= 1`. Steps finer
    /// than [`MAX_GRID_LEVELS`] allows are rejected.
    pub fn new(strategies: usize, step: f64) -> Result<Self> {
        if strategies == 0 {
            return Err(MosaicError::InvalidInput(
                "weight grid needs at least one strategy".to_string(),
            ));
        }
        if !(step > 0.0 && step <= 1.0) {
            return Err(MosaicError::InvalidInput(format!(
                "weight step must be in (0, 1], got {}",
                step
            )));
        }

        let divisions = (1.0 / step + 1e-9).floor();
        if divisions + 1.0 > MAX_GRID_LEVELS as f64 {
            return Err(MosaicError::InvalidInput(format!(
                "weight step {} gives more than {} levels per strategy",
                step, MAX_GRID_LEVELS
            )));
        }
        let levels = (0..=divisions as usize).map(|i| i as f64 * step).collect();

        Ok(Self {
            strategies,
            step,
            levels,
        })
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn strategies(&self) -> usize {
        self.strategies
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    /// Size of the unfiltered Cartesian product.
    pub fn raw_size(&self) -> u128 {
        let mut size: u128 = 1;
        for _ in 0..self.strategies {
            size = size.saturating_mul(self.levels.len() as u128);
        }
        size
    }

    /// Count the candidates without materializing them.
    pub fn candidate_count(&self) -> usize {
        let mut count = 0;
        self.for_each_raw(|_| count += 1);
        count
    }

    pub fn estimate(&self) -> GridEstimate {
        GridEstimate {
            levels: self.levels.len(),
            raw_size: self.raw_size(),
            candidates: self.candidate_count(),
        }
    }

    /// Every candidate, renormalized to sum to exactly 1, in enumeration order.
    ///
    /// Distinct tuples may renormalize to the same vector; they are kept.
    pub fn candidates(&self) -> Vec<WeightVector> {
        let mut out = Vec::new();
        self.for_each_raw(|raw| out.push(WeightVector::renormalized(raw)));
        out
    }

    /// Visit raw tuples whose sum is within tolerance of 1, before renormalization.
    pub fn for_each_raw<F: FnMut(&[f64])>(&self, mut f: F) {
        let mut buf = Vec::with_capacity(self.strategies);
        self.walk(&mut buf, 0.0, &mut f);
    }

    fn walk<F: FnMut(&[f64])>(&self, buf: &mut Vec<f64>, partial: f64, f: &mut F) {
        if buf.len() == self.strategies {
            if (partial - 1.0).abs() < WEIGHT_SUM_TOLERANCE {
                f(buf.as_slice());
            }
            return;
        }

        let max_level = self.levels.last().copied().unwrap_or(0.0);
        let remaining = (self.strategies - buf.len()) as f64;
        if partial + remaining * max_level + 1e-9 <= 1.0 - WEIGHT_SUM_TOLERANCE {
            return;
        }

        for &level in &self.levels {
            let next = partial + level;
            // Weights are non-negative, so the sum only grows from here.
            if next > 1.0 + WEIGHT_SUM_TOLERANCE {
                break;
            }
            buf.push(level);
            self.walk(buf, next, f);
            buf.pop();
        }
    }
}

/// Optimizer settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Grid increment for each weight.
    pub weight_step: f64,
    /// Number of ranked results to keep.
    pub top_k: usize,
    /// Capital every blended curve starts from.
    pub initial_capital: f64,
    /// Evaluate candidates on the rayon thread pool.
    pub parallel: bool,
    /// Scoring policy.
    pub metrics: MetricsConfig,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            weight_step: 0.1,
            top_k: 10,
            initial_capital: 20_000.0,
            parallel: true,
            metrics: MetricsConfig::default(),
        }
    }
}

/// Observer notified after each candidate evaluation.
///
/// With a parallel sweep calls arrive from worker threads in no particular
/// order; `done` still counts up to `total`.
pub trait SweepProgress: Sync {
    fn on_candidate(&self, done: usize, total: usize);
}

impl<F> SweepProgress for F
where
    F: Fn(usize, usize) + Sync,
{
    fn on_candidate(&self, done: usize, total: usize) {
        self(done, total)
    }
}

/// One ranked allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    /// 1-based position in the ranking.
    pub rank: usize,
    pub allocation: PortfolioAllocation,
    pub metrics: PerformanceMetrics,
    pub curve: BlendedCurve,
}

/// Outcome of a sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub strategies: Vec<StrategyRef>,
    pub initial_capital: f64,
    /// Candidates generated by the grid.
    pub candidate_count: usize,
    /// Candidates whose evaluation failed and were dropped.
    pub failed_count: usize,
    /// Best allocations by descending Sharpe ratio, at most `top_k`.
    pub results: Vec<RankedResult>,
    /// Why the ranking is empty, when it is.
    pub diagnostic: Option<String>,
}

impl OptimizationReport {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn best(&self) -> Option<&RankedResult> {
        self.results.first()
    }
}

/// Grid-search optimizer over strategy weights.
pub struct Optimizer<S: CurveSource> {
    combiner: Combiner<S>,
    config: OptimizerConfig,
}

impl<S: CurveSource> Optimizer<S> {
    pub fn new(source: S, config: OptimizerConfig) -> Self {
        Self {
            combiner: Combiner::with_metrics(source, config.metrics),
            config,
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn combiner(&self) -> &Combiner<S> {
        &self.combiner
    }

    /// Grid this optimizer would sweep for `strategies`.
    pub fn grid(&self, strategies: &[StrategyRef]) -> Result<WeightGrid> {
        WeightGrid::new(strategies.len(), self.config.weight_step)
    }

    /// Sweep the weight grid and rank the allocations.
    ///
    /// Curves are loaded and aligned once per run. A candidate that fails
    /// to evaluate is dropped; if the curves cannot be loaded or aligned,
    /// every candidate fails and the report is empty with a diagnostic.
    pub fn run(
        &self,
        strategies: &[StrategyRef],
        progress: Option<&dyn SweepProgress>,
    ) -> Result<OptimizationReport> {
        validate_capital(self.config.initial_capital)?;
        if self.config.top_k == 0 {
            return Err(MosaicError::InvalidInput(
                "result cap must be at least 1".to_string(),
            ));
        }

        let grid = self.grid(strategies)?;
        let candidates = grid.candidates();
        let total = candidates.len();
        info!(
            "Testing {} weight combinations (grid of {} levels per strategy)",
            total,
            grid.levels().len()
        );

        let mut report = OptimizationReport {
            strategies: strategies.to_vec(),
            initial_capital: self.config.initial_capital,
            candidate_count: total,
            failed_count: 0,
            results: Vec::new(),
            diagnostic: None,
        };

        let aligned = match self.combiner.align(strategies) {
            Ok(aligned) => aligned,
            Err(e) if e.is_candidate_local() => {
                warn!("Every candidate fails: {}", e);
                report.failed_count = total;
                report.diagnostic = Some(e.to_string());
                return Ok(report);
            }
            Err(e) => return Err(e),
        };

        let done = AtomicUsize::new(0);
        let score = |(index, weights): (usize, &WeightVector)| {
            let outcome = self.score(&aligned, weights).map(|m| (index, m));
            if let Some(observer) = progress {
                observer.on_candidate(done.fetch_add(1, AtomicOrdering::Relaxed) + 1, total);
            }
            outcome
        };

        // Only metrics are kept per candidate; curves are rebuilt for the survivors.
        let scored: Vec<Option<(usize, PerformanceMetrics)>> = if self.config.parallel {
            candidates.par_iter().enumerate().map(score).collect()
        } else {
            candidates.iter().enumerate().map(score).collect()
        };

        let mut scored: Vec<(usize, PerformanceMetrics)> = scored.into_iter().flatten().collect();
        report.failed_count = total - scored.len();

        scored.sort_by(|a, b| by_sharpe_desc(&a.1, &b.1));
        scored.truncate(self.config.top_k);

        let mut results = Vec::with_capacity(scored.len());
        for (index, _) in scored {
            let allocation =
                PortfolioAllocation::new(strategies.to_vec(), candidates[index].clone());
            match aligned.evaluate(
                allocation,
                self.config.initial_capital,
                self.combiner.metrics_config(),
            ) {
                Ok(result) => results.push(RankedResult {
                    rank: results.len() + 1,
                    allocation: result.allocation,
                    metrics: result.metrics,
                    curve: result.curve,
                }),
                Err(e) => {
                    debug!("Dropping candidate {}: {}", candidates[index], e);
                    report.failed_count += 1;
                }
            }
        }

        if results.is_empty() {
            report.diagnostic = Some("no candidate combination succeeded".to_string());
        }
        report.results = results;

        info!(
            "Ranked {} of {} candidates ({} failed)",
            report.results.len(),
            total,
            report.failed_count
        );
        Ok(report)
    }

    fn score(&self, aligned: &AlignedCurves, weights: &WeightVector) -> Option<PerformanceMetrics> {
        match aligned.score(
            weights,
            self.config.initial_capital,
            self.combiner.metrics_config(),
        ) {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                debug!("Dropping candidate {}: {}", weights, e);
                None
            }
        }
    }
}

fn by_sharpe_desc(a: &PerformanceMetrics, b: &PerformanceMetrics) -> Ordering {
    b.sharpe_ratio
        .partial_cmp(&a.sharpe_ratio)
        .unwrap_or(Ordering::Equal)
}

/// Stable sort by descending Sharpe ratio, truncate, and number the ranks.
///
/// Ties keep enumeration order.
pub fn rank(results: &mut Vec<RankedResult>, top_k: usize) {
    results.sort_by(|a, b| by_sharpe_desc(&a.metrics, &b.metrics));
    results.truncate(top_k);
    for (i, result) in results.iter_mut().enumerate() {
        result.rank = i + 1;
    }
}
