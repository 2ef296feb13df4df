//! Portfolio combination: aligning strategy curves and blending them under a
//! weight vector.
//!
//! Every curve is restricted to the dates shared by all curves, rebased so it
//! starts at the initial capital, and the rebased curves are summed with
//! their weights. Weights that pass the tolerance check are used exactly as
//! given: a vector summing to 0.995 yields a blend starting at 0.995 times the
//! capital. Only the optimizer's grid renormalizes.

use crate::analytics::{MetricsConfig, PerformanceMetrics};
use crate::data::CurveSource;
use crate::error::{MosaicError, Result};
use crate::types::{EquityCurve, EquityPoint, PortfolioAllocation, StrategyRef, WeightVector};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Weighted sum of rebased strategy curves over their common dates.
pub type BlendedCurve = EquityCurve;

/// Strategy curves restricted to their common dates and rebased to 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedCurves {
    dates: Vec<NaiveDate>,
    /// Per strategy, value divided by its value on the first common date.
    growth: Vec<Vec<f64>>,
}

impl AlignedCurves {
    /// Intersect the date axes of `curves` and rebase each curve on the
    /// first common date.
    pub fn new(curves: &[EquityCurve]) -> Result<Self> {
        let (head, rest) = curves
            .split_first()
            .ok_or_else(|| MosaicError::InvalidInput("no strategies to combine".to_string()))?;

        let dates: Vec<NaiveDate> = head
            .dates()
            .filter(|d| rest.iter().all(|c| c.value_at(*d).is_some()))
            .collect();

        if dates.is_empty() {
            return Err(MosaicError::NoCommonDates);
        }

        let mut growth = Vec::with_capacity(curves.len());
        for curve in curves {
            let values: Vec<f64> = dates.iter().filter_map(|d| curve.value_at(*d)).collect();
            let base = values[0];
            if base <= 0.0 {
                return Err(MosaicError::Malformed(format!(
                    "value on first common date {} is {}, cannot rebase",
                    dates[0], base
                )));
            }
            growth.push(values.iter().map(|v| v / base).collect());
        }

        debug!(
            "Aligned {} curves on {} common dates",
            curves.len(),
            dates.len()
        );

        Ok(Self { dates, growth })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Number of common dates.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn strategy_count(&self) -> usize {
        self.growth.len()
    }

    /// Weighted sum of the rebased curves. `weights` must match the strategy count.
    pub fn blend_values(&self, weights: &[f64], initial_capital: f64) -> Vec<f64> {
        let mut blended = vec![0.0; self.dates.len()];
        for (series, &weight) in self.growth.iter().zip(weights) {
            for (acc, g) in blended.iter_mut().zip(series) {
                *acc += g * initial_capital * weight;
            }
        }
        blended
    }

    /// Metrics of the blend under `weights`, without keeping the curve.
    pub fn score(
        &self,
        weights: &WeightVector,
        initial_capital: f64,
        metrics_config: &MetricsConfig,
    ) -> Result<PerformanceMetrics> {
        weights.validate(self.strategy_count())?;
        let values = self.blend_values(weights.as_slice(), initial_capital);
        PerformanceMetrics::calculate(&values, initial_capital, metrics_config)
    }

    /// Blend under `allocation` and score the result.
    pub fn evaluate(
        &self,
        allocation: PortfolioAllocation,
        initial_capital: f64,
        metrics_config: &MetricsConfig,
    ) -> Result<CombineResult> {
        allocation.weights.validate(self.strategy_count())?;

        let values = self.blend_values(allocation.weights.as_slice(), initial_capital);
        let metrics = PerformanceMetrics::calculate(&values, initial_capital, metrics_config)?;
        let curve = EquityCurve::new(
            self.dates
                .iter()
                .zip(values)
                .map(|(&d, v)| EquityPoint::new(d, v))
                .collect(),
        )?;

        Ok(CombineResult {
            allocation,
            initial_capital,
            metrics,
            curve,
        })
    }
}

/// Outcome of blending one allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombineResult {
    pub allocation: PortfolioAllocation,
    pub initial_capital: f64,
    pub metrics: PerformanceMetrics,
    pub curve: BlendedCurve,
}

/// Combines strategy curves fetched from a [`CurveSource`].
pub struct Combiner<S: CurveSource> {
    source: S,
    metrics: MetricsConfig,
}

impl<S: CurveSource> Combiner<S> {
    pub fn new(source: S) -> Self {
        Self::with_metrics(source, MetricsConfig::default())
    }

    pub fn with_metrics(source: S, metrics: MetricsConfig) -> Self {
        Self { source, metrics }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn metrics_config(&self) -> &MetricsConfig {
        &self.metrics
    }

    /// Load every strategy and align them on their common dates.
    ///
    /// Strategies that end up with zero weight still take part in the date
    /// intersection.
    pub fn align(&self, strategies: &[StrategyRef]) -> Result<AlignedCurves> {
        let curves = self.source.load_all(strategies)?;
        AlignedCurves::new(&curves)
    }

    /// Blend `strategies` under `weights` starting from `initial_capital`.
    ///
    /// Weights are checked before anything is loaded. Any load failure fails
    /// the whole combination.
    pub fn combine(
        &self,
        strategies: &[StrategyRef],
        weights: &WeightVector,
        initial_capital: f64,
    ) -> Result<CombineResult> {
        validate_capital(initial_capital)?;
        weights.validate(strategies.len())?;

        let sum = weights.sum();
        if sum != 1.0 {
            debug!("Weights sum to {}, blend is scaled by the same factor", sum);
        }

        let aligned = self.align(strategies)?;
        let result = aligned.evaluate(
            PortfolioAllocation::new(strategies.to_vec(), weights.clone()),
            initial_capital,
            &self.metrics,
        )?;

        info!(
            "Combined {} strategies: sharpe {:.4}, return {:.2}%",
            strategies.len(),
            result.metrics.sharpe_ratio,
            result.metrics.total_return_pct
        );
        Ok(result)
    }
}

pub(crate) fn validate_capital(initial_capital: f64) -> Result<()> {
    if !(initial_capital.is_finite() && initial_capital > 0.0) {
        return Err(MosaicError::InvalidInput(format!(
            "initial capital must be positive, got {}",
            initial_capital
        )));
    }
    Ok(())
}
