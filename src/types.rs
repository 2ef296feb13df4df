//! Core data types for the portfolio combination engine.

use crate::error::{MosaicError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Absolute tolerance on the raw weight sum.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Identifies one equity-curve source: a ticker traded under a named rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StrategyRef {
    pub ticker: String,
    pub strategy_type: String,
}

impl StrategyRef {
    /// Create a strategy reference. Both fields must be non-empty.
    pub fn new(ticker: impl Into<String>, strategy_type: impl Into<String>) -> Result<Self> {
        let ticker = ticker.into();
        let strategy_type = strategy_type.into();

        if ticker.trim().is_empty() || strategy_type.trim().is_empty() {
            return Err(MosaicError::InvalidInput(format!(
                "strategy needs a ticker and a type, got '{}:{}'",
                ticker, strategy_type
            )));
        }

        Ok(Self {
            ticker,
            strategy_type,
        })
    }
}

impl FromStr for StrategyRef {
    type Err = MosaicError;

    /// Parse the `ticker:type` form, e.g. `0288.HK:Aggressive`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 2 {
            return Err(MosaicError::InvalidInput(format!(
                "invalid strategy format '{}', use 'ticker:type' (e.g. 0288.HK:Aggressive)",
                s
            )));
        }
        StrategyRef::new(parts[0].trim(), parts[1].trim())
    }
}

impl fmt::Display for StrategyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.ticker, self.strategy_type)
    }
}

/// A single dated portfolio value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub value: f64,
}

impl EquityPoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Time series of portfolio values with strictly increasing dates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EquityCurve {
    points: Vec<EquityPoint>,
}

impl EquityCurve {
    /// Build a curve, checking dates are strictly increasing and values are
    /// finite and non-negative.
    pub fn new(points: Vec<EquityPoint>) -> Result<Self> {
        for (i, point) in points.iter().enumerate() {
            if !point.value.is_finite() || point.value < 0.0 {
                return Err(MosaicError::Malformed(format!(
                    "value {} on {} is not a non-negative number",
                    point.value, point.date
                )));
            }
            if i > 0 && points[i - 1].date >= point.date {
                return Err(MosaicError::Malformed(format!(
                    "dates must be strictly increasing: {} follows {}",
                    point.date,
                    points[i - 1].date
                )));
            }
        }
        Ok(Self { points })
    }

    /// Build a curve from parallel date/value slices.
    pub fn from_parts(dates: &[NaiveDate], values: &[f64]) -> Result<Self> {
        if dates.len() != values.len() {
            return Err(MosaicError::Malformed(format!(
                "{} dates but {} values",
                dates.len(),
                values.len()
            )));
        }
        Self::new(
            dates
                .iter()
                .zip(values)
                .map(|(&d, &v)| EquityPoint::new(d, v))
                .collect(),
        )
    }

    pub fn points(&self) -> &[EquityPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.iter().map(|p| p.date)
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn first(&self) -> Option<&EquityPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&EquityPoint> {
        self.points.last()
    }

    /// Value at an exact date, found by binary search.
    pub fn value_at(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|i| self.points[i].value)
    }
}

/// Capital allocation fractions, one per strategy, in strategy order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightVector(Vec<f64>);

impl WeightVector {
    /// Wrap raw weights without checking them.
    ///
    /// Use [`WeightVector::validate`] at the combine boundary.
    pub fn new(weights: Vec<f64>) -> Self {
        Self(weights)
    }

    /// Divide each weight by the vector's own sum so it totals exactly 1.0.
    pub fn renormalized(weights: &[f64]) -> Self {
        let sum: f64 = weights.iter().sum();
        Self(weights.iter().map(|w| w / sum).collect())
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    /// Check length against the strategy count, sign, and the sum tolerance.
    pub fn validate(&self, expected_len: usize) -> Result<()> {
        if self.0.len() != expected_len {
            return Err(MosaicError::InvalidWeights(format!(
                "number of weights ({}) doesn't match strategies ({})",
                self.0.len(),
                expected_len
            )));
        }
        if let Some(w) = self.0.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(MosaicError::InvalidWeights(format!(
                "weight {} is not a non-negative number",
                w
            )));
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(MosaicError::InvalidWeights(format!(
                "weights sum to {:.4}, not 1.0",
                sum
            )));
        }
        Ok(())
    }
}

impl From<Vec<f64>> for WeightVector {
    fn from(weights: Vec<f64>) -> Self {
        Self(weights)
    }
}

impl fmt::Display for WeightVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|w| format!("{:.1}%", w * 100.0)).collect();
        write!(f, "{}", parts.join(" + "))
    }
}

/// Strategies paired with the weights allocated to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioAllocation {
    pub strategies: Vec<StrategyRef>,
    pub weights: WeightVector,
}

impl PortfolioAllocation {
    pub fn new(strategies: Vec<StrategyRef>, weights: WeightVector) -> Self {
        Self {
            strategies,
            weights,
        }
    }

    /// Human-readable composition, e.g. `60.0% AAA (Aggressive) + 40.0% BBB (Conservative)`.
    pub fn composition(&self) -> String {
        self.components()
            .map(|(strategy, weight)| format!("{:.1}% {}", weight * 100.0, strategy))
            .collect::<Vec<_>>()
            .join(" + ")
    }

    pub fn components(&self) -> impl Iterator<Item = (&StrategyRef, f64)> {
        self.strategies
            .iter()
            .zip(self.weights.as_slice().iter().copied())
    }
}
