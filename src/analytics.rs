//! Performance analytics and reporting.
//!
//! [`PerformanceMetrics::calculate`] scores one blended equity curve. The
//! annualization factor and the risk-free rate are policy values carried in
//! [`MetricsConfig`] rather than baked into the formulas.

use crate::error::{MosaicError, Result};
use crate::optimizer::{OptimizationReport, RankedResult};
use crate::portfolio::CombineResult;
use crate::viz::{allocation_bars, curve_sparkline, drawdown_sparkline};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{builder::Builder, settings::Style};

/// Policy constants used when scoring a curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Risk-free return, in percent, subtracted from the total return.
    #[serde(default = "default_risk_free_pct")]
    pub risk_free_pct: f64,
    /// Assumed periods per year used to annualize volatility.
    ///
    /// Fixed rather than inferred from the spacing of the dates.
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: f64,
}

fn default_risk_free_pct() -> f64 {
    2.0
}

fn default_periods_per_year() -> f64 {
    252.0
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            risk_free_pct: default_risk_free_pct(),
            periods_per_year: default_periods_per_year(),
        }
    }
}

/// Risk/return summary of one equity curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Last value of the curve.
    pub final_value: f64,
    /// Return over the whole curve relative to the initial capital, in percent.
    pub total_return_pct: f64,
    /// Sample standard deviation of per-step percentage returns.
    pub daily_return_stddev_pct: f64,
    /// Most negative peak-to-current decline, in percent (0 or below).
    pub max_drawdown_pct: f64,
    /// Per-step standard deviation scaled by the square root of periods per year.
    pub annualized_volatility_pct: f64,
    /// (total return - risk-free) / annualized volatility; 0 for a flat curve.
    pub sharpe_ratio: f64,
}

impl PerformanceMetrics {
    /// Score a curve given the capital it started from.
    ///
    /// Returns [`MosaicError::NoData`] for an empty curve.
    pub fn calculate(values: &[f64], initial_capital: f64, config: &MetricsConfig) -> Result<Self> {
        let final_value = *values.last().ok_or(MosaicError::NoData)?;
        let total_return_pct = (final_value - initial_capital) / initial_capital * 100.0;

        let returns = pct_returns(values);
        let daily_return_stddev_pct = sample_std_dev(&returns);
        let max_drawdown_pct = max_drawdown_pct(values);
        let annualized_volatility_pct = daily_return_stddev_pct * config.periods_per_year.sqrt();

        let sharpe_ratio = if annualized_volatility_pct > 0.0 {
            (total_return_pct - config.risk_free_pct) / annualized_volatility_pct
        } else {
            0.0
        };

        Ok(Self {
            final_value,
            total_return_pct,
            daily_return_stddev_pct,
            max_drawdown_pct,
            annualized_volatility_pct,
            sharpe_ratio,
        })
    }
}

/// Percentage change between consecutive values; the first step is dropped.
///
/// A step from 0 to 0 has no defined change and is skipped. A step away from
/// 0 is infinite and kept.
pub fn pct_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| (w[1] - w[0]) / w[0] * 100.0)
        .filter(|r| !r.is_nan())
        .collect()
}

/// Unbiased (n - 1) standard deviation. Fewer than two samples give 0.
pub fn sample_std_dev(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}

/// Drawdown from the running peak at every point, in percent.
pub fn drawdown_series(values: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    values
        .iter()
        .map(|&v| {
            peak = peak.max(v);
            (v - peak) / peak * 100.0
        })
        .collect()
}

/// Most negative drawdown over the curve; 0 for curves shorter than two points.
pub fn max_drawdown_pct(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    drawdown_series(values).into_iter().fold(0.0, f64::min)
}

/// Format results for terminal display.
pub struct ResultFormatter;

impl ResultFormatter {
    /// Print the outcome of a single explicit combination.
    pub fn print_combine_report(result: &CombineResult) {
        let metrics = &result.metrics;
        let curve = &result.curve;

        println!();
        println!("{}", "═".repeat(60).blue());
        println!("{}", " PORTFOLIO COMBINATION ".bold().blue());
        println!("{}", "═".repeat(60).blue());
        println!();

        println!("{}", "Composition".bold().underline());
        for line in allocation_bars(&result.allocation, 30).lines() {
            println!("  {}", line);
        }
        println!();

        println!("{}", "Overview".bold().underline());
        if let (Some(first), Some(last)) = (curve.first(), curve.last()) {
            println!("  Period:          {} to {}", first.date, last.date);
        }
        println!("  Common Dates:    {}", curve.len());
        println!("  Equity:          {}", curve_sparkline(curve, 40));
        println!("  Drawdown:        {}", drawdown_sparkline(curve, 40));
        println!();

        Self::print_metrics(metrics, result.initial_capital);
        println!("{}", "═".repeat(60).blue());
    }

    fn print_metrics(metrics: &PerformanceMetrics, initial_capital: f64) {
        println!("{}", "Performance".bold().underline());
        println!("  Initial Capital: ${:>12.2}", initial_capital);
        println!(
            "  Final Value:     ${:>12.2}  {}",
            metrics.final_value,
            Self::format_pct_change(metrics.total_return_pct)
        );
        println!("  Total Return:    {:>12.2}%", metrics.total_return_pct);
        println!();

        println!("{}", "Risk Metrics".bold().underline());
        println!("  Sharpe Ratio:    {:>12.4}", metrics.sharpe_ratio);
        println!("  Max Drawdown:    {:>12.2}%", metrics.max_drawdown_pct);
        println!("  Std Dev (daily): {:>12.2}%", metrics.daily_return_stddev_pct);
        println!("  Volatility:      {:>12.2}%", metrics.annualized_volatility_pct);
        println!();
    }

    /// Format percentage change with color.
    fn format_pct_change(pct: f64) -> String {
        if pct >= 0.0 {
            format!("(+{:.2}%)", pct).green().to_string()
        } else {
            format!("({:.2}%)", pct).red().to_string()
        }
    }

    /// Print the ranked results of a sweep as a table followed by each composition.
    pub fn print_rankings(report: &OptimizationReport) {
        println!();
        println!("{}", "═".repeat(100).blue());
        println!(
            "{}",
            format!(
                " TOP {} PORTFOLIO COMBINATIONS (Ranked by Sharpe Ratio) ",
                report.results.len()
            )
            .bold()
            .blue()
        );
        println!("{}", "═".repeat(100).blue());

        println!("{}", Self::rankings_table(&report.results));

        for result in &report.results {
            println!();
            println!("{}", format!("#{}", result.rank).bold());
            for (strategy, weight) in result.allocation.components() {
                println!("    {:>6.1}% - {}", weight * 100.0, strategy);
            }
            println!("    Equity: {}", curve_sparkline(&result.curve, 40));
        }

        println!();
        println!(
            "  Evaluated {} candidates, {} failed",
            report.candidate_count, report.failed_count
        );
    }

    /// Render ranked results as a table.
    pub fn rankings_table(results: &[RankedResult]) -> String {
        let mut builder = Builder::new();
        builder.push_record([
            "Rank", "Sharpe", "Return %", "Final Value", "Max DD %", "Std Dev %", "Volatility %",
        ]);

        for result in results {
            let m = &result.metrics;
            builder.push_record([
                result.rank.to_string(),
                format!("{:.4}", m.sharpe_ratio),
                format!("{:.2}", m.total_return_pct),
                format!("{:.2}", m.final_value),
                format!("{:.2}", m.max_drawdown_pct),
                format!("{:.2}", m.daily_return_stddev_pct),
                format!("{:.2}", m.annualized_volatility_pct),
            ]);
        }

        builder.build().with(Style::rounded()).to_string()
    }

    /// Serialize any result to pretty JSON.
    pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_hand_computed_blend() {
        // 50/50 blend of [100,110,120,90] and [100,105,100,140] on 20000.
        let values = [20000.0, 21500.0, 22000.0, 23000.0];
        let m = PerformanceMetrics::calculate(&values, 20000.0, &MetricsConfig::default()).unwrap();

        assert!((m.final_value - 23000.0).abs() < EPS);
        assert!((m.total_return_pct - 15.0).abs() < EPS);
        assert!((m.daily_return_stddev_pct - 2.5958872452944806).abs() < 1e-9);
        assert!((m.annualized_volatility_pct - 41.208432495682324).abs() < 1e-8);
        assert!((m.sharpe_ratio - 0.31546941275580176).abs() < 1e-9);
        assert_eq!(m.max_drawdown_pct, 0.0);
    }

    #[test]
    fn test_drawdown() {
        let values = [20000.0, 22000.0, 24000.0, 18000.0];
        let m = PerformanceMetrics::calculate(&values, 20000.0, &MetricsConfig::default()).unwrap();
        assert!((m.max_drawdown_pct + 25.0).abs() < EPS);
        assert!((m.total_return_pct + 10.0).abs() < EPS);
        assert!((m.sharpe_ratio + 0.03789116310912143).abs() < 1e-9);
    }

    #[test]
    fn test_flat_curve_has_zero_sharpe() {
        let values = [1000.0; 10];
        let m = PerformanceMetrics::calculate(&values, 1000.0, &MetricsConfig::default()).unwrap();
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.annualized_volatility_pct, 0.0);
        assert_eq!(m.max_drawdown_pct, 0.0);
    }

    #[test]
    fn test_single_point_curve() {
        let m = PerformanceMetrics::calculate(&[1100.0], 1000.0, &MetricsConfig::default()).unwrap();
        assert!((m.total_return_pct - 10.0).abs() < EPS);
        assert_eq!(m.daily_return_stddev_pct, 0.0);
        assert_eq!(m.max_drawdown_pct, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
    }

    #[test]
    fn test_empty_curve_is_no_data() {
        let err = PerformanceMetrics::calculate(&[], 1000.0, &MetricsConfig::default()).unwrap_err();
        assert!(matches!(err, MosaicError::NoData));
    }

    #[test]
    fn test_custom_policy_constants() {
        let values = [20000.0, 21500.0, 22000.0, 23000.0];
        let config = MetricsConfig {
            risk_free_pct: 0.0,
            periods_per_year: 1.0,
        };
        let m = PerformanceMetrics::calculate(&values, 20000.0, &config).unwrap();
        assert!((m.annualized_volatility_pct - m.daily_return_stddev_pct).abs() < EPS);
        assert!((m.sharpe_ratio - 15.0 / m.daily_return_stddev_pct).abs() < EPS);
    }

    #[test]
    fn test_pct_returns() {
        let r = pct_returns(&[100.0, 110.0, 99.0]);
        assert_eq!(r.len(), 2);
        assert!((r[0] - 10.0).abs() < EPS);
        assert!((r[1] + 10.0).abs() < EPS);
    }

    #[test]
    fn test_curve_reaching_zero() {
        let values = [20000.0, 10000.0, 0.0, 0.0];
        let m = PerformanceMetrics::calculate(&values, 20000.0, &MetricsConfig::default()).unwrap();

        // Returns are -50% and -100%; the flat 0 -> 0 step is skipped.
        assert_eq!(pct_returns(&values).len(), 2);
        assert!((m.daily_return_stddev_pct - 35.35533905932738).abs() < 1e-9);
        assert!((m.total_return_pct + 100.0).abs() < EPS);
        assert!((m.max_drawdown_pct + 100.0).abs() < EPS);
        assert!((m.sharpe_ratio + 0.18173764450044858).abs() < 1e-9);
    }

    #[test]
    fn test_drawdown_series() {
        let dd = drawdown_series(&[100.0, 120.0, 90.0, 130.0]);
        assert_eq!(dd[0], 0.0);
        assert_eq!(dd[1], 0.0);
        assert!((dd[2] + 25.0).abs() < EPS);
        assert_eq!(dd[3], 0.0);
    }
}
