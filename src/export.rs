//! Export utilities for optimizer output.
//!
//! | Artifact | Format |
//! |----------|--------|
//! | Ranked allocations | CSV, JSON |
//! | Blended curve | CSV (`Date,Portfolio_Value`), readable by the curve loader |
//!
//! Every export overwrites its target; nothing is appended.

use crate::error::{MosaicError, Result};
use crate::optimizer::{OptimizationReport, RankedResult};
use crate::types::{EquityCurve, EquityPoint};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

/// One row of the rankings table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRow {
    #[serde(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Sharpe_Ratio")]
    pub sharpe_ratio: f64,
    #[serde(rename = "Total_Return_%")]
    pub total_return_pct: f64,
    #[serde(rename = "Final_Value")]
    pub final_value: f64,
    #[serde(rename = "Max_Drawdown_%")]
    pub max_drawdown_pct: f64,
    #[serde(rename = "Std_Dev_%")]
    pub daily_return_stddev_pct: f64,
    #[serde(rename = "Volatility_%")]
    pub annualized_volatility_pct: f64,
    #[serde(rename = "Portfolio")]
    pub portfolio: String,
}

impl RankingRow {
    pub fn from_result(result: &RankedResult) -> Self {
        let m = &result.metrics;
        Self {
            rank: result.rank,
            sharpe_ratio: m.sharpe_ratio,
            total_return_pct: m.total_return_pct,
            final_value: m.final_value,
            max_drawdown_pct: m.max_drawdown_pct,
            daily_return_stddev_pct: m.daily_return_stddev_pct,
            annualized_volatility_pct: m.annualized_volatility_pct,
            portfolio: result.allocation.composition(),
        }
    }
}

#[derive(Serialize)]
struct CurveRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Portfolio_Value")]
    value: f64,
}

impl CurveRow {
    fn from_point(point: &EquityPoint) -> Self {
        Self {
            date: point.date.format("%Y-%m-%d").to_string(),
            value: point.value,
        }
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Write the ranked results as CSV.
pub fn export_rankings_csv(results: &[RankedResult], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let mut writer = csv::Writer::from_path(path)?;
    for result in results {
        writer.serialize(RankingRow::from_result(result))?;
    }
    writer.flush()?;

    info!("Rankings saved to: {}", path.display());
    Ok(())
}

/// Render the ranked results as CSV text, header included.
pub fn rankings_to_csv(results: &[RankedResult]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for result in results {
        writer.serialize(RankingRow::from_result(result))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| MosaicError::IoError(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Render a curve as `Date,Portfolio_Value` CSV text.
pub fn curve_to_csv(curve: &EquityCurve) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for point in curve.points() {
        writer.serialize(CurveRow::from_point(point))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| MosaicError::IoError(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write the whole report, curves included, as pretty JSON.
pub fn export_report_json(report: &OptimizationReport, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, report)?;

    info!("Report saved to: {}", path.display());
    Ok(())
}

/// Write a curve as `Date,Portfolio_Value` CSV.
pub fn export_curve_csv(curve: &EquityCurve, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let mut writer = csv::Writer::from_path(path)?;
    for point in curve.points() {
        writer.serialize(CurveRow::from_point(point))?;
    }
    writer.flush()?;

    info!("Blended curve saved to: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{MetricsConfig, PerformanceMetrics};
    use crate::data::{load_curve_csv, LoaderConfig};
    use crate::types::{PortfolioAllocation, WeightVector};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn ranked(rank: usize) -> RankedResult {
        let dates: Vec<NaiveDate> = (1..=3)
            .map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
            .collect();
        let curve = EquityCurve::from_parts(&dates, &[1000.0, 1100.0, 1050.0]).unwrap();
        RankedResult {
            rank,
            allocation: PortfolioAllocation::new(
                vec!["AAA:Aggressive".parse().unwrap(), "BBB:Conservative".parse().unwrap()],
                WeightVector::new(vec![0.7, 0.3]),
            ),
            metrics: PerformanceMetrics::calculate(
                &curve.values(),
                1000.0,
                &MetricsConfig::default(),
            )
            .unwrap(),
            curve,
        }
    }

    #[test]
    fn test_rankings_csv() {
        let csv = rankings_to_csv(&[ranked(1), ranked(2)]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(
            lines[0],
            "Rank,Sharpe_Ratio,Total_Return_%,Final_Value,Max_Drawdown_%,Std_Dev_%,Volatility_%,Portfolio"
        );
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("1,"));
        assert!(lines[1].ends_with("70.0% AAA (Aggressive) + 30.0% BBB (Conservative)"));
    }

    #[test]
    fn test_export_rankings_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("optimal_portfolios.csv");

        export_rankings_csv(&[ranked(1), ranked(2)], &path).unwrap();
        export_rankings_csv(&[ranked(1)], &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_curve_export_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blend.csv");
        let original = ranked(1).curve;

        export_curve_csv(&original, &path).unwrap();
        let loaded = load_curve_csv(&path, &LoaderConfig::default()).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_curve_csv_text() {
        let csv = curve_to_csv(&ranked(1).curve).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Date,Portfolio_Value");
        assert_eq!(lines[1], "2024-01-01,1000.0");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_report_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        let report = OptimizationReport {
            strategies: ranked(1).allocation.strategies,
            initial_capital: 1000.0,
            candidate_count: 11,
            failed_count: 0,
            results: vec![ranked(1)],
            diagnostic: None,
        };

        export_report_json(&report, &path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["candidate_count"], 11);
        assert_eq!(json["results"][0]["rank"], 1);
    }
}
