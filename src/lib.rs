//! Mosaic - weighted blending and grid-search ranking of strategy equity curves.
//!
//! # Overview
//!
//! Every trading strategy leaves behind a daily equity curve. Mosaic combines
//! several such curves into one portfolio and searches the space of weights
//! for the allocations with the best risk-adjusted return:
//!
//! - **Curve loading**: one CSV per strategy under a results directory
//! - **Alignment**: curves are restricted to their common dates and rebased
//!   to the initial capital
//! - **Metrics**: total return, daily volatility, annualized volatility,
//!   maximum drawdown and Sharpe ratio
//! - **Grid search**: parallel sweep over a discretized weight simplex,
//!   ranked by Sharpe ratio
//! - **Configuration files**: TOML-based configuration for reproducible runs
//!
//! # Quick Start
//!
//! ```no_run
//! use mosaic::{CsvCurveStore, Combiner, StrategyRef, WeightVector};
//!
//! let strategies: Vec<StrategyRef> = vec![
//!     "0005.HK:Aggressive".parse().unwrap(),
//!     "0288.HK:Conservative".parse().unwrap(),
//! ];
//!
//! let combiner = Combiner::new(CsvCurveStore::new("trading_results"));
//! let result = combiner
//!     .combine(&strategies, &WeightVector::new(vec![0.6, 0.4]), 20_000.0)
//!     .unwrap();
//!
//! println!("Return: {:.2}%", result.metrics.total_return_pct);
//! println!("Sharpe: {:.4}", result.metrics.sharpe_ratio);
//! ```
//!
//! # Modules
//!
//! - [`types`]: Strategy identifiers, equity curves, weight vectors
//! - [`data`]: Curve loading from CSV files or memory
//! - [`portfolio`]: Alignment and weighted combination
//! - [`analytics`]: Performance metrics and reporting
//! - [`optimizer`]: Weight-space grid search
//! - [`export`]: CSV and JSON output
//! - [`viz`]: Terminal sparklines and allocation bars
//! - [`config`]: TOML configuration file support

pub mod analytics;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod optimizer;
pub mod portfolio;
pub mod types;
pub mod viz;

// Re-exports for convenience
pub use analytics::{MetricsConfig, PerformanceMetrics, ResultFormatter};
pub use config::MosaicFileConfig;
pub use data::{load_curve_csv, CsvCurveStore, CurveSource, LoaderConfig, MemoryCurveStore};
pub use error::{MosaicError, Result};
pub use optimizer::{
    GridEstimate, OptimizationReport, Optimizer, OptimizerConfig, RankedResult, SweepProgress,
    WeightGrid,
};
pub use portfolio::{AlignedCurves, BlendedCurve, CombineResult, Combiner};
pub use types::{EquityCurve, EquityPoint, PortfolioAllocation, StrategyRef, WeightVector};

// Export utilities
pub use export::{export_curve_csv, export_rankings_csv, export_report_json};

// Visualization utilities
pub use viz::{allocation_bars, curve_sparkline, sparkline};
