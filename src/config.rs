//! Configuration file support.
//!
//! A run can be described in a TOML file for reproducibility: which
//! strategies to combine, where their curves live, how fine the weight grid
//! is, and where to write the rankings.

use crate::analytics::MetricsConfig;
use crate::data::LoaderConfig;
use crate::error::{MosaicError, Result};
use crate::optimizer::OptimizerConfig;
use crate::types::{StrategyRef, WeightVector};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Complete run configuration loaded from a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MosaicFileConfig {
    #[serde(default)]
    pub portfolio: PortfolioSettings,
    #[serde(default)]
    pub optimizer: OptimizerSettings,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub data: LoaderConfig,
    #[serde(default)]
    pub output: OutputSettings,
}

/// Which strategies to combine and with how much capital.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSettings {
    /// Strategies as `ticker:type`.
    #[serde(default)]
    pub strategies: Vec<String>,
    #[serde(default = "default_capital")]
    pub initial_capital: f64,
    /// Directory holding one sub-directory per strategy.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

fn default_capital() -> f64 {
    20_000.0
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("trading_results")
}

impl Default for PortfolioSettings {
    fn default() -> Self {
        Self {
            strategies: Vec::new(),
            initial_capital: default_capital(),
            results_dir: default_results_dir(),
        }
    }
}

/// Grid search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerSettings {
    #[serde(default = "default_weight_step")]
    pub weight_step: f64,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_true")]
    pub parallel: bool,
    /// Explicit weights; when set the run combines once instead of sweeping.
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
}

fn default_weight_step() -> f64 {
    0.1
}

fn default_top_n() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            weight_step: default_weight_step(),
            top_n: default_top_n(),
            parallel: true,
            weights: None,
        }
    }
}

/// Where results are written. Relative paths resolve against the results directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default = "default_rankings_csv")]
    pub rankings_csv: PathBuf,
    #[serde(default)]
    pub report_json: Option<PathBuf>,
    /// Curve of the best allocation, as `Date,Portfolio_Value`.
    #[serde(default)]
    pub best_curve_csv: Option<PathBuf>,
}

fn default_rankings_csv() -> PathBuf {
    PathBuf::from("optimal_portfolios.csv")
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            rankings_csv: default_rankings_csv(),
            report_json: None,
            best_curve_csv: None,
        }
    }
}

impl MosaicFileConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        let config: MosaicFileConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| MosaicError::ConfigError(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Parsed strategy list; at least one is required.
    pub fn strategies(&self) -> Result<Vec<StrategyRef>> {
        if self.portfolio.strategies.is_empty() {
            return Err(MosaicError::ConfigError(
                "no strategies listed under [portfolio]".to_string(),
            ));
        }
        self.portfolio
            .strategies
            .iter()
            .map(|s| s.parse())
            .collect()
    }

    /// Explicit weights, checked for count against the strategy list.
    pub fn weights(&self) -> Result<Option<WeightVector>> {
        match &self.optimizer.weights {
            None => Ok(None),
            Some(weights) if weights.len() != self.portfolio.strategies.len() => {
                Err(MosaicError::InvalidWeights(format!(
                    "number of weights ({}) doesn't match strategies ({})",
                    weights.len(),
                    self.portfolio.strategies.len()
                )))
            }
            Some(weights) => Ok(Some(WeightVector::new(weights.clone()))),
        }
    }

    /// Convert to the optimizer's runtime configuration.
    pub fn to_optimizer_config(&self) -> Result<OptimizerConfig> {
        let step = self.optimizer.weight_step;
        if !(step > 0.0 && step <= 1.0) {
            return Err(MosaicError::ConfigError(format!(
                "weight_step must be in (0, 1], got {}",
                step
            )));
        }
        if self.optimizer.top_n == 0 {
            return Err(MosaicError::ConfigError("top_n must be at least 1".to_string()));
        }
        if !(self.portfolio.initial_capital > 0.0) {
            return Err(MosaicError::ConfigError(format!(
                "initial_capital must be positive, got {}",
                self.portfolio.initial_capital
            )));
        }

        Ok(OptimizerConfig {
            weight_step: step,
            top_k: self.optimizer.top_n,
            initial_capital: self.portfolio.initial_capital,
            parallel: self.optimizer.parallel,
            metrics: self.metrics,
        })
    }

    /// Resolve an output path against the results directory.
    pub fn output_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.portfolio.results_dir.join(path)
        }
    }

    /// Generate an example configuration file content.
    pub fn example() -> String {
        r#"# Mosaic configuration file

[portfolio]
strategies = ["0005.HK:Aggressive", "0288.HK:Conservative", "0700.HK:Aggressive"]
initial_capital = 20000.0
results_dir = "trading_results"

[optimizer]
weight_step = 0.1
top_n = 10
parallel = true
# Evaluate a single allocation instead of sweeping the grid:
# weights = [0.5, 0.3, 0.2]

[metrics]
risk_free_pct = 2.0
periods_per_year = 252.0

[data]
value_column = "Portfolio_Value"
file_name = "portfolio_history.csv"
# date_format = "%Y-%m-%d"
# delimiter = ","

[output]
rankings_csv = "optimal_portfolios.csv"
# report_json = "optimal_portfolios.json"
# best_curve_csv = "best_portfolio_history.csv"
"#
        .to_string()
    }
}
