//! Command-line interface for the portfolio combination engine.

use mosaic::analytics::{MetricsConfig, PerformanceMetrics, ResultFormatter};
use mosaic::config::MosaicFileConfig;
use mosaic::data::{CsvCurveStore, CurveSource};
use mosaic::error::{MosaicError, Result};
use mosaic::export::{
    curve_to_csv, export_curve_csv, export_rankings_csv, export_report_json, rankings_to_csv,
};
use mosaic::optimizer::{
    OptimizationReport, Optimizer, OptimizerConfig, SweepProgress, WeightGrid,
};
use mosaic::portfolio::{AlignedCurves, CombineResult, Combiner};
use mosaic::types::{StrategyRef, WeightVector};

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_RANKINGS_FILE: &str = "optimal_portfolios.csv";

/// Mosaic - blend strategy equity curves and search for the best weights.
#[derive(Parser)]
#[command(name = "mosaic")]
#[command(version)]
#[command(about = "Combine strategy equity curves and rank weight allocations by Sharpe ratio")]
#[command(long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Blend strategies under explicit weights
    Combine {
        /// Strategies as TICKER:TYPE
        #[arg(short, long, num_args = 1.., required = true)]
        strategies: Vec<StrategyRef>,

        /// One weight per strategy, summing to 1
        #[arg(short, long, num_args = 1.., required = true)]
        weights: Vec<f64>,

        /// Initial capital
        #[arg(short, long, default_value = "20000")]
        capital: f64,

        /// Directory holding one sub-directory per strategy
        #[arg(short, long, default_value = "trading_results")]
        results_dir: PathBuf,

        /// Annual risk-free rate in percent
        #[arg(long, default_value = "2.0")]
        risk_free: f64,

        /// Write the blended curve to this CSV file
        #[arg(long)]
        save_curve: Option<PathBuf>,
    },

    /// Search the weight grid for the best Sharpe ratios
    Optimize {
        /// Strategies as TICKER:TYPE
        #[arg(short, long, num_args = 1.., required = true)]
        strategies: Vec<StrategyRef>,

        /// Initial capital
        #[arg(short, long, default_value = "20000")]
        capital: f64,

        /// Directory holding one sub-directory per strategy
        #[arg(short, long, default_value = "trading_results")]
        results_dir: PathBuf,

        /// Weight increment
        #[arg(long, default_value = "0.1")]
        step: f64,

        /// Number of ranked allocations to keep
        #[arg(short = 'n', long, default_value = "10")]
        top_n: usize,

        /// Annual risk-free rate in percent
        #[arg(long, default_value = "2.0")]
        risk_free: f64,

        /// Evaluate candidates on a single thread
        #[arg(long)]
        sequential: bool,

        /// Rankings CSV (defaults to <results-dir>/optimal_portfolios.csv)
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Also write the full report as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        /// Write the curve of the best allocation to this CSV file
        #[arg(long)]
        best_curve: Option<PathBuf>,
    },

    /// Show how many candidates a weight grid produces
    Grid {
        /// Number of strategies
        #[arg(short = 'n', long)]
        strategies: usize,

        /// Weight increment
        #[arg(long, default_value = "0.1")]
        step: f64,
    },

    /// Check that strategy curves load and share dates
    Validate {
        /// Strategies as TICKER:TYPE
        #[arg(short, long, num_args = 1.., required = true)]
        strategies: Vec<StrategyRef>,

        /// Directory holding one sub-directory per strategy
        #[arg(short, long, default_value = "trading_results")]
        results_dir: PathBuf,

        /// Capital used for the standalone metrics
        #[arg(short, long, default_value = "20000")]
        capital: f64,
    },

    /// Generate an example configuration file
    Init {
        /// Output path for config file
        #[arg(short, long, default_value = "mosaic.toml")]
        output: PathBuf,
    },

    /// Run from a configuration file
    RunConfig {
        /// Path to TOML configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

/// Files an optimization run writes.
struct OptimizeTargets {
    rankings_csv: PathBuf,
    report_json: Option<PathBuf>,
    best_curve_csv: Option<PathBuf>,
}

impl Cli {
    /// Initialize logging based on verbosity level.
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();

        // Already set when embedded in a host that installed its own.
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

/// Run the CLI application.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();

    match &cli.command {
        Commands::Combine {
            strategies,
            weights,
            capital,
            results_dir,
            risk_free,
            save_curve,
        } => {
            let metrics = MetricsConfig {
                risk_free_pct: *risk_free,
                ..Default::default()
            };
            let store = CsvCurveStore::new(results_dir);
            run_combine(
                store,
                strategies,
                weights,
                *capital,
                metrics,
                save_curve.as_deref(),
                cli.output,
            )
        }

        Commands::Optimize {
            strategies,
            capital,
            results_dir,
            step,
            top_n,
            risk_free,
            sequential,
            csv,
            json,
            best_curve,
        } => {
            let config = OptimizerConfig {
                weight_step: *step,
                top_k: *top_n,
                initial_capital: *capital,
                parallel: !*sequential,
                metrics: MetricsConfig {
                    risk_free_pct: *risk_free,
                    ..Default::default()
                },
            };
            let targets = OptimizeTargets {
                rankings_csv: csv
                    .clone()
                    .unwrap_or_else(|| results_dir.join(DEFAULT_RANKINGS_FILE)),
                report_json: json.clone(),
                best_curve_csv: best_curve.clone(),
            };
            run_optimize(
                CsvCurveStore::new(results_dir),
                strategies,
                config,
                &targets,
                cli.output,
            )
        }

        Commands::Grid { strategies, step } => print_grid(*strategies, *step, cli.output),

        Commands::Validate {
            strategies,
            results_dir,
            capital,
        } => validate_curves(&CsvCurveStore::new(results_dir), strategies, *capital),

        Commands::Init { output } => init_config(output),

        Commands::RunConfig { config } => run_from_config(config, cli.output),
    }
}

fn check_weight_count(strategies: &[StrategyRef], weights: &[f64]) -> Result<()> {
    if strategies.len() != weights.len() {
        return Err(MosaicError::InvalidWeights(format!(
            "number of weights ({}) doesn't match strategies ({})",
            weights.len(),
            strategies.len()
        )));
    }
    Ok(())
}

fn run_combine<S: CurveSource>(
    source: S,
    strategies: &[StrategyRef],
    weights: &[f64],
    capital: f64,
    metrics: MetricsConfig,
    save_curve: Option<&Path>,
    output: OutputFormat,
) -> Result<()> {
    check_weight_count(strategies, weights)?;

    let combiner = Combiner::with_metrics(source, metrics);
    let result = combiner.combine(strategies, &WeightVector::new(weights.to_vec()), capital)?;

    if let Some(path) = save_curve {
        export_curve_csv(&result.curve, path)?;
    }

    print_combine(&result, output)
}

fn print_combine(result: &CombineResult, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Text => ResultFormatter::print_combine_report(result),
        OutputFormat::Json => println!("{}", ResultFormatter::to_json(result)?),
        OutputFormat::Csv => print!("{}", curve_to_csv(&result.curve)?),
    }
    Ok(())
}

fn sweep_progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

fn run_optimize<S: CurveSource>(
    source: S,
    strategies: &[StrategyRef],
    config: OptimizerConfig,
    targets: &OptimizeTargets,
    output: OutputFormat,
) -> Result<()> {
    let optimizer = Optimizer::new(source, config);
    let estimate = optimizer.grid(strategies)?.estimate();

    let report = if output == OutputFormat::Text {
        println!(
            "Testing {} weight combinations for {} strategies...",
            estimate.candidates,
            strategies.len()
        );
        let pb = sweep_progress_bar(estimate.candidates);
        let observer = |done: usize, _total: usize| pb.set_position(done as u64);
        let progress: &dyn SweepProgress = &observer;
        let report = optimizer.run(strategies, Some(progress));
        pb.finish_and_clear();
        report?
    } else {
        optimizer.run(strategies, None)?
    };

    if report.is_empty() {
        match output {
            OutputFormat::Json => println!("{}", ResultFormatter::to_json(&report)?),
            // Keep stdout a valid (empty) CSV document.
            OutputFormat::Csv => eprint!("{}", empty_report_message(&report)),
            OutputFormat::Text => print!("{}", empty_report_message(&report)),
        }
        return Ok(());
    }

    write_optimize_artifacts(&report, targets)?;

    match output {
        OutputFormat::Text => {
            ResultFormatter::print_rankings(&report);
            println!();
            println!("Results saved to: {}", targets.rankings_csv.display());
        }
        OutputFormat::Json => println!("{}", ResultFormatter::to_json(&report)?),
        OutputFormat::Csv => print!("{}", rankings_to_csv(&report.results)?),
    }

    Ok(())
}

fn empty_report_message(report: &OptimizationReport) -> String {
    let mut message = String::from("No valid portfolio combinations found.\n");
    if let Some(reason) = &report.diagnostic {
        message.push_str(&format!("  Reason: {}\n", reason));
    }
    message
}

fn write_optimize_artifacts(report: &OptimizationReport, targets: &OptimizeTargets) -> Result<()> {
    export_rankings_csv(&report.results, &targets.rankings_csv)?;

    if let Some(path) = &targets.report_json {
        export_report_json(report, path)?;
    }
    if let (Some(path), Some(best)) = (&targets.best_curve_csv, report.best()) {
        export_curve_csv(&best.curve, path)?;
    }
    Ok(())
}

fn print_grid(strategies: usize, step: f64, output: OutputFormat) -> Result<()> {
    let grid = WeightGrid::new(strategies, step)?;
    let estimate = grid.estimate();

    match output {
        OutputFormat::Json => println!("{}", ResultFormatter::to_json(&estimate)?),
        OutputFormat::Csv => {
            println!("strategies,step,levels,raw_size,candidates");
            println!(
                "{},{},{},{},{}",
                strategies, step, estimate.levels, estimate.raw_size, estimate.candidates
            );
        }
        OutputFormat::Text => {
            println!("\nWeight Grid:");
            println!("  Strategies:   {}", strategies);
            println!("  Step:         {}", step);
            println!("  Levels:       {}", estimate.levels);
            println!("  Full product: {}", estimate.raw_size);
            println!("  Candidates:   {}", estimate.candidates);
        }
    }
    Ok(())
}

fn validate_curves(
    store: &CsvCurveStore,
    strategies: &[StrategyRef],
    capital: f64,
) -> Result<()> {
    println!("Validating curves under: {}", store.results_dir().display());

    let mut curves = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        let curve = store.load(strategy)?;
        println!("\n{}", strategy);
        println!("  File: {}", store.path_for(strategy).display());
        println!("  Rows: {}", curve.len());
        if let (Some(first), Some(last)) = (curve.first(), curve.last()) {
            println!("  Start: {} ({:.2})", first.date, first.value);
            println!("  End: {} ({:.2})", last.date, last.value);
        }

        // Standalone, rebased to `capital`.
        let standalone =
            AlignedCurves::new(std::slice::from_ref(&curve))?.blend_values(&[1.0], capital);
        let metrics =
            PerformanceMetrics::calculate(&standalone, capital, &MetricsConfig::default())?;
        println!("  Return: {:.2}%", metrics.total_return_pct);
        println!("  Sharpe: {:.4}", metrics.sharpe_ratio);
        println!("  Max Drawdown: {:.2}%", metrics.max_drawdown_pct);
        curves.push(curve);
    }

    let aligned = AlignedCurves::new(&curves)?;
    println!("\nCommon dates: {}", aligned.len());
    if let (Some(first), Some(last)) = (aligned.dates().first(), aligned.dates().last()) {
        println!("  Range: {} to {}", first, last);
    }

    println!("\nValidation: PASSED");
    Ok(())
}

fn init_config(output: &PathBuf) -> Result<()> {
    fs::write(output, MosaicFileConfig::example())?;
    println!("Created example configuration file: {}", output.display());
    println!("\nEdit this file to list your strategies, then run:");
    println!("  mosaic run-config -c {}", output.display());
    Ok(())
}

fn run_from_config(config_path: &PathBuf, output: OutputFormat) -> Result<()> {
    let file_config = MosaicFileConfig::load(config_path)?;
    let strategies = file_config.strategies()?;
    let optimizer_config = file_config.to_optimizer_config()?;
    let store =
        CsvCurveStore::with_config(&file_config.portfolio.results_dir, file_config.data.clone());

    if let Some(weights) = file_config.weights()? {
        info!("Explicit weights given, combining once");
        let best_curve = file_config
            .output
            .best_curve_csv
            .as_ref()
            .map(|p| file_config.output_path(p));
        return run_combine(
            store,
            &strategies,
            weights.as_slice(),
            optimizer_config.initial_capital,
            optimizer_config.metrics,
            best_curve.as_deref(),
            output,
        );
    }

    let targets = OptimizeTargets {
        rankings_csv: file_config.output_path(&file_config.output.rankings_csv),
        report_json: file_config
            .output
            .report_json
            .as_ref()
            .map(|p| file_config.output_path(p)),
        best_curve_csv: file_config
            .output
            .best_curve_csv
            .as_ref()
            .map(|p| file_config.output_path(p)),
    };
    run_optimize(store, &strategies, optimizer_config, &targets, output)
}
