mod commands;
mod config;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::correlation::CorrelationArgs;
use commands::forecast::ForecastArgs;
use commands::portfolio::{FrontierArgs, OptimiseArgs};
use commands::returns::{PerformanceArgs, ReturnsArgs};
use commands::risk::RiskArgs;
use commands::simulate::SimulateArgs;
use commands::valuation::{CapmArgs, DcfArgs, DcfSensitivityArgs};
use config::EngineConfig;

/// Correlated price forecasting, tail risk and valuation
#[derive(Parser)]
#[command(
    name = "qf",
    version,
    about = "Correlated price forecasting, tail risk and valuation",
    long_about = "A CLI for forecasting multi-asset price paths under correlated GBM, \
                  estimating VaR and expected shortfall (historical, parametric, Monte Carlo), \
                  and valuing equities with CAPM-driven DCF models."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// TOML file with engine defaults (qf.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a price series into returns with annualised statistics
    Returns(ReturnsArgs),
    /// Estimate covariance and correlation across aligned return series
    Correlation(CorrelationArgs),
    /// Simulate correlated GBM price paths
    Simulate(SimulateArgs),
    /// Value at Risk and expected shortfall
    Risk(RiskArgs),
    /// CAPM expected return
    Capm(CapmArgs),
    /// Per-share DCF valuation
    Dcf(DcfArgs),
    /// DCF intrinsic value over discount rate x terminal growth
    DcfSensitivity(DcfSensitivityArgs),
    /// Pick minimum variance, maximum Sharpe and maximum return frontier points
    Frontier(FrontierArgs),
    /// Closed-form minimum variance and tangency portfolios
    Optimise(OptimiseArgs),
    /// Sharpe ratio, drawdown, beta and rolling risk of a return series
    Performance(PerformanceArgs),
    /// Price history to simulated portfolio VaR / ES in one run
    Forecast(ForecastArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<Option<serde_json::Value>, Box<dyn std::error::Error>> {
    if let Commands::Version = cli.command {
        println!("qf {}", env!("CARGO_PKG_VERSION"));
        return Ok(None);
    }

    let config = EngineConfig::load(cli.config.as_deref())?;
    tracing::debug!(?config, "engine config");

    let value = match cli.command {
        Commands::Returns(args) => commands::returns::run_returns(args, &config),
        Commands::Correlation(args) => commands::correlation::run_correlation(args),
        Commands::Simulate(args) => commands::simulate::run_simulate(args, &config),
        Commands::Risk(args) => commands::risk::run_risk(args, &config),
        Commands::Capm(args) => commands::valuation::run_capm(args, &config),
        Commands::Dcf(args) => commands::valuation::run_dcf(args, &config),
        Commands::DcfSensitivity(args) => commands::valuation::run_dcf_sensitivity(args),
        Commands::Frontier(args) => commands::portfolio::run_frontier(args, &config),
        Commands::Optimise(args) => commands::portfolio::run_optimise(args, &config),
        Commands::Performance(args) => commands::returns::run_performance(args, &config),
        Commands::Forecast(args) => commands::forecast::run_forecast_command(args, &config),
        Commands::Version => return Ok(None),
    }?;
    Ok(Some(value))
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let format = cli.output.clone();

    match run(cli) {
        Ok(Some(value)) => {
            if let Err(e) = output::format_output(&format, &value) {
                eprintln!("{}: {}", "error".red().bold(), e);
                process::exit(1);
            }
            process::exit(0);
        }
        Ok(None) => process::exit(0),
        Err(e) => {
            tracing::debug!(error = %e, "command failed");
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
