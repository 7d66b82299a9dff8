use clap::Args;
use std::path::PathBuf;

use quant_forecast_core::correlation::matrix::align_series;
use quant_forecast_core::portfolio::frontier::{analyse_frontier, FrontierInput};
use quant_forecast_core::portfolio::optimiser::{
    annualised_moments, optimise_portfolio, OptimiserInput,
};
use quant_forecast_core::returns::series::{compute_returns, ReturnFrequency, ReturnKind};

use super::{envelope, load_json, CommandResult, FrequencyArg};
use crate::config::EngineConfig;
use crate::input::csv_series;

/// Arguments for selecting portfolios on an efficient frontier
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct FrontierArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Frontier CSV with `mean`, `StdDev` and `w.<ASSET>` columns
    #[arg(long, conflicts_with = "input")]
    pub csv: Option<PathBuf>,

    /// Annual risk-free rate
    #[arg(long)]
    pub risk_free_rate: Option<f64>,

    /// Period of the frontier's returns and risks
    #[arg(long, value_enum, default_value = "daily")]
    pub frequency: FrequencyArg,
}

/// Arguments for the closed-form minimum variance / tangency optimiser
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct OptimiseArgs {
    /// Path to JSON input file with annualised expected returns and covariance
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Wide `date,<ASSET>,...` price CSV to estimate the moments from
    #[arg(long, conflicts_with = "input")]
    pub csv: Option<PathBuf>,

    /// Annual risk-free rate
    #[arg(long)]
    pub risk_free_rate: Option<f64>,

    /// Observation frequency of the CSV prices
    #[arg(long, value_enum, default_value = "daily")]
    pub frequency: FrequencyArg,
}

pub fn run_frontier(args: FrontierArgs, config: &EngineConfig) -> CommandResult {
    let input: FrontierInput = if let Some(ref path) = args.csv {
        let (assets, points) = csv_series::read_frontier_csv(path)?;
        FrontierInput {
            assets,
            points,
            risk_free_rate: args.risk_free_rate.unwrap_or(config.risk_free_rate),
            frequency: args.frequency.into(),
        }
    } else {
        load_json(args.input.as_deref())?
            .ok_or("--csv or --input is required (or pipe JSON on stdin)")?
    };

    tracing::info!(
        assets = input.assets.len(),
        points = input.points.len(),
        "analysing efficient frontier"
    );
    envelope(analyse_frontier(&input)?, Vec::new())
}

pub fn run_optimise(args: OptimiseArgs, config: &EngineConfig) -> CommandResult {
    let risk_free_rate = args.risk_free_rate.unwrap_or(config.risk_free_rate);
    let input: OptimiserInput = if let Some(ref path) = args.csv {
        let frequency: ReturnFrequency = args.frequency.into();
        let periods = config
            .periods_per_year
            .unwrap_or_else(|| frequency.periods_per_year());
        let series = csv_series::read_wide_price_csv(path)?
            .iter()
            .map(|s| compute_returns(&s.asset, &s.prices, ReturnKind::Simple))
            .collect::<Result<Vec<_>, _>>()?;
        let aligned = align_series(&series)?;
        tracing::debug!(
            common_dates = aligned.num_dates(),
            periods_per_year = periods,
            "estimating annualised moments"
        );
        let (expected_returns, covariance) = annualised_moments(&aligned, periods)?;
        OptimiserInput {
            assets: aligned.assets,
            expected_returns,
            covariance,
            risk_free_rate,
        }
    } else {
        load_json(args.input.as_deref())?
            .ok_or("--csv or --input is required (or pipe JSON on stdin)")?
    };

    tracing::info!(assets = input.assets.len(), "optimising portfolio weights");
    envelope(optimise_portfolio(&input)?, Vec::new())
}
