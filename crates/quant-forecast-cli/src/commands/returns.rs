use clap::Args;
use std::path::PathBuf;

use quant_forecast_core::returns::performance::{calculate_performance, PerformanceInput};
use quant_forecast_core::returns::series::{normalise_prices, NormaliseInput};

use super::{envelope, load_json, CommandResult, FrequencyArg, KindArg};
use crate::config::EngineConfig;
use crate::input::csv_series;

/// Arguments for price → return normalisation
#[derive(Args)]
pub struct ReturnsArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Path to a `date,price` CSV file
    #[arg(long, conflicts_with = "input")]
    pub csv: Option<PathBuf>,

    /// Asset name (defaults to the CSV file stem)
    #[arg(long)]
    pub asset: Option<String>,

    /// Return definition
    #[arg(long, value_enum, default_value = "simple")]
    pub kind: KindArg,

    /// Observation frequency
    #[arg(long, value_enum, default_value = "daily")]
    pub frequency: FrequencyArg,

    /// Periods per year, overriding the frequency
    #[arg(long)]
    pub periods_per_year: Option<f64>,
}

/// Arguments for performance analytics
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct PerformanceArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Path to a CSV file with a `return` column
    #[arg(long, conflicts_with = "input")]
    pub csv: Option<PathBuf>,

    /// Path to a CSV file of market returns on the same dates
    #[arg(long)]
    pub market_csv: Option<PathBuf>,

    /// Annual risk-free rate
    #[arg(long)]
    pub risk_free_rate: Option<f64>,

    #[arg(long, value_enum, default_value = "daily")]
    pub frequency: FrequencyArg,

    #[arg(long, default_value = "30")]
    pub volatility_window: usize,

    #[arg(long, default_value = "60")]
    pub beta_window: usize,
}

pub fn run_returns(args: ReturnsArgs, config: &EngineConfig) -> CommandResult {
    let input: NormaliseInput = if let Some(ref path) = args.csv {
        let asset = match args.asset {
            Some(a) => a,
            None => path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("asset")
                .to_string(),
        };
        NormaliseInput {
            asset,
            prices: csv_series::read_price_csv(path)?,
            kind: args.kind.into(),
            frequency: args.frequency.into(),
            periods_per_year: args.periods_per_year.or(config.periods_per_year),
        }
    } else {
        let mut input: NormaliseInput = load_json(args.input.as_deref())?
            .ok_or("--csv or --input is required (or pipe JSON on stdin)")?;
        if input.periods_per_year.is_none() {
            input.periods_per_year = args.periods_per_year.or(config.periods_per_year);
        }
        input
    };

    tracing::info!(
        asset = %input.asset,
        prices = input.prices.len(),
        "normalising price series"
    );
    let result = normalise_prices(&input)?;
    envelope(result, Vec::new())
}

pub fn run_performance(args: PerformanceArgs, config: &EngineConfig) -> CommandResult {
    let input: PerformanceInput = if let Some(ref path) = args.csv {
        let market_returns = match args.market_csv {
            Some(ref m) => Some(csv_series::read_return_csv(m)?),
            None => None,
        };
        PerformanceInput {
            returns: csv_series::read_return_csv(path)?,
            market_returns,
            risk_free_rate: args.risk_free_rate.unwrap_or(config.risk_free_rate),
            frequency: args.frequency.into(),
            volatility_window: args.volatility_window,
            beta_window: args.beta_window,
        }
    } else {
        load_json(args.input.as_deref())?
            .ok_or("--csv or --input is required (or pipe JSON on stdin)")?
    };

    tracing::info!(
        observations = input.returns.len(),
        benchmark = input.market_returns.is_some(),
        "calculating performance"
    );
    let result = calculate_performance(&input)?;
    envelope(result, Vec::new())
}
