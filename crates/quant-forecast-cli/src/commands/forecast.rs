use clap::Args;
use std::path::PathBuf;

use quant_forecast_core::forecast::{run_forecast, ForecastInput, WeightSource};
use quant_forecast_core::returns::series::ReturnFrequency;

use super::{envelope, load_json_value, CommandResult, FrequencyArg, InputLayer};
use crate::config::EngineConfig;
use crate::input::csv_series;

/// Arguments for the end-to-end history → forecast → risk pipeline
#[derive(Args)]
pub struct ForecastArgs {
    /// Path to JSON input file with price series per asset
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Wide `date,<ASSET>,...` price CSV
    #[arg(long, conflicts_with = "input")]
    pub csv: Option<PathBuf>,

    /// Comma-separated portfolio weights (minimum variance when omitted)
    #[arg(long, value_delimiter = ',')]
    pub weights: Option<Vec<f64>>,

    /// Observation frequency of the prices
    #[arg(long, value_enum)]
    pub frequency: Option<FrequencyArg>,

    /// Steps to simulate
    #[arg(long)]
    pub horizon: Option<usize>,

    /// Number of scenarios
    #[arg(long)]
    pub scenarios: Option<usize>,

    /// Confidence level for VaR / ES
    #[arg(long)]
    pub confidence: Option<f64>,

    /// Random seed for reproducible paths
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run_forecast_command(args: ForecastArgs, config: &EngineConfig) -> CommandResult {
    let mut value = match args.csv {
        Some(ref path) => {
            let series = csv_series::read_wide_price_csv(path)?;
            serde_json::json!({ "series": series })
        }
        None => load_json_value(args.input.as_deref())?
            .ok_or("--csv or --input is required (or pipe JSON on stdin)")?,
    };

    let frequency = match args.frequency {
        Some(f) => Some(serde_json::to_value(ReturnFrequency::from(f))?),
        None => None,
    };
    InputLayer::new(&mut value)?
        .default_to("confidence_level", config.confidence_level)
        .default_to("mc_draws", config.mc_draws)
        .default_to("sample_paths", config.sample_paths)
        .default_opt("seed", config.seed)
        .set_opt("weights", args.weights)
        .set_opt("frequency", frequency)
        .set_opt("horizon", args.horizon)
        .set_opt("scenarios", args.scenarios)
        .set_opt("confidence_level", args.confidence)
        .set_opt("seed", args.seed);
    let input: ForecastInput = serde_json::from_value(value)?;

    tracing::info!(
        assets = input.series.len(),
        horizon = input.horizon,
        scenarios = input.scenarios,
        seed = ?input.seed,
        "running forecast pipeline"
    );
    let result = run_forecast(&input)?;
    if result.result.weight_source == WeightSource::MinimumVariance {
        tracing::info!(weights = ?result.result.weights, "using minimum variance weights");
    }
    envelope(result, Vec::new())
}
