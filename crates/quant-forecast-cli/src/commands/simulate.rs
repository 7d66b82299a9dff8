use clap::Args;
use std::path::PathBuf;

use quant_forecast_core::simulation::{run_simulation, SimulationInput};

use super::{envelope, load_json_value, CommandResult, InputLayer};
use crate::config::EngineConfig;

/// Arguments for correlated GBM path simulation
#[derive(Args)]
pub struct SimulateArgs {
    /// Path to JSON input file (assets, prices, drifts, volatilities, correlation)
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Number of scenarios
    #[arg(long)]
    pub scenarios: Option<usize>,

    /// Steps to simulate
    #[arg(long)]
    pub horizon: Option<usize>,

    /// Random seed for reproducible paths
    #[arg(long)]
    pub seed: Option<u64>,

    /// Confidence level for forward VaR / ES
    #[arg(long)]
    pub confidence: Option<f64>,
}

pub fn run_simulate(args: SimulateArgs, config: &EngineConfig) -> CommandResult {
    let mut value = load_json_value(args.input.as_deref())?
        .ok_or("--input is required (or pipe JSON on stdin)")?;
    InputLayer::new(&mut value)?
        .default_opt("seed", config.seed)
        .default_opt("dt", config.periods_per_year.map(|p| 1.0 / p))
        .default_to("confidence_level", config.confidence_level)
        .default_to("sample_paths", config.sample_paths)
        .default_to("mc_draws", config.mc_draws)
        .set_opt("scenarios", args.scenarios)
        .set_opt("horizon", args.horizon)
        .set_opt("seed", args.seed)
        .set_opt("confidence_level", args.confidence);
    let input: SimulationInput = serde_json::from_value(value)?;

    tracing::info!(
        assets = input.assets.len(),
        scenarios = input.scenarios,
        horizon = input.horizon,
        seed = ?input.seed,
        "simulating correlated price paths"
    );
    let result = run_simulation(&input)?;
    envelope(result, Vec::new())
}
