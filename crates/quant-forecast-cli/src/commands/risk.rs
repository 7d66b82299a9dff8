use clap::{Args, ValueEnum};
use std::path::PathBuf;

use quant_forecast_core::risk::var::{estimate_risk, RiskInput};
use quant_forecast_core::risk::RiskMethod;

use super::{envelope, load_json_value, CommandResult, InputLayer};
use crate::config::EngineConfig;
use crate::input::csv_series;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MethodArg {
    Historical,
    Parametric,
    MonteCarlo,
}

impl From<MethodArg> for RiskMethod {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::Historical => RiskMethod::Historical,
            MethodArg::Parametric => RiskMethod::Parametric,
            MethodArg::MonteCarlo => RiskMethod::MonteCarlo,
        }
    }
}

/// Arguments for VaR / ES estimation
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct RiskArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Path to a CSV file with a `return` column
    #[arg(long, conflicts_with_all = ["input", "returns"])]
    pub csv: Option<PathBuf>,

    /// Comma-separated periodic returns
    #[arg(long, value_delimiter = ',', conflicts_with = "input")]
    pub returns: Option<Vec<f64>>,

    /// Confidence level, e.g. 0.95
    #[arg(long)]
    pub confidence: Option<f64>,

    /// Methods to run (repeatable; all three by default)
    #[arg(long = "method", value_enum)]
    pub methods: Vec<MethodArg>,

    /// Monte Carlo draw count
    #[arg(long)]
    pub mc_draws: Option<usize>,

    /// Random seed for the Monte Carlo method
    #[arg(long)]
    pub seed: Option<u64>,

    /// Portfolio value for monetary loss amounts
    #[arg(long)]
    pub portfolio_value: Option<f64>,
}

pub fn run_risk(args: RiskArgs, config: &EngineConfig) -> CommandResult {
    let returns = match (&args.csv, args.returns) {
        (Some(path), _) => Some(csv_series::read_return_csv(path)?),
        (None, Some(r)) => Some(r),
        (None, None) => None,
    };

    let input: RiskInput = match returns {
        Some(returns) => RiskInput {
            returns,
            confidence_level: args.confidence.unwrap_or(config.confidence_level),
            methods: None,
            mc_draws: args.mc_draws.unwrap_or(config.mc_draws),
            seed: args.seed.or(config.seed),
            portfolio_value: args.portfolio_value,
        },
        None => {
            let mut value = load_json_value(args.input.as_deref())?
                .ok_or("--csv, --returns or --input is required (or pipe JSON on stdin)")?;
            InputLayer::new(&mut value)?
                .default_to("confidence_level", config.confidence_level)
                .default_to("mc_draws", config.mc_draws)
                .default_opt("seed", config.seed)
                .set_opt("confidence_level", args.confidence)
                .set_opt("mc_draws", args.mc_draws)
                .set_opt("seed", args.seed)
                .set_opt("portfolio_value", args.portfolio_value);
            serde_json::from_value(value)?
        }
    };
    let input = if args.methods.is_empty() {
        input
    } else {
        RiskInput {
            methods: Some(args.methods.iter().map(|&m| m.into()).collect()),
            ..input
        }
    };

    tracing::info!(
        observations = input.returns.len(),
        confidence_level = input.confidence_level,
        "estimating VaR and expected shortfall"
    );
    let result = estimate_risk(&input)?;
    envelope(result, Vec::new())
}
