use clap::Args;
use std::path::PathBuf;

use quant_forecast_core::correlation::matrix::{estimate_correlation, CorrelationInput};
use quant_forecast_core::returns::series::compute_returns;

use super::{envelope, load_json, CommandResult, KindArg};
use crate::input::csv_series;

/// Arguments for covariance / correlation estimation
#[derive(Args)]
pub struct CorrelationArgs {
    /// Path to JSON input file with return series
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Path to a wide `date,<ASSET>,...` price CSV
    #[arg(long, conflicts_with = "input")]
    pub csv: Option<PathBuf>,

    /// Return definition used for the CSV prices
    #[arg(long, value_enum, default_value = "log")]
    pub kind: KindArg,
}

pub fn run_correlation(args: CorrelationArgs) -> CommandResult {
    let input: CorrelationInput = if let Some(ref path) = args.csv {
        let series = csv_series::read_wide_price_csv(path)?
            .iter()
            .map(|s| compute_returns(&s.asset, &s.prices, args.kind.into()))
            .collect::<Result<Vec<_>, _>>()?;
        CorrelationInput { series }
    } else {
        load_json(args.input.as_deref())?
            .ok_or("--csv or --input is required (or pipe JSON on stdin)")?
    };

    tracing::info!(assets = input.series.len(), "estimating covariance and correlation");
    let result = estimate_correlation(&input)?;
    tracing::debug!(
        common_dates = result.result.common_dates,
        dropped_dates = result.result.dropped_dates,
        "aligned return series"
    );
    envelope(result, Vec::new())
}
