use clap::Args;
use rust_decimal::Decimal;
use std::path::PathBuf;

use quant_forecast_core::returns::performance::estimate_beta;
use quant_forecast_core::types::decimal_from_f64;
use quant_forecast_core::valuation::capm::{self, CapmInput};
use quant_forecast_core::valuation::dcf::{self, DcfInput};
use quant_forecast_core::valuation::sensitivity::{self, DcfSensitivityInput};
use quant_forecast_core::QuantError;

use super::{envelope, load_json, CommandResult};
use crate::config::EngineConfig;
use crate::input::csv_series;

/// Arguments for the CAPM expected return
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct CapmArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Risk-free rate (e.g. 0.045 for 4.5%)
    #[arg(long)]
    pub risk_free_rate: Option<Decimal>,

    /// Beta against the market
    #[arg(long, conflicts_with = "asset_returns")]
    pub beta: Option<Decimal>,

    /// Market risk premium R_m - R_f
    #[arg(long, alias = "mrp", conflicts_with = "market_return")]
    pub market_risk_premium: Option<Decimal>,

    /// Expected market return R_m
    #[arg(long)]
    pub market_return: Option<Decimal>,

    /// CSV of asset returns for estimating beta
    #[arg(long, requires = "market_returns")]
    pub asset_returns: Option<PathBuf>,

    /// CSV of market returns for estimating beta
    #[arg(long, requires = "asset_returns")]
    pub market_returns: Option<PathBuf>,

    /// Beta to use when the market return series has zero variance
    #[arg(long, requires = "asset_returns")]
    pub fallback_beta: Option<f64>,
}

/// Arguments for the per-share DCF valuation
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct DcfArgs {
    /// Path to JSON input file with DCF parameters
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Current market price per share
    #[arg(long)]
    pub price: Option<Decimal>,

    /// Year-0 free cash flow per share
    #[arg(long)]
    pub base_cash_flow: Option<Decimal>,

    /// FCF yield used to derive the base cash flow from the price
    #[arg(long)]
    pub fcf_yield: Option<Decimal>,

    /// Comma-separated growth rates, one per projection year
    #[arg(long, value_delimiter = ',')]
    pub growth_rates: Vec<Decimal>,

    /// Single growth rate applied for `--years` years
    #[arg(long, conflicts_with = "growth_rates")]
    pub growth_rate: Option<Decimal>,

    /// Projection years for `--growth-rate`
    #[arg(long, default_value = "5")]
    pub years: usize,

    /// Terminal growth rate
    #[arg(long)]
    pub terminal_growth: Option<Decimal>,

    /// Discount rate (cost of equity)
    #[arg(long, conflicts_with = "beta")]
    pub discount_rate: Option<Decimal>,

    /// Beta for a CAPM-derived discount rate
    #[arg(long)]
    pub beta: Option<Decimal>,

    /// Risk-free rate for the CAPM discount rate
    #[arg(long)]
    pub risk_free_rate: Option<Decimal>,

    /// Market risk premium for the CAPM discount rate
    #[arg(long, alias = "mrp")]
    pub market_risk_premium: Option<Decimal>,
}

/// Arguments for the discount rate x terminal growth grid
#[derive(Args)]
pub struct DcfSensitivityArgs {
    /// Path to JSON input file with the base case and both sweep ranges
    #[arg(long)]
    pub input: Option<PathBuf>,
}

pub fn run_capm(args: CapmArgs, config: &EngineConfig) -> CommandResult {
    let from_flags = args.beta.is_some() || args.asset_returns.is_some();
    if args.input.is_some() || !from_flags {
        if let Some(input) = load_json::<CapmInput>(args.input.as_deref())? {
            tracing::info!(beta = %input.beta, "calculating CAPM expected return");
            return envelope(capm::calculate_capm(&input)?, Vec::new());
        }
    }

    let mut cli_warnings = Vec::new();
    let beta = match (args.beta, &args.asset_returns, &args.market_returns) {
        (Some(b), _, _) => b,
        (None, Some(asset_path), Some(market_path)) => {
            let asset = csv_series::read_return_csv(asset_path)?;
            let market = csv_series::read_return_csv(market_path)?;
            let estimated = match (estimate_beta(&asset, &market), args.fallback_beta) {
                (Ok(b), _) => b,
                (Err(QuantError::DegenerateAsset { .. }), Some(fallback)) => {
                    tracing::warn!(
                        fallback_beta = fallback,
                        "market returns have zero variance, using fallback beta"
                    );
                    cli_warnings.push(format!(
                        "Market returns have zero variance: beta set to fallback {fallback}"
                    ));
                    fallback
                }
                (Err(e), _) => return Err(e.into()),
            };
            tracing::debug!(beta = estimated, observations = asset.len(), "estimated beta");
            decimal_from_f64("beta", estimated)?
        }
        _ => return Err("--beta or --asset-returns/--market-returns is required (or provide --input)".into()),
    };

    let risk_free_rate = match args.risk_free_rate {
        Some(r) => r,
        None => decimal_from_f64("risk_free_rate", config.risk_free_rate)?,
    };
    let input = CapmInput {
        risk_free_rate,
        beta,
        market_risk_premium: args.market_risk_premium,
        market_return: args.market_return,
    };

    tracing::info!(beta = %input.beta, "calculating CAPM expected return");
    envelope(capm::calculate_capm(&input)?, cli_warnings)
}

pub fn run_dcf(args: DcfArgs, config: &EngineConfig) -> CommandResult {
    let from_json = if args.input.is_some() || args.price.is_none() {
        load_json(args.input.as_deref())?
    } else {
        None
    };
    let input: DcfInput = match from_json {
        Some(input) => input,
        None => {
            let growth_rates = match args.growth_rate {
                Some(g) => vec![g; args.years],
                None => args.growth_rates,
            };
            let capm = match args.beta {
                Some(beta) => Some(CapmInput {
                    risk_free_rate: match args.risk_free_rate {
                        Some(r) => r,
                        None => decimal_from_f64("risk_free_rate", config.risk_free_rate)?,
                    },
                    beta,
                    market_risk_premium: Some(
                        args.market_risk_premium
                            .ok_or("--market-risk-premium is required with --beta")?,
                    ),
                    market_return: None,
                }),
                None => None,
            };
            DcfInput {
                current_price: args
                    .price
                    .ok_or("--price is required (or provide --input)")?,
                base_cash_flow: args.base_cash_flow,
                fcf_yield: args.fcf_yield,
                growth_rates,
                terminal_growth_rate: args
                    .terminal_growth
                    .ok_or("--terminal-growth is required (or provide --input)")?,
                discount_rate: args.discount_rate,
                capm,
            }
        }
    };

    tracing::info!(
        years = input.growth_rates.len(),
        capm = input.capm.is_some(),
        "running DCF valuation"
    );
    envelope(dcf::calculate_dcf(&input)?, Vec::new())
}

pub fn run_dcf_sensitivity(args: DcfSensitivityArgs) -> CommandResult {
    let input: DcfSensitivityInput = load_json(args.input.as_deref())?
        .ok_or("--input is required (or pipe JSON on stdin)")?;
    tracing::info!(
        discount_rate = %format!("{}..{}", input.discount_rate.min, input.discount_rate.max),
        terminal_growth = %format!("{}..{}", input.terminal_growth.min, input.terminal_growth.max),
        "running DCF sensitivity grid"
    );
    envelope(sensitivity::dcf_sensitivity(&input)?, Vec::new())
}
