use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::correlation::matrix::{align_series, covariance_and_correlation};
use crate::correlation::{CorrelationMatrix, CovarianceMatrix};
use crate::error::QuantError;
use crate::portfolio::optimiser::min_variance_weights;
use crate::returns::series::{compute_returns, PricePoint, ReturnFrequency, ReturnKind};
use crate::simulation::{run_simulation, SimulationInput, SimulationOutput};
use crate::stats;
use crate::types::{with_metadata_f64, ComputationOutput};
use crate::QuantResult;

fn default_horizon() -> usize {
    252
}

fn default_scenarios() -> usize {
    10_000
}

fn default_confidence() -> f64 {
    0.95
}

fn default_sample_paths() -> usize {
    30
}

fn default_mc_draws() -> usize {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub asset: String,
    pub prices: Vec<PricePoint>,
}

/// Input for the end-to-end price history to forward risk pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastInput {
    pub series: Vec<PriceSeries>,
    /// Portfolio weights; global minimum variance weights when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    #[serde(default)]
    pub frequency: ReturnFrequency,
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    #[serde(default = "default_scenarios")]
    pub scenarios: usize,
    #[serde(default = "default_confidence")]
    pub confidence_level: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default = "default_sample_paths")]
    pub sample_paths: usize,
    #[serde(default = "default_mc_draws")]
    pub mc_draws: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetParameters {
    pub asset: String,
    pub last_price: f64,
    /// Annualised mean log return
    pub drift: f64,
    /// Annualised volatility of log returns
    pub volatility: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSource {
    Supplied,
    MinimumVariance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastOutput {
    pub common_dates: usize,
    pub parameters: Vec<AssetParameters>,
    pub covariance: CovarianceMatrix,
    pub correlation: CorrelationMatrix,
    pub weights: Vec<f64>,
    pub weight_source: WeightSource,
    pub simulation: SimulationOutput,
}

/// Price history → log returns → annualised drift and volatility →
/// correlation → simulated paths from the last prices → portfolio VaR / ES.
pub fn run_forecast(input: &ForecastInput) -> QuantResult<ComputationOutput<ForecastOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.series.is_empty() {
        return Err(QuantError::InsufficientData(
            "At least one price series is required".into(),
        ));
    }
    let periods = input.frequency.periods_per_year();

    let returns = input
        .series
        .iter()
        .map(|s| compute_returns(&s.asset, &s.prices, ReturnKind::Log))
        .collect::<QuantResult<Vec<_>>>()?;
    let aligned = align_series(&returns)?;
    let (covariance, correlation) = covariance_and_correlation(&aligned)?;

    let mut parameters = Vec::with_capacity(input.series.len());
    for (s, column) in input.series.iter().zip(&aligned.columns) {
        let last_price = s.prices.last().map(|p| p.price).ok_or_else(|| {
            QuantError::InsufficientData(format!("No prices for '{}'", s.asset))
        })?;
        let (mean, std_dev) = match (stats::mean(column), stats::sample_std_dev(column)) {
            (Some(m), Some(sd)) => (m, sd),
            _ => {
                return Err(QuantError::MisalignedSeries {
                    common_dates: aligned.num_dates(),
                    required: 2,
                })
            }
        };
        parameters.push(AssetParameters {
            asset: s.asset.clone(),
            last_price,
            drift: mean * periods,
            volatility: std_dev * periods.sqrt(),
        });
    }

    let (weights, weight_source) = match input.weights {
        Some(ref w) => (w.clone(), WeightSource::Supplied),
        None => {
            warnings.push("No weights supplied: using global minimum variance weights".into());
            (min_variance_weights(&covariance)?, WeightSource::MinimumVariance)
        }
    };

    let sim_input = SimulationInput {
        assets: aligned.assets.clone(),
        initial_prices: parameters.iter().map(|p| p.last_price).collect(),
        drifts: parameters.iter().map(|p| p.drift).collect(),
        volatilities: parameters.iter().map(|p| p.volatility).collect(),
        correlation: correlation.clone(),
        horizon: input.horizon,
        scenarios: input.scenarios,
        dt: 1.0 / periods,
        seed: input.seed,
        weights: Some(weights.clone()),
        confidence_level: Some(input.confidence_level),
        sample_paths: input.sample_paths,
        mc_draws: input.mc_draws,
    };
    let simulation = run_simulation(&sim_input)?;
    warnings.extend(simulation.warnings.into_iter().map(|w| format!("[simulation] {w}")));

    let output = ForecastOutput {
        common_dates: aligned.num_dates(),
        parameters,
        covariance,
        correlation,
        weights,
        weight_source,
        simulation: simulation.result,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Historical log-return calibration, correlated GBM forecast and portfolio VaR/ES",
        &serde_json::json!({
            "assets": aligned.assets,
            "frequency": input.frequency,
            "horizon_steps": input.horizon,
            "scenarios": input.scenarios,
            "confidence_level": input.confidence_level,
            "seed": input.seed,
        }),
        warnings,
        elapsed,
        output,
    ))
}
