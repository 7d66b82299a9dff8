use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use std::time::Instant;

use crate::error::QuantError;
use crate::stats;
use crate::types::{with_metadata_f64, ComputationOutput};
use crate::QuantResult;

pub const MIN_CONFIDENCE: f64 = 0.5;
pub const MAX_CONFIDENCE: f64 = 1.0 - 1e-6;
pub const MIN_MC_DRAWS: usize = 100;

/// Historical ES worse than parametric ES by more than this fraction flags a
/// heavy left tail.
const HEAVY_TAIL_RATIO: f64 = 1.25;

fn default_mc_draws() -> usize {
    10_000
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskMethod {
    Historical,
    Parametric,
    MonteCarlo,
}

impl RiskMethod {
    pub const ALL: [RiskMethod; 3] = [
        RiskMethod::Historical,
        RiskMethod::Parametric,
        RiskMethod::MonteCarlo,
    ];
}

impl std::fmt::Display for RiskMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskMethod::Historical => "historical",
            RiskMethod::Parametric => "parametric",
            RiskMethod::MonteCarlo => "monte_carlo",
        };
        f.write_str(s)
    }
}

/// VaR and ES as return quantiles: negative values are losses and `es <= var`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEstimate {
    pub confidence_level: f64,
    pub var: f64,
    pub es: f64,
    pub method: RiskMethod,
}

/// Input for side-by-side VaR / ES estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskInput {
    /// Periodic returns, historical or simulated
    pub returns: Vec<f64>,
    /// Confidence level, e.g. 0.95
    pub confidence_level: f64,
    /// Methods to run (all three when omitted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<RiskMethod>>,
    /// Draw count for the Monte Carlo method
    #[serde(default = "default_mc_draws")]
    pub mc_draws: usize,
    /// Seed for the Monte Carlo draws
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Portfolio value for monetary loss amounts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio_value: Option<f64>,
}

/// Loss amounts in currency, reported as positive numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonetaryRisk {
    pub method: RiskMethod,
    pub var_loss: f64,
    pub es_loss: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskOutput {
    pub observations: usize,
    pub confidence_level: f64,
    pub sample_mean: f64,
    pub sample_std_dev: f64,
    pub estimates: Vec<RiskEstimate>,
    /// Best ES minus worst ES across the methods run
    pub es_spread: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub monetary: Vec<MonetaryRisk>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate_confidence(confidence_level: f64) -> QuantResult<()> {
    if !(MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&confidence_level) {
        return Err(QuantError::InvalidInput {
            field: "confidence_level".into(),
            reason: format!(
                "Must be in [{MIN_CONFIDENCE}, {MAX_CONFIDENCE}], got {confidence_level}"
            ),
        });
    }
    Ok(())
}

fn validate_sample(returns: &[f64]) -> QuantResult<()> {
    if returns.len() < 2 {
        return Err(QuantError::InsufficientData(format!(
            "At least 2 return observations required, got {}",
            returns.len()
        )));
    }
    if returns.iter().any(|r| !r.is_finite()) {
        return Err(QuantError::InvalidInput {
            field: "returns".into(),
            reason: "Returns must be finite".into(),
        });
    }
    Ok(())
}

fn moments(returns: &[f64]) -> QuantResult<(f64, f64)> {
    match (stats::mean(returns), stats::sample_std_dev(returns)) {
        (Some(m), Some(s)) => Ok((m, s)),
        _ => Err(QuantError::InsufficientData(
            "At least 2 return observations required".into(),
        )),
    }
}

fn standard_normal() -> QuantResult<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| QuantError::InvalidInput {
        field: "distribution".into(),
        reason: format!("Invalid Normal parameters: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

/// Historical VaR/ES: empirical (1 - α) quantile with linear interpolation,
/// ES is the mean of all observations at or below it.
pub fn historical_var_es(returns: &[f64], confidence_level: f64) -> QuantResult<RiskEstimate> {
    validate_confidence(confidence_level)?;
    validate_sample(returns)?;

    let mut sorted = returns.to_vec();
    stats::sort_ascending(&mut sorted);
    let var = stats::percentile_sorted(&sorted, (1.0 - confidence_level) * 100.0)
        .ok_or(QuantError::EmptyTail { confidence_level })?;

    let tail: Vec<f64> = sorted.iter().copied().take_while(|r| *r <= var).collect();
    let es = stats::mean(&tail).ok_or(QuantError::EmptyTail { confidence_level })?;

    Ok(RiskEstimate {
        confidence_level,
        var,
        es,
        method: RiskMethod::Historical,
    })
}

/// Parametric (normal) VaR/ES from the sample mean and standard deviation.
///
/// Assumes normally distributed returns and therefore understates losses
/// when the empirical distribution has fat tails.
pub fn parametric_var_es(returns: &[f64], confidence_level: f64) -> QuantResult<RiskEstimate> {
    validate_confidence(confidence_level)?;
    validate_sample(returns)?;
    let (mean, std_dev) = moments(returns)?;
    parametric_from_moments(mean, std_dev, confidence_level)
}

/// Parametric VaR/ES given the distribution moments directly.
pub fn parametric_from_moments(
    mean: f64,
    std_dev: f64,
    confidence_level: f64,
) -> QuantResult<RiskEstimate> {
    validate_confidence(confidence_level)?;
    let normal = standard_normal()?;
    let tail_prob = 1.0 - confidence_level;
    let z = normal.inverse_cdf(tail_prob);

    Ok(RiskEstimate {
        confidence_level,
        var: mean + std_dev * z,
        es: mean - std_dev * normal.pdf(z) / tail_prob,
        method: RiskMethod::Parametric,
    })
}

/// Monte Carlo VaR/ES: draw `draws` normals with the sample's mean and
/// standard deviation, then apply the historical method to the draws.
pub fn monte_carlo_var_es(
    returns: &[f64],
    confidence_level: f64,
    draws: usize,
    seed: Option<u64>,
) -> QuantResult<RiskEstimate> {
    validate_confidence(confidence_level)?;
    validate_sample(returns)?;
    if draws < MIN_MC_DRAWS {
        return Err(QuantError::InvalidInput {
            field: "mc_draws".into(),
            reason: format!("Must be at least {MIN_MC_DRAWS}, got {draws}"),
        });
    }
    let (mean, std_dev) = moments(returns)?;
    let normal = standard_normal()?;

    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let simulated: Vec<f64> = (0..draws)
        .map(|_| mean + std_dev * rng.sample(&normal))
        .collect();

    let est = historical_var_es(&simulated, confidence_level)?;
    Ok(RiskEstimate {
        method: RiskMethod::MonteCarlo,
        ..est
    })
}

/// Run one method.
pub fn estimate_with(
    method: RiskMethod,
    returns: &[f64],
    confidence_level: f64,
    draws: usize,
    seed: Option<u64>,
) -> QuantResult<RiskEstimate> {
    match method {
        RiskMethod::Historical => historical_var_es(returns, confidence_level),
        RiskMethod::Parametric => parametric_var_es(returns, confidence_level),
        RiskMethod::MonteCarlo => monte_carlo_var_es(returns, confidence_level, draws, seed),
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Report VaR and ES by each requested method side by side.
pub fn estimate_risk(input: &RiskInput) -> QuantResult<ComputationOutput<RiskOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_confidence(input.confidence_level)?;
    validate_sample(&input.returns)?;
    if let Some(pv) = input.portfolio_value {
        if !pv.is_finite() || pv <= 0.0 {
            return Err(QuantError::InvalidInput {
                field: "portfolio_value".into(),
                reason: "Must be positive and finite".into(),
            });
        }
    }

    let methods: Vec<RiskMethod> = match input.methods {
        Some(ref m) if !m.is_empty() => m.clone(),
        _ => RiskMethod::ALL.to_vec(),
    };

    let estimates = methods
        .iter()
        .map(|&m| {
            estimate_with(
                m,
                &input.returns,
                input.confidence_level,
                input.mc_draws,
                input.seed,
            )
        })
        .collect::<QuantResult<Vec<_>>>()?;

    let (sample_mean, sample_std_dev) = moments(&input.returns)?;

    if input.returns.len() < 100 {
        warnings.push(format!(
            "Only {} observations: historical tail estimates are unstable",
            input.returns.len()
        ));
    }

    let find = |m: RiskMethod| estimates.iter().find(|e| e.method == m);
    if let (Some(h), Some(p)) = (find(RiskMethod::Historical), find(RiskMethod::Parametric)) {
        if p.es < 0.0 && h.es < HEAVY_TAIL_RATIO * p.es {
            warnings.push(format!(
                "Historical ES ({:.4}) is more than {:.0}% worse than parametric ES ({:.4}): heavy left tail, the normal assumption understates losses",
                h.es,
                (HEAVY_TAIL_RATIO - 1.0) * 100.0,
                p.es
            ));
        }
    }

    let es_spread = if estimates.len() > 1 {
        let worst = estimates.iter().map(|e| e.es).fold(f64::INFINITY, f64::min);
        let best = estimates.iter().map(|e| e.es).fold(f64::NEG_INFINITY, f64::max);
        Some(best - worst)
    } else {
        None
    };

    let monetary = match input.portfolio_value {
        Some(pv) => estimates
            .iter()
            .map(|e| MonetaryRisk {
                method: e.method,
                var_loss: -e.var * pv,
                es_loss: -e.es * pv,
            })
            .collect(),
        None => Vec::new(),
    };

    let output = RiskOutput {
        observations: input.returns.len(),
        confidence_level: input.confidence_level,
        sample_mean,
        sample_std_dev,
        estimates,
        es_spread,
        monetary,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Value at Risk and Expected Shortfall (historical, parametric normal, Monte Carlo)",
        &serde_json::json!({
            "confidence_level": input.confidence_level,
            "methods": methods,
            "mc_draws": input.mc_draws,
            "seed": input.seed,
            "quantile_interpolation": "linear",
            "sign_convention": "return quantiles, negative = loss",
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
