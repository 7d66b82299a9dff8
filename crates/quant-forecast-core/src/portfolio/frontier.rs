use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::correlation::matrix::AlignedReturns;
use crate::error::QuantError;
use crate::returns::series::{ReturnFrequency, ReturnKind, ReturnPoint, ReturnSeries};
use crate::types::{validate_weights, with_metadata_f64, ComputationOutput};
use crate::QuantResult;

use super::optimiser::AssetWeight;

/// One portfolio on an externally computed efficient frontier, per period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub expected_return: f64,
    pub risk: f64,
    pub weights: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierInput {
    pub assets: Vec<String>,
    pub points: Vec<FrontierPoint>,
    /// Annual risk-free rate for the Sharpe ratio
    #[serde(default)]
    pub risk_free_rate: f64,
    /// Period of the frontier's returns and risks
    #[serde(default)]
    pub frequency: ReturnFrequency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedPortfolio {
    /// Row of the point in the input table
    pub index: usize,
    pub expected_return: f64,
    pub risk: f64,
    pub annualised_return: f64,
    pub annualised_risk: f64,
    /// (annualised return - r_f) / annualised risk
    pub sharpe_ratio: f64,
    pub weights: Vec<AssetWeight>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierOutput {
    pub points: usize,
    pub min_variance: SelectedPortfolio,
    pub max_sharpe: SelectedPortfolio,
    pub max_return: SelectedPortfolio,
}

fn validate_frontier(input: &FrontierInput) -> QuantResult<()> {
    if input.points.is_empty() {
        return Err(QuantError::InsufficientData(
            "Frontier table has no points".into(),
        ));
    }
    let n = input.assets.len();
    for (i, p) in input.points.iter().enumerate() {
        if !p.expected_return.is_finite() || !p.risk.is_finite() || p.risk <= 0.0 {
            return Err(QuantError::InvalidInput {
                field: format!("points[{i}]"),
                reason: format!(
                    "Return must be finite and risk positive, got ({}, {})",
                    p.expected_return, p.risk
                ),
            });
        }
        validate_weights(&p.weights, n).map_err(|e| match e {
            QuantError::InvalidInput { reason, .. } => QuantError::InvalidInput {
                field: format!("points[{i}].weights"),
                reason,
            },
            other => other,
        })?;
    }
    Ok(())
}

fn select(input: &FrontierInput, index: usize, periods: f64) -> SelectedPortfolio {
    let p = &input.points[index];
    let annualised_return = p.expected_return * periods;
    let annualised_risk = p.risk * periods.sqrt();
    SelectedPortfolio {
        index,
        expected_return: p.expected_return,
        risk: p.risk,
        annualised_return,
        annualised_risk,
        sharpe_ratio: (annualised_return - input.risk_free_rate) / annualised_risk,
        weights: input
            .assets
            .iter()
            .zip(&p.weights)
            .map(|(a, w)| AssetWeight {
                asset: a.clone(),
                weight: *w,
            })
            .collect(),
    }
}

fn argmax_by<F: Fn(&FrontierPoint) -> f64>(points: &[FrontierPoint], key: F) -> usize {
    points
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_val), (i, p)| {
            let v = key(p);
            if v > best_val {
                (i, v)
            } else {
                (best, best_val)
            }
        })
        .0
}

/// Pick the minimum-variance, maximum-Sharpe and maximum-return portfolios
/// from a frontier table.
pub fn analyse_frontier(input: &FrontierInput) -> QuantResult<ComputationOutput<FrontierOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_frontier(input)?;
    let periods = input.frequency.periods_per_year();
    let rf_per_period = input.risk_free_rate / periods;

    let min_idx = argmax_by(&input.points, |p| -p.risk);
    let sharpe_idx = argmax_by(&input.points, |p| (p.expected_return - rf_per_period) / p.risk);
    let ret_idx = argmax_by(&input.points, |p| p.expected_return);

    if min_idx != 0 {
        warnings.push(format!(
            "Frontier table is not ordered by risk: minimum-variance point is row {min_idx}"
        ));
    }
    if input.points.len() < 10 {
        warnings.push(format!(
            "Only {} frontier points: selections are coarse",
            input.points.len()
        ));
    }

    let output = FrontierOutput {
        points: input.points.len(),
        min_variance: select(input, min_idx, periods),
        max_sharpe: select(input, sharpe_idx, periods),
        max_return: select(input, ret_idx, periods),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Efficient frontier table: minimum variance, maximum Sharpe, maximum return",
        &serde_json::json!({
            "assets": input.assets,
            "points": input.points.len(),
            "risk_free_rate": input.risk_free_rate,
            "frequency": input.frequency,
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Weighted historical return series of a portfolio over aligned asset returns.
pub fn portfolio_return_series(aligned: &AlignedReturns, weights: &[f64]) -> QuantResult<ReturnSeries> {
    validate_weights(weights, aligned.num_assets())?;
    let points = aligned
        .dates
        .iter()
        .enumerate()
        .map(|(t, date)| ReturnPoint {
            date: *date,
            value: weights
                .iter()
                .zip(&aligned.columns)
                .map(|(w, col)| w * col[t])
                .sum(),
        })
        .collect();
    ReturnSeries::new("portfolio", ReturnKind::Simple, points)
}
