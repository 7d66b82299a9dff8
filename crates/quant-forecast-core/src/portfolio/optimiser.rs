use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::correlation::cholesky::lower_factor;
use crate::correlation::matrix::{covariance_and_correlation, AlignedReturns, CovarianceMatrix};
use crate::error::QuantError;
use crate::types::{with_metadata_f64, ComputationOutput};
use crate::QuantResult;

/// Relative pivot size below which the covariance matrix is treated as singular.
const SINGULAR_TOLERANCE: f64 = 1e-12;

/// Relative asymmetry tolerated between Σ[i][j] and Σ[j][i].
const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Input for the closed-form mean-variance optimiser (short sales allowed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimiserInput {
    pub assets: Vec<String>,
    /// Expected returns, annualised
    pub expected_returns: Vec<f64>,
    /// Covariance matrix, annualised
    pub covariance: CovarianceMatrix,
    #[serde(default)]
    pub risk_free_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetWeight {
    pub asset: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimalPortfolio {
    pub weights: Vec<AssetWeight>,
    pub expected_return: f64,
    pub risk: f64,
    pub sharpe_ratio: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimiserOutput {
    pub min_variance: OptimalPortfolio,
    /// Absent when 1ᵀ Σ⁻¹ (μ - r_f) vanishes
    pub tangency: Option<OptimalPortfolio>,
}

// ---------------------------------------------------------------------------
// Linear algebra
// ---------------------------------------------------------------------------

/// Matrix inverse via Gauss-Jordan with partial pivoting.
#[allow(clippy::needless_range_loop)]
pub fn invert(mat: &[Vec<f64>]) -> QuantResult<Vec<Vec<f64>>> {
    let n = mat.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let scale = (0..n).map(|i| mat[i][i].abs()).fold(0.0, f64::max).max(f64::MIN_POSITIVE);

    let mut aug: Vec<Vec<f64>> = Vec::with_capacity(n);
    for i in 0..n {
        let mut row = Vec::with_capacity(2 * n);
        row.extend_from_slice(&mat[i]);
        for j in 0..n {
            row.push(if i == j { 1.0 } else { 0.0 });
        }
        aug.push(row);
    }

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for row in (col + 1)..n {
            let val = aug[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if !max_val.is_finite() || max_val < SINGULAR_TOLERANCE * scale {
            return Err(QuantError::NonPositiveDefiniteMatrix { pivot: col });
        }

        if max_row != col {
            aug.swap(col, max_row);
        }

        let pivot = aug[col][col];
        for cell in aug[col].iter_mut() {
            *cell /= pivot;
        }

        let pivot_row = aug[col].clone();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            for (cell, &pv) in aug[row].iter_mut().zip(pivot_row.iter()) {
                *cell -= factor * pv;
            }
        }
    }

    Ok(aug.iter().map(|row| row[n..].to_vec()).collect())
}

/// Square, symmetric and positive semi-definite.
///
/// An indefinite matrix can still be invertible, in which case the closed-form
/// weights would land on a saddle point rather than a minimum.
pub fn validate_covariance(covariance: &CovarianceMatrix) -> QuantResult<()> {
    let n = covariance.dim();
    if let Some((i, row)) = covariance.rows.iter().enumerate().find(|(_, r)| r.len() != n) {
        return Err(QuantError::InvalidInput {
            field: format!("covariance[{i}]"),
            reason: format!("Expected {n} columns, got {}", row.len()),
        });
    }
    let scale = (0..n)
        .map(|i| covariance.rows[i][i].abs())
        .fold(0.0, f64::max)
        .max(f64::MIN_POSITIVE);
    for i in 0..n {
        for j in (i + 1)..n {
            if (covariance.rows[i][j] - covariance.rows[j][i]).abs() > SYMMETRY_TOLERANCE * scale {
                return Err(QuantError::InvalidInput {
                    field: format!("covariance[{i}][{j}]"),
                    reason: "Matrix must be symmetric".into(),
                });
            }
        }
    }
    lower_factor(&covariance.rows, scale)?;
    Ok(())
}

fn mat_vec_multiply(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    mat.iter()
        .map(|row| row.iter().zip(v).map(|(a, b)| a * b).sum())
        .collect()
}

// ---------------------------------------------------------------------------
// Portfolios
// ---------------------------------------------------------------------------

/// w = Σ⁻¹1 / (1ᵀΣ⁻¹1)
pub fn min_variance_weights(covariance: &CovarianceMatrix) -> QuantResult<Vec<f64>> {
    validate_covariance(covariance)?;
    let inv = invert(&covariance.rows)?;
    let ones = vec![1.0; covariance.dim()];
    let inv_ones = mat_vec_multiply(&inv, &ones);
    let denom: f64 = inv_ones.iter().sum();
    if denom.abs() < f64::EPSILON {
        return Err(QuantError::NonPositiveDefiniteMatrix { pivot: 0 });
    }
    Ok(inv_ones.iter().map(|v| v / denom).collect())
}

/// w = Σ⁻¹(μ - r_f) / 1ᵀΣ⁻¹(μ - r_f); `None` when the denominator vanishes.
pub fn tangency_weights(
    covariance: &CovarianceMatrix,
    expected_returns: &[f64],
    risk_free_rate: f64,
) -> QuantResult<Option<Vec<f64>>> {
    validate_covariance(covariance)?;
    let excess: Vec<f64> = expected_returns.iter().map(|r| r - risk_free_rate).collect();
    let inv = invert(&covariance.rows)?;
    let inv_excess = mat_vec_multiply(&inv, &excess);
    let denom: f64 = inv_excess.iter().sum();
    let scale = inv_excess.iter().map(|v| v.abs()).fold(0.0, f64::max);
    if denom.abs() <= 1e-12 * scale.max(f64::MIN_POSITIVE) {
        return Ok(None);
    }
    Ok(Some(inv_excess.iter().map(|v| v / denom).collect()))
}

fn describe(
    assets: &[String],
    weights: Vec<f64>,
    input: &OptimiserInput,
) -> OptimalPortfolio {
    let expected_return: f64 = weights
        .iter()
        .zip(&input.expected_returns)
        .map(|(w, r)| w * r)
        .sum();
    let risk = input.covariance.portfolio_variance(&weights).max(0.0).sqrt();
    let sharpe_ratio = if risk > 0.0 {
        Some((expected_return - input.risk_free_rate) / risk)
    } else {
        None
    };
    OptimalPortfolio {
        weights: assets
            .iter()
            .zip(weights)
            .map(|(a, w)| AssetWeight {
                asset: a.clone(),
                weight: w,
            })
            .collect(),
        expected_return,
        risk,
        sharpe_ratio,
    }
}

/// Annualised mean returns and covariance of aligned return columns.
pub fn annualised_moments(
    aligned: &AlignedReturns,
    periods_per_year: f64,
) -> QuantResult<(Vec<f64>, CovarianceMatrix)> {
    let (cov, _) = covariance_and_correlation(aligned)?;
    let means = aligned
        .columns
        .iter()
        .map(|c| crate::stats::mean(c).unwrap_or_default() * periods_per_year)
        .collect();
    let rows = cov
        .rows
        .iter()
        .map(|row| row.iter().map(|v| v * periods_per_year).collect())
        .collect();
    Ok((means, CovarianceMatrix { rows }))
}

/// Global minimum variance and tangency portfolios in closed form.
pub fn optimise_portfolio(
    input: &OptimiserInput,
) -> QuantResult<ComputationOutput<OptimiserOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let n = input.assets.len();
    if n == 0 {
        return Err(QuantError::InsufficientData("At least one asset is required".into()));
    }
    if input.expected_returns.len() != n
        || input.covariance.dim() != n
        || input.covariance.rows.iter().any(|r| r.len() != n)
    {
        return Err(QuantError::InvalidInput {
            field: "covariance".into(),
            reason: format!("Expected {n} returns and a {n}x{n} covariance matrix"),
        });
    }
    if input
        .expected_returns
        .iter()
        .chain(input.covariance.rows.iter().flatten())
        .any(|v| !v.is_finite())
    {
        return Err(QuantError::InvalidInput {
            field: "covariance".into(),
            reason: "Inputs must be finite".into(),
        });
    }

    let gmv = min_variance_weights(&input.covariance)?;
    let min_variance = describe(&input.assets, gmv, input);

    let tangency = match tangency_weights(&input.covariance, &input.expected_returns, input.risk_free_rate)? {
        Some(w) => {
            let p = describe(&input.assets, w, input);
            if p.expected_return < input.risk_free_rate {
                warnings.push(
                    "Tangency portfolio lies on the inefficient branch: expected returns are mostly below the risk-free rate".into(),
                );
            }
            Some(p)
        }
        None => {
            warnings.push("Excess returns cancel out: tangency portfolio undefined".into());
            None
        }
    };

    let shorts = min_variance
        .weights
        .iter()
        .chain(tangency.iter().flat_map(|t| t.weights.iter()))
        .any(|w| w.weight < 0.0);
    if shorts {
        warnings.push("Unconstrained solution includes short positions".into());
    }

    let output = OptimiserOutput {
        min_variance,
        tangency,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Closed-form mean-variance (global minimum variance and tangency, short sales allowed)",
        &serde_json::json!({
            "assets": input.assets,
            "risk_free_rate": input.risk_free_rate,
            "inversion": "Cholesky PSD check, then Gauss-Jordan with partial pivoting",
        }),
        warnings,
        elapsed,
        output,
    ))
}
