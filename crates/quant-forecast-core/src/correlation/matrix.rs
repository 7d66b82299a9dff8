use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use crate::error::QuantError;
use crate::returns::series::ReturnSeries;
use crate::stats;
use crate::types::{with_metadata_f64, ComputationOutput};
use crate::QuantResult;

const SYMMETRY_TOLERANCE: f64 = 1e-9;
const MIN_VARIANCE: f64 = 1e-15;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Symmetric N x N correlation matrix with unit diagonal and entries in [-1, 1].
///
/// Positive semi-definiteness is not checked here; the Cholesky factorisation
/// reports it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CorrelationMatrix {
    rows: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn new(rows: Vec<Vec<f64>>) -> QuantResult<Self> {
        let n = rows.len();
        if n == 0 {
            return Err(QuantError::InvalidInput {
                field: "correlation".into(),
                reason: "Matrix must have at least one row".into(),
            });
        }
        // Every row must be full length before entries are cross-checked.
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n) {
            return Err(QuantError::InvalidInput {
                field: format!("correlation[{i}]"),
                reason: format!("Expected {n} columns, got {}", row.len()),
            });
        }
        for (i, row) in rows.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                if !v.is_finite() || v.abs() > 1.0 + SYMMETRY_TOLERANCE {
                    return Err(QuantError::InvalidInput {
                        field: format!("correlation[{i}][{j}]"),
                        reason: format!("Entry must lie in [-1, 1], got {v}"),
                    });
                }
                if (v - rows[j][i]).abs() > SYMMETRY_TOLERANCE {
                    return Err(QuantError::InvalidInput {
                        field: format!("correlation[{i}][{j}]"),
                        reason: "Matrix must be symmetric".into(),
                    });
                }
            }
            if (row[i] - 1.0).abs() > SYMMETRY_TOLERANCE {
                return Err(QuantError::InvalidInput {
                    field: format!("correlation[{i}][{i}]"),
                    reason: format!("Diagonal must be 1.0, got {}", row[i]),
                });
            }
        }
        Ok(Self { rows })
    }

    pub fn identity(n: usize) -> Self {
        let rows = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect();
        Self { rows }
    }

    pub fn dim(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.rows[i][j]
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }
}

impl<'de> Deserialize<'de> for CorrelationMatrix {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rows = Vec::<Vec<f64>>::deserialize(deserializer)?;
        CorrelationMatrix::new(rows).map_err(serde::de::Error::custom)
    }
}

/// Sample covariance matrix (n - 1 denominator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CovarianceMatrix {
    pub rows: Vec<Vec<f64>>,
}

impl CovarianceMatrix {
    pub fn dim(&self) -> usize {
        self.rows.len()
    }

    /// Per-asset standard deviations from the diagonal.
    pub fn std_devs(&self) -> Vec<f64> {
        (0..self.dim()).map(|i| self.rows[i][i].max(0.0).sqrt()).collect()
    }

    /// Portfolio variance wᵗ Σ w.
    pub fn portfolio_variance(&self, weights: &[f64]) -> f64 {
        let n = self.dim();
        let mut total = 0.0;
        for i in 0..n {
            for j in 0..n {
                total += weights[i] * self.rows[i][j] * weights[j];
            }
        }
        total
    }
}

/// Return series inner-joined on their common dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedReturns {
    pub assets: Vec<String>,
    pub dates: Vec<NaiveDate>,
    /// `columns[a][t]` is the return of asset `a` on `dates[t]`.
    pub columns: Vec<Vec<f64>>,
}

impl AlignedReturns {
    pub fn num_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn num_dates(&self) -> usize {
        self.dates.len()
    }
}

/// Input for covariance / correlation estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationInput {
    pub series: Vec<ReturnSeries>,
}

/// Output of covariance / correlation estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationOutput {
    pub assets: Vec<String>,
    pub common_dates: usize,
    pub dropped_dates: usize,
    pub covariance: CovarianceMatrix,
    pub correlation: CorrelationMatrix,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Inner-join return series on dates. A date missing from any series is
/// dropped from all of them.
pub fn align_series(series: &[ReturnSeries]) -> QuantResult<AlignedReturns> {
    if series.is_empty() {
        return Err(QuantError::InsufficientData(
            "At least one return series is required".into(),
        ));
    }
    let mut seen = HashSet::new();
    for s in series {
        if !seen.insert(s.asset()) {
            return Err(QuantError::InvalidInput {
                field: "series".into(),
                reason: format!("Duplicate asset identifier '{}'", s.asset()),
            });
        }
    }

    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for s in series {
        for p in s.points() {
            *counts.entry(p.date).or_insert(0) += 1;
        }
    }
    let dates: Vec<NaiveDate> = counts
        .into_iter()
        .filter(|(_, c)| *c == series.len())
        .map(|(d, _)| d)
        .collect();

    if dates.len() < 2 {
        return Err(QuantError::MisalignedSeries {
            common_dates: dates.len(),
            required: 2,
        });
    }

    let keep: HashSet<NaiveDate> = dates.iter().copied().collect();
    let columns = series
        .iter()
        .map(|s| {
            s.points()
                .iter()
                .filter(|p| keep.contains(&p.date))
                .map(|p| p.value)
                .collect()
        })
        .collect();

    Ok(AlignedReturns {
        assets: series.iter().map(|s| s.asset().to_string()).collect(),
        dates,
        columns,
    })
}

/// Sample covariance and correlation of aligned return columns.
pub fn covariance_and_correlation(
    aligned: &AlignedReturns,
) -> QuantResult<(CovarianceMatrix, CorrelationMatrix)> {
    let n = aligned.num_assets();
    let mut cov = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in i..n {
            let c = stats::sample_covariance(&aligned.columns[i], &aligned.columns[j])
                .ok_or_else(|| QuantError::MisalignedSeries {
                    common_dates: aligned.num_dates(),
                    required: 2,
                })?;
            cov[i][j] = c;
            cov[j][i] = c;
        }
    }

    for (i, asset) in aligned.assets.iter().enumerate() {
        if cov[i][i] <= MIN_VARIANCE {
            return Err(QuantError::DegenerateAsset {
                asset: asset.clone(),
            });
        }
    }

    let mut corr = vec![vec![0.0; n]; n];
    for i in 0..n {
        corr[i][i] = 1.0;
        for j in (i + 1)..n {
            let r = (cov[i][j] / (cov[i][i].sqrt() * cov[j][j].sqrt())).clamp(-1.0, 1.0);
            corr[i][j] = r;
            corr[j][i] = r;
        }
    }

    Ok((
        CovarianceMatrix { rows: cov },
        CorrelationMatrix { rows: corr },
    ))
}

/// Estimate the covariance and correlation matrices of N return series.
pub fn estimate_correlation(
    input: &CorrelationInput,
) -> QuantResult<ComputationOutput<CorrelationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let aligned = align_series(&input.series)?;
    let (covariance, correlation) = covariance_and_correlation(&aligned)?;

    let longest = input.series.iter().map(|s| s.len()).max().unwrap_or(0);
    let dropped_dates = longest.saturating_sub(aligned.num_dates());
    if dropped_dates > 0 {
        warnings.push(format!(
            "{dropped_dates} dates dropped during alignment ({} common dates kept)",
            aligned.num_dates()
        ));
    }

    let output = CorrelationOutput {
        assets: aligned.assets.clone(),
        common_dates: aligned.num_dates(),
        dropped_dates,
        covariance,
        correlation,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Sample covariance and Pearson correlation (inner-joined dates)",
        &serde_json::json!({
            "assets": output.assets,
            "common_dates": output.common_dates,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::returns::series::{ReturnKind, ReturnPoint};

    fn series(asset: &str, days: &[u32], values: &[f64]) -> ReturnSeries {
        let points = days
            .iter()
            .zip(values)
            .map(|(&d, &value)| ReturnPoint {
                date: NaiveDate::from_ymd_opt(2024, 3, d).unwrap(),
                value,
            })
            .collect();
        ReturnSeries::new(asset, ReturnKind::Simple, points).unwrap()
    }

    #[test]
    fn test_alignment_drops_missing_dates() {
        let a = series("A", &[1, 2, 3, 4], &[0.01, 0.02, -0.01, 0.03]);
        let b = series("B", &[1, 3, 4, 5], &[0.02, -0.02, 0.01, 0.00]);
        let aligned = align_series(&[a, b]).unwrap();
        assert_eq!(aligned.num_dates(), 3);
        assert_eq!(aligned.columns[0], vec![0.01, -0.01, 0.03]);
        assert_eq!(aligned.columns[1], vec![0.02, -0.02, 0.01]);
    }

    #[test]
    fn test_misaligned_series() {
        let a = series("A", &[1, 2], &[0.01, 0.02]);
        let b = series("B", &[2, 3], &[0.02, -0.02]);
        assert!(matches!(
            align_series(&[a, b]),
            Err(QuantError::MisalignedSeries { common_dates: 1, .. })
        ));
    }

    #[test]
    fn test_duplicate_assets_rejected() {
        let a = series("A", &[1, 2], &[0.01, 0.02]);
        assert!(align_series(&[a.clone(), a]).is_err());
    }

    #[test]
    fn test_perfect_correlation() {
        let a = series("A", &[1, 2, 3, 4], &[0.01, 0.02, -0.01, 0.03]);
        let b = series("B", &[1, 2, 3, 4], &[0.02, 0.04, -0.02, 0.06]);
        let c = series("C", &[1, 2, 3, 4], &[-0.01, -0.02, 0.01, -0.03]);
        let out = estimate_correlation(&CorrelationInput {
            series: vec![a, b, c],
        })
        .unwrap()
        .result;
        assert!((out.correlation.get(0, 1) - 1.0).abs() < 1e-12);
        assert!((out.correlation.get(0, 2) + 1.0).abs() < 1e-12);
        assert!((out.covariance.rows[1][1] - 4.0 * out.covariance.rows[0][0]).abs() < 1e-15);
    }

    #[test]
    fn test_zero_variance_is_degenerate() {
        let a = series("A", &[1, 2, 3], &[0.01, 0.02, -0.01]);
        let flat = series("FLAT", &[1, 2, 3], &[0.0, 0.0, 0.0]);
        let err = estimate_correlation(&CorrelationInput {
            series: vec![a, flat],
        })
        .unwrap_err();
        match err {
            QuantError::DegenerateAsset { asset } => assert_eq!(asset, "FLAT"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_correlation_matrix_validation() {
        assert!(CorrelationMatrix::new(vec![vec![1.0, 0.5], vec![0.5, 1.0]]).is_ok());
        assert!(CorrelationMatrix::new(vec![vec![1.0, 0.5], vec![0.4, 1.0]]).is_err());
        assert!(CorrelationMatrix::new(vec![vec![0.9, 0.5], vec![0.5, 1.0]]).is_err());
        assert!(CorrelationMatrix::new(vec![vec![1.0, 1.5], vec![1.5, 1.0]]).is_err());
        assert!(CorrelationMatrix::new(vec![vec![1.0, 0.5]]).is_err());
    }

    #[test]
    fn test_ragged_matrix_is_invalid_input() {
        let rows = vec![vec![1.0, 0.5, 0.2], vec![0.5, 1.0, 0.1], vec![0.2]];
        match CorrelationMatrix::new(rows) {
            Err(QuantError::InvalidInput { field, .. }) => assert_eq!(field, "correlation[2]"),
            other => panic!("expected InvalidInput, got {other:?}"),
        }

        let err = serde_json::from_str::<CorrelationMatrix>("[[1.0,0.5,0.2],[0.5,1.0,0.1],[0.2]]")
            .unwrap_err();
        assert!(err.to_string().contains("Expected 3 columns"), "{err}");
    }
}
