use serde::{Deserialize, Serialize};

use crate::error::QuantError;
use crate::QuantResult;

use super::matrix::CorrelationMatrix;

/// Pivots within this distance of zero are treated as exact zeros, which
/// lets perfectly correlated assets (a PSD but singular matrix) factorise.
pub const PSD_TOLERANCE: f64 = 1e-10;

/// Lower triangular factor L with L Lᵗ equal to the source correlation matrix.
///
/// Stored row-major in a flat buffer of `dim * dim` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CholeskyFactor {
    dim: usize,
    lower: Vec<f64>,
}

impl CholeskyFactor {
    /// Factorise a correlation matrix.
    ///
    /// Returns `NonPositiveDefiniteMatrix` with the failing pivot index when a
    /// diagonal residual is below `-PSD_TOLERANCE`, or when a zero pivot has a
    /// non-zero residual beneath it.
    pub fn decompose(matrix: &CorrelationMatrix) -> QuantResult<Self> {
        let lower = lower_factor(matrix.rows(), 1.0)?;
        Ok(Self {
            dim: matrix.dim(),
            lower,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.lower[i * self.dim + j]
    }

    /// Map independent standard normals `z` to correlated normals `out = L z`.
    ///
    /// Both slices must have length `dim`.
    #[inline]
    pub fn correlate(&self, z: &[f64], out: &mut [f64]) {
        let n = self.dim;
        for i in 0..n {
            let row = &self.lower[i * n..i * n + i + 1];
            out[i] = row.iter().zip(&z[..=i]).map(|(l, z)| l * z).sum();
        }
    }

    /// Rebuild L Lᵗ, mainly for diagnostics and tests.
    pub fn reconstruct(&self) -> Vec<Vec<f64>> {
        let n = self.dim;
        let mut out = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..=i {
                let v: f64 = (0..=j).map(|k| self.get(i, k) * self.get(j, k)).sum();
                out[i][j] = v;
                out[j][i] = v;
            }
        }
        out
    }
}

/// Row-major lower factor of a square symmetric matrix.
///
/// Tolerances are `PSD_TOLERANCE` times `scale`, so covariance matrices pass
/// their largest variance and correlation matrices pass 1.0.
pub fn lower_factor(rows: &[Vec<f64>], scale: f64) -> QuantResult<Vec<f64>> {
    let n = rows.len();
    let zero_pivot = PSD_TOLERANCE * scale;
    let max_residual = PSD_TOLERANCE.sqrt() * scale;
    let mut lower = vec![0.0; n * n];

    for j in 0..n {
        let mut sum = 0.0;
        for k in 0..j {
            let l_jk = lower[j * n + k];
            sum += l_jk * l_jk;
        }
        let diag = rows[j][j] - sum;
        if diag < -zero_pivot {
            return Err(QuantError::NonPositiveDefiniteMatrix { pivot: j });
        }
        let l_jj = if diag <= zero_pivot { 0.0 } else { diag.sqrt() };
        lower[j * n + j] = l_jj;

        for i in (j + 1)..n {
            let mut sum = 0.0;
            for k in 0..j {
                sum += lower[i * n + k] * lower[j * n + k];
            }
            let residual = rows[i][j] - sum;
            if l_jj == 0.0 {
                if residual.abs() > max_residual {
                    return Err(QuantError::NonPositiveDefiniteMatrix { pivot: j });
                }
                lower[i * n + j] = 0.0;
            } else {
                lower[i * n + j] = residual / l_jj;
            }
        }
    }

    Ok(lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<f64>>) -> CorrelationMatrix {
        CorrelationMatrix::new(rows).unwrap()
    }

    #[test]
    fn test_identity_factor() {
        let f = CholeskyFactor::decompose(&CorrelationMatrix::identity(3)).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(f.get(i, j), if i == j { 1.0 } else { 0.0 });
            }
        }
    }

    #[test]
    fn test_two_asset_factor() {
        let rho = 0.6;
        let f = CholeskyFactor::decompose(&matrix(vec![vec![1.0, rho], vec![rho, 1.0]])).unwrap();
        assert!((f.get(1, 0) - rho).abs() < 1e-15);
        assert!((f.get(1, 1) - (1.0 - rho * rho).sqrt()).abs() < 1e-15);
        assert_eq!(f.get(0, 1), 0.0);
    }

    #[test]
    fn test_reconstruction() {
        let rows = vec![
            vec![1.0, 0.5, 0.3],
            vec![0.5, 1.0, -0.2],
            vec![0.3, -0.2, 1.0],
        ];
        let f = CholeskyFactor::decompose(&matrix(rows.clone())).unwrap();
        let back = f.reconstruct();
        for i in 0..3 {
            for j in 0..3 {
                assert!((back[i][j] - rows[i][j]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_perfect_correlation_is_psd() {
        let f = CholeskyFactor::decompose(&matrix(vec![vec![1.0, 1.0], vec![1.0, 1.0]])).unwrap();
        assert_eq!(f.get(1, 0), 1.0);
        assert_eq!(f.get(1, 1), 0.0);
        let mut out = [0.0; 2];
        f.correlate(&[0.7, -1.3], &mut out);
        assert_eq!(out[0], out[1]);
    }

    #[test]
    fn test_indefinite_matrix_rejected() {
        // Pairwise correlations that no joint distribution can satisfy
        let rows = vec![
            vec![1.0, 0.9, -0.9],
            vec![0.9, 1.0, 0.9],
            vec![-0.9, 0.9, 1.0],
        ];
        assert!(matches!(
            CholeskyFactor::decompose(&matrix(rows)),
            Err(QuantError::NonPositiveDefiniteMatrix { pivot: 2 })
        ));
    }

    #[test]
    fn test_correlate_applies_lower_triangle() {
        let f = CholeskyFactor::decompose(&matrix(vec![vec![1.0, 0.5], vec![0.5, 1.0]])).unwrap();
        let mut out = [0.0; 2];
        f.correlate(&[1.0, 1.0], &mut out);
        assert!((out[0] - 1.0).abs() < 1e-15);
        assert!((out[1] - (0.5 + 0.75f64.sqrt())).abs() < 1e-15);
    }
}
