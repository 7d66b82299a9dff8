use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use crate::correlation::{CholeskyFactor, CorrelationMatrix};
use crate::error::QuantError;
use crate::QuantResult;

/// Scenarios per batch. Each batch draws from its own RNG, so the output is
/// the same however rayon schedules the batches.
pub const BATCH_SIZE: usize = 256;

/// Upper bound on the number of stored path values (M x (H+1) x N).
pub const MAX_PATH_VALUES: usize = 200_000_000;

/// Width of the normal tail covered by the pre-simulation overflow check.
const OVERFLOW_SIGMAS: f64 = 12.0;

const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

pub fn default_dt() -> f64 {
    1.0 / 252.0
}

/// Parameters of a correlated multi-asset GBM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbmSpec {
    pub initial_prices: Vec<f64>,
    /// Annualised drifts
    pub drifts: Vec<f64>,
    /// Annualised volatilities
    pub volatilities: Vec<f64>,
    pub correlation: CorrelationMatrix,
    /// Number of steps H
    pub horizon: usize,
    /// Number of scenarios M
    pub scenarios: usize,
    #[serde(default = "default_dt")]
    pub dt: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Simulated prices in a flat buffer of shape M x (H+1) x N.
///
/// Step 0 holds the initial prices.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationPaths {
    scenarios: usize,
    horizon: usize,
    assets: usize,
    data: Vec<f64>,
}

impl SimulationPaths {
    pub fn scenarios(&self) -> usize {
        self.scenarios
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn num_assets(&self) -> usize {
        self.assets
    }

    fn stride(&self) -> usize {
        (self.horizon + 1) * self.assets
    }

    pub fn value(&self, scenario: usize, step: usize, asset: usize) -> f64 {
        self.data[scenario * self.stride() + step * self.assets + asset]
    }

    pub fn initial(&self, scenario: usize, asset: usize) -> f64 {
        self.value(scenario, 0, asset)
    }

    pub fn terminal(&self, scenario: usize, asset: usize) -> f64 {
        self.value(scenario, self.horizon, asset)
    }

    /// All values of one scenario, step-major.
    pub fn scenario(&self, scenario: usize) -> &[f64] {
        let stride = self.stride();
        &self.data[scenario * stride..(scenario + 1) * stride]
    }

    /// Price path of one asset in one scenario (H+1 values).
    pub fn path(&self, scenario: usize, asset: usize) -> Vec<f64> {
        (0..=self.horizon)
            .map(|t| self.value(scenario, t, asset))
            .collect()
    }

    /// Values of one asset at one step across all scenarios.
    pub fn cross_section(&self, step: usize, asset: usize) -> Vec<f64> {
        (0..self.scenarios)
            .map(|s| self.value(s, step, asset))
            .collect()
    }
}

fn standard_normal() -> QuantResult<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| QuantError::InvalidInput {
        field: "distribution".into(),
        reason: format!("Invalid Normal parameters: {e}"),
    })
}

fn batch_seed(base: u64, batch: usize) -> u64 {
    base ^ (batch as u64).wrapping_add(1).wrapping_mul(SEED_STRIDE)
}

/// Draw `m` rows of i.i.d. standard normals and correlate each row with `L`.
///
/// Returns a row-major m x N buffer `E = Z Lᵗ`.
pub fn correlated_normals<R: Rng>(
    factor: &CholeskyFactor,
    m: usize,
    rng: &mut R,
) -> QuantResult<Vec<f64>> {
    let n = factor.dim();
    let normal = standard_normal()?;
    let mut z = vec![0.0; n];
    let mut out = vec![0.0; m * n];
    for row in out.chunks_mut(n.max(1)).take(m) {
        for v in z.iter_mut() {
            *v = rng.sample(&normal);
        }
        factor.correlate(&z, row);
    }
    Ok(out)
}

fn validate(spec: &GbmSpec) -> QuantResult<()> {
    let n = spec.initial_prices.len();
    if n == 0 {
        return Err(QuantError::InvalidInput {
            field: "initial_prices".into(),
            reason: "At least one asset is required".into(),
        });
    }
    if spec.drifts.len() != n || spec.volatilities.len() != n {
        return Err(QuantError::InvalidInput {
            field: "drifts/volatilities".into(),
            reason: format!(
                "Expected {n} entries, got {} drifts and {} volatilities",
                spec.drifts.len(),
                spec.volatilities.len()
            ),
        });
    }
    if spec.correlation.dim() != n {
        return Err(QuantError::InvalidInput {
            field: "correlation".into(),
            reason: format!("Expected {n}x{n}, got dimension {}", spec.correlation.dim()),
        });
    }
    for (i, &s0) in spec.initial_prices.iter().enumerate() {
        if !s0.is_finite() || s0 <= 0.0 {
            return Err(QuantError::InvalidInput {
                field: format!("initial_prices[{i}]"),
                reason: format!("Must be positive and finite, got {s0}"),
            });
        }
    }
    for (i, &mu) in spec.drifts.iter().enumerate() {
        if !mu.is_finite() {
            return Err(QuantError::InvalidInput {
                field: format!("drifts[{i}]"),
                reason: "Must be finite".into(),
            });
        }
    }
    for (i, &sigma) in spec.volatilities.iter().enumerate() {
        if !sigma.is_finite() || sigma < 0.0 {
            return Err(QuantError::InvalidInput {
                field: format!("volatilities[{i}]"),
                reason: format!("Must be finite and non-negative, got {sigma}"),
            });
        }
    }
    if spec.scenarios == 0 {
        return Err(QuantError::InvalidInput {
            field: "scenarios".into(),
            reason: "At least one scenario is required".into(),
        });
    }
    if !spec.dt.is_finite() || spec.dt <= 0.0 {
        return Err(QuantError::InvalidInput {
            field: "dt".into(),
            reason: format!("Must be positive and finite, got {}", spec.dt),
        });
    }
    let total = spec
        .scenarios
        .checked_mul(spec.horizon + 1)
        .and_then(|v| v.checked_mul(n));
    match total {
        Some(t) if t <= MAX_PATH_VALUES => Ok(()),
        _ => Err(QuantError::InvalidInput {
            field: "scenarios".into(),
            reason: format!(
                "{} scenarios x {} steps x {n} assets exceeds {MAX_PATH_VALUES} stored values",
                spec.scenarios,
                spec.horizon + 1
            ),
        }),
    }
}

/// Reject parameter sets whose log-price excursion could leave the f64 range.
fn check_overflow_bound(spec: &GbmSpec) -> QuantResult<()> {
    let max_s0 = spec.initial_prices.iter().cloned().fold(0.0, f64::max);
    let headroom = (f64::MAX / max_s0).ln();
    let t = spec.dt * spec.horizon as f64;
    for (i, (&mu, &sigma)) in spec.drifts.iter().zip(&spec.volatilities).enumerate() {
        let bound = (mu - 0.5 * sigma * sigma).abs() * t + OVERFLOW_SIGMAS * sigma * t.sqrt();
        if !bound.is_finite() || bound > headroom {
            return Err(QuantError::NumericOverflow {
                context: format!(
                    "asset {i}: log-price bound {bound:.2} exceeds headroom {headroom:.2}"
                ),
            });
        }
    }
    Ok(())
}

/// Simulate correlated GBM price paths.
///
/// `S(t) = S(t-1) exp[(μ - σ²/2) dt + σ √dt e]` where `e = L z` for i.i.d.
/// standard normals `z`. Scenarios are generated in batches of `BATCH_SIZE`
/// on the rayon pool.
pub fn simulate_paths(spec: &GbmSpec) -> QuantResult<SimulationPaths> {
    validate(spec)?;
    let factor = CholeskyFactor::decompose(&spec.correlation)?;
    check_overflow_bound(spec)?;

    let n = spec.initial_prices.len();
    let h = spec.horizon;
    let stride = (h + 1) * n;

    let drift_term: Vec<f64> = spec
        .drifts
        .iter()
        .zip(&spec.volatilities)
        .map(|(mu, sigma)| (mu - 0.5 * sigma * sigma) * spec.dt)
        .collect();
    let vol_term: Vec<f64> = spec
        .volatilities
        .iter()
        .map(|sigma| sigma * spec.dt.sqrt())
        .collect();

    let base_seed = match spec.seed {
        Some(s) => s,
        None => StdRng::from_entropy().next_u64(),
    };
    let normal = standard_normal()?;

    let mut data = vec![0.0; spec.scenarios * stride];

    data.par_chunks_mut(BATCH_SIZE * stride)
        .enumerate()
        .try_for_each(|(batch, chunk)| -> QuantResult<()> {
            let mut rng = StdRng::seed_from_u64(batch_seed(base_seed, batch));
            let mut z = vec![0.0; n];
            let mut e = vec![0.0; n];

            for (local, scenario) in chunk.chunks_mut(stride).enumerate() {
                scenario[..n].copy_from_slice(&spec.initial_prices);
                for t in 1..=h {
                    for v in z.iter_mut() {
                        *v = rng.sample(&normal);
                    }
                    factor.correlate(&z, &mut e);
                    let (prev, next) = scenario.split_at_mut(t * n);
                    let prev = &prev[(t - 1) * n..];
                    for a in 0..n {
                        let s = prev[a] * (drift_term[a] + vol_term[a] * e[a]).exp();
                        if !s.is_finite() || s <= 0.0 {
                            return Err(QuantError::NumericOverflow {
                                context: format!(
                                    "scenario {}, step {t}, asset {a}",
                                    batch * BATCH_SIZE + local
                                ),
                            });
                        }
                        next[a] = s;
                    }
                }
            }
            Ok(())
        })?;

    Ok(SimulationPaths {
        scenarios: spec.scenarios,
        horizon: h,
        assets: n,
        data,
    })
}
