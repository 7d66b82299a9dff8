use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::QuantError;
use crate::stats;
use crate::types::{with_metadata_f64, ComputationOutput};
use crate::QuantResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Frequency of return observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annual,
}

impl ReturnFrequency {
    /// Number of periods in a year for annualisation
    pub fn periods_per_year(&self) -> f64 {
        match self {
            ReturnFrequency::Daily => 252.0,
            ReturnFrequency::Weekly => 52.0,
            ReturnFrequency::Monthly => 12.0,
            ReturnFrequency::Quarterly => 4.0,
            ReturnFrequency::Annual => 1.0,
        }
    }
}

/// How periodic returns are computed from consecutive prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    /// (P_t - P_{t-1}) / P_{t-1}
    #[default]
    Simple,
    /// ln(P_t / P_{t-1})
    Log,
}

/// A dated price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// A dated periodic return.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Ordered periodic returns for one asset.
///
/// Dates are strictly increasing and every value is finite. The only ways to
/// obtain one are [`compute_returns`] and [`ReturnSeries::new`], both of which
/// enforce this.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnSeries {
    asset: String,
    kind: ReturnKind,
    points: Vec<ReturnPoint>,
}

impl ReturnSeries {
    pub fn new(
        asset: impl Into<String>,
        kind: ReturnKind,
        points: Vec<ReturnPoint>,
    ) -> QuantResult<Self> {
        let asset = asset.into();
        for (i, p) in points.iter().enumerate() {
            if !p.value.is_finite() {
                return Err(QuantError::InvalidInput {
                    field: format!("returns[{asset}][{i}]"),
                    reason: format!("Return must be finite, got {}", p.value),
                });
            }
            if i > 0 && p.date <= points[i - 1].date {
                return Err(QuantError::InvalidInput {
                    field: format!("returns[{asset}][{i}].date"),
                    reason: format!(
                        "Dates must be strictly increasing ({} follows {})",
                        p.date,
                        points[i - 1].date
                    ),
                });
            }
        }
        Ok(Self {
            asset,
            kind,
            points,
        })
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn kind(&self) -> ReturnKind {
        self.kind
    }

    pub fn points(&self) -> &[ReturnPoint] {
        &self.points
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl<'de> Deserialize<'de> for ReturnSeries {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            asset: String,
            #[serde(default)]
            kind: ReturnKind,
            points: Vec<ReturnPoint>,
        }
        let raw = Raw::deserialize(deserializer)?;
        ReturnSeries::new(raw.asset, raw.kind, raw.points).map_err(serde::de::Error::custom)
    }
}

/// Annualised summary of a return series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnualisedStats {
    pub observations: usize,
    pub periodic_mean: f64,
    pub periodic_std_dev: f64,
    pub periods_per_year: f64,
    pub annualised_mean: f64,
    pub annualised_volatility: f64,
}

/// Input for price → return normalisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormaliseInput {
    pub asset: String,
    pub prices: Vec<PricePoint>,
    #[serde(default)]
    pub kind: ReturnKind,
    #[serde(default)]
    pub frequency: ReturnFrequency,
    /// Overrides the frequency's periods-per-year when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub periods_per_year: Option<f64>,
}

/// Output of price → return normalisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormaliseOutput {
    pub returns: ReturnSeries,
    pub stats: AnnualisedStats,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Convert an ordered price series into periodic returns.
///
/// The first observation has no return, so the result has `prices.len() - 1`
/// points dated at the later observation of each pair.
pub fn compute_returns(
    asset: &str,
    prices: &[PricePoint],
    kind: ReturnKind,
) -> QuantResult<ReturnSeries> {
    if prices.len() < 2 {
        return Err(QuantError::InsufficientData(format!(
            "At least 2 price observations required for '{asset}', got {}",
            prices.len()
        )));
    }
    validate_prices(asset, prices)?;

    let points = prices
        .windows(2)
        .map(|w| {
            let (prev, curr) = (w[0].price, w[1].price);
            let value = match kind {
                ReturnKind::Simple => (curr - prev) / prev,
                ReturnKind::Log => (curr / prev).ln(),
            };
            ReturnPoint {
                date: w[1].date,
                value,
            }
        })
        .collect();

    ReturnSeries::new(asset, kind, points)
}

/// Annualise the mean and volatility of a return series.
///
/// Requires at least 2 returns; the sample standard deviation is undefined
/// below that and the caller gets `InsufficientData` rather than zeros.
pub fn annualise(series: &ReturnSeries, periods_per_year: f64) -> QuantResult<AnnualisedStats> {
    if !periods_per_year.is_finite() || periods_per_year <= 0.0 {
        return Err(QuantError::InvalidInput {
            field: "periods_per_year".into(),
            reason: format!("Must be positive, got {periods_per_year}"),
        });
    }
    let values = series.values();
    let (periodic_mean, periodic_std_dev) =
        match (stats::mean(&values), stats::sample_std_dev(&values)) {
            (Some(m), Some(s)) => (m, s),
            _ => {
                return Err(QuantError::InsufficientData(format!(
                    "At least 2 returns required to annualise '{}', got {}",
                    series.asset(),
                    values.len()
                )))
            }
        };

    Ok(AnnualisedStats {
        observations: values.len(),
        periodic_mean,
        periodic_std_dev,
        periods_per_year,
        annualised_mean: periodic_mean * periods_per_year,
        annualised_volatility: periodic_std_dev * periods_per_year.sqrt(),
    })
}

/// Normalise a price series into returns and annualised statistics.
pub fn normalise_prices(
    input: &NormaliseInput,
) -> QuantResult<ComputationOutput<NormaliseOutput>> {
    let start = Instant::now();
    let warnings: Vec<String> = Vec::new();

    let periods = input
        .periods_per_year
        .unwrap_or_else(|| input.frequency.periods_per_year());
    let returns = compute_returns(&input.asset, &input.prices, input.kind)?;
    let stats = annualise(&returns, periods)?;

    let output = NormaliseOutput { returns, stats };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Periodic returns with annualised mean and volatility",
        &serde_json::json!({
            "asset": input.asset,
            "kind": input.kind,
            "periods_per_year": periods,
            "price_observations": input.prices.len(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn validate_prices(asset: &str, prices: &[PricePoint]) -> QuantResult<()> {
    for (i, p) in prices.iter().enumerate() {
        if !p.price.is_finite() || p.price <= 0.0 {
            return Err(QuantError::InvalidInput {
                field: format!("prices[{asset}][{i}]"),
                reason: format!("Price must be finite and positive, got {}", p.price),
            });
        }
        if i > 0 && p.date <= prices[i - 1].date {
            return Err(QuantError::InvalidInput {
                field: format!("prices[{asset}][{i}].date"),
                reason: "Dates must be strictly increasing with no duplicates".into(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
