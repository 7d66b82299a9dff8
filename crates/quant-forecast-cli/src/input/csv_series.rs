//! CSV readers for price histories, return columns and frontier tables.

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::path::Path;

use quant_forecast_core::forecast::PriceSeries;
use quant_forecast_core::portfolio::frontier::FrontierPoint;
use quant_forecast_core::returns::series::PricePoint;

use super::file::resolve_path;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const DATE_COLUMNS: [&str; 2] = ["date", "timestamp"];
const PRICE_COLUMNS: [&str; 4] = ["price", "adj_close", "adjusted", "close"];
const RETURN_COLUMNS: [&str; 2] = ["return", "returns"];

/// `date,price` history for one asset.
///
/// The price column may also be named `close`, `adj_close` or `adjusted`.
pub fn read_price_csv(path: &Path) -> CliResult<Vec<PricePoint>> {
    let (headers, records) = read_records(path)?;
    let date_col = find_column(&headers, &DATE_COLUMNS)
        .ok_or_else(|| format!("'{}' has no date column", path.display()))?;
    let price_col = find_column(&headers, &PRICE_COLUMNS)
        .ok_or_else(|| format!("'{}' has no price column", path.display()))?;

    records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            Ok(PricePoint {
                date: parse_date(field(r, date_col), i + 2)?,
                price: parse_f64(field(r, price_col), "price", i + 2)?,
            })
        })
        .collect()
}

/// Wide `date,<ASSET>,<ASSET>,...` price table.
///
/// An empty cell is a missing price for that asset on that date, so the
/// series can have different lengths.
pub fn read_wide_price_csv(path: &Path) -> CliResult<Vec<PriceSeries>> {
    let (headers, records) = read_records(path)?;
    let date_col = find_column(&headers, &DATE_COLUMNS)
        .ok_or_else(|| format!("'{}' has no date column", path.display()))?;

    let mut series: Vec<PriceSeries> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != date_col)
        .map(|(_, name)| PriceSeries {
            asset: name.to_string(),
            prices: Vec::with_capacity(records.len()),
        })
        .collect();
    if series.is_empty() {
        return Err(format!("'{}' has no asset columns", path.display()).into());
    }

    for (i, record) in records.iter().enumerate() {
        let date = parse_date(field(record, date_col), i + 2)?;
        let cells = (0..headers.len()).filter(|c| *c != date_col);
        for (s, col) in series.iter_mut().zip(cells) {
            let cell = field(record, col);
            if cell.is_empty() {
                continue;
            }
            s.prices.push(PricePoint {
                date,
                price: parse_f64(cell, &s.asset, i + 2)?,
            });
        }
    }
    Ok(series)
}

/// A single column of returns, named `return` or the only column in the file.
pub fn read_return_csv(path: &Path) -> CliResult<Vec<f64>> {
    let (headers, records) = read_records(path)?;
    let col = match find_column(&headers, &RETURN_COLUMNS) {
        Some(c) => c,
        None if headers.len() == 1 => 0,
        None => return Err(format!("'{}' has no return column", path.display()).into()),
    };
    records
        .iter()
        .enumerate()
        .map(|(i, r)| parse_f64(field(r, col), "return", i + 2))
        .collect()
}

/// Frontier table with `mean`, `StdDev` and one `w.<ASSET>` column per asset.
///
/// Returns the asset names in column order and one point per row.
pub fn read_frontier_csv(path: &Path) -> CliResult<(Vec<String>, Vec<FrontierPoint>)> {
    let (headers, records) = read_records(path)?;
    let mean_col = find_column(&headers, &["mean"])
        .ok_or_else(|| format!("'{}' has no mean column", path.display()))?;
    let risk_col = find_column(&headers, &["stddev", "std_dev", "sd"])
        .ok_or_else(|| format!("'{}' has no StdDev column", path.display()))?;

    let weight_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| h.strip_prefix("w.").map(|a| (i, a.to_string())))
        .collect();
    if weight_cols.is_empty() {
        return Err(format!("'{}' has no w.<ASSET> weight columns", path.display()).into());
    }

    let points = records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let weights = weight_cols
                .iter()
                .map(|(c, asset)| parse_f64(field(r, *c), asset, i + 2))
                .collect::<CliResult<Vec<f64>>>()?;
            Ok(FrontierPoint {
                expected_return: parse_f64(field(r, mean_col), "mean", i + 2)?,
                risk: parse_f64(field(r, risk_col), "StdDev", i + 2)?,
                weights,
            })
        })
        .collect::<CliResult<Vec<_>>>()?;

    let assets = weight_cols.into_iter().map(|(_, a)| a).collect();
    Ok((assets, points))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_records(path: &Path) -> CliResult<(Vec<String>, Vec<StringRecord>)> {
    let resolved = resolve_path(path)?;
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(&resolved)
        .map_err(|e| format!("Failed to open '{}': {}", resolved.display(), e))?;
    let headers = reader
        .headers()
        .map_err(|e| format!("Failed to read header of '{}': {}", resolved.display(), e))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect::<Vec<_>>();
    let records = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("Failed to parse '{}': {}", resolved.display(), e))?;
    tracing::debug!(
        path = %resolved.display(),
        columns = headers.len(),
        rows = records.len(),
        "read CSV input"
    );
    Ok((headers, records))
}

fn find_column(headers: &[String], names: &[&str]) -> Option<usize> {
    names.iter().find_map(|name| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
    })
}

fn field(record: &StringRecord, col: usize) -> &str {
    record.get(col).unwrap_or("")
}

fn parse_date(s: &str, line: usize) -> CliResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| format!("line {line}: invalid date '{s}': {e}").into())
}

fn parse_f64(s: &str, column: &str, line: usize) -> CliResult<f64> {
    s.parse::<f64>()
        .map_err(|_| format!("line {line}: invalid number '{s}' in column '{column}'").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn csv_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_price_csv_accepts_close_column() {
        let file = csv_file("Date,Close\n2024-01-02,100.5\n2024-01-03,101.25\n");
        let prices = read_price_csv(file.path()).unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[1].price, 101.25);
        assert_eq!(prices[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[test]
    fn test_wide_csv_skips_empty_cells() {
        let file = csv_file(
            "date,AAA,BBB\n2024-01-02,10,20\n2024-01-03,,21\n2024-01-04,11,22\n",
        );
        let series = read_wide_price_csv(file.path()).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].asset, "AAA");
        assert_eq!(series[0].prices.len(), 2);
        assert_eq!(series[1].prices.len(), 3);
    }

    #[test]
    fn test_bad_number_reports_line() {
        let file = csv_file("date,price\n2024-01-02,abc\n");
        let err = read_price_csv(file.path()).unwrap_err().to_string();
        assert!(err.contains("line 2"), "{err}");
    }

    #[test]
    fn test_single_column_returns() {
        let file = csv_file("r\n0.01\n-0.02\n0.005\n");
        assert_eq!(read_return_csv(file.path()).unwrap(), vec![0.01, -0.02, 0.005]);
    }

    #[test]
    fn test_frontier_table_columns() {
        let file = csv_file(
            "mean,StdDev,w.AAA,w.BBB\n0.0002,0.007,0.7,0.3\n0.0004,0.008,0.5,0.5\n",
        );
        let (assets, points) = read_frontier_csv(file.path()).unwrap();
        assert_eq!(assets, vec!["AAA".to_string(), "BBB".to_string()]);
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].weights, vec![0.5, 0.5]);
        assert_eq!(points[0].risk, 0.007);
    }
}
