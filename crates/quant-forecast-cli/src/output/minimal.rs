use serde_json::Value;

/// Headline numbers, most specific first. Nested paths use `/`.
const HEADLINE_KEYS: [&str; 8] = [
    "intrinsic_value",
    "expected_return",
    "sharpe_ratio",
    "max_sharpe/index",
    "min_variance/risk",
    "stats/annualised_volatility",
    "simulation/portfolio/probability_of_loss",
    "common_dates",
];

/// Render just the key answer of a command.
///
/// VaR / ES estimates print one line per method; otherwise the first
/// non-null headline key wins, then the first field of the result.
pub fn render_minimal(value: &Value) -> String {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Some(lines) = risk_lines(result) {
        return lines;
    }

    for key in HEADLINE_KEYS {
        if let Some(v) = result.pointer(&format!("/{key}")) {
            if !v.is_null() {
                return format_scalar(v);
            }
        }
    }

    match result {
        Value::Object(map) => match map.iter().next() {
            Some((key, val)) => format!("{}: {}", key, format_scalar(val)),
            None => String::new(),
        },
        other => format_scalar(other),
    }
}

fn risk_lines(result: &Value) -> Option<String> {
    let estimates = result
        .get("estimates")
        .or_else(|| result.pointer("/portfolio/risk"))
        .or_else(|| result.pointer("/simulation/portfolio/risk"))?
        .as_array()?;
    let lines: Vec<String> = estimates
        .iter()
        .filter_map(|e| {
            Some(format!(
                "{} var={} es={}",
                e.get("method")?.as_str()?,
                format_scalar(e.get("var")?),
                format_scalar(e.get("es")?)
            ))
        })
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn format_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
