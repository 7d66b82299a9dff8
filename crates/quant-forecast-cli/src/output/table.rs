use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Scalar arrays longer than this are summarised instead of listed.
const MAX_INLINE_VALUES: usize = 12;

/// Format output as tables using the tabled crate.
pub fn print_table(value: &Value) {
    print!("{}", render_table(value));
}

/// Render a result envelope: scalar fields first, then one titled table per
/// matrix, list of records or nested object, then warnings and methodology.
pub fn render_table(value: &Value) -> String {
    let mut out = String::new();
    match value {
        Value::Object(map) => match map.get("result") {
            Some(Value::Object(result)) => {
                render_section(&mut out, None, result);
                render_footer(&mut out, map);
            }
            _ => render_section(&mut out, None, map),
        },
        Value::Array(arr) => render_records(&mut out, None, arr),
        other => {
            out.push_str(&format_value(other));
            out.push('\n');
        }
    }
    out
}

fn render_section(out: &mut String, title: Option<&str>, map: &Map<String, Value>) {
    let labels = map.get("assets").and_then(|a| a.as_array());

    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    let mut scalars = 0;
    for (key, val) in map {
        if is_scalar_like(val) {
            builder.push_record([key.as_str(), &format_value(val)]);
            scalars += 1;
        }
    }
    if scalars > 0 {
        push_title(out, title);
        out.push_str(&Table::from(builder).to_string());
        out.push('\n');
    }

    for (key, val) in map {
        let name = qualified(title, key);
        match val {
            Value::Array(rows) if is_grid(rows) => render_grid(out, &name, rows, labels),
            Value::Array(rows) if !rows.is_empty() && rows.iter().all(Value::is_object) => {
                render_records(out, Some(&name), rows)
            }
            Value::Object(inner) => render_section(out, Some(&name), inner),
            _ => {}
        }
    }
}

fn render_grid(out: &mut String, title: &str, rows: &[Value], labels: Option<&Vec<Value>>) {
    let cols = rows.iter().filter_map(Value::as_array).map(Vec::len).max().unwrap_or(0);
    let axis = |n: usize| -> Vec<String> {
        match labels {
            Some(l) if l.len() == n => l.iter().map(format_value).collect(),
            _ => (0..n).map(|i| i.to_string()).collect(),
        }
    };
    let mut builder = Builder::default();
    let mut header = vec![String::new()];
    header.extend(axis(cols));
    builder.push_record(header);
    for (label, row) in axis(rows.len()).into_iter().zip(rows) {
        let mut record = vec![label];
        if let Value::Array(cells) = row {
            record.extend(cells.iter().map(format_value));
        }
        builder.push_record(record);
    }
    push_title(out, Some(title));
    out.push_str(&Table::from(builder).to_string());
    out.push('\n');
}

fn render_records(out: &mut String, title: Option<&str>, rows: &[Value]) {
    let Some(Value::Object(first)) = rows.first() else {
        for item in rows {
            out.push_str(&format_value(item));
            out.push('\n');
        }
        return;
    };
    let headers: Vec<String> = first.keys().cloned().collect();
    let mut builder = Builder::default();
    builder.push_record(headers.clone());
    for item in rows {
        if let Value::Object(map) = item {
            builder.push_record(
                headers
                    .iter()
                    .map(|h| map.get(h).map(format_value).unwrap_or_default()),
            );
        }
    }
    push_title(out, title);
    out.push_str(&Table::from(builder).to_string());
    out.push('\n');
}

fn render_footer(out: &mut String, envelope: &Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            out.push_str("\nWarnings:\n");
            for w in warnings.iter().filter_map(Value::as_str) {
                out.push_str(&format!("  - {w}\n"));
            }
        }
    }
    if let Some(Value::String(meth)) = envelope.get("methodology") {
        out.push_str(&format!("\nMethodology: {meth}\n"));
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

fn push_title(out: &mut String, title: Option<&str>) {
    if let Some(t) = title {
        out.push_str(&format!("\n{t}\n"));
    }
}

fn qualified(parent: Option<&str>, key: &str) -> String {
    match parent {
        Some(p) => format!("{p}.{key}"),
        None => key.to_string(),
    }
}

fn is_scalar_like(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().all(is_scalar),
        Value::Object(_) => false,
        _ => true,
    }
}

/// Non-empty array of arrays of scalars: matrices and value grids.
fn is_grid(rows: &[Value]) -> bool {
    !rows.is_empty()
        && rows
            .iter()
            .all(|r| r.as_array().is_some_and(|cells| cells.iter().all(is_scalar)))
}

fn is_scalar(value: &Value) -> bool {
    !value.is_array() && !value.is_object()
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(x) if n.is_f64() => format_float(x),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(items) if items.len() > MAX_INLINE_VALUES => {
            format!("[{} values]", items.len())
        }
        Value::Array(items) => items.iter().map(format_value).collect::<Vec<_>>().join(", "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Six decimals, trailing zeros trimmed.
fn format_float(x: f64) -> String {
    let s = format!("{x:.6}");
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
