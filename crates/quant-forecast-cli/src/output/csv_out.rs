use serde_json::{Map, Value};
use std::io::{self, Write};

/// Write output as CSV to stdout.
///
/// A result whose main payload is a list of records (VaR estimates, DCF
/// projections, frontier points, per-asset forecasts) is written one row per
/// record. Anything else is flattened to `field,value` rows with dotted paths.
pub fn print_csv(value: &Value) -> io::Result<()> {
    let stdout = io::stdout();
    write_csv(stdout.lock(), value)
}

pub fn write_csv<W: Write>(writer: W, value: &Value) -> io::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    match primary_records(result) {
        Some(records) => write_records(&mut wtr, records)?,
        None => {
            wtr.write_record(["field", "value"])?;
            let mut rows = Vec::new();
            flatten("", result, &mut rows);
            for (field, val) in rows {
                wtr.write_record([field, val])?;
            }
        }
    }
    wtr.flush()
}

/// The first array of objects among the result's top-level fields.
fn primary_records(result: &Value) -> Option<&[Value]> {
    match result {
        Value::Array(items) if items.iter().all(Value::is_object) => Some(items),
        Value::Object(map) => map.values().find_map(|v| match v {
            Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
                Some(items.as_slice())
            }
            _ => None,
        }),
        _ => None,
    }
}

fn write_records<W: Write>(wtr: &mut csv::Writer<W>, records: &[Value]) -> io::Result<()> {
    let Some(Value::Object(first)) = records.first() else {
        return Ok(());
    };
    let mut header_rows = Vec::new();
    flatten("", &Value::Object(first.clone()), &mut header_rows);
    let headers: Vec<String> = header_rows.into_iter().map(|(k, _)| k).collect();
    wtr.write_record(&headers)?;

    for record in records {
        let mut cells = Vec::new();
        flatten("", record, &mut cells);
        let lookup: Map<String, Value> = cells
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        let row: Vec<&str> = headers
            .iter()
            .map(|h| lookup.get(h).and_then(Value::as_str).unwrap_or(""))
            .collect();
        wtr.write_record(&row)?;
    }
    Ok(())
}

/// Depth-first `(dotted.path, value)` pairs. Arrays of scalars are joined
/// with `;`, arrays of structures are indexed.
fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten(&join(k), v, out);
            }
        }
        Value::Array(items) if items.iter().any(|v| v.is_object() || v.is_array()) => {
            for (i, v) in items.iter().enumerate() {
                flatten(&join(&i.to_string()), v, out);
            }
        }
        Value::Array(items) => {
            let joined = items.iter().map(scalar).collect::<Vec<_>>().join(";");
            out.push((prefix.to_string(), joined));
        }
        other => out.push((prefix.to_string(), scalar(other))),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
