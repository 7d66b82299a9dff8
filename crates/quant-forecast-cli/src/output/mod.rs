pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;
use std::io;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) -> io::Result<()> {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => {
            table::print_table(value);
            Ok(())
        }
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => {
            println!("{}", minimal::render_minimal(value));
            Ok(())
        }
    }
}
