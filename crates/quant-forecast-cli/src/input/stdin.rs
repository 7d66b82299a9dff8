use serde_json::Value;
use std::io::{self, Read};

/// Piped stdin as text. `None` when stdin is a terminal or the pipe is empty.
pub fn read_stdin_text() -> Result<Option<String>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    tracing::debug!(bytes = trimmed.len(), "read input from stdin");
    Ok(Some(trimmed.to_string()))
}

/// Piped stdin parsed as JSON.
pub fn read_stdin() -> Result<Option<Value>, Box<dyn std::error::Error>> {
    match read_stdin_text()? {
        Some(text) => {
            let value: Value = serde_json::from_str(&text)
                .map_err(|e| format!("Failed to parse JSON from stdin: {}", e))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}
