//! JSON line I/O for the CLI
//!
//! - Input: one JSON value per stdin line, blank lines skipped
//! - Output: one JSON object per stdout line
//! - UTF-8 only

use std::io::{self, BufRead, Write};

use serde_json::{json, Value};

use crate::errors::{CvlErrorCode, CvlResult};

use super::errors::{CliError, CliResult};

/// Read JSON values from stdin, one per non-blank line
pub fn read_requests() -> impl Iterator<Item = CliResult<Value>> {
    let stdin = io::stdin();
    stdin
        .lock()
        .lines()
        .filter(|line| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
        .map(|line| {
            let line = line.map_err(CliError::from)?;
            serde_json::from_str(&line).map_err(CliError::from)
        })
}

/// Response line for one validated batch
pub fn validation_response(result: CvlResult<()>) -> Value {
    match result {
        Ok(()) => json!({"status": "ok", "code": CvlErrorCode::Success.code()}),
        Err(e) => {
            let (info, code) = e.into_parts();
            json!({
                "status": "error",
                "code": code.code(),
                "info": info,
            })
        }
    }
}

/// Write one response line to stdout
pub fn write_response(response: &Value) -> CliResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, response)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

/// Write a CLI-level error line to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    write_response(&json!({
        "status": "error",
        "code": code,
        "message": message
    }))
}
