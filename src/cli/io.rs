//! JSON I/O handling for CLI
//!
//! - Input: a snapshot file holding an ordered JSON array of events
//! - Output: a single JSON object per invocation on stdout

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde_json::Value;

use super::errors::{CliError, CliResult};
use crate::ledger::Event;

/// Read a snapshot written by `export`
pub fn read_snapshot(path: &Path) -> CliResult<Vec<Event>> {
    let content = fs::read_to_string(path).map_err(|e| {
        CliError::snapshot_error(format!("failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        CliError::snapshot_error(format!("invalid snapshot {}: {}", path.display(), e))
    })
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}
