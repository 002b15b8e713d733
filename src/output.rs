//! JSON output for command results.

use anyhow::Result;
use serde::Serialize;

/// Pretty-prints `value` as JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
