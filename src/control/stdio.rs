//! Stdout output for machine-readable results.
//!
//! # Important
//!
//! - **stdout**: JSON summary only (one object per line)
//! - **stderr**: Logs and prompts
//! - **Never use `println!`**: It may add `\r\n` on Windows

use std::io::Write;

/// Write a line to stdout.
///
/// Writes the string followed by a single `\n` and flushes.
///
/// # Errors
///
/// Returns IO error if write or flush fails.
pub fn write_stdout_line(line: &str) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    write_line(&mut handle, line)
}

/// Write a JSON value to stdout as a single line.
///
/// # Errors
///
/// Returns error if serialization or write fails.
pub fn write_stdout_json<T: serde::Serialize>(value: &T) -> crate::error::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    write_json(&mut handle, value)
}

fn write_json<W: Write, T: serde::Serialize>(out: &mut W, value: &T) -> crate::error::Result<()> {
    let json = serde_json::to_string(value)?;
    write_line(out, &json)?;
    Ok(())
}

fn write_line<W: Write>(out: &mut W, line: &str) -> std::io::Result<()> {
    out.write_all(line.as_bytes())?;
    out.write_all(b"\n")?;
    out.flush()
}
