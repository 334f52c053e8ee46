// src/clock.rs

//! Conversion between elapsed seconds and the `H:MM:SS` display form.
//!
//! Hours are unpadded and unbounded; minutes and seconds are always two
//! digits. Parsing is lenient about padding (`"0:0:0"` is accepted) but
//! strict about shape: exactly three colon-separated digit fields, with
//! minutes and seconds below 60.

use crate::errors::{ProcregError, Result};

/// Format a number of seconds as `H:MM:SS`.
pub fn seconds_to_clock(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    format!("{hours}:{minutes:02}:{seconds:02}")
}

/// Parse an `H:MM:SS` string back into seconds.
pub fn clock_to_seconds(s: &str) -> Result<u64> {
    let fields: Vec<&str> = s.split(':').collect();
    if fields.len() != 3 {
        return Err(ProcregError::FormatError(format!(
            "'{s}' must have exactly three colon-separated fields"
        )));
    }

    let hours = parse_field(s, fields[0], "hours")?;
    let minutes = parse_field(s, fields[1], "minutes")?;
    let seconds = parse_field(s, fields[2], "seconds")?;

    if minutes >= 60 || seconds >= 60 {
        return Err(ProcregError::FormatError(format!(
            "'{s}' has minutes or seconds out of range (0-59)"
        )));
    }

    hours
        .checked_mul(3600)
        .and_then(|h| h.checked_add(minutes * 60 + seconds))
        .ok_or_else(|| ProcregError::FormatError(format!("'{s}' overflows the seconds counter")))
}

fn parse_field(input: &str, field: &str, name: &str) -> Result<u64> {
    // `u64::from_str` accepts a leading '+', which is not a clock digit.
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProcregError::FormatError(format!(
            "'{input}' has a non-numeric {name} field '{field}'"
        )));
    }
    field.parse::<u64>().map_err(|e| {
        ProcregError::FormatError(format!("'{input}' has an invalid {name} field: {e}"))
    })
}
