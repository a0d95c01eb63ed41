use chrono::{Duration, NaiveDateTime};

use super::schema::EPIC_TIMESTAMP_FORMAT;

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Decodes instrument output as UTF-8, dropping any byte sequences that are
/// not valid UTF-8 instead of failing the whole file.
pub fn decode_lossy(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    match text.strip_prefix(BYTE_ORDER_MARK) {
        Some(rest) => rest.to_string(),
        None => text,
    }
}

/// Splits on `\r\n`, `\n` or a bare `\r`. A trailing line break does not
/// produce an empty final line.
pub(crate) fn split_lines(content: &str) -> impl Iterator<Item = &str> {
    let mut rest = content;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let Some(idx) = rest.find(['\r', '\n']) else {
            return Some(std::mem::take(&mut rest));
        };
        let line = &rest[..idx];
        let break_len = if rest[idx..].starts_with("\r\n") { 2 } else { 1 };
        rest = &rest[idx + break_len..];
        Some(line)
    })
}

pub fn format_epic_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(EPIC_TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_offset_seconds(value: &str) -> Result<f64, String> {
    let trimmed = value.trim();
    let parsed = trimmed
        .parse::<f64>()
        .map_err(|err| format!("could not convert '{trimmed}' to a time offset: {err}"))?;
    if !parsed.is_finite() {
        return Err(format!("time offset '{trimmed}' is not finite"));
    }
    Ok(parsed)
}

/// Resolves `base + offset_seconds`, rounding the offset to whole microseconds
/// (ties to even).
pub(crate) fn apply_offset(base: NaiveDateTime, offset_seconds: f64) -> Result<NaiveDateTime, String> {
    let micros = (offset_seconds * 1_000_000.0).round_ties_even();
    if micros.abs() >= i64::MAX as f64 {
        return Err(format!("time offset {offset_seconds}s is out of range"));
    }
    base.checked_add_signed(Duration::microseconds(micros as i64))
        .ok_or_else(|| format!("time offset {offset_seconds}s overflows the calendar"))
}

pub fn parse_optional_f64(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}
