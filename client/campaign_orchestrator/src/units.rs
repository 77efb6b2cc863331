//! Conversions between human-facing decimals and the ledger's fixed-point
//! integers. Everything past this boundary compares integers only.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Decimal places of the Stellar asset used for escrow.
pub const DEFAULT_DECIMALS: u32 = 7;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitsError {
    #[error("amount is empty")]
    Empty,
    #[error("malformed amount {0:?}")]
    Malformed(String),
    #[error("amount must not be negative")]
    Negative,
    #[error("amount has more than {0} decimal places")]
    TooPrecise(u32),
    #[error("amount does not fit the ledger's integer range")]
    Overflow,
    #[error("malformed time {0:?}: expected unix seconds, RFC 3339 or +duration such as +2h")]
    Timestamp(String),
}

fn scale(decimals: u32) -> Result<i128, UnitsError> {
    10i128.checked_pow(decimals).ok_or(UnitsError::Overflow)
}

fn digits(part: &str, input: &str) -> Result<i128, UnitsError> {
    if !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(UnitsError::Malformed(input.to_string()));
    }
    part.bytes().try_fold(0i128, |acc, b| {
        acc.checked_mul(10)
            .and_then(|acc| acc.checked_add(i128::from(b - b'0')))
            .ok_or(UnitsError::Overflow)
    })
}

/// Parse `"12.5"` into minor units with `decimals` places.
pub fn parse_amount(input: &str, decimals: u32) -> Result<i128, UnitsError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(UnitsError::Empty);
    }
    if input.starts_with('-') {
        return Err(UnitsError::Negative);
    }

    let (whole, fraction) = match input.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (input, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(UnitsError::Malformed(input.to_string()));
    }
    if fraction.len() > decimals as usize {
        return Err(UnitsError::TooPrecise(decimals));
    }

    let whole = digits(whole, input)?;
    let fraction_value = digits(fraction, input)?;
    let padding = scale(decimals - fraction.len() as u32)?;

    whole
        .checked_mul(scale(decimals)?)
        .and_then(|v| fraction_value.checked_mul(padding).and_then(|f| v.checked_add(f)))
        .ok_or(UnitsError::Overflow)
}

/// Render minor units as a decimal, without trailing zeros.
pub fn format_amount(value: i128, decimals: u32) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let magnitude = value.unsigned_abs();
    let Some(scale) = 10u128.checked_pow(decimals) else {
        return value.to_string();
    };

    let whole = magnitude / scale;
    let fraction = magnitude % scale;
    if fraction == 0 {
        return format!("{sign}{whole}");
    }
    let fraction = format!("{fraction:0width$}", width = decimals as usize);
    format!("{sign}{whole}.{}", fraction.trim_end_matches('0'))
}

/// Accept unix seconds or an RFC 3339 timestamp.
pub fn parse_timestamp(input: &str) -> Result<u64, UnitsError> {
    let input = input.trim();
    if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
        return input
            .parse()
            .map_err(|_| UnitsError::Timestamp(input.to_string()));
    }
    let parsed = DateTime::parse_from_rfc3339(input)
        .map_err(|_| UnitsError::Timestamp(input.to_string()))?;
    u64::try_from(parsed.timestamp()).map_err(|_| UnitsError::Timestamp(input.to_string()))
}

/// A deadline: an absolute timestamp, or `+<n>[s|m|h|d]` counted from `now`.
pub fn parse_deadline(input: &str, now: u64) -> Result<u64, UnitsError> {
    let input = input.trim();
    let Some(relative) = input.strip_prefix('+') else {
        return parse_timestamp(input);
    };
    let malformed = || UnitsError::Timestamp(input.to_string());

    let (count, unit) = match relative.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => relative.split_at(split),
        None => (relative, "s"),
    };
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        _ => return Err(malformed()),
    };
    let count: u64 = count.parse().map_err(|_| malformed())?;
    count
        .checked_mul(multiplier)
        .and_then(|secs| now.checked_add(secs))
        .ok_or_else(malformed)
}

pub fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}
