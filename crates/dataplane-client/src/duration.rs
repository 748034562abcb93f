//! Go-style duration strings
//!
//! Timeouts in a dataplane config use the `time.ParseDuration` grammar shared
//! with the rest of the Kubernetes tooling: a sequence of decimal numbers,
//! each with an optional fraction and a unit suffix, such as `300ms`, `1.5s`
//! or `1m30s`. Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`.

use crate::error::DataplaneError;
use std::time::Duration;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;

// Fraction digits past this point cannot change the result.
const MAX_FRACTION_DIGITS: usize = 18;

/// Parse a Go duration string.
///
/// Negative durations are rejected since a timeout cannot be negative.
pub fn parse_go_duration(input: &str) -> Result<Duration, DataplaneError> {
    let invalid = || DataplaneError::InvalidTimeout(input.to_string());

    let mut rest = input.strip_prefix('+').unwrap_or(input);
    if rest.starts_with('-') {
        return Err(invalid());
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let (whole, after) = split_digits(rest);
        let (fraction, after) = match after.strip_prefix('.') {
            Some(after_dot) => split_digits(after_dot),
            None => ("", after),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, after) = after.split_at(unit_len);
        let scale = unit_scale(unit).ok_or_else(invalid)?;

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut value = whole.checked_mul(scale).ok_or_else(invalid)?;

        let mut numerator: u128 = 0;
        let mut denominator: u128 = 1;
        for digit in fraction.bytes().take(MAX_FRACTION_DIGITS) {
            numerator = numerator * 10 + u128::from(digit - b'0');
            denominator *= 10;
        }
        value += numerator * scale / denominator;

        total = total.checked_add(value).ok_or_else(invalid)?;
        rest = after;
    }

    u64::try_from(total)
        .map(Duration::from_nanos)
        .map_err(|_| invalid())
}

fn split_digits(s: &str) -> (&str, &str) {
    let len = s.bytes().take_while(u8::is_ascii_digit).count();
    s.split_at(len)
}

fn unit_scale(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        // U+00B5 micro sign and U+03BC Greek mu
        "us" | "\u{b5}s" | "\u{3bc}s" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SECOND),
        "m" => Some(60 * NANOS_PER_SECOND),
        "h" => Some(60 * 60 * NANOS_PER_SECOND),
        _ => None,
    }
}
