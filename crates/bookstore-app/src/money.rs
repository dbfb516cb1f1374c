// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::fmt;

/// Significant digits a price may carry after rounding to cents.
pub const PRICE_PRECISION: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoneyError;

impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Error: The price is wrong")
    }
}

impl std::error::Error for MoneyError {}

/// Parses a price into cents. Either `.` or `,` marks the decimals; extra decimals
/// round half down.
pub fn parse_price(input: &str) -> Result<i64, MoneyError> {
    let clean = input.trim().replace(',', ".");
    let (negative, unsigned) = match clean.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, clean.as_str()),
    };
    if unsigned.is_empty() {
        return Err(MoneyError);
    }

    let mut parts = unsigned.split('.');
    let whole = parts.next().unwrap_or("");
    let fraction = parts.next().unwrap_or("");
    if parts.next().is_some() || (whole.is_empty() && fraction.is_empty()) {
        return Err(MoneyError);
    }
    if !whole.bytes().chain(fraction.bytes()).all(|byte| byte.is_ascii_digit()) {
        return Err(MoneyError);
    }

    let whole = whole.trim_start_matches('0');
    if whole.len() + 2 > PRICE_PRECISION {
        return Err(MoneyError);
    }
    let units: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| MoneyError)?
    };

    let mut cents = units * 100 + leading_cents(fraction);
    if rounds_up(fraction) {
        cents += 1;
    }
    // Rounding 9999.999 up leaves seven digits.
    if cents >= 10_i64.pow(PRICE_PRECISION as u32) {
        return Err(MoneyError);
    }
    Ok(if negative { -cents } else { cents })
}

fn leading_cents(fraction: &str) -> i64 {
    let bytes = fraction.as_bytes();
    let digit = |index: usize| bytes.get(index).map_or(0, |byte| i64::from(byte - b'0'));
    digit(0) * 10 + digit(1)
}

// Half down: a remainder of exactly one half is dropped.
fn rounds_up(fraction: &str) -> bool {
    let Some(rest) = fraction.get(2..) else {
        return false;
    };
    let mut digits = rest.bytes();
    match digits.next() {
        Some(first) if first > b'5' => true,
        Some(b'5') => digits.any(|digit| digit != b'0'),
        _ => false,
    }
}

pub fn format_price(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{sign}{}.{:02}", cents / 100, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::{MoneyError, format_price, parse_price};

    #[test]
    fn accepts_either_decimal_mark() {
        assert_eq!(parse_price("12.5"), Ok(1250));
        assert_eq!(parse_price("12,50"), Ok(1250));
        assert_eq!(parse_price("7"), Ok(700));
        assert_eq!(parse_price(".75"), Ok(75));
    }

    #[test]
    fn extra_decimals_round_half_down() {
        assert_eq!(parse_price("1.005"), Ok(100));
        assert_eq!(parse_price("1.006"), Ok(101));
        assert_eq!(parse_price("1.0051"), Ok(101));
        assert_eq!(parse_price("0.994"), Ok(99));
    }

    #[test]
    fn rejects_more_than_six_significant_digits() {
        assert_eq!(parse_price("9999.99"), Ok(999_999));
        assert_eq!(parse_price("10000"), Err(MoneyError));
        assert_eq!(parse_price("9999.999"), Err(MoneyError));
        assert_eq!(parse_price("00012.30"), Ok(1230));
    }

    #[test]
    fn rejects_junk() {
        for input in ["", "-", "1.2.3", "12a", "+3", "1 000", "."] {
            assert_eq!(parse_price(input), Err(MoneyError), "input {input:?}");
        }
        assert_eq!(MoneyError.to_string(), "Error: The price is wrong");
    }

    #[test]
    fn format_always_shows_two_decimals() {
        assert_eq!(format_price(1250), "12.50");
        assert_eq!(format_price(5), "0.05");
        assert_eq!(format_price(-120), "-1.20");
    }
}
