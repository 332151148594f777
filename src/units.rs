//! Number and date helpers following German conventions.
//!
//! Parsing is lenient: anything that is not a finite number counts as zero.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A form value that may be stored as a TOML number or as free text such as `"1,5"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberInput {
    Number(f64),
    Text(String),
}

impl NumberInput {
    /// Numeric value, zero when blank or unparseable
    pub fn value(&self) -> f64 {
        match self {
            NumberInput::Number(n) if n.is_finite() => *n,
            NumberInput::Number(_) => 0.0,
            NumberInput::Text(s) => parse_locale_number(s),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            NumberInput::Number(_) => false,
            NumberInput::Text(s) => s.trim().is_empty(),
        }
    }
}

impl Default for NumberInput {
    fn default() -> Self {
        NumberInput::Text(String::new())
    }
}

impl From<f64> for NumberInput {
    fn from(value: f64) -> Self {
        NumberInput::Number(value)
    }
}

impl From<&str> for NumberInput {
    fn from(value: &str) -> Self {
        NumberInput::Text(value.to_string())
    }
}

impl fmt::Display for NumberInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberInput::Number(n) => write!(f, "{n}"),
            NumberInput::Text(s) => f.write_str(s),
        }
    }
}

/// Parse a number written with `,` as decimal separator.
///
/// Only the first comma is treated as the decimal point and the longest numeric
/// prefix wins, so `"12,5 km"` yields `12.5`. Returns `0.0` for anything else.
pub fn parse_locale_number(input: &str) -> f64 {
    let normalized = input.replacen(',', ".", 1);
    let prefix = numeric_prefix(normalized.trim_start());
    prefix
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

fn numeric_prefix(s: &str) -> &str {
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }

    if digits == 0 {
        return "";
    }

    // Exponent only counts when followed by at least one digit
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+') | Some(b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    &s[..end]
}

/// Format an amount as EUR, e.g. `1.234,50 €`.
///
/// Non-finite input formats as zero. The currency sign is separated by a
/// non-breaking space.
pub fn format_currency(amount: f64) -> String {
    let amount = if amount.is_finite() { amount } else { 0.0 };
    let rounded = format!("{:.2}", amount.abs());
    let (whole, frac) = rounded.split_once('.').unwrap_or((rounded.as_str(), "00"));

    let negative = amount < 0.0 && rounded != "0.00";
    let sign = if negative { "-" } else { "" };
    format!("{}{},{}\u{a0}€", sign, group_thousands(whole), frac)
}

/// Insert `.` between groups of three digits
fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out.chars().rev().collect()
}

/// ISO-8601 calendar week of a `YYYY-MM-DD` date as `"<week>/<year>"`.
///
/// The year is the ISO week-numbering year, so `2025-12-29` gives `"1/2026"`.
/// Empty or invalid input yields an empty string.
pub fn iso_calendar_week(date: &str) -> String {
    let date = date.trim();
    if date.is_empty() {
        return String::new();
    }
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(d) => {
            let week = d.iso_week();
            format!("{}/{}", week.week(), week.year())
        }
        Err(_) => String::new(),
    }
}

/// Format a `YYYY-MM-DD` date the German way (`dd.mm.yyyy`), passing other input through
pub fn format_date_de(date: &str) -> String {
    match NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") {
        Ok(d) => d.format("%d.%m.%Y").to_string(),
        Err(_) => date.to_string(),
    }
}
