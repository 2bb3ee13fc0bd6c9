/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Unit-suffixed quantities.
//!
//! Every time, size and speed in the model is held in one internal unit:
//!
//! | Quantity | Internal unit | Accepted suffixes |
//! |---|---|---|
//! | time | µs | `s`, `ms`, `us`, `µs`, `ns` |
//! | size | byte | `b`/`bit`/`bits`, `B`/`byte`/`bytes`, each with an optional `k`, `M` or `G` prefix |
//! | speed | byte/µs | `<size>/<time>`, e.g. `125B/us`, `1Gbit/s` |
//!
//! A bare number is taken in the internal unit.  An unrecognised suffix is not
//! fatal: the number is used in the internal unit and a warning is logged.
//! Only a value that does not start with a number is rejected.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum UnitError {
    #[error("'{0}' does not start with a number")]
    InvalidNumber(String),
}

/// A YAML scalar that is either a plain number or a string with a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Number(f64),
    Text(String),
}

impl Quantity {
    pub fn to_time_us(&self) -> Result<f64, UnitError> {
        match self {
            Quantity::Number(v) => Ok(*v),
            Quantity::Text(s) => parse_time_us(s),
        }
    }

    pub fn to_bytes(&self) -> Result<f64, UnitError> {
        match self {
            Quantity::Number(v) => Ok(*v),
            Quantity::Text(s) => parse_size_bytes(s),
        }
    }

    pub fn to_bytes_per_us(&self) -> Result<f64, UnitError> {
        match self {
            Quantity::Number(v) => Ok(*v),
            Quantity::Text(s) => parse_speed_bytes_per_us(s),
        }
    }
}

impl From<f64> for Quantity {
    fn from(v: f64) -> Self {
        Quantity::Number(v)
    }
}

impl From<&str> for Quantity {
    fn from(s: &str) -> Self {
        Quantity::Text(s.to_string())
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

fn split_number(input: &str) -> Result<(f64, &str), UnitError> {
    let s = input.trim();
    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.' || *c == '-' || *c == '+'))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let value: f64 = s[..end]
        .parse()
        .map_err(|_| UnitError::InvalidNumber(input.to_string()))?;
    Ok((value, s[end..].trim()))
}

fn time_factor(unit: &str) -> Option<f64> {
    match unit {
        "" | "us" | "µs" => Some(1.0),
        "s" => Some(1_000_000.0),
        "ms" => Some(1_000.0),
        "ns" => Some(0.001),
        _ => None,
    }
}

fn size_factor(unit: &str) -> Option<f64> {
    let base = |u: &str| match u {
        "b" | "bit" | "bits" => Some(0.125),
        "B" | "byte" | "bytes" => Some(1.0),
        _ => None,
    };
    if unit.is_empty() {
        return Some(1.0);
    }
    if let Some(f) = base(unit) {
        return Some(f);
    }
    let mut chars = unit.chars();
    let prefix = match chars.next()? {
        'k' | 'K' => 1e3,
        'M' => 1e6,
        'G' => 1e9,
        _ => return None,
    };
    base(chars.as_str()).map(|f| f * prefix)
}

/// Parse a time into microseconds.
pub fn parse_time_us(input: &str) -> Result<f64, UnitError> {
    let (value, unit) = split_number(input)?;
    match time_factor(unit) {
        Some(f) => Ok(value * f),
        None => {
            warn!(input, unit, "unrecognised time unit, assuming microseconds");
            Ok(value)
        }
    }
}

/// Parse a size into bytes.
pub fn parse_size_bytes(input: &str) -> Result<f64, UnitError> {
    let (value, unit) = split_number(input)?;
    match size_factor(unit) {
        Some(f) => Ok(value * f),
        None => {
            warn!(input, unit, "unrecognised size unit, assuming bytes");
            Ok(value)
        }
    }
}

/// Parse a speed into bytes per microsecond.
pub fn parse_speed_bytes_per_us(input: &str) -> Result<f64, UnitError> {
    let (value, unit) = split_number(input)?;
    let (size_unit, time_unit) = unit.split_once('/').unwrap_or((unit, ""));
    let size = size_factor(size_unit.trim());
    let time = time_factor(time_unit.trim());
    match (size, time) {
        (Some(s), Some(t)) => Ok(value * s / t),
        _ => {
            warn!(input, unit, "unrecognised speed unit, assuming byte/us");
            Ok(value)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn times_normalise_to_microseconds() {
        assert!(close(parse_time_us("200").unwrap(), 200.0));
        assert!(close(parse_time_us("200us").unwrap(), 200.0));
        assert!(close(parse_time_us("1.5ms").unwrap(), 1_500.0));
        assert!(close(parse_time_us("2 s").unwrap(), 2_000_000.0));
        assert!(close(parse_time_us("500ns").unwrap(), 0.5));
    }

    #[test]
    fn sizes_normalise_to_bytes() {
        assert!(close(parse_size_bytes("1250").unwrap(), 1250.0));
        assert!(close(parse_size_bytes("1250B").unwrap(), 1250.0));
        assert!(close(parse_size_bytes("80bit").unwrap(), 10.0));
        assert!(close(parse_size_bytes("1kB").unwrap(), 1_000.0));
        assert!(close(parse_size_bytes("1Mbit").unwrap(), 125_000.0));
    }

    #[test]
    fn speeds_normalise_to_bytes_per_microsecond() {
        assert!(close(parse_speed_bytes_per_us("125").unwrap(), 125.0));
        assert!(close(parse_speed_bytes_per_us("125B/us").unwrap(), 125.0));
        assert!(close(parse_speed_bytes_per_us("1Gbit/s").unwrap(), 125.0));
        assert!(close(parse_speed_bytes_per_us("100Mbit/s").unwrap(), 12.5));
    }

    #[test]
    fn unknown_unit_falls_back_to_default() {
        assert!(close(parse_time_us("7 fortnights").unwrap(), 7.0));
        assert!(close(parse_size_bytes("3 parsecs").unwrap(), 3.0));
        assert!(close(parse_speed_bytes_per_us("9 knots").unwrap(), 9.0));
    }

    #[test]
    fn missing_number_is_an_error() {
        assert!(matches!(parse_time_us("fast"), Err(UnitError::InvalidNumber(_))));
    }

    #[test]
    fn quantity_accepts_numbers_and_strings() {
        let q: Quantity = serde_yaml::from_str("10").unwrap();
        assert_eq!(q.to_time_us().unwrap(), 10.0);
        let q: Quantity = serde_yaml::from_str("\"10ms\"").unwrap();
        assert_eq!(q.to_time_us().unwrap(), 10_000.0);
    }
}
