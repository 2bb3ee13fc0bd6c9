/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Pure arithmetic helpers: GCD and checked LCM over integer period ticks.
//!
//! Periods are carried as `f64` microseconds in the model and converted to
//! whole nanosecond ticks before any of these run, so GCD/LCM stay exact.

use super::SizingError;

/// Nanosecond ticks per microsecond.
pub const TICKS_PER_US: f64 = 1_000.0;

/// Iterative Euclidean GCD.  `gcd(0, x) == x`.
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// Checked LCM: `Err(SizingError::Overflow { a, b })` if the result would
/// overflow `u64`.  `Ok(0)` when either input is `0`.
pub fn lcm(a: u64, b: u64) -> Result<u64, SizingError> {
    if a == 0 || b == 0 {
        return Ok(0);
    }
    let reduced = a / gcd(a, b);
    reduced.checked_mul(b).ok_or(SizingError::Overflow { a, b })
}

/// LCM of a slice; `Ok(0)` for an empty slice.
pub fn lcm_of_slice(periods: &[u64]) -> Result<u64, SizingError> {
    periods
        .iter()
        .try_fold(periods.first().copied().unwrap_or(0), |acc, &p| lcm(acc, p))
}

/// GCD of a slice; `0` for an empty slice.
pub fn gcd_of_slice(periods: &[u64]) -> u64 {
    periods.iter().fold(0, |acc, &p| gcd(acc, p))
}

/// Convert a microsecond period to nanosecond ticks.
///
/// Returns `None` for non-positive or non-finite input.
pub fn to_ticks(period_us: f64) -> Option<u64> {
    if !period_us.is_finite() || period_us <= 0.0 {
        return None;
    }
    let ticks = (period_us * TICKS_PER_US).round();
    if ticks < 1.0 || ticks > u64::MAX as f64 {
        return None;
    }
    Some(ticks as u64)
}

pub fn from_ticks(ticks: u64) -> f64 {
    ticks as f64 / TICKS_PER_US
}

// ── Tests ─────────────────────────────────────────────────────────────────────
