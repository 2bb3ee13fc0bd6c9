/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Hypercycle / microcycle sizing of a port's cycle.
//!
//! Given the periods of every fragment egressing through a port:
//!
//! * **microcycle** = GCD of the periods,
//! * **hypercycle** = LCM of the periods.
//!
//! [`SizingPolicy::Microcycle`] makes the cycle one microcycle long and
//! repeats it `hypercycle / microcycle` times; [`SizingPolicy::Hypercycle`]
//! makes the cycle the whole hypercycle, repeated once.  Each fragment sends
//! `hypercycle / period` packet instances per hypercycle.
//!
//! # Arithmetic
//!
//! | Concern | Handling |
//! |-----------|----------|
//! | Fractional microsecond periods | converted to whole nanosecond ticks before GCD/LCM |
//! | `(a / gcd) * b` overflow | `checked_mul`, surfaced as `Err(Overflow)` |
//! | Very long hypercycles | `Err(TooLarge)` above the configured limit; the caller decides |
//! | Zero / negative periods | skipped with a warning; `Err(NoValidPeriods)` if none remain |

pub mod math;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use math::{from_ticks, gcd_of_slice, lcm_of_slice, to_ticks};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Default upper limit on a port hypercycle (100 ms in microseconds).
///
/// Every packet instance inside one hypercycle becomes solver variables, so
/// the limit is much tighter than a task-level hyperperiod would be.
pub const DEFAULT_HYPERCYCLE_LIMIT_US: f64 = 100_000.0;

/// Priority lanes per port when a switch does not say otherwise.
pub const DEFAULT_PRIORITY_LANES: usize = 8;

// ── Error type ────────────────────────────────────────────────────────────────

/// Errors that can occur while sizing a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SizingError {
    /// No fragment on the port had a valid (positive) period.
    NoValidPeriods,

    /// LCM calculation overflowed `u64` nanosecond ticks.
    Overflow { a: u64, b: u64 },

    /// The hypercycle exceeded the configured limit.
    TooLarge { value_us: f64, limit_us: f64 },
}

impl std::fmt::Display for SizingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizingError::NoValidPeriods => {
                write!(f, "no fragment with a valid (positive) period")
            }
            SizingError::Overflow { a, b } => {
                write!(f, "LCM overflow computing lcm({a}, {b}) ns")
            }
            SizingError::TooLarge { value_us, limit_us } => write!(
                f,
                "hypercycle {value_us}µs exceeds limit {limit_us}µs ({:.1}x)",
                value_us / limit_us
            ),
        }
    }
}

impl std::error::Error for SizingError {}

// ── Policies ──────────────────────────────────────────────────────────────────

/// How a port's cycle length is derived from its fragment periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SizingPolicy {
    #[default]
    Hypercycle,
    Microcycle,
}

impl std::fmt::Display for SizingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizingPolicy::Hypercycle => write!(f, "hypercycle"),
            SizingPolicy::Microcycle => write!(f, "microcycle"),
        }
    }
}

/// How the candidate slot count is spread over priority lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LanePolicy {
    /// `ceil(candidates / lanes)` slots in every lane.
    #[default]
    Equal,
    /// The highest lane gets every candidate; each lower lane half of the
    /// lane above it (at least one).
    AggressiveDescent,
    /// Every lane gets every candidate.
    MaxCapacity,
}

impl LanePolicy {
    /// Slot count per lane, indexed by priority.
    ///
    /// Zero candidates yield an all-zero table (an empty cycle).
    pub fn slots_per_lane(self, candidates: usize, lanes: usize) -> Vec<usize> {
        let lanes = lanes.max(1);
        if candidates == 0 {
            return vec![0; lanes];
        }
        match self {
            LanePolicy::Equal => vec![candidates.div_ceil(lanes).max(1); lanes],
            LanePolicy::MaxCapacity => vec![candidates; lanes],
            LanePolicy::AggressiveDescent => {
                let mut out = vec![1; lanes];
                let mut count = candidates;
                for lane in (0..lanes).rev() {
                    out[lane] = count.max(1);
                    count = count.div_ceil(2);
                }
                out
            }
        }
    }
}

// ── PortSizing ────────────────────────────────────────────────────────────────

/// Result of sizing one port.
#[derive(Debug, Clone, PartialEq)]
pub struct PortSizing {
    pub policy: SizingPolicy,

    /// Unique fragment periods in µs (sorted).
    pub periods_us: Vec<f64>,

    pub microcycle_us: f64,
    pub hypercycle_us: f64,

    /// Length of one cycle in µs.
    pub cycle_duration_us: f64,

    /// Cycle repetitions per hypercycle.
    pub repetitions: usize,

    /// Candidate slot count before the lane policy is applied.
    pub candidate_slots: usize,

    /// Slot count per priority lane.
    pub slots_per_lane: Vec<usize>,
}

impl PortSizing {
    /// Cycle with no slots, `duration_us` long.
    pub fn empty(duration_us: f64, lanes: usize) -> Self {
        Self {
            policy: SizingPolicy::Hypercycle,
            periods_us: Vec::new(),
            microcycle_us: duration_us,
            hypercycle_us: duration_us,
            cycle_duration_us: duration_us,
            repetitions: 1,
            candidate_slots: 0,
            slots_per_lane: vec![0; lanes.max(1)],
        }
    }

    /// Packet instances per hypercycle for a fragment of `period_us`.
    pub fn packets_for(&self, period_us: f64) -> usize {
        if period_us <= 0.0 {
            return 0;
        }
        ((self.hypercycle_us / period_us).round() as usize).max(1)
    }

    pub fn lanes(&self) -> usize {
        self.slots_per_lane.len()
    }

    pub fn slot_count(&self, lane: usize) -> usize {
        self.slots_per_lane.get(lane).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.candidate_slots == 0
    }
}

// ── CycleSizer ────────────────────────────────────────────────────────────────

/// Sizes port cycles under a hypercycle limit.
///
/// # Example
/// ```rust
/// use gcl_synth::hyperperiod::{CycleSizer, LanePolicy, SizingPolicy};
///
/// let sizer = CycleSizer::new();
/// let sizing = sizer
///     .size(&[1_000.0, 1_500.0], SizingPolicy::Microcycle, 2, LanePolicy::Equal)
///     .unwrap();
/// assert_eq!(sizing.cycle_duration_us, 500.0);
/// assert_eq!(sizing.repetitions, 6);
/// ```
#[derive(Debug, Clone)]
pub struct CycleSizer {
    limit_us: f64,
}

impl CycleSizer {
    /// Sizer with the default 100 ms limit.
    pub fn new() -> Self {
        Self {
            limit_us: DEFAULT_HYPERCYCLE_LIMIT_US,
        }
    }

    pub fn with_limit(limit_us: f64) -> Self {
        Self { limit_us }
    }

    pub fn limit_us(&self) -> f64 {
        self.limit_us
    }

    fn valid_ticks(periods: &[f64]) -> Vec<u64> {
        periods
            .iter()
            .filter_map(|&p| {
                let ticks = to_ticks(p);
                if ticks.is_none() {
                    warn!(period_us = p, "skipping fragment with invalid period");
                }
                ticks
            })
            .collect()
    }

    /// LCM of `periods` in µs, checked against the limit.
    pub fn hypercycle(&self, periods: &[f64]) -> Result<f64, SizingError> {
        let mut ticks = Self::valid_ticks(periods);
        ticks.sort_unstable();
        ticks.dedup();
        if ticks.is_empty() {
            return Err(SizingError::NoValidPeriods);
        }
        let hyper = from_ticks(lcm_of_slice(&ticks)?);
        if hyper > self.limit_us {
            warn!(
                hypercycle_us = hyper,
                limit_us = self.limit_us,
                "Hypercycle exceeds configured limit"
            );
            return Err(SizingError::TooLarge {
                value_us: hyper,
                limit_us: self.limit_us,
            });
        }
        Ok(hyper)
    }

    /// Size a cycle for fragments with the given periods (one entry per
    /// fragment, duplicates included).
    ///
    /// # Errors
    /// * [`SizingError::NoValidPeriods`] – no positive period.
    /// * [`SizingError::Overflow`] – LCM exceeded `u64` ticks.
    /// * [`SizingError::TooLarge`] – hypercycle above the limit.
    pub fn size(
        &self,
        fragment_periods: &[f64],
        policy: SizingPolicy,
        lanes: usize,
        lane_policy: LanePolicy,
    ) -> Result<PortSizing, SizingError> {
        let ticks = Self::valid_ticks(fragment_periods);
        if ticks.is_empty() {
            return Err(SizingError::NoValidPeriods);
        }

        let unique: Vec<u64> = {
            let mut v = ticks.clone();
            v.sort_unstable();
            v.dedup();
            v
        };

        let hyper_ticks = lcm_of_slice(&unique)?;
        let micro_ticks = gcd_of_slice(&unique);
        let hypercycle_us = from_ticks(hyper_ticks);
        let microcycle_us = from_ticks(micro_ticks);

        if hypercycle_us > self.limit_us {
            warn!(
                hypercycle_us,
                limit_us = self.limit_us,
                "Hypercycle exceeds configured limit"
            );
            return Err(SizingError::TooLarge {
                value_us: hypercycle_us,
                limit_us: self.limit_us,
            });
        }

        let (cycle_duration_us, repetitions, candidate_slots) = match policy {
            SizingPolicy::Microcycle => (
                microcycle_us,
                (hyper_ticks / micro_ticks) as usize,
                ticks.len(),
            ),
            SizingPolicy::Hypercycle => (
                hypercycle_us,
                1,
                ticks.iter().map(|&t| (hyper_ticks / t) as usize).sum(),
            ),
        };

        let slots_per_lane = lane_policy.slots_per_lane(candidate_slots, lanes);

        info!(
            %policy,
            fragments = ticks.len(),
            hypercycle_us,
            microcycle_us,
            cycle_duration_us,
            repetitions,
            "Sized cycle"
        );
        for p in &unique {
            debug!(period_us = from_ticks(*p), "  unique period");
        }

        Ok(PortSizing {
            policy,
            periods_us: unique.iter().map(|&t| from_ticks(t)).collect(),
            microcycle_us,
            hypercycle_us,
            cycle_duration_us,
            repetitions,
            candidate_slots,
            slots_per_lane,
        })
    }
}

impl Default for CycleSizer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn microcycle_sizing_of_1000_and_1500() {
        let s = CycleSizer::new()
            .size(&[1_000.0, 1_500.0], SizingPolicy::Microcycle, 2, LanePolicy::Equal)
            .unwrap();
        assert_eq!(s.microcycle_us, 500.0);
        assert_eq!(s.hypercycle_us, 3_000.0);
        assert_eq!(s.cycle_duration_us, 500.0);
        assert_eq!(s.repetitions, 6);
        assert_eq!(s.packets_for(1_000.0), 3);
        assert_eq!(s.packets_for(1_500.0), 2);
        // one candidate per fragment, spread over two lanes
        assert_eq!(s.candidate_slots, 2);
        assert_eq!(s.slots_per_lane, vec![1, 1]);
    }

    #[test]
    fn hypercycle_sizing_counts_every_instance() {
        let s = CycleSizer::new()
            .size(&[1_000.0, 1_500.0], SizingPolicy::Hypercycle, 2, LanePolicy::Equal)
            .unwrap();
        assert_eq!(s.cycle_duration_us, 3_000.0);
        assert_eq!(s.repetitions, 1);
        assert_eq!(s.candidate_slots, 5);
        assert_eq!(s.slots_per_lane, vec![3, 3]);
    }

    #[test]
    fn duplicate_periods_share_one_unique_entry() {
        let s = CycleSizer::new()
            .size(&[200.0, 200.0, 200.0], SizingPolicy::Hypercycle, 1, LanePolicy::Equal)
            .unwrap();
        assert_eq!(s.periods_us, vec![200.0]);
        assert_eq!(s.candidate_slots, 3);
    }

    #[test]
    fn fractional_periods_are_exact() {
        let s = CycleSizer::new()
            .size(&[0.5, 0.75], SizingPolicy::Microcycle, 1, LanePolicy::Equal)
            .unwrap();
        assert_eq!(s.microcycle_us, 0.25);
        assert_eq!(s.hypercycle_us, 1.5);
        assert_eq!(s.repetitions, 6);
    }

    #[test]
    fn invalid_periods_are_rejected() {
        let sizer = CycleSizer::new();
        assert_eq!(
            sizer.size(&[], SizingPolicy::Hypercycle, 1, LanePolicy::Equal),
            Err(SizingError::NoValidPeriods)
        );
        assert_eq!(
            sizer.size(&[0.0, -1.0], SizingPolicy::Hypercycle, 1, LanePolicy::Equal),
            Err(SizingError::NoValidPeriods)
        );
    }

    #[test]
    fn limit_is_enforced() {
        let sizer = CycleSizer::with_limit(1_000.0);
        let result = sizer.size(&[700.0, 300.0], SizingPolicy::Hypercycle, 1, LanePolicy::Equal);
        assert!(matches!(result, Err(SizingError::TooLarge { .. })));
        assert!(sizer.hypercycle(&[500.0, 1_000.0]).is_ok());
    }

    #[test]
    fn lane_policies() {
        assert_eq!(LanePolicy::Equal.slots_per_lane(5, 2), vec![3, 3]);
        assert_eq!(LanePolicy::Equal.slots_per_lane(1, 4), vec![1, 1, 1, 1]);
        assert_eq!(LanePolicy::MaxCapacity.slots_per_lane(3, 2), vec![3, 3]);
        assert_eq!(
            LanePolicy::AggressiveDescent.slots_per_lane(8, 4),
            vec![1, 2, 4, 8]
        );
        assert_eq!(LanePolicy::AggressiveDescent.slots_per_lane(5, 3), vec![2, 3, 5]);
        assert_eq!(LanePolicy::Equal.slots_per_lane(0, 3), vec![0, 0, 0]);
    }

    #[test]
    fn empty_sizing_has_no_slots() {
        let s = PortSizing::empty(200.0, 3);
        assert!(s.is_empty());
        assert_eq!(s.lanes(), 3);
        assert_eq!(s.slot_count(1), 0);
        assert_eq!(s.cycle_duration_us, 200.0);
    }
}
