/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! A port's repeating gate window.
//!
//! Before a solve a cycle only knows its bounds and its sizing (slot table
//! shape); the symbolic slot variables live in the solving session.  After a
//! solve it carries a [`SolvedCycle`] with concrete slot positions.

use serde::{Deserialize, Serialize};

use crate::hyperperiod::PortSizing;

/// `start` and `duration` relative to the cycle start, in µs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub start: f64,
    pub duration: f64,
}

impl Slot {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    pub fn is_open(&self, tolerance: f64) -> bool {
        self.duration > tolerance
    }
}

/// Concrete cycle materialised from a model.
#[derive(Debug, Clone, PartialEq)]
pub struct SolvedCycle {
    /// Absolute time of the first cycle start.
    pub start: f64,
    pub duration: f64,
    pub repetitions: usize,
    /// Slots per priority lane, in order.
    pub lanes: Vec<Vec<Slot>>,
}

impl SolvedCycle {
    /// Lanes holding at least one open slot.
    pub fn used_priorities(&self, tolerance: f64) -> Vec<usize> {
        self.lanes
            .iter()
            .enumerate()
            .filter(|(_, slots)| slots.iter().any(|s| s.is_open(tolerance)))
            .map(|(p, _)| p)
            .collect()
    }

    /// Every open slot as `(priority, slot)`.
    pub fn open_slots(&self, tolerance: f64) -> Vec<(usize, Slot)> {
        self.lanes
            .iter()
            .enumerate()
            .flat_map(|(p, slots)| {
                slots
                    .iter()
                    .filter(|s| s.is_open(tolerance))
                    .map(move |s| (p, *s))
            })
            .collect()
    }

    /// Absolute window of `slot` in repetition `rep`.
    pub fn window(&self, slot: &Slot, rep: usize) -> (f64, f64) {
        let base = self.start + rep as f64 * self.duration;
        (base + slot.start, base + slot.end())
    }

    /// Reserved time per cycle.
    pub fn reserved(&self) -> f64 {
        self.lanes.iter().flatten().map(|s| s.duration).sum()
    }
}

#[derive(Debug, Clone)]
pub struct Cycle {
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Longest single slot; `None` means the cycle duration.
    pub max_slot_duration: Option<f64>,
    pub sizing: Option<PortSizing>,
    pub solved: Option<SolvedCycle>,
    /// Values from before the last reset, kept for carry-over policies.
    pub previous: Option<SolvedCycle>,
}

impl Cycle {
    pub fn new(lower_bound: f64, upper_bound: f64, max_slot_duration: Option<f64>) -> Self {
        Self {
            lower_bound,
            upper_bound,
            max_slot_duration,
            sizing: None,
            solved: None,
            previous: None,
        }
    }

    pub fn duration(&self) -> Option<f64> {
        self.solved
            .as_ref()
            .map(|s| s.duration)
            .or_else(|| self.sizing.as_ref().map(|s| s.cycle_duration_us))
    }

    pub fn max_slot(&self) -> Option<f64> {
        match (self.max_slot_duration, self.duration()) {
            (Some(m), Some(d)) => Some(m.min(d)),
            (m, d) => m.or(d),
        }
    }

    pub fn is_sized(&self) -> bool {
        self.sizing.is_some()
    }

    pub fn is_solved(&self) -> bool {
        self.solved.is_some()
    }

    /// Move solved values to `previous` and drop the sizing.
    pub fn reset(&mut self) {
        if let Some(s) = self.solved.take() {
            self.previous = Some(s);
        }
        self.sizing = None;
    }

    /// Drop everything, including carried values.
    pub fn clear(&mut self) {
        self.solved = None;
        self.previous = None;
        self.sizing = None;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
