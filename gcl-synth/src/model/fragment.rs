/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! One flow's hop through one egress port.
//!
//! Packet instance `i` of a fragment is defined for `i < packet_count`; any
//! later index is its periodic extension
//! `x(i) = x(i mod n) + (i div n)·n·period`.

use super::{FlowId, FragmentId, PathNodeId, PortId};

/// Concrete per-packet timing of a solved fragment, µs.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentTiming {
    pub priority: u8,
    pub departure: Vec<f64>,
    pub arrival: Vec<f64>,
    /// End of transmission on the egress wire.
    pub scheduled: Vec<f64>,
}

fn extend(series: &[f64], period: f64, i: usize) -> Option<f64> {
    let n = series.len();
    if n == 0 {
        return None;
    }
    Some(series[i % n] + (i / n) as f64 * n as f64 * period)
}

impl FragmentTiming {
    pub fn departure_at(&self, period: f64, i: usize) -> Option<f64> {
        extend(&self.departure, period, i)
    }

    pub fn arrival_at(&self, period: f64, i: usize) -> Option<f64> {
        extend(&self.arrival, period, i)
    }

    pub fn scheduled_at(&self, period: f64, i: usize) -> Option<f64> {
        extend(&self.scheduled, period, i)
    }

    pub fn packet_count(&self) -> usize {
        self.scheduled.len()
    }
}

#[derive(Debug, Clone)]
pub struct FlowFragment {
    pub id: FragmentId,
    pub flow: FlowId,
    /// Path-tree node of the switch this hop leaves from.
    pub hop: PathNodeId,
    /// Egress port this fragment is transmitted on.
    pub port: PortId,
    /// Port on the far side of the incoming link: the previous hop's egress
    /// port, or for a first hop this switch's port toward the source device.
    pub ingress: PortId,
    pub prev: Option<FragmentId>,
    pub next: Vec<FragmentId>,
    /// Priority pinned for this hop, if any.
    pub fixed_priority: Option<u8>,
    pub period: f64,
    pub packet_size: f64,
    /// Packet instances per hypercycle of the egress port.
    pub packet_count: usize,
    pub solved: Option<FragmentTiming>,
    /// Values from before the last reset, kept for carry-over policies.
    pub previous: Option<FragmentTiming>,
}

impl FlowFragment {
    pub fn is_first_hop(&self) -> bool {
        self.prev.is_none()
    }

    /// `true` if this hop delivers to a destination device.
    pub fn is_leaf(&self) -> bool {
        self.next.is_empty()
    }

    pub fn reset(&mut self) {
        if let Some(t) = self.solved.take() {
            self.previous = Some(t);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periodic_extension() {
        let t = FragmentTiming {
            priority: 0,
            departure: vec![0.0, 100.0],
            arrival: vec![1.0, 101.0],
            scheduled: vec![11.0, 111.0],
        };
        assert_eq!(t.scheduled_at(100.0, 1), Some(111.0));
        assert_eq!(t.scheduled_at(100.0, 2), Some(211.0));
        assert_eq!(t.scheduled_at(100.0, 5), Some(511.0));
        assert_eq!(t.arrival_at(100.0, 3), Some(301.0));
        assert_eq!(t.packet_count(), 2);
    }

    #[test]
    fn empty_series_has_no_extension() {
        let t = FragmentTiming {
            priority: 0,
            departure: vec![],
            arrival: vec![],
            scheduled: vec![],
        };
        assert_eq!(t.departure_at(10.0, 0), None);
    }
}
