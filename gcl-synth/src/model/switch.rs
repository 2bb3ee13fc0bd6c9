/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use super::{PortId, SwitchId};
use crate::hyperperiod::{LanePolicy, SizingPolicy, DEFAULT_PRIORITY_LANES};

/// Parameters of a new switch; ports inherit them unless overridden.
#[derive(Debug, Clone)]
pub struct SwitchSpec {
    pub name: String,
    pub propagation_delay: f64,
    pub speed: f64,
    pub guard_band: f64,
    pub sizing: SizingPolicy,
    pub priority_lanes: usize,
    pub lane_policy: LanePolicy,
    pub min_cycle: Option<f64>,
    pub max_cycle: Option<f64>,
    pub max_slot_duration: Option<f64>,
}

impl SwitchSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            propagation_delay: 0.0,
            speed: 1.0,
            guard_band: 0.0,
            sizing: SizingPolicy::default(),
            priority_lanes: DEFAULT_PRIORITY_LANES,
            lane_policy: LanePolicy::default(),
            min_cycle: None,
            max_cycle: None,
            max_slot_duration: None,
        }
    }

    pub fn speed(mut self, bytes_per_us: f64) -> Self {
        self.speed = bytes_per_us;
        self
    }

    pub fn propagation_delay(mut self, delay: f64) -> Self {
        self.propagation_delay = delay;
        self
    }

    pub fn guard_band(mut self, guard_band: f64) -> Self {
        self.guard_band = guard_band;
        self
    }

    pub fn sizing(mut self, sizing: SizingPolicy) -> Self {
        self.sizing = sizing;
        self
    }

    pub fn priority_lanes(mut self, lanes: usize) -> Self {
        self.priority_lanes = lanes.max(1);
        self
    }

    pub fn lane_policy(mut self, policy: LanePolicy) -> Self {
        self.lane_policy = policy;
        self
    }

    pub fn cycle_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_cycle = min;
        self.max_cycle = max;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Switch {
    pub id: SwitchId,
    pub name: String,
    pub propagation_delay: f64,
    pub speed: f64,
    pub guard_band: f64,
    pub sizing: SizingPolicy,
    pub priority_lanes: usize,
    pub lane_policy: LanePolicy,
    pub min_cycle: Option<f64>,
    pub max_cycle: Option<f64>,
    pub max_slot_duration: Option<f64>,
    pub ports: Vec<PortId>,
}

impl Switch {
    pub(crate) fn from_spec(id: SwitchId, spec: SwitchSpec) -> Self {
        Self {
            id,
            name: spec.name,
            propagation_delay: spec.propagation_delay,
            speed: spec.speed,
            guard_band: spec.guard_band,
            sizing: spec.sizing,
            priority_lanes: spec.priority_lanes.max(1),
            lane_policy: spec.lane_policy,
            min_cycle: spec.min_cycle,
            max_cycle: spec.max_cycle,
            max_slot_duration: spec.max_slot_duration,
            ports: Vec::new(),
        }
    }

    /// Switch-wide `[lower, upper]` bounds on any port cycle duration.
    pub fn cycle_bounds(&self) -> (f64, f64) {
        (
            self.min_cycle.unwrap_or(0.0),
            self.max_cycle.unwrap_or(f64::INFINITY),
        )
    }
}
