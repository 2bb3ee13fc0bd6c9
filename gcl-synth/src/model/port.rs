/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use serde::{Deserialize, Serialize};

use super::{Cycle, EntityState, FragmentId, NodeRef, PortId, SwitchId};
use crate::hyperperiod::{LanePolicy, SizingPolicy};

/// What a port keeps from its previous solve when an edit dirties it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResetPolicy {
    /// Discard everything and regenerate.
    #[default]
    HardReset,
    /// Keep the cycle start and duration.
    CarryOnCycle,
    /// Keep the cycle start and the timing of existing fragments; only new
    /// fragments are placed freely.
    CarryOnFragments,
    /// Keep every previous value (slots included) as a fixed assumption.
    SoftReset,
}

impl ResetPolicy {
    /// Next weaker policy, used when the previous values no longer fit.
    pub fn weaker(self) -> Self {
        match self {
            ResetPolicy::SoftReset => ResetPolicy::CarryOnFragments,
            ResetPolicy::CarryOnFragments => ResetPolicy::CarryOnCycle,
            ResetPolicy::CarryOnCycle | ResetPolicy::HardReset => ResetPolicy::HardReset,
        }
    }
}

impl std::fmt::Display for ResetPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResetPolicy::HardReset => "hard-reset",
            ResetPolicy::CarryOnCycle => "carry-on-cycle",
            ResetPolicy::CarryOnFragments => "carry-on-fragments",
            ResetPolicy::SoftReset => "soft-reset",
        };
        f.write_str(s)
    }
}

/// Per-port overrides of the owning switch's settings.
#[derive(Debug, Clone, Default)]
pub struct PortSpec {
    pub propagation_delay: Option<f64>,
    pub speed: Option<f64>,
    pub guard_band: Option<f64>,
    pub sizing: Option<SizingPolicy>,
    pub max_slot_duration: Option<f64>,
    pub reset_policy: ResetPolicy,
}

/// Egress port of a switch toward one neighbour.
#[derive(Debug, Clone)]
pub struct Port {
    pub id: PortId,
    pub switch: SwitchId,
    /// `"<switch>-><target>"`.
    pub name: String,
    pub target: NodeRef,
    /// Link delay to `target`, µs.
    pub propagation_delay: f64,
    /// Bytes per µs.
    pub speed: f64,
    /// Minimum idle gap between non-adjacent slots, µs.
    pub guard_band: f64,
    pub sizing_policy: SizingPolicy,
    pub priority_lanes: usize,
    pub lane_policy: LanePolicy,
    pub reset_policy: ResetPolicy,
    pub state: EntityState,
    pub fragments: Vec<FragmentId>,
    pub cycle: Cycle,
}

impl Port {
    /// Wire time of `size` bytes on this port.
    pub fn transmission_time(&self, size: f64) -> f64 {
        if self.speed > 0.0 {
            size / self.speed
        } else {
            0.0
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.state == EntityState::Frozen
    }

    /// `true` if this port's constraints go into the next solve.
    pub fn needs_solving(&self) -> bool {
        self.cycle.is_sized() && !self.is_frozen()
    }
}
