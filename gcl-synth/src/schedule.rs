/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Persistable view of a solved network.
//!
//! The report holds plain numbers only and can be written to and read back
//! from YAML:
//!
//! ```yaml
//! ports:
//!   - switch: s0
//!     port: s0->d1
//!     cycle_start: 0.0
//!     cycle_duration: 200.0
//!     repetitions: 1
//!     priorities:
//!       - priority: 0
//!         slots:
//!           - { start: 0.0, duration: 10.0 }
//! flows:
//!   - name: f
//!     period: 200.0
//!     first_send: 0.0
//!     leaves:
//!       - { destination: d1, average_latency: 10.0, jitter: 0.0 }
//! ```

use serde::{Deserialize, Serialize};

use crate::model::{EntityState, Network};

/// Slots shorter than this are closed and left out of the report.
pub const REPORT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotEntry {
    pub start: f64,
    pub duration: f64,
}

/// Open slots of one priority lane, in cycle order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrioritySlots {
    pub priority: usize,
    pub slots: Vec<SlotEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSchedule {
    pub switch: String,
    pub port: String,
    pub state: EntityState,
    pub cycle_start: f64,
    pub cycle_duration: f64,
    pub repetitions: usize,
    pub priorities: Vec<PrioritySlots>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafReport {
    pub destination: String,
    pub average_latency: f64,
    pub jitter: f64,
}

/// Packet series of one fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopReport {
    pub port: String,
    pub priority: u8,
    pub departure: Vec<f64>,
    pub arrival: Vec<f64>,
    pub scheduled: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowReport {
    pub name: String,
    pub period: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_send: Option<f64>,
    pub leaves: Vec<LeafReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hops: Vec<HopReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleReport {
    pub ports: Vec<PortSchedule>,
    pub flows: Vec<FlowReport>,
}

impl ScheduleReport {
    /// Snapshot every port and flow with concrete values.
    ///
    /// `include_hops` adds the per-hop packet series of every flow.
    pub fn from_network(net: &Network, include_hops: bool) -> Self {
        let ports = net
            .ports()
            .iter()
            .filter_map(|p| {
                let c = p.cycle.solved.as_ref()?;
                let priorities = c
                    .used_priorities(REPORT_TOLERANCE)
                    .into_iter()
                    .map(|priority| PrioritySlots {
                        priority,
                        slots: c.lanes[priority]
                            .iter()
                            .filter(|s| s.is_open(REPORT_TOLERANCE))
                            .map(|s| SlotEntry {
                                start: s.start,
                                duration: s.duration,
                            })
                            .collect(),
                    })
                    .collect();
                Some(PortSchedule {
                    switch: net.switch(p.switch).name.clone(),
                    port: p.name.clone(),
                    state: p.state,
                    cycle_start: c.start,
                    cycle_duration: c.duration,
                    repetitions: c.repetitions,
                    priorities,
                })
            })
            .collect();

        let flows = net
            .flows()
            .iter()
            .filter(|f| f.fragments.iter().any(|&fr| net.fragment(fr).solved.is_some()))
            .map(|f| FlowReport {
                name: f.name.clone(),
                period: f.period,
                first_send: f.effective_first_send(),
                leaves: f
                    .stats
                    .iter()
                    .map(|s| LeafReport {
                        destination: net.device(s.destination).name.clone(),
                        average_latency: s.average_latency,
                        jitter: s.jitter,
                    })
                    .collect(),
                hops: if include_hops {
                    f.fragments
                        .iter()
                        .filter_map(|&fr| {
                            let frag = net.fragment(fr);
                            let t = frag.solved.as_ref()?;
                            Some(HopReport {
                                port: net.port(frag.port).name.clone(),
                                priority: t.priority,
                                departure: t.departure.clone(),
                                arrival: t.arrival.clone(),
                                scheduled: t.scheduled.clone(),
                            })
                        })
                        .collect()
                } else {
                    Vec::new()
                },
            })
            .collect();

        Self { ports, flows }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn from_yaml(input: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(input)
    }

    pub fn port(&self, name: &str) -> Option<&PortSchedule> {
        self.ports.iter().find(|p| p.port == name)
    }

    pub fn flow(&self, name: &str) -> Option<&FlowReport> {
        self.flows.iter().find(|f| f.name == name)
    }

    /// Every open slot as `(port, priority, start, duration)`.
    pub fn slot_tuples(&self) -> Vec<(String, usize, f64, f64)> {
        self.ports
            .iter()
            .flat_map(|p| {
                p.priorities.iter().flat_map(move |lane| {
                    lane.slots
                        .iter()
                        .map(move |s| (p.port.clone(), lane.priority, s.start, s.duration))
                })
            })
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
