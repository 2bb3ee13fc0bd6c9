/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Materialise a solver model into concrete cycle and fragment values.

use gcl_solver::Model;
use tracing::debug;

use super::session::SolvingSession;
use super::SchedulerError;
use crate::model::{
    EntityState, FlowId, FragmentId, FragmentTiming, LeafStats, Network, PortId, Slot, SolvedCycle,
};

/// Values below this magnitude are written as exact zeros.
const SNAP: f64 = 1e-9;

fn snap(v: f64) -> f64 {
    if v.abs() < SNAP {
        0.0
    } else {
        v
    }
}

struct PortValues {
    port: PortId,
    cycle: SolvedCycle,
    fragments: Vec<(FragmentId, FragmentTiming)>,
}

fn read_port(s: &SolvingSession, net: &Network, model: &Model, port: PortId) -> Result<Option<PortValues>, SchedulerError> {
    let p = net.port(port);
    let Some(sizing) = p.cycle.sizing.as_ref() else {
        return Ok(None);
    };
    let eval = |e: gcl_solver::LinExpr| snap(model.evaluate(&e));

    let lanes = (0..sizing.lanes())
        .map(|lane| {
            (0..sizing.slot_count(lane))
                .map(|k| {
                    Ok(Slot {
                        start: eval(s.slot_start(net, port, lane, k)?),
                        duration: eval(s.slot_duration(net, port, lane, k)?),
                    })
                })
                .collect::<Result<Vec<_>, SchedulerError>>()
        })
        .collect::<Result<Vec<_>, _>>()?;
    let cycle = SolvedCycle {
        start: eval(s.cycle_start(net, port)?),
        duration: sizing.cycle_duration_us,
        repetitions: sizing.repetitions,
        lanes,
    };

    let mut fragments = Vec::with_capacity(p.fragments.len());
    for &fid in &p.fragments {
        let n = net.fragment(fid).packet_count;
        let priority = model.evaluate(&s.priority(net, fid)?).round().clamp(0.0, f64::from(u8::MAX)) as u8;
        let mut timing = FragmentTiming {
            priority,
            departure: Vec::with_capacity(n),
            arrival: Vec::with_capacity(n),
            scheduled: Vec::with_capacity(n),
        };
        for i in 0..n {
            timing.departure.push(eval(s.departure(net, fid, i)?));
            timing.arrival.push(eval(s.arrival(net, fid, i)?));
            timing.scheduled.push(eval(s.scheduled(net, fid, i)?));
        }
        fragments.push((fid, timing));
    }
    Ok(Some(PortValues {
        port,
        cycle,
        fragments,
    }))
}

/// Latency figures of every leaf of `flow` from concrete values.
///
/// Leaves without solved timing are skipped.
pub fn leaf_stats(net: &Network, flow: FlowId) -> Vec<LeafStats> {
    let f = net.flow(flow);
    let Some(first_send) = f.effective_first_send() else {
        return Vec::new();
    };
    net.leaf_fragments(flow)
        .into_iter()
        .filter_map(|leaf| {
            let frag = net.fragment(leaf);
            let timing = frag.solved.as_ref()?;
            let destination = f.tree.node(frag.hop).children.iter().find_map(|&c| {
                let node = f.tree.node(c).node;
                if net.port(frag.port).target == node {
                    node.as_device()
                } else {
                    None
                }
            })?;
            let latencies = (0..timing.packet_count())
                .map(|i| timing.scheduled[i] - (first_send + i as f64 * f.period))
                .collect();
            Some(LeafStats::from_latencies(destination, latencies))
        })
        .collect()
}

/// Write the model's values into every modeled port and flow.
pub(crate) fn materialize(s: &SolvingSession, net: &mut Network, model: &Model) -> Result<(), SchedulerError> {
    let mut ports = Vec::with_capacity(s.modeled_ports().len());
    for &port in s.modeled_ports() {
        if let Some(values) = read_port(s, net, model, port)? {
            ports.push(values);
        }
    }
    let mut first_sends = Vec::with_capacity(s.modeled_flows().len());
    for &flow in s.modeled_flows() {
        first_sends.push((flow, snap(model.evaluate(&s.first_send(net, flow)?))));
    }

    for values in ports {
        for (fid, timing) in values.fragments {
            let f = net.fragment_mut(fid);
            f.solved = Some(timing);
            f.previous = None;
        }
        let p = net.port_mut(values.port);
        debug!(
            port = %p.name,
            start = values.cycle.start,
            reserved = values.cycle.reserved(),
            "cycle materialised"
        );
        p.cycle.solved = Some(values.cycle);
        p.cycle.previous = None;
        net.set_port_state(values.port, EntityState::Solved);
    }

    for (flow, first_send) in first_sends {
        net.flow_mut(flow).solved_first_send = Some(first_send);
        let stats = leaf_stats(net, flow);
        net.flow_mut(flow).stats = stats;
        net.set_flow_state(flow, EntityState::Solved);
    }
    net.mark_solved();
    Ok(())
}
