/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Independent re-check of a materialised schedule.
//!
//! Runs after every solve on the concrete values only (no solver state), so
//! it also catches numerical slack in the backend.  Violations are logged by
//! the scheduler; tests assert there are none.

use std::collections::BTreeMap;

use tracing::warn;

use crate::hyperperiod::CycleSizer;
use crate::model::{DeviceId, FragmentId, Network, Port, PortId};

#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    /// Slot extends past the cycle or has negative start or length.
    SlotOutsideCycle { port: String, lane: usize, slot: usize },
    /// Same-lane slots out of order or overlapping.
    SlotOrder { port: String, lane: usize, slot: usize },
    /// Open slots of two lanes overlap.
    LaneOverlap { port: String, lanes: (usize, usize) },
    /// Two open non-adjacent slots closer than the guard band.
    GuardBand { port: String, lanes: (usize, usize) },
    /// A packet leaves before it has arrived and been transmitted.
    Causality { port: String, flow: String, packet: usize },
    /// A packet is not inside an open slot of its lane.
    OutsideSlot { port: String, flow: String, packet: usize },
    /// Two packets on the wire at once.
    Overlap { port: String, a: String, b: String },
    /// Same-lane packets leave out of arrival order.
    Fifo { port: String, a: String, b: String },
    /// An open slot carries no packet.
    UnusedSlot { port: String, lane: usize, slot: usize },
    /// Two flows leaving one device overlap on its link.
    SourceCollision { link: String, a: String, b: String },
    Latency { flow: String, latency: f64, limit: f64 },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::SlotOutsideCycle { port, lane, slot } => {
                write!(f, "{port}: slot {lane}/{slot} outside the cycle")
            }
            Violation::SlotOrder { port, lane, slot } => write!(f, "{port}: slot {lane}/{slot} out of order"),
            Violation::LaneOverlap { port, lanes } => {
                write!(f, "{port}: lanes {} and {} overlap", lanes.0, lanes.1)
            }
            Violation::GuardBand { port, lanes } => {
                write!(f, "{port}: lanes {} and {} violate the guard band", lanes.0, lanes.1)
            }
            Violation::Causality { port, flow, packet } => {
                write!(f, "{port}: {flow} packet {packet} leaves before it arrives")
            }
            Violation::OutsideSlot { port, flow, packet } => {
                write!(f, "{port}: {flow} packet {packet} is outside every slot of its lane")
            }
            Violation::Overlap { port, a, b } => write!(f, "{port}: {a} and {b} overlap on the wire"),
            Violation::Fifo { port, a, b } => write!(f, "{port}: {a} and {b} leave out of arrival order"),
            Violation::UnusedSlot { port, lane, slot } => write!(f, "{port}: slot {lane}/{slot} is open but unused"),
            Violation::SourceCollision { link, a, b } => write!(f, "{link}: {a} and {b} collide leaving their source"),
            Violation::Latency { flow, latency, limit } => {
                write!(f, "{flow}: latency {latency:.3} us over budget {limit:.3} us")
            }
        }
    }
}

struct Sent<'a> {
    flow: &'a str,
    index: usize,
    priority: usize,
    arrival: f64,
    start: f64,
    end: f64,
}

fn overlaps(a: (f64, f64), b: (f64, f64), tolerance: f64) -> bool {
    a.0 < b.1 - tolerance && b.0 < a.1 - tolerance
}

fn check_slots(port: &Port, tolerance: f64, out: &mut Vec<Violation>) {
    let Some(c) = port.cycle.solved.as_ref() else {
        return;
    };
    let name = || port.name.clone();
    for (lane, slots) in c.lanes.iter().enumerate() {
        for (k, s) in slots.iter().enumerate() {
            if s.start < -tolerance || s.duration < -tolerance || s.end() > c.duration + tolerance {
                out.push(Violation::SlotOutsideCycle { port: name(), lane, slot: k });
            }
            if k > 0 && s.start < slots[k - 1].end() - tolerance {
                out.push(Violation::SlotOrder { port: name(), lane, slot: k });
            }
        }
    }
    let open = c.open_slots(tolerance);
    for (n, (pa, a)) in open.iter().enumerate() {
        for (pb, b) in &open[n + 1..] {
            if pa == pb {
                continue;
            }
            let lanes = (*pa, *pb);
            if overlaps((a.start, a.end()), (b.start, b.end()), tolerance) {
                out.push(Violation::LaneOverlap { port: name(), lanes });
            } else if port.guard_band > 0.0 {
                let gap = (b.start - a.end()).max(a.start - b.end());
                if gap > tolerance && gap < port.guard_band - tolerance {
                    out.push(Violation::GuardBand { port: name(), lanes });
                }
            }
        }
    }
}

fn check_packets(net: &Network, port: &Port, tolerance: f64, out: &mut Vec<Violation>) {
    let Some(c) = port.cycle.solved.as_ref() else {
        return;
    };
    let mut sent = Vec::new();
    for &fid in &port.fragments {
        let f = net.fragment(fid);
        let Some(t) = f.solved.as_ref() else {
            continue;
        };
        let flow = net.flow(f.flow).name.as_str();
        let tx = port.transmission_time(f.packet_size);
        for i in 0..t.packet_count() {
            sent.push(Sent {
                flow,
                index: i,
                priority: usize::from(t.priority),
                arrival: t.arrival[i],
                start: t.scheduled[i] - tx,
                end: t.scheduled[i],
            });
        }
    }

    let mut used: Vec<Vec<bool>> = c.lanes.iter().map(|slots| vec![false; slots.len()]).collect();
    for p in &sent {
        if p.start < p.arrival - tolerance {
            out.push(Violation::Causality {
                port: port.name.clone(),
                flow: p.flow.to_string(),
                packet: p.index,
            });
        }
        let mut inside = false;
        if let Some(slots) = c.lanes.get(p.priority) {
            for (k, s) in slots.iter().enumerate() {
                for rep in 0..c.repetitions {
                    let (open, close) = c.window(s, rep);
                    if p.start >= open - tolerance && p.end <= close + tolerance {
                        inside = true;
                        used[p.priority][k] = true;
                    }
                }
            }
        }
        if !inside {
            out.push(Violation::OutsideSlot {
                port: port.name.clone(),
                flow: p.flow.to_string(),
                packet: p.index,
            });
        }
    }

    for (n, a) in sent.iter().enumerate() {
        for b in &sent[n + 1..] {
            let label = |p: &Sent| format!("{}#{}", p.flow, p.index);
            if overlaps((a.start, a.end), (b.start, b.end), tolerance) {
                out.push(Violation::Overlap {
                    port: port.name.clone(),
                    a: label(a),
                    b: label(b),
                });
            }
            let tied = (a.arrival - b.arrival).abs() <= tolerance;
            if a.priority == b.priority && a.flow != b.flow && !tied {
                let (first, second) = if a.arrival <= b.arrival { (a, b) } else { (b, a) };
                if first.end > second.start + tolerance {
                    out.push(Violation::Fifo {
                        port: port.name.clone(),
                        a: label(first),
                        b: label(second),
                    });
                }
            }
        }
    }

    for (lane, slots) in c.lanes.iter().enumerate() {
        for (k, s) in slots.iter().enumerate() {
            if s.is_open(tolerance) && !used[lane][k] {
                out.push(Violation::UnusedSlot {
                    port: port.name.clone(),
                    lane,
                    slot: k,
                });
            }
        }
    }
}

/// Departure windows of flows sharing a device's link, compared over their
/// joint hypercycle (wrapping around it).
fn check_source_links(net: &Network, tolerance: f64, out: &mut Vec<Violation>) {
    let mut links: BTreeMap<(DeviceId, PortId), Vec<FragmentId>> = BTreeMap::new();
    for f in net.fragments().iter().filter(|f| f.is_first_hop() && f.solved.is_some()) {
        links
            .entry((net.flow(f.flow).source, f.ingress))
            .or_default()
            .push(f.id);
    }
    let sizer = CycleSizer::with_limit(f64::MAX);
    for ((_, link), frags) in links {
        let port = net.port(link);
        for (n, &a) in frags.iter().enumerate() {
            for &b in &frags[n + 1..] {
                let (fa, fb) = (net.fragment(a), net.fragment(b));
                let (Some(ta), Some(tb)) = (fa.solved.as_ref(), fb.solved.as_ref()) else {
                    continue;
                };
                if fa.flow == fb.flow {
                    continue;
                }
                let Ok(horizon) = sizer.hypercycle(&[fa.period, fb.period]) else {
                    continue;
                };
                let (tx_a, tx_b) = (port.transmission_time(fa.packet_size), port.transmission_time(fb.packet_size));
                let na = (horizon / fa.period).round() as usize;
                let nb = (horizon / fb.period).round() as usize;
                let clash = (0..na).any(|i| {
                    (0..nb).any(|k| {
                        let (Some(da), Some(db)) = (ta.departure_at(fa.period, i), tb.departure_at(fb.period, k)) else {
                            return false;
                        };
                        [-horizon, 0.0, horizon]
                            .iter()
                            .any(|shift| overlaps((da, da + tx_a), (db + shift, db + shift + tx_b), tolerance))
                    })
                });
                if clash {
                    out.push(Violation::SourceCollision {
                        link: port.name.clone(),
                        a: net.flow(fa.flow).name.clone(),
                        b: net.flow(fb.flow).name.clone(),
                    });
                }
            }
        }
    }
}

/// Every violated schedule property, in port then flow order.
pub fn verify(net: &Network, tolerance: f64) -> Vec<Violation> {
    let mut out = Vec::new();
    for port in net.ports() {
        check_slots(port, tolerance, &mut out);
        check_packets(net, port, tolerance, &mut out);
    }
    check_source_links(net, tolerance, &mut out);
    for flow in net.flows() {
        let Some(limit) = flow.max_latency else {
            continue;
        };
        for stats in &flow.stats {
            let worst = stats.latencies.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if worst > limit + tolerance {
                out.push(Violation::Latency {
                    flow: flow.name.clone(),
                    latency: worst,
                    limit,
                });
            }
        }
    }
    out
}

/// [`verify`] and log each violation; returns how many were found.
pub fn verify_and_log(net: &Network, tolerance: f64) -> usize {
    let violations = verify(net, tolerance);
    for v in &violations {
        warn!(violation = %v, "schedule check failed");
    }
    violations.len()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceSpec, FlowSpec, FragmentTiming, Route, Slot, SolvedCycle, SwitchSpec};

    fn port_with(lanes: Vec<Vec<Slot>>) -> Network {
        let mut net = Network::new();
        net.add_device(DeviceSpec::new("d0")).unwrap();
        net.add_switch(SwitchSpec::new("s0")).unwrap();
        net.connect_by_name("d0", "s0").unwrap();
        let port = net.port_by_name("s0->d0").unwrap();
        net.port_mut(port).cycle.solved = Some(SolvedCycle {
            start: 0.0,
            duration: 100.0,
            repetitions: 1,
            lanes,
        });
        net
    }

    #[test]
    fn overlapping_lanes_are_reported() {
        let net = port_with(vec![
            vec![Slot { start: 0.0, duration: 10.0 }],
            vec![Slot { start: 5.0, duration: 10.0 }],
        ]);
        let v = verify(&net, 1e-6);
        assert!(v.contains(&Violation::LaneOverlap {
            port: "s0->d0".into(),
            lanes: (0, 1)
        }));
    }

    #[test]
    fn zero_length_slots_never_conflict() {
        let net = port_with(vec![
            vec![Slot { start: 0.0, duration: 0.0 }],
            vec![Slot { start: 0.0, duration: 0.0 }],
        ]);
        assert!(verify(&net, 1e-6).is_empty());
    }

    #[test]
    fn open_slot_without_packets_is_unused() {
        let net = port_with(vec![vec![Slot { start: 20.0, duration: 5.0 }]]);
        assert_eq!(
            verify(&net, 1e-6),
            vec![Violation::UnusedSlot {
                port: "s0->d0".into(),
                lane: 0,
                slot: 0
            }]
        );
    }

    /// d0 sends flows "a" and "b" through s0 to d1 and d2; the first hops
    /// leave d0 at the given offsets, 10 µs on the wire each.
    fn shared_source(departures: [f64; 2]) -> Network {
        let mut net = Network::new();
        let d0 = net.add_device(DeviceSpec::new("d0").period(200.0).packet_size(1250.0)).unwrap();
        let d1 = net.add_device(DeviceSpec::new("d1")).unwrap();
        let d2 = net.add_device(DeviceSpec::new("d2")).unwrap();
        net.add_switch(SwitchSpec::new("s0").speed(125.0).propagation_delay(1.0)).unwrap();
        for (a, b) in [("d0", "s0"), ("s0", "d1"), ("s0", "d2")] {
            net.connect_by_name(a, b).unwrap();
        }
        for (name, dst, dep) in [("a", d1, departures[0]), ("b", d2, departures[1])] {
            let flow = net
                .add_flow(FlowSpec::new(name, d0, Route::Destinations(vec![dst])))
                .unwrap();
            let first = net.first_hop_fragments(flow)[0];
            net.fragment_mut(first).solved = Some(FragmentTiming {
                priority: 0,
                departure: vec![dep],
                arrival: vec![dep + 11.0],
                scheduled: vec![dep + 21.0],
            });
        }
        net
    }

    #[test]
    fn shared_source_link_overlap_is_reported() {
        let v = verify(&shared_source([0.0, 4.0]), 1e-6);
        assert!(v.contains(&Violation::SourceCollision {
            link: "s0->d0".into(),
            a: "a".into(),
            b: "b".into(),
        }));
    }

    #[test]
    fn shared_source_link_checks_the_wrapped_cycle() {
        let v = verify(&shared_source([195.0, 0.0]), 1e-6);
        assert!(v.iter().any(|v| matches!(v, Violation::SourceCollision { .. })));

        let v = verify(&shared_source([0.0, 10.0]), 1e-6);
        assert!(!v.iter().any(|v| matches!(v, Violation::SourceCollision { .. })));
    }
}
