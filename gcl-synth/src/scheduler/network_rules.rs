/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Network-wide constraints spanning more than one port.
//!
//! * `latency`: leaf scheduled time minus source emission time stays within
//!   the flow's budget, per packet instance.
//! * `jitter`: each leaf latency stays within the jitter budget of the
//!   leaf's average latency.
//! * `first-hop-collision`: flows leaving the same device over the same link
//!   never overlap on that link.
//! * `periodicity`: a hop with more packet instances than its successor
//!   repeats at the successor's granularity.
//! * `frozen`: a re-solved hop feeding a frozen hop must deliver exactly when
//!   the frozen hop expects it.

use std::collections::BTreeMap;

use gcl_solver::{Formula, LinExpr};
use tracing::debug;

use super::session::{frozen_timing, SolvingSession};
use super::{SchedulerError, SchedulerOptions};
use crate::hyperperiod::CycleSizer;
use crate::model::{DeviceId, Flow, FragmentId, Network, PortId};

/// Packet pairs per joint hypercycle a pair of flows may share a source link
/// over; more is rejected with [`SchedulerError::CollisionPairLimit`].
pub const MAX_COLLISION_PAIRS: usize = 256;

pub(crate) fn emit_network(
    s: &mut SolvingSession,
    net: &Network,
    options: &SchedulerOptions,
) -> Result<(), SchedulerError> {
    let before = s.constraint_count();
    let flows: Vec<_> = s.modeled_flows().to_vec();
    for flow in flows {
        let flow = net.flow(flow);
        emit_latency(s, net, flow)?;
        if let Some(limit) = flow.max_jitter.or(options.default_max_jitter) {
            emit_jitter(s, net, flow, limit)?;
        }
    }
    emit_first_hop_collisions(s, net, &CycleSizer::with_limit(options.hypercycle_limit_us))?;
    emit_periodicity(s, net)?;
    emit_frozen_boundaries(s, net)?;
    debug!(constraints = s.constraint_count() - before, "network constraints emitted");
    Ok(())
}

fn latencies(s: &SolvingSession, net: &Network, flow: &Flow, leaf: FragmentId) -> Result<Vec<LinExpr>, SchedulerError> {
    let first_send = s.first_send(net, flow.id)?;
    (0..net.fragment(leaf).packet_count)
        .map(|i| Ok(s.scheduled(net, leaf, i)? - (first_send.clone() + i as f64 * flow.period)))
        .collect()
}

fn emit_latency(s: &mut SolvingSession, net: &Network, flow: &Flow) -> Result<(), SchedulerError> {
    let Some(limit) = flow.max_latency else {
        return Ok(());
    };
    for leaf in net.leaf_fragments(flow.id) {
        for latency in latencies(s, net, flow, leaf)? {
            s.assert("latency", Formula::le(latency, limit));
        }
    }
    Ok(())
}

fn emit_jitter(s: &mut SolvingSession, net: &Network, flow: &Flow, limit: f64) -> Result<(), SchedulerError> {
    for leaf in net.leaf_fragments(flow.id) {
        let lat = latencies(s, net, flow, leaf)?;
        if lat.len() < 2 {
            continue;
        }
        let average = LinExpr::sum(lat.iter().cloned()).scaled(1.0 / lat.len() as f64);
        for l in lat {
            let deviation = l - average.clone();
            s.assert("jitter", Formula::le(deviation.clone(), limit));
            s.assert("jitter", Formula::ge(deviation, -limit));
        }
    }
    Ok(())
}

// ── Shared source links ───────────────────────────────────────────────────────

fn emit_first_hop_collisions(s: &mut SolvingSession, net: &Network, sizer: &CycleSizer) -> Result<(), SchedulerError> {
    let mut links: BTreeMap<(DeviceId, PortId), Vec<FragmentId>> = BTreeMap::new();
    for f in net.fragments().iter().filter(|f| f.is_first_hop()) {
        links
            .entry((net.flow(f.flow).source, f.ingress))
            .or_default()
            .push(f.id);
    }

    for ((_, link), frags) in links {
        let port = net.port(link);
        for (n, &a) in frags.iter().enumerate() {
            for &b in &frags[n + 1..] {
                let (fa, fb) = (net.fragment(a), net.fragment(b));
                let modeled = s.is_port_modeled(fa.port) || s.is_port_modeled(fb.port);
                if fa.flow == fb.flow || !modeled {
                    continue;
                }
                let horizon = sizer
                    .hypercycle(&[fa.period, fb.period])
                    .map_err(|source| SchedulerError::Sizing {
                        port: port.name.clone(),
                        source,
                    })?;
                let na = (horizon / fa.period).round() as usize;
                let nb = (horizon / fb.period).round() as usize;
                if na * nb > MAX_COLLISION_PAIRS {
                    return Err(SchedulerError::CollisionPairLimit {
                        link: port.name.clone(),
                        a: net.flow(fa.flow).name.clone(),
                        b: net.flow(fb.flow).name.clone(),
                        pairs: na * nb,
                        limit: MAX_COLLISION_PAIRS,
                    });
                }
                debug!(link = %port.name, pairs = na * nb, "shared source link");
                let (tx_a, tx_b) = (port.transmission_time(fa.packet_size), port.transmission_time(fb.packet_size));
                for (i, k) in (0..na).flat_map(|i| (0..nb).map(move |k| (i, k))) {
                    let dep_a = s.departure(net, a, i)?;
                    let dep_b = s.departure(net, b, k)?;
                    for shift in [-horizon, 0.0, horizon] {
                        let dep_b = dep_b.clone() + shift;
                        s.assert(
                            "first-hop-collision",
                            Formula::or(vec![
                                Formula::le(dep_a.clone() + tx_a, dep_b.clone()),
                                Formula::le(dep_b + tx_b, dep_a.clone()),
                            ]),
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

// ── Hop coupling ──────────────────────────────────────────────────────────────

fn emit_periodicity(s: &mut SolvingSession, net: &Network) -> Result<(), SchedulerError> {
    let ports: Vec<PortId> = s.modeled_ports().to_vec();
    for port in ports {
        for &fid in &net.port(port).fragments {
            let f = net.fragment(fid);
            for &next in &f.next {
                let ns = net.fragment(next).packet_count.max(1);
                for i in ns..f.packet_count {
                    let this = s.scheduled(net, fid, i)?;
                    let base = s.scheduled(net, fid, i % ns)? + (i / ns) as f64 * ns as f64 * f.period;
                    s.assert("periodicity", Formula::eq(this, base));
                }
            }
        }
    }
    Ok(())
}

fn emit_frozen_boundaries(s: &mut SolvingSession, net: &Network) -> Result<(), SchedulerError> {
    let ports: Vec<PortId> = s.modeled_ports().to_vec();
    for port in ports {
        for &fid in &net.port(port).fragments {
            let f = net.fragment(fid);
            for &next in &f.next {
                let Some(t) = frozen_timing(net, net.fragment(next)) else {
                    continue;
                };
                for i in 0..f.packet_count {
                    if let Some(expected) = t.departure_at(f.period, i) {
                        let sched = s.scheduled(net, fid, i)?;
                        s.assert("frozen", Formula::eq(sched, expected));
                    }
                }
            }
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceSpec, FlowSpec, Route, SwitchSpec};
    use crate::scheduler::{verify, NetworkScheduler};

    const TOL: f64 = 1e-5;

    /// d0 ── s0 ─┬─ d1
    ///           └─ d2
    /// with one flow from d0 to each listener.
    fn fan_out(periods: [f64; 2]) -> Network {
        let mut net = Network::new();
        let d0 = net
            .add_device(DeviceSpec::new("d0").period(200.0).packet_size(1250.0))
            .unwrap();
        let d1 = net.add_device(DeviceSpec::new("d1")).unwrap();
        let d2 = net.add_device(DeviceSpec::new("d2")).unwrap();
        net.add_switch(SwitchSpec::new("s0").speed(125.0).propagation_delay(1.0).priority_lanes(1))
            .unwrap();
        for (a, b) in [("d0", "s0"), ("s0", "d1"), ("s0", "d2")] {
            net.connect_by_name(a, b).unwrap();
        }
        for (name, dst, period) in [("a", d1, periods[0]), ("b", d2, periods[1])] {
            net.add_flow(FlowSpec::new(name, d0, Route::Destinations(vec![dst])).period(period))
                .unwrap();
        }
        net
    }

    #[test]
    fn flows_from_one_device_leave_one_after_the_other() {
        let mut net = fan_out([200.0, 200.0]);
        NetworkScheduler::with_builtin(SchedulerOptions::default())
            .schedule(&mut net)
            .unwrap();
        assert!(verify(&net, TOL).is_empty());

        let window = |name: &str| {
            let first = net.first_hop_fragments(net.flow_by_name(name).unwrap())[0];
            let t = net.fragment(first).solved.clone().unwrap();
            (t.departure[0], t.departure[0] + 10.0)
        };
        let (a, b) = (window("a"), window("b"));
        for shift in [-200.0, 0.0, 200.0] {
            let b = (b.0 + shift, b.1 + shift);
            assert!(a.1 <= b.0 + TOL || b.1 <= a.0 + TOL, "{a:?} overlaps {b:?}");
        }
    }

    #[test]
    fn too_many_packet_pairs_on_a_source_link_is_an_error() {
        // 3230 µs joint hypercycle: 19 × 17 packet pairs
        let mut net = fan_out([170.0, 190.0]);
        let err = NetworkScheduler::with_builtin(SchedulerOptions::default())
            .schedule(&mut net)
            .unwrap_err();
        match err {
            SchedulerError::CollisionPairLimit { link, pairs, limit, .. } => {
                assert_eq!(link, "s0->d0");
                assert_eq!(pairs, 323);
                assert_eq!(limit, MAX_COLLISION_PAIRS);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!net.is_solved());
    }

    #[test]
    fn latency_rows_follow_every_packet() {
        let mut net = fan_out([100.0, 200.0]);
        let a = net.flow_by_name("a").unwrap();
        net.flow_mut(a).max_latency = Some(40.0);
        NetworkScheduler::with_builtin(SchedulerOptions::default())
            .schedule(&mut net)
            .unwrap();
        let stats = &net.flow(a).stats;
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].latencies.len(), 1);
        assert!(stats[0].latencies.iter().all(|&l| l <= 40.0 + TOL));
        assert!(verify(&net, TOL).is_empty());
    }
}
