/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-port constraints: slot layout, packet timing, containment, FIFO,
//! exclusion and the optional wrap / best-effort / carry-over families.
//!
//! Times are absolute.  Slot `(p, k)` of repetition `j` spans
//! `[cs + j·dur + s[p][k], cs + j·dur + s[p][k] + d[p][k]]`, where `cs` is
//! the port's cycle start and `dur` its sized (constant) cycle duration.
//! A packet occupies the wire during `[sched − tx, sched]`.
//!
//! | Group | Constraint |
//! |---|---|
//! | `cycle-bounds` | `s + d ≤ dur`, `d ≤ max slot`, `prio < lanes` |
//! | `slot-order` | same-lane slots ordered; guard band unless adjacent |
//! | `slot-exclusion` | slots of different lanes never overlap |
//! | `transmission` | `sched ≥ arrival + tx` |
//! | `containment` | each packet inside one slot of its lane |
//! | `exclusion` | no two packets on the wire at once |
//! | `fifo` | same-lane packets leave in arrival order |
//! | `wrap` | transmission starts on an arrival, a slot start or right after another packet |
//! | `best-effort` | `Σ d ≤ (1 − f)·dur` |
//! | `slot-zeroing` | a slot holding no packet has zero length |
//! | `carry` | values kept by the port's reset policy |

use gcl_solver::{Formula, LinExpr};
use tracing::{debug, warn};

use super::session::SolvingSession;
use super::{SchedulerError, SchedulerOptions};
use crate::hyperperiod::PortSizing;
use crate::model::{FragmentId, Network, Port, PortId, ResetPolicy, SolvedCycle};

const MATCH_TOLERANCE: f64 = 1e-6;

/// One packet instance on the port, with its symbolic timing.
struct Packet {
    fragment: FragmentId,
    tx: f64,
    prio: LinExpr,
    arrival: LinExpr,
    sched: LinExpr,
}

impl Packet {
    fn start(&self) -> LinExpr {
        self.sched.clone() - self.tx
    }
}

/// Symbolic slot `(start, duration)` table, indexed `[lane][slot]`.
type SlotTable = Vec<Vec<(LinExpr, LinExpr)>>;

/// Emit every constraint of one sized port.
pub(crate) fn emit_port(
    s: &mut SolvingSession,
    net: &Network,
    port: PortId,
    options: &SchedulerOptions,
) -> Result<(), SchedulerError> {
    let p = net.port(port);
    let Some(sizing) = p.cycle.sizing.as_ref() else {
        return Ok(());
    };
    let before = s.constraint_count();

    let cs = s.cycle_start(net, port)?;
    let slots = slot_table(s, net, port, sizing)?;
    let packets = packets(s, net, p)?;

    emit_slot_layout(s, p, sizing, &slots);
    emit_timing(s, net, p, sizing, &packets)?;
    emit_containment(s, sizing, &cs, &slots, &packets);
    emit_pairs(s, &packets, options.interframe_gap);
    if options.wrap {
        emit_wrap(s, sizing, &cs, &slots, &packets);
    }
    if options.best_effort_fraction > 0.0 {
        let reserved = LinExpr::sum(slots.iter().flatten().map(|(_, d)| d.clone()));
        s.assert(
            "best-effort",
            Formula::le(reserved, (1.0 - options.best_effort_fraction) * sizing.cycle_duration_us),
        );
    }
    emit_slot_zeroing(s, sizing, &cs, &slots, &packets);
    emit_carry(s, net, p, sizing, &cs, &slots)?;

    debug!(
        port = %p.name,
        packets = packets.len(),
        slots = slots.iter().map(Vec::len).sum::<usize>(),
        constraints = s.constraint_count() - before,
        "port constraints emitted"
    );
    Ok(())
}

fn slot_table(
    s: &SolvingSession,
    net: &Network,
    port: PortId,
    sizing: &PortSizing,
) -> Result<SlotTable, SchedulerError> {
    (0..sizing.lanes())
        .map(|lane| {
            (0..sizing.slot_count(lane))
                .map(|k| Ok((s.slot_start(net, port, lane, k)?, s.slot_duration(net, port, lane, k)?)))
                .collect()
        })
        .collect()
}

fn packets(s: &SolvingSession, net: &Network, p: &Port) -> Result<Vec<Packet>, SchedulerError> {
    let mut out = Vec::new();
    for &fid in &p.fragments {
        let f = net.fragment(fid);
        let tx = p.transmission_time(f.packet_size);
        let prio = s.priority(net, fid)?;
        for i in 0..f.packet_count {
            out.push(Packet {
                fragment: fid,
                tx,
                prio: prio.clone(),
                arrival: s.arrival(net, fid, i)?,
                sched: s.scheduled(net, fid, i)?,
            });
        }
    }
    Ok(out)
}

/// Absolute start of slot `(start, _)` in repetition `j`.
fn absolute(cs: &LinExpr, sizing: &PortSizing, start: &LinExpr, j: usize) -> LinExpr {
    cs.clone() + start.clone() + j as f64 * sizing.cycle_duration_us
}

// ── Slot layout ───────────────────────────────────────────────────────────────

fn emit_slot_layout(s: &mut SolvingSession, p: &Port, sizing: &PortSizing, slots: &SlotTable) {
    let dur = sizing.cycle_duration_us;
    let max_slot = p.cycle.max_slot().unwrap_or(dur);
    let gb = p.guard_band;

    for lane in slots {
        for (start, d) in lane {
            s.assert("cycle-bounds", Formula::le(start.clone() + d.clone(), dur));
            s.assert("cycle-bounds", Formula::le(d.clone(), max_slot));
        }
        for w in lane.windows(2) {
            let (s0, d0) = &w[0];
            let (s1, _) = &w[1];
            let end0 = s0.clone() + d0.clone();
            s.assert("slot-order", Formula::ge(s1.clone(), end0.clone()));
            if gb > 0.0 {
                s.assert(
                    "slot-order",
                    Formula::or(vec![
                        Formula::ge(s1.clone(), end0.clone() + gb),
                        Formula::eq(s1.clone(), end0),
                        Formula::eq(d0.clone(), 0.0),
                    ]),
                );
            }
        }
    }

    for (a, lane_a) in slots.iter().enumerate() {
        for lane_b in &slots[a + 1..] {
            for (sa, da) in lane_a {
                for (sb, db) in lane_b {
                    let end_a = sa.clone() + da.clone();
                    let end_b = sb.clone() + db.clone();
                    let mut options = if gb > 0.0 {
                        vec![
                            Formula::le(end_a.clone() + gb, sb.clone()),
                            Formula::le(end_b.clone() + gb, sa.clone()),
                            Formula::eq(end_a, sb.clone()),
                            Formula::eq(end_b, sa.clone()),
                        ]
                    } else {
                        vec![Formula::le(end_a, sb.clone()), Formula::le(end_b, sa.clone())]
                    };
                    options.push(Formula::eq(da.clone(), 0.0));
                    options.push(Formula::eq(db.clone(), 0.0));
                    s.assert("slot-exclusion", Formula::or(options));
                }
            }
        }
    }
}

// ── Packet timing ─────────────────────────────────────────────────────────────

fn emit_timing(
    s: &mut SolvingSession,
    net: &Network,
    p: &Port,
    sizing: &PortSizing,
    packets: &[Packet],
) -> Result<(), SchedulerError> {
    let top = sizing.lanes().saturating_sub(1) as f64;
    for &fid in &p.fragments {
        let prio = s.priority(net, fid)?;
        if !prio.is_constant() {
            s.assert("cycle-bounds", Formula::le(prio, top));
        }
    }

    for pk in packets {
        s.assert("transmission", Formula::ge(pk.sched.clone(), pk.arrival.clone() + pk.tx));
    }

    // consecutive instances of one fragment, including the wrap into the
    // next hypercycle
    for &fid in &p.fragments {
        let f = net.fragment(fid);
        let tx = p.transmission_time(f.packet_size);
        for i in 0..f.packet_count {
            let this = s.scheduled(net, fid, i)?;
            let next = s.scheduled(net, fid, i + 1)?;
            s.assert("exclusion", Formula::le(this + tx, next));
        }
    }
    Ok(())
}

fn emit_containment(s: &mut SolvingSession, sizing: &PortSizing, cs: &LinExpr, slots: &SlotTable, packets: &[Packet]) {
    for pk in packets {
        let mut options = Vec::new();
        for (lane, lane_slots) in slots.iter().enumerate() {
            for (start, d) in lane_slots {
                for j in 0..sizing.repetitions {
                    let open = absolute(cs, sizing, start, j);
                    options.push(Formula::and(vec![
                        Formula::eq(pk.prio.clone(), lane as f64),
                        Formula::ge(pk.start(), open.clone()),
                        Formula::le(pk.sched.clone(), open + d.clone()),
                    ]));
                }
            }
        }
        s.assert("containment", Formula::or(options));
    }
}

/// Exclusion and FIFO between packets of different fragments.
fn emit_pairs(s: &mut SolvingSession, packets: &[Packet], gap: f64) {
    for (n, a) in packets.iter().enumerate() {
        for b in &packets[n + 1..] {
            if a.fragment == b.fragment {
                continue;
            }
            s.assert(
                "exclusion",
                Formula::or(vec![
                    Formula::le(a.sched.clone() + b.tx, b.sched.clone()),
                    Formula::le(b.sched.clone() + a.tx, a.sched.clone()),
                ]),
            );
            s.assert(
                "fifo",
                Formula::or(vec![
                    Formula::le(a.prio.clone() + 1.0, b.prio.clone()),
                    Formula::ge(a.prio.clone(), b.prio.clone() + 1.0),
                    Formula::and(vec![
                        Formula::le(a.arrival.clone(), b.arrival.clone()),
                        Formula::le(a.sched.clone() + b.tx + gap, b.sched.clone()),
                    ]),
                    Formula::and(vec![
                        Formula::le(b.arrival.clone(), a.arrival.clone()),
                        Formula::le(b.sched.clone() + a.tx + gap, a.sched.clone()),
                    ]),
                ]),
            );
        }
    }
}

fn emit_wrap(s: &mut SolvingSession, sizing: &PortSizing, cs: &LinExpr, slots: &SlotTable, packets: &[Packet]) {
    for (n, pk) in packets.iter().enumerate() {
        let start = pk.start();
        let mut options = vec![Formula::eq(start.clone(), pk.arrival.clone())];
        for (m, other) in packets.iter().enumerate() {
            if m != n {
                options.push(Formula::eq(start.clone(), other.sched.clone()));
            }
        }
        for (start_k, _) in slots.iter().flatten() {
            for j in 0..sizing.repetitions {
                options.push(Formula::eq(start.clone(), absolute(cs, sizing, start_k, j)));
            }
        }
        s.assert("wrap", Formula::or(options));
    }
}

fn emit_slot_zeroing(s: &mut SolvingSession, sizing: &PortSizing, cs: &LinExpr, slots: &SlotTable, packets: &[Packet]) {
    for (lane, lane_slots) in slots.iter().enumerate() {
        for (start, d) in lane_slots {
            let mut options = vec![Formula::eq(d.clone(), 0.0)];
            for pk in packets {
                for j in 0..sizing.repetitions {
                    let open = absolute(cs, sizing, start, j);
                    options.push(Formula::and(vec![
                        Formula::eq(pk.prio.clone(), lane as f64),
                        Formula::ge(pk.start(), open.clone()),
                        Formula::le(pk.sched.clone(), open + d.clone()),
                    ]));
                }
            }
            s.assert("slot-zeroing", Formula::or(options));
        }
    }
}

// ── Carry-over ────────────────────────────────────────────────────────────────

fn same_cycle(prev: &SolvedCycle, sizing: &PortSizing) -> bool {
    (prev.duration - sizing.cycle_duration_us).abs() <= MATCH_TOLERANCE && prev.repetitions == sizing.repetitions
}

fn same_slots(prev: &SolvedCycle, sizing: &PortSizing) -> bool {
    prev.lanes.len() == sizing.lanes()
        && prev
            .lanes
            .iter()
            .enumerate()
            .all(|(lane, slots)| slots.len() == sizing.slot_count(lane))
}

fn same_fragments(net: &Network, p: &Port) -> bool {
    p.fragments.iter().all(|&fid| {
        let f = net.fragment(fid);
        f.previous
            .as_ref()
            .map_or(true, |t| t.packet_count() == f.packet_count)
    })
}

/// Strongest policy at or below `policy` that the previous values still fit.
pub(crate) fn applicable_policy(net: &Network, p: &Port, sizing: &PortSizing, prev: &SolvedCycle) -> ResetPolicy {
    let mut policy = p.reset_policy;
    loop {
        let fits = match policy {
            ResetPolicy::HardReset => true,
            ResetPolicy::CarryOnCycle => same_cycle(prev, sizing),
            ResetPolicy::CarryOnFragments => same_cycle(prev, sizing) && same_fragments(net, p),
            ResetPolicy::SoftReset => {
                same_cycle(prev, sizing) && same_fragments(net, p) && same_slots(prev, sizing)
            }
        };
        if fits {
            return policy;
        }
        let weaker = policy.weaker();
        warn!(
            port = %p.name,
            from = %policy,
            to = %weaker,
            "previous values no longer fit the port, weakening reset policy"
        );
        policy = weaker;
    }
}

fn emit_carry(
    s: &mut SolvingSession,
    net: &Network,
    p: &Port,
    sizing: &PortSizing,
    cs: &LinExpr,
    slots: &SlotTable,
) -> Result<(), SchedulerError> {
    let Some(prev) = p.cycle.previous.as_ref() else {
        return Ok(());
    };
    let policy = applicable_policy(net, p, sizing, prev);
    if policy == ResetPolicy::HardReset {
        return Ok(());
    }
    s.assert("carry", Formula::eq(cs.clone(), prev.start));

    if matches!(policy, ResetPolicy::CarryOnFragments | ResetPolicy::SoftReset) {
        for &fid in &p.fragments {
            let f = net.fragment(fid);
            let Some(t) = f.previous.as_ref() else {
                continue;
            };
            if f.fixed_priority.is_none() {
                let prio = s.priority(net, fid)?;
                s.assert("carry", Formula::eq(prio, f64::from(t.priority)));
            }
            for (i, &v) in t.scheduled.iter().enumerate() {
                let sched = s.scheduled(net, fid, i)?;
                s.assert("carry", Formula::eq(sched, v));
            }
        }
    }

    if policy == ResetPolicy::SoftReset {
        for (lane, lane_slots) in slots.iter().enumerate() {
            for (k, (start, d)) in lane_slots.iter().enumerate() {
                let old = prev.lanes[lane][k];
                s.assert("carry", Formula::eq(start.clone(), old.start));
                s.assert("carry", Formula::eq(d.clone(), old.duration));
            }
        }
    }
    debug!(port = %p.name, policy = %policy, "carried previous values");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
