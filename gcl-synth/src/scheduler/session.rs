/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! In-memory solving session: the constraint set under construction and the
//! map from model entities to solver variables.
//!
//! Every variable is declared up front (ports first, then flows) before any
//! constraint is emitted, so accessors never create variables; asking for
//! one that was never declared is an ordering fault reported as
//! [`SchedulerError::UnmodeledEntity`].
//!
//! A fragment on a frozen port contributes its solved values as constants.

use std::collections::{HashMap, HashSet};

use gcl_solver::{Formula, LinExpr, Problem, VarId, VarKind};
use tracing::debug;

use super::SchedulerError;
use crate::model::{FlowFragment, FlowId, FragmentId, FragmentTiming, Network, PortId};

// ── Variable keys ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum EntityRef {
    Port(PortId),
    Fragment(FragmentId),
    Flow(FlowId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Field {
    CycleStart,
    SlotStart { lane: usize },
    SlotDuration { lane: usize },
    Priority,
    Scheduled,
    FirstSend,
}

/// `(entity, field, index)`; `index` is the slot or packet index, 0 for
/// scalar fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct VarKey {
    pub entity: EntityRef,
    pub field: Field,
    pub index: usize,
}

impl VarKey {
    fn new(entity: EntityRef, field: Field, index: usize) -> Self {
        Self { entity, field, index }
    }
}

// ── SolvingSession ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SolvingSession {
    problem: Problem,
    vars: HashMap<VarKey, VarId>,
    ports: Vec<PortId>,
    port_set: HashSet<PortId>,
    flows: Vec<FlowId>,
}

impl SolvingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn var_count(&self) -> usize {
        self.problem.var_count()
    }

    pub fn constraint_count(&self) -> usize {
        self.problem.constraint_count()
    }

    /// Ports whose constraints are part of this session, in declaration order.
    pub fn modeled_ports(&self) -> &[PortId] {
        &self.ports
    }

    /// Flows with at least one fragment on a modeled port.
    pub fn modeled_flows(&self) -> &[FlowId] {
        &self.flows
    }

    pub fn is_port_modeled(&self, port: PortId) -> bool {
        self.port_set.contains(&port)
    }

    pub(crate) fn assert(&mut self, group: &'static str, formula: Formula) {
        self.problem.assert(group, formula);
    }

    fn declare(&mut self, key: VarKey, kind: VarKind, name: String) -> VarId {
        if let Some(&v) = self.vars.get(&key) {
            return v;
        }
        let v = self.problem.new_var(name, kind);
        self.vars.insert(key, v);
        v
    }

    fn lookup(&self, key: VarKey, net: &Network) -> Result<VarId, SchedulerError> {
        self.vars.get(&key).copied().ok_or_else(|| {
            let entity = match key.entity {
                EntityRef::Port(p) => net.port(p).name.clone(),
                EntityRef::Fragment(f) => fragment_label(net, net.fragment(f)),
                EntityRef::Flow(f) => net.flow(f).name.clone(),
            };
            SchedulerError::UnmodeledEntity {
                entity: format!("{} {:?}[{}]", entity, key.field, key.index),
            }
        })
    }

    // ── Declaration ───────────────────────────────────────────────────────────

    /// Declare the cycle, slot and fragment variables of a sized port.
    pub(crate) fn declare_port(&mut self, net: &Network, port: PortId) {
        let p = net.port(port);
        let Some(sizing) = p.cycle.sizing.as_ref() else {
            return;
        };
        let e = EntityRef::Port(port);
        self.declare(VarKey::new(e, Field::CycleStart, 0), VarKind::Real, format!("{}.cs", p.name));
        for lane in 0..sizing.lanes() {
            for k in 0..sizing.slot_count(lane) {
                self.declare(
                    VarKey::new(e, Field::SlotStart { lane }, k),
                    VarKind::Real,
                    format!("{}.s[{}][{}]", p.name, lane, k),
                );
                self.declare(
                    VarKey::new(e, Field::SlotDuration { lane }, k),
                    VarKind::Real,
                    format!("{}.d[{}][{}]", p.name, lane, k),
                );
            }
        }
        for &fid in &p.fragments {
            let f = net.fragment(fid);
            let label = fragment_label(net, f);
            let e = EntityRef::Fragment(fid);
            if f.fixed_priority.is_none() {
                self.declare(VarKey::new(e, Field::Priority, 0), VarKind::Integer, format!("{label}.prio"));
            }
            for i in 0..f.packet_count {
                self.declare(
                    VarKey::new(e, Field::Scheduled, i),
                    VarKind::Real,
                    format!("{label}.sched[{i}]"),
                );
            }
        }
        if self.port_set.insert(port) {
            self.ports.push(port);
        }
    }

    /// Declare the first-send offset of a flow that has none fixed.
    pub(crate) fn declare_flow(&mut self, net: &Network, flow: FlowId) {
        let f = net.flow(flow);
        if f.effective_first_send().is_none() {
            let v = self.declare(
                VarKey::new(EntityRef::Flow(flow), Field::FirstSend, 0),
                VarKind::Real,
                format!("{}.first_send", f.name),
            );
            self.problem
                .assert("transmission", Formula::le(LinExpr::var(v), f.period));
        }
        if !self.flows.contains(&flow) {
            self.flows.push(flow);
        }
    }

    /// Minimise cycle starts, slot durations and scheduled times.
    pub(crate) fn set_objective(&mut self) {
        let terms = self.vars.iter().filter_map(|(k, v)| match k.field {
            Field::CycleStart | Field::SlotDuration { .. } | Field::Scheduled => Some(LinExpr::var(*v)),
            _ => None,
        });
        let objective = LinExpr::sum(terms);
        debug!(terms = objective.terms().len(), "objective set");
        self.problem.minimize(objective);
    }

    // ── Symbolic accessors ────────────────────────────────────────────────────

    pub fn cycle_start(&self, net: &Network, port: PortId) -> Result<LinExpr, SchedulerError> {
        let key = VarKey::new(EntityRef::Port(port), Field::CycleStart, 0);
        Ok(LinExpr::var(self.lookup(key, net)?))
    }

    pub fn slot_start(&self, net: &Network, port: PortId, lane: usize, slot: usize) -> Result<LinExpr, SchedulerError> {
        let key = VarKey::new(EntityRef::Port(port), Field::SlotStart { lane }, slot);
        Ok(LinExpr::var(self.lookup(key, net)?))
    }

    pub fn slot_duration(&self, net: &Network, port: PortId, lane: usize, slot: usize) -> Result<LinExpr, SchedulerError> {
        let key = VarKey::new(EntityRef::Port(port), Field::SlotDuration { lane }, slot);
        Ok(LinExpr::var(self.lookup(key, net)?))
    }

    pub fn first_send(&self, net: &Network, flow: FlowId) -> Result<LinExpr, SchedulerError> {
        match net.flow(flow).effective_first_send() {
            Some(v) => Ok(LinExpr::constant(v)),
            None => {
                let key = VarKey::new(EntityRef::Flow(flow), Field::FirstSend, 0);
                Ok(LinExpr::var(self.lookup(key, net)?))
            }
        }
    }

    pub fn priority(&self, net: &Network, fragment: FragmentId) -> Result<LinExpr, SchedulerError> {
        let f = net.fragment(fragment);
        if let Some(t) = frozen_timing(net, f) {
            return Ok(LinExpr::constant(f64::from(t.priority)));
        }
        if let Some(p) = f.fixed_priority {
            return Ok(LinExpr::constant(f64::from(p)));
        }
        let key = VarKey::new(EntityRef::Fragment(fragment), Field::Priority, 0);
        Ok(LinExpr::var(self.lookup(key, net)?))
    }

    /// End of transmission of packet `i`.
    pub fn scheduled(&self, net: &Network, fragment: FragmentId, i: usize) -> Result<LinExpr, SchedulerError> {
        let f = net.fragment(fragment);
        if let Some(t) = frozen_timing(net, f) {
            if let Some(v) = t.scheduled_at(f.period, i) {
                return Ok(LinExpr::constant(v));
            }
        }
        let n = f.packet_count.max(1);
        let key = VarKey::new(EntityRef::Fragment(fragment), Field::Scheduled, i % n);
        let base = LinExpr::var(self.lookup(key, net)?);
        Ok(base + (i / n) as f64 * n as f64 * f.period)
    }

    /// Time packet `i` leaves the previous hop (or the source).
    pub fn departure(&self, net: &Network, fragment: FragmentId, i: usize) -> Result<LinExpr, SchedulerError> {
        let f = net.fragment(fragment);
        if let Some(t) = frozen_timing(net, f) {
            if let Some(v) = t.departure_at(f.period, i) {
                return Ok(LinExpr::constant(v));
            }
        }
        match f.prev {
            Some(prev) => self.scheduled(net, prev, i),
            None => Ok(self.first_send(net, f.flow)? + i as f64 * f.period),
        }
    }

    /// Time packet `i` is fully received at this hop's switch.
    pub fn arrival(&self, net: &Network, fragment: FragmentId, i: usize) -> Result<LinExpr, SchedulerError> {
        let f = net.fragment(fragment);
        if let Some(t) = frozen_timing(net, f) {
            if let Some(v) = t.arrival_at(f.period, i) {
                return Ok(LinExpr::constant(v));
            }
        }
        Ok(self.departure(net, fragment, i)? + net.port(f.ingress).propagation_delay)
    }
}

/// Solved timing of a fragment whose port is frozen.
pub(crate) fn frozen_timing<'n>(net: &'n Network, f: &'n FlowFragment) -> Option<&'n FragmentTiming> {
    if net.port(f.port).is_frozen() {
        f.solved.as_ref()
    } else {
        None
    }
}

pub(crate) fn fragment_label(net: &Network, f: &FlowFragment) -> String {
    format!("{}@{}", net.flow(f.flow).name, net.port(f.port).name)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
