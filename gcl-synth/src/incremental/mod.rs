/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Incremental edits to an already solved network.
//!
//! [`ModificationHandler`] records edits, then
//! [`apply_changes_to_solver`](ModificationHandler::apply_changes_to_solver)
//! prepares the network so that
//! [`NetworkScheduler::schedule_incremental`](crate::scheduler::NetworkScheduler::schedule_incremental)
//! re-solves only what the edits touched:
//!
//! 1. reset every modified port (its reset policy decides what is carried),
//! 2. re-size pending ports, the idle ports of every switch a new or edited
//!    flow crosses, so they keep a cycle consistent with their switch,
//! 3. record fragments whose packet count changed with the new sizing; the
//!    solving session links the extra instances periodically,
//! 4. mark the affected ports and flows Dirty.
//!
//! Every other port stays Solved and is frozen by the scheduler.

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::hyperperiod::{CycleSizer, SizingError};
use crate::model::{
    EntityState, FlowEdit, FlowId, FlowSpec, FragmentId, ModelError, Network, PortId, ResetPolicy,
};

// ── Errors ────────────────────────────────────────────────────────────────────

/// An edit that does not fit the current network.
///
/// Fatal for the offending edit only; the handler keeps every edit
/// recorded before it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModificationError {
    #[error("port {0} is not part of the network")]
    UnknownPort(String),

    #[error("flow {0} is not part of the network")]
    UnknownFlow(String),

    #[error("network has no solved schedule to modify")]
    NotSolved,

    #[error("cannot re-size port '{port}': {source}")]
    Sizing {
        port: String,
        #[source]
        source: SizingError,
    },

    #[error(transparent)]
    Model(#[from] ModelError),
}

// ── Edits ─────────────────────────────────────────────────────────────────────

/// Port properties an edit may change; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortEdit {
    pub reset_policy: Option<ResetPolicy>,
    /// Bytes per µs.
    pub speed: Option<f64>,
    pub guard_band: Option<f64>,
}

impl PortEdit {
    pub fn is_empty(&self) -> bool {
        self.reset_policy.is_none() && self.speed.is_none() && self.guard_band.is_none()
    }
}

/// What [`ModificationHandler::apply_changes_to_solver`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Ports reset for re-solving, edited ports and ports on edited paths.
    pub dirty_ports: BTreeSet<PortId>,
    /// Idle ports re-sized alongside the dirty ones.
    pub pending_ports: BTreeSet<PortId>,
    /// Fragments whose packet count changed with the new sizing.
    pub relinked_fragments: BTreeSet<FragmentId>,
    /// Ports whose values the next solve keeps as constants.
    pub frozen_ports: BTreeSet<PortId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.dirty_ports.is_empty() && self.pending_ports.is_empty()
    }

    /// `true` if `port` will be re-solved.
    pub fn touches(&self, port: PortId) -> bool {
        self.dirty_ports.contains(&port) || self.pending_ports.contains(&port)
    }
}

// ── ModificationHandler ───────────────────────────────────────────────────────

/// Collects edits between two solves.
#[derive(Debug, Clone, Default)]
pub struct ModificationHandler {
    modified_ports: BTreeSet<PortId>,
    modified_flows: BTreeSet<FlowId>,
    created_flows: BTreeSet<FlowId>,
    pending_setup: BTreeSet<PortId>,
    sizer: CycleSizer,
}

impl ModificationHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler that re-sizes with `sizer` (use the scheduler's limit).
    pub fn with_sizer(sizer: CycleSizer) -> Self {
        Self {
            sizer,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.modified_ports.is_empty()
            && self.modified_flows.is_empty()
            && self.created_flows.is_empty()
            && self.pending_setup.is_empty()
    }

    pub fn modified_ports(&self) -> &BTreeSet<PortId> {
        &self.modified_ports
    }

    pub fn modified_flows(&self) -> &BTreeSet<FlowId> {
        &self.modified_flows
    }

    pub fn created_flows(&self) -> &BTreeSet<FlowId> {
        &self.created_flows
    }

    pub fn pending_setup(&self) -> &BTreeSet<PortId> {
        &self.pending_setup
    }

    // ── Recording ─────────────────────────────────────────────────────────────

    /// Mark every port a flow's fragments use, and the idle ports of every
    /// switch it crosses.
    fn mark_path(&mut self, net: &Network, flow: FlowId) {
        let mut switches = BTreeSet::new();
        for &fid in &net.flow(flow).fragments {
            let port = net.fragment(fid).port;
            self.modified_ports.insert(port);
            switches.insert(net.port(port).switch);
        }
        for sw in switches {
            for &port in &net.switch(sw).ports {
                if net.port(port).fragments.is_empty() {
                    self.pending_setup.insert(port);
                }
            }
        }
    }

    /// Add a flow to a solved network.
    ///
    /// # Errors
    /// * [`ModificationError::NotSolved`] – nothing to modify yet.
    /// * [`ModificationError::Model`] – the flow is malformed; the network is
    ///   unchanged.
    pub fn add_flow(&mut self, net: &mut Network, spec: FlowSpec) -> Result<FlowId, ModificationError> {
        if !net.is_solved() {
            return Err(ModificationError::NotSolved);
        }
        let id = net.add_flow(spec)?;
        self.mark_path(net, id);
        self.created_flows.insert(id);
        info!(
            flow = %net.flow(id).name,
            ports = self.modified_ports.len(),
            pending = self.pending_setup.len(),
            "flow added incrementally"
        );
        Ok(id)
    }

    /// Change a flow's period, size, budgets or fixed priority.
    ///
    /// An empty edit records nothing.
    pub fn modify_flow(&mut self, net: &mut Network, flow: FlowId, edit: &FlowEdit) -> Result<(), ModificationError> {
        if !net.has_flow(flow) {
            return Err(ModificationError::UnknownFlow(flow.to_string()));
        }
        if edit.is_empty() {
            debug!(flow = %net.flow(flow).name, "empty flow edit ignored");
            return Ok(());
        }
        net.update_flow(flow, edit)?;
        net.flow_mut(flow).solved_first_send = None;
        self.mark_path(net, flow);
        if !self.created_flows.contains(&flow) {
            self.modified_flows.insert(flow);
        }
        info!(flow = %net.flow(flow).name, ?edit, "flow modified");
        Ok(())
    }

    /// Change a port's reset policy, speed or guard band.
    pub fn modify_port(&mut self, net: &mut Network, port: PortId, edit: &PortEdit) -> Result<(), ModificationError> {
        if !net.has_port(port) {
            return Err(ModificationError::UnknownPort(port.to_string()));
        }
        if edit.is_empty() {
            debug!(port = %net.port(port).name, "empty port edit ignored");
            return Ok(());
        }
        let p = net.port_mut(port);
        if let Some(policy) = edit.reset_policy {
            p.reset_policy = policy;
        }
        if let Some(speed) = edit.speed {
            p.speed = speed;
        }
        if let Some(guard_band) = edit.guard_band {
            p.guard_band = guard_band;
        }
        info!(port = %p.name, policy = %p.reset_policy, speed = p.speed, guard_band = p.guard_band, "port modified");
        self.modified_ports.insert(port);
        Ok(())
    }

    // ── Apply ─────────────────────────────────────────────────────────────────

    /// Move a port's solved values to `previous` (kept only if its policy
    /// carries anything) and unsize it.
    fn reset_port(net: &mut Network, port: PortId) {
        let policy = net.port(port).reset_policy;
        let frags = net.port(port).fragments.clone();
        let p = net.port_mut(port);
        p.cycle.reset();
        if policy == ResetPolicy::HardReset {
            p.cycle.previous = None;
        }
        for fid in frags {
            let f = net.fragment_mut(fid);
            f.reset();
            if policy == ResetPolicy::HardReset {
                f.previous = None;
            }
        }
        net.set_port_state(port, EntityState::Dirty);
    }

    /// Reset, re-size and mark everything the recorded edits touched.
    ///
    /// On success the handler is emptied and the network is ready for
    /// `schedule_incremental`.  With no recorded edits nothing changes.
    ///
    /// # Errors
    /// * [`ModificationError::NotSolved`] – the network was never solved.
    /// * [`ModificationError::Sizing`] – a touched port cannot be sized.
    pub fn apply_changes_to_solver(&mut self, net: &mut Network) -> Result<ChangeSet, ModificationError> {
        if !net.is_solved() {
            return Err(ModificationError::NotSolved);
        }
        let dirty: BTreeSet<PortId> = self.modified_ports.clone();
        let pending: BTreeSet<PortId> = self.pending_setup.difference(&dirty).copied().collect();

        // (1) reset
        for &port in &dirty {
            Self::reset_port(net, port);
        }
        for &flow in &self.modified_flows {
            for fid in net.flow(flow).fragments.clone() {
                net.fragment_mut(fid).previous = None;
            }
        }

        // (2) re-size, ports with traffic first so idle ones see their switch
        let counts: Vec<(FragmentId, usize)> = dirty
            .iter()
            .flat_map(|&p| net.port(p).fragments.iter())
            .map(|&f| (f, net.fragment(f).packet_count))
            .collect();
        for &port in &pending {
            Self::reset_port(net, port);
        }
        let mut order: Vec<PortId> = dirty.iter().chain(pending.iter()).copied().collect();
        order.sort_by_key(|&p| net.port(p).fragments.is_empty());
        for port in order {
            if let Err(source) = net.size_port(port, &self.sizer) {
                return Err(ModificationError::Sizing {
                    port: net.port(port).name.clone(),
                    source,
                });
            }
        }

        // (3) re-link
        let created: BTreeSet<FragmentId> = self
            .created_flows
            .iter()
            .flat_map(|&f| net.flow(f).fragments.iter().copied())
            .collect();
        let relinked: BTreeSet<FragmentId> = counts
            .into_iter()
            .filter(|(f, before)| !created.contains(f) && net.fragment(*f).packet_count != *before)
            .map(|(f, _)| f)
            .collect();
        for &f in &relinked {
            let frag = net.fragment(f);
            debug!(
                flow = %net.flow(frag.flow).name,
                port = %net.port(frag.port).name,
                packets = frag.packet_count,
                "packet count changed, instances re-linked"
            );
        }

        // (4) finalise
        let touched: Vec<FlowId> = net
            .flows()
            .iter()
            .filter(|f| f.fragments.iter().any(|&fr| dirty.contains(&net.fragment(fr).port)))
            .map(|f| f.id)
            .collect();
        for flow in touched {
            net.set_flow_state(flow, EntityState::Dirty);
        }
        let unsized_ports: Vec<&str> = dirty
            .iter()
            .filter(|&&p| !net.port(p).cycle.is_sized())
            .map(|&p| net.port(p).name.as_str())
            .collect();
        if !unsized_ports.is_empty() {
            warn!(ports = ?unsized_ports, "touched ports carry no traffic and stay unsized");
        }

        let changes = ChangeSet {
            dirty_ports: dirty,
            pending_ports: pending,
            relinked_fragments: relinked,
            frozen_ports: net
                .ports()
                .iter()
                .filter(|p| p.state == EntityState::Solved)
                .map(|p| p.id)
                .collect(),
        };
        info!(
            dirty = changes.dirty_ports.len(),
            pending = changes.pending_ports.len(),
            relinked = changes.relinked_fragments.len(),
            frozen = changes.frozen_ports.len(),
            "changes applied"
        );
        *self = Self::with_sizer(self.sizer.clone());
        Ok(changes)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceSpec, Route, SwitchSpec};
    use crate::scheduler::{NetworkScheduler, SchedulerOptions};

    /// d0 ── s0 ── s1 ── d1, plus d2 on s1 and an idle d3 on s0.
    fn solved_line() -> Network {
        let mut net = Network::new();
        let d0 = net.add_device(DeviceSpec::new("d0").period(100.0).packet_size(125.0)).unwrap();
        let d1 = net.add_device(DeviceSpec::new("d1")).unwrap();
        net.add_device(DeviceSpec::new("d2").period(100.0).packet_size(125.0)).unwrap();
        net.add_device(DeviceSpec::new("d3")).unwrap();
        for s in ["s0", "s1"] {
            net.add_switch(SwitchSpec::new(s).speed(125.0).priority_lanes(1)).unwrap();
        }
        for (a, b) in [("d0", "s0"), ("s0", "s1"), ("s1", "d1"), ("d2", "s1"), ("d3", "s0")] {
            net.connect_by_name(a, b).unwrap();
        }
        net.add_flow(FlowSpec::new("f0", d0, Route::Destinations(vec![d1]))).unwrap();
        NetworkScheduler::with_builtin(SchedulerOptions::default())
            .schedule(&mut net)
            .unwrap();
        net
    }

    #[test]
    fn edits_need_a_solved_network() {
        let mut net = Network::new();
        let d0 = net.add_device(DeviceSpec::new("d0")).unwrap();
        let mut handler = ModificationHandler::new();
        let err = handler
            .add_flow(&mut net, FlowSpec::new("f", d0, Route::Destinations(vec![])))
            .unwrap_err();
        assert_eq!(err, ModificationError::NotSolved);
        assert!(handler.is_empty());
    }

    #[test]
    fn new_flow_marks_its_path_and_idle_ports() {
        let mut net = solved_line();
        let d2 = net.device_by_name("d2").unwrap();
        let d1 = net.device_by_name("d1").unwrap();
        let mut handler = ModificationHandler::new();
        handler
            .add_flow(&mut net, FlowSpec::new("f1", d2, Route::Destinations(vec![d1])))
            .unwrap();

        let s1_d1 = net.port_by_name("s1->d1").unwrap();
        assert_eq!(handler.modified_ports().iter().copied().collect::<Vec<_>>(), vec![s1_d1]);
        assert!(handler.pending_setup().contains(&net.port_by_name("s1->d2").unwrap()));
        assert!(!handler.pending_setup().contains(&net.port_by_name("s0->d3").unwrap()));

        let changes = handler.apply_changes_to_solver(&mut net).unwrap();
        assert!(changes.dirty_ports.contains(&s1_d1));
        assert!(changes.frozen_ports.contains(&net.port_by_name("s0->s1").unwrap()));
        assert_eq!(net.port(s1_d1).state, EntityState::Dirty);
        assert!(handler.is_empty());
    }

    #[test]
    fn malformed_flow_leaves_the_handler_untouched() {
        let mut net = solved_line();
        let d0 = net.device_by_name("d0").unwrap();
        let d3 = net.device_by_name("d3").unwrap();
        let mut handler = ModificationHandler::new();
        let err = handler
            .add_flow(&mut net, FlowSpec::new("f0", d0, Route::Destinations(vec![d3])))
            .unwrap_err();
        assert!(matches!(err, ModificationError::Model(ModelError::DuplicateName(_))));
        assert!(handler.is_empty());
    }

    #[test]
    fn unknown_entities_are_rejected() {
        let mut net = solved_line();
        let mut handler = ModificationHandler::new();
        let ghost = PortId(99);
        let err = handler
            .modify_port(&mut net, ghost, &PortEdit { speed: Some(1.0), ..Default::default() })
            .unwrap_err();
        assert_eq!(err, ModificationError::UnknownPort("port#99".into()));
        let err = handler
            .modify_flow(&mut net, FlowId(7), &FlowEdit::default())
            .unwrap_err();
        assert_eq!(err, ModificationError::UnknownFlow("flow#7".into()));
    }

    #[test]
    fn hard_reset_drops_previous_values() {
        let mut net = solved_line();
        let port = net.port_by_name("s0->s1").unwrap();
        let mut handler = ModificationHandler::new();
        handler
            .modify_port(&mut net, port, &PortEdit { guard_band: Some(1.0), ..Default::default() })
            .unwrap();
        handler.apply_changes_to_solver(&mut net).unwrap();
        let p = net.port(port);
        assert!(p.cycle.previous.is_none());
        assert!(p.cycle.is_sized());
        assert_eq!(p.guard_band, 1.0);
    }

    #[test]
    fn carry_policy_keeps_previous_values() {
        let mut net = solved_line();
        let port = net.port_by_name("s0->s1").unwrap();
        let solved = net.port(port).cycle.solved.clone();
        let mut handler = ModificationHandler::new();
        handler
            .modify_port(
                &mut net,
                port,
                &PortEdit {
                    reset_policy: Some(ResetPolicy::SoftReset),
                    ..Default::default()
                },
            )
            .unwrap();
        handler.apply_changes_to_solver(&mut net).unwrap();
        assert_eq!(net.port(port).cycle.previous, solved);
        let frag = net.port(port).fragments[0];
        assert!(net.fragment(frag).previous.is_some());
    }

    #[test]
    fn longer_hypercycle_relinks_existing_fragments() {
        let mut net = solved_line();
        let d2 = net.device_by_name("d2").unwrap();
        let d1 = net.device_by_name("d1").unwrap();
        let mut handler = ModificationHandler::new();
        let f1 = handler
            .add_flow(&mut net, FlowSpec::new("f1", d2, Route::Destinations(vec![d1])).period(200.0))
            .unwrap();
        let changes = handler.apply_changes_to_solver(&mut net).unwrap();

        // s1->d1 grows from 100 to 200 µs: f0 now sends twice per cycle there
        let f0 = net.flow_by_name("f0").unwrap();
        let f0_at_s1 = net.flow(f0).fragments[1];
        assert_eq!(net.fragment(f0_at_s1).packet_count, 2);
        assert_eq!(changes.relinked_fragments.iter().copied().collect::<Vec<_>>(), vec![f0_at_s1]);
        assert_eq!(net.fragment(net.flow(f1).fragments[0]).packet_count, 1);
    }

    #[test]
    fn flow_edit_dirties_its_whole_path() {
        let mut net = solved_line();
        let f0 = net.flow_by_name("f0").unwrap();
        let mut handler = ModificationHandler::new();
        handler
            .modify_flow(&mut net, f0, &FlowEdit { packet_size: Some(250.0), ..Default::default() })
            .unwrap();
        assert_eq!(handler.modified_ports().len(), 2);
        assert!(net.flow(f0).solved_first_send.is_none());

        handler.apply_changes_to_solver(&mut net).unwrap();
        assert_eq!(net.flow(f0).state, EntityState::Dirty);
        for &fid in &net.flow(f0).fragments {
            assert!(net.fragment(fid).previous.is_none());
        }
    }

    #[test]
    fn empty_apply_changes_nothing() {
        let mut net = solved_line();
        let before: Vec<_> = net.ports().iter().map(|p| p.cycle.solved.clone()).collect();
        let changes = ModificationHandler::new().apply_changes_to_solver(&mut net).unwrap();
        assert!(changes.is_empty());
        let after: Vec<_> = net.ports().iter().map(|p| p.cycle.solved.clone()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn editing_the_only_flow_keeps_the_network_solved() {
        let mut net = solved_line();
        let f0 = net.flow_by_name("f0").unwrap();
        let mut handler = ModificationHandler::new();
        handler
            .modify_flow(&mut net, f0, &FlowEdit { packet_size: Some(250.0), ..Default::default() })
            .unwrap();
        handler.apply_changes_to_solver(&mut net).unwrap();
        assert!(net.ports().iter().all(|p| p.state != EntityState::Solved || p.fragments.is_empty()));
        assert!(net.is_solved());

        NetworkScheduler::with_builtin(SchedulerOptions::default())
            .schedule_incremental(&mut net)
            .unwrap();
        assert_eq!(net.flow(f0).state, EntityState::Solved);
        assert!(crate::scheduler::verify(&net, 1e-5).is_empty());
    }
}
