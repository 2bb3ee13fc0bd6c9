/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The top-level aggregate and sole owner of every model entity.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::{debug, warn};

use super::{
    Cycle, Device, DeviceId, DeviceSpec, EntityState, Flow, FlowFragment, FlowId, FragmentId,
    ModelError, NodeRef, Port, PortId, PortSpec, Switch, SwitchId, SwitchSpec,
};
use crate::hyperperiod::{CycleSizer, PortSizing, SizingError};

/// Devices, switches, ports, flows and fragments in id-addressed arenas.
///
/// Ids are dense indices issued here; accessors index directly and panic on
/// an id that came from a different network.
#[derive(Debug, Clone, Default)]
pub struct Network {
    pub(crate) devices: Vec<Device>,
    pub(crate) switches: Vec<Switch>,
    pub(crate) ports: Vec<Port>,
    pub(crate) flows: Vec<Flow>,
    pub(crate) fragments: Vec<FlowFragment>,
    names: HashMap<String, NodeRef>,
    pub(crate) flow_names: HashMap<String, FlowId>,
    /// A schedule was produced and has not been discarded since.
    solved: bool,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Construction ──────────────────────────────────────────────────────────

    pub fn add_device(&mut self, spec: DeviceSpec) -> Result<DeviceId, ModelError> {
        if self.names.contains_key(&spec.name) {
            return Err(ModelError::DuplicateName(spec.name));
        }
        let id = DeviceId(self.devices.len());
        self.names.insert(spec.name.clone(), NodeRef::Device(id));
        debug!(device = %spec.name, period = spec.period, size = spec.packet_size, "added device");
        self.devices.push(Device::from_spec(id, spec));
        Ok(id)
    }

    pub fn add_switch(&mut self, spec: SwitchSpec) -> Result<SwitchId, ModelError> {
        if self.names.contains_key(&spec.name) {
            return Err(ModelError::DuplicateName(spec.name));
        }
        let id = SwitchId(self.switches.len());
        self.names.insert(spec.name.clone(), NodeRef::Switch(id));
        debug!(switch = %spec.name, speed = spec.speed, sizing = %spec.sizing, "added switch");
        self.switches.push(Switch::from_spec(id, spec));
        Ok(id)
    }

    /// Add an egress port on `switch` toward `target`.
    pub fn add_port(&mut self, switch: SwitchId, target: NodeRef, spec: PortSpec) -> Result<PortId, ModelError> {
        let sw = self
            .switches
            .get(switch.0)
            .ok_or_else(|| ModelError::UnknownSwitch(switch.to_string()))?;
        let target_name = self.try_node_name(target)?.to_string();
        let name = format!("{}->{}", sw.name, target_name);
        if self.port_between(switch, target).is_some() {
            return Err(ModelError::DuplicateName(name));
        }
        let (lower, upper) = sw.cycle_bounds();
        let id = PortId(self.ports.len());
        let port = Port {
            id,
            switch,
            name,
            target,
            propagation_delay: spec.propagation_delay.unwrap_or(sw.propagation_delay),
            speed: spec.speed.unwrap_or(sw.speed),
            guard_band: spec.guard_band.unwrap_or(sw.guard_band),
            sizing_policy: spec.sizing.unwrap_or(sw.sizing),
            priority_lanes: sw.priority_lanes,
            lane_policy: sw.lane_policy,
            reset_policy: spec.reset_policy,
            state: EntityState::Unbound,
            fragments: Vec::new(),
            cycle: Cycle::new(lower, upper, spec.max_slot_duration.or(sw.max_slot_duration)),
        };
        debug!(port = %port.name, speed = port.speed, delay = port.propagation_delay, "added port");
        self.ports.push(port);
        self.switches[switch.0].ports.push(id);
        Ok(id)
    }

    /// Link two nodes with default ports on every switch end.
    pub fn connect(&mut self, a: NodeRef, b: NodeRef) -> Result<Vec<PortId>, ModelError> {
        if a.is_device() && b.is_device() {
            return Err(ModelError::UnknownSwitch(self.try_node_name(b)?.to_string()));
        }
        let mut out = Vec::new();
        for (from, to) in [(a, b), (b, a)] {
            if let NodeRef::Switch(sw) = from {
                match self.port_between(sw, to) {
                    Some(p) => out.push(p),
                    None => out.push(self.add_port(sw, to, PortSpec::default())?),
                }
            }
        }
        Ok(out)
    }

    pub fn connect_by_name(&mut self, a: &str, b: &str) -> Result<Vec<PortId>, ModelError> {
        let a = self.node_by_name(a).ok_or_else(|| ModelError::UnknownNode(a.to_string()))?;
        let b = self.node_by_name(b).ok_or_else(|| ModelError::UnknownNode(b.to_string()))?;
        self.connect(a, b)
    }

    // ── Lookup ────────────────────────────────────────────────────────────────

    pub fn device(&self, id: DeviceId) -> &Device {
        &self.devices[id.0]
    }

    pub fn switch(&self, id: SwitchId) -> &Switch {
        &self.switches[id.0]
    }

    pub fn port(&self, id: PortId) -> &Port {
        &self.ports[id.0]
    }

    pub fn flow(&self, id: FlowId) -> &Flow {
        &self.flows[id.0]
    }

    pub fn fragment(&self, id: FragmentId) -> &FlowFragment {
        &self.fragments[id.0]
    }

    pub(crate) fn port_mut(&mut self, id: PortId) -> &mut Port {
        &mut self.ports[id.0]
    }

    pub(crate) fn flow_mut(&mut self, id: FlowId) -> &mut Flow {
        &mut self.flows[id.0]
    }

    pub(crate) fn fragment_mut(&mut self, id: FragmentId) -> &mut FlowFragment {
        &mut self.fragments[id.0]
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn switches(&self) -> &[Switch] {
        &self.switches
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    pub fn fragments(&self) -> &[FlowFragment] {
        &self.fragments
    }

    pub fn has_port(&self, id: PortId) -> bool {
        id.0 < self.ports.len()
    }

    pub fn has_flow(&self, id: FlowId) -> bool {
        id.0 < self.flows.len()
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeRef> {
        self.names.get(name).copied()
    }

    pub fn device_by_name(&self, name: &str) -> Option<DeviceId> {
        self.node_by_name(name).and_then(NodeRef::as_device)
    }

    pub fn switch_by_name(&self, name: &str) -> Option<SwitchId> {
        self.node_by_name(name).and_then(NodeRef::as_switch)
    }

    pub fn flow_by_name(&self, name: &str) -> Option<FlowId> {
        self.flow_names.get(name).copied()
    }

    /// Port named `"<switch>-><target>"`.
    pub fn port_by_name(&self, name: &str) -> Option<PortId> {
        self.ports.iter().find(|p| p.name == name).map(|p| p.id)
    }

    pub fn node_name(&self, node: NodeRef) -> &str {
        match node {
            NodeRef::Device(d) => &self.devices[d.0].name,
            NodeRef::Switch(s) => &self.switches[s.0].name,
        }
    }

    fn try_node_name(&self, node: NodeRef) -> Result<&str, ModelError> {
        match node {
            NodeRef::Device(d) => self
                .devices
                .get(d.0)
                .map(|x| x.name.as_str())
                .ok_or_else(|| ModelError::UnknownDevice(d.to_string())),
            NodeRef::Switch(s) => self
                .switches
                .get(s.0)
                .map(|x| x.name.as_str())
                .ok_or_else(|| ModelError::UnknownSwitch(s.to_string())),
        }
    }

    pub fn port_between(&self, switch: SwitchId, target: NodeRef) -> Option<PortId> {
        self.switches
            .get(switch.0)?
            .ports
            .iter()
            .copied()
            .find(|p| self.ports[p.0].target == target)
    }

    fn neighbours(&self, node: NodeRef) -> Vec<NodeRef> {
        match node {
            NodeRef::Switch(s) => self.switches[s.0]
                .ports
                .iter()
                .map(|p| self.ports[p.0].target)
                .collect(),
            NodeRef::Device(_) => self
                .ports
                .iter()
                .filter(|p| p.target == node)
                .map(|p| NodeRef::Switch(p.switch))
                .collect(),
        }
    }

    /// Shortest route from `source` to `destination` through switches only.
    ///
    /// Returns the nodes after `source`, ending with `destination`.
    pub fn route(&self, source: DeviceId, destination: DeviceId) -> Option<Vec<NodeRef>> {
        let start = NodeRef::Device(source);
        let goal = NodeRef::Device(destination);
        let mut came_from: BTreeMap<NodeRef, NodeRef> = BTreeMap::new();
        let mut queue = VecDeque::from([start]);
        while let Some(at) = queue.pop_front() {
            if at == goal {
                let mut route = vec![goal];
                let mut cur = goal;
                while let Some(&prev) = came_from.get(&cur) {
                    if prev == start {
                        break;
                    }
                    route.push(prev);
                    cur = prev;
                }
                route.reverse();
                return Some(route);
            }
            // devices other than the source do not forward
            if at.is_device() && at != start {
                continue;
            }
            for next in self.neighbours(at) {
                if next != start && !came_from.contains_key(&next) {
                    came_from.insert(next, at);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    // ── Derived views ─────────────────────────────────────────────────────────

    /// Fragments of `flow` that deliver to a destination device.
    pub fn leaf_fragments(&self, flow: FlowId) -> Vec<FragmentId> {
        self.flows[flow.0]
            .fragments
            .iter()
            .copied()
            .filter(|f| self.fragments[f.0].is_leaf())
            .collect()
    }

    pub fn first_hop_fragments(&self, flow: FlowId) -> Vec<FragmentId> {
        self.flows[flow.0]
            .fragments
            .iter()
            .copied()
            .filter(|f| self.fragments[f.0].is_first_hop())
            .collect()
    }

    /// Fragments from the first hop down to `fragment`, inclusive.
    pub fn chain_to(&self, fragment: FragmentId) -> Vec<FragmentId> {
        let mut chain: Vec<FragmentId> =
            std::iter::successors(Some(fragment), |f| self.fragments[f.0].prev).collect();
        chain.reverse();
        chain
    }

    /// Packets the source emits per hypercycle of its busiest first hop.
    pub fn total_packets(&self, flow: FlowId) -> usize {
        self.first_hop_fragments(flow)
            .iter()
            .map(|f| self.fragments[f.0].packet_count)
            .max()
            .unwrap_or(0)
    }

    /// `true` once a schedule exists, including while edits have reset
    /// some or all of its ports for re-solving.
    pub fn is_solved(&self) -> bool {
        self.solved
    }

    pub(crate) fn mark_solved(&mut self) {
        self.solved = true;
    }

    // ── Sizing ────────────────────────────────────────────────────────────────

    /// LCM of every fragment period on `switch`, if it carries traffic.
    pub fn switch_reference_duration(&self, switch: SwitchId, sizer: &CycleSizer) -> Option<f64> {
        let periods: Vec<f64> = self.switches[switch.0]
            .ports
            .iter()
            .flat_map(|p| self.ports[p.0].fragments.iter())
            .map(|f| self.fragments[f.0].period)
            .collect();
        if periods.is_empty() {
            return None;
        }
        match sizer.hypercycle(&periods) {
            Ok(h) => Some(h),
            Err(e) => {
                warn!(switch = %self.switches[switch.0].name, error = %e, "no reference cycle for idle ports");
                None
            }
        }
    }

    /// Size `port`'s cycle and set its fragments' packet counts.
    ///
    /// A port without fragments gets an empty cycle as long as the rest of
    /// its switch carries traffic; otherwise it stays unsized.
    pub fn size_port(&mut self, port: PortId, sizer: &CycleSizer) -> Result<Option<&PortSizing>, SizingError> {
        let p = &self.ports[port.0];
        let periods: Vec<f64> = p.fragments.iter().map(|f| self.fragments[f.0].period).collect();
        let sizing = if periods.is_empty() {
            self.switch_reference_duration(p.switch, sizer)
                .map(|d| PortSizing::empty(d, p.priority_lanes))
        } else {
            Some(sizer.size(&periods, p.sizing_policy, p.priority_lanes, p.lane_policy)?)
        };
        if let Some(s) = &sizing {
            for f in &self.ports[port.0].fragments {
                let frag = &mut self.fragments[f.0];
                frag.packet_count = s.packets_for(frag.period);
            }
            debug!(port = %self.ports[port.0].name, cycle = s.cycle_duration_us, reps = s.repetitions, "port sized");
        }
        let p = &mut self.ports[port.0];
        p.cycle.sizing = sizing;
        Ok(p.cycle.sizing.as_ref())
    }

    /// Size every port that is not frozen.
    ///
    /// Ports with fragments go first so idle ports can take their switch's
    /// reference duration.
    pub fn size_ports(&mut self, sizer: &CycleSizer) -> Result<(), (PortId, SizingError)> {
        let mut order: Vec<PortId> = self
            .ports
            .iter()
            .filter(|p| !p.is_frozen())
            .map(|p| p.id)
            .collect();
        order.sort_by_key(|p| self.ports[p.0].fragments.is_empty());
        for port in order {
            self.size_port(port, sizer).map_err(|e| (port, e))?;
        }
        Ok(())
    }

    // ── Validation ────────────────────────────────────────────────────────────

    /// Switch-to-switch links whose two ends use different sizing policies.
    pub fn sizing_mismatches(&self) -> Vec<(PortId, PortId)> {
        let mut out = Vec::new();
        for p in &self.ports {
            let NodeRef::Switch(other) = p.target else {
                continue;
            };
            if let Some(back) = self.port_between(other, NodeRef::Switch(p.switch)) {
                if p.id < back && p.sizing_policy != self.ports[back.0].sizing_policy {
                    out.push((p.id, back));
                }
            }
        }
        out
    }

    /// Structural checks run before constraint emission.
    ///
    /// Mismatched sizing policies across a link are reported but not
    /// rejected.
    pub fn validate(&self) -> Result<(), ModelError> {
        for (a, b) in self.sizing_mismatches() {
            let (pa, pb) = (&self.ports[a.0], &self.ports[b.0]);
            warn!(
                port = %pa.name,
                policy = %pa.sizing_policy,
                reverse = %pb.name,
                reverse_policy = %pb.sizing_policy,
                "link ends use different cycle sizing policies"
            );
        }
        for flow in &self.flows {
            if flow.fragments.is_empty() {
                return Err(ModelError::EmptyPath(flow.name.clone()));
            }
            if flow.period <= 0.0 {
                return Err(ModelError::InvalidPeriod {
                    name: flow.name.clone(),
                    period: flow.period,
                });
            }
        }
        Ok(())
    }

    // ── State ─────────────────────────────────────────────────────────────────

    pub(crate) fn set_port_state(&mut self, port: PortId, state: EntityState) {
        let p = &mut self.ports[port.0];
        if p.state != state {
            debug!(port = %p.name, from = %p.state, to = %state, "port state");
            p.state = state;
        }
    }

    pub(crate) fn set_flow_state(&mut self, flow: FlowId, state: EntityState) {
        let f = &mut self.flows[flow.0];
        if f.state != state {
            debug!(flow = %f.name, from = %f.state, to = %state, "flow state");
            f.state = state;
        }
    }

    /// Forget every solved and carried value; everything becomes Unbound.
    pub fn reset_all(&mut self) {
        self.solved = false;
        for p in &mut self.ports {
            p.cycle.clear();
            p.state = EntityState::Unbound;
        }
        for f in &mut self.fragments {
            f.solved = None;
            f.previous = None;
        }
        for f in &mut self.flows {
            f.solved_first_send = None;
            f.stats.clear();
            f.state = EntityState::Unbound;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
