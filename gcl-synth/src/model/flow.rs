/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Flows and their decomposition into per-hop fragments.
//!
//! A flow's route is a [`PathTree`].  Walking it from the source, every
//! switch node yields one fragment per child ("this switch → next hop"),
//! registered on the switch's egress port toward that child and chained to
//! the fragment that brought the flow into the switch.

use tracing::{debug, info};

use super::{
    DeviceId, EntityState, FlowFragment, FlowId, FragmentId, ModelError, Network, NodeRef,
    PathNodeId, PathTree, PortId,
};

/// One hop of an explicit path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hop {
    pub node: NodeRef,
    /// Priority for the hop leaving `node`.
    pub priority: Option<u8>,
}

impl Hop {
    pub fn new(node: NodeRef) -> Self {
        Self { node, priority: None }
    }

    pub fn with_priority(node: NodeRef, priority: u8) -> Self {
        Self {
            node,
            priority: Some(priority),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Shortest routes to each destination device.
    Destinations(Vec<DeviceId>),
    /// Explicit hop lists, each starting after the source and ending at a
    /// destination device.
    Paths(Vec<Vec<Hop>>),
}

/// Parameters of a new flow; unset values fall back to the source device.
#[derive(Debug, Clone)]
pub struct FlowSpec {
    pub name: String,
    pub source: DeviceId,
    pub route: Route,
    pub period: Option<f64>,
    pub packet_size: Option<f64>,
    pub first_send: Option<f64>,
    pub priority: Option<u8>,
    pub max_jitter: Option<f64>,
    pub max_latency: Option<f64>,
}

impl FlowSpec {
    pub fn new(name: impl Into<String>, source: DeviceId, route: Route) -> Self {
        Self {
            name: name.into(),
            source,
            route,
            period: None,
            packet_size: None,
            first_send: None,
            priority: None,
            max_jitter: None,
            max_latency: None,
        }
    }

    pub fn period(mut self, period: f64) -> Self {
        self.period = Some(period);
        self
    }

    pub fn packet_size(mut self, size: f64) -> Self {
        self.packet_size = Some(size);
        self
    }

    pub fn first_send(mut self, offset: f64) -> Self {
        self.first_send = Some(offset);
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn max_jitter(mut self, jitter: f64) -> Self {
        self.max_jitter = Some(jitter);
        self
    }

    pub fn max_latency(mut self, latency: f64) -> Self {
        self.max_latency = Some(latency);
        self
    }
}

/// Changes to an existing flow; `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct FlowEdit {
    pub period: Option<f64>,
    pub packet_size: Option<f64>,
    pub max_latency: Option<f64>,
    pub max_jitter: Option<f64>,
    pub priority: Option<u8>,
}

impl FlowEdit {
    pub fn is_empty(&self) -> bool {
        self.period.is_none()
            && self.packet_size.is_none()
            && self.max_latency.is_none()
            && self.max_jitter.is_none()
            && self.priority.is_none()
    }
}

/// Latency figures for one destination after a solve, µs.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafStats {
    pub destination: DeviceId,
    pub latencies: Vec<f64>,
    pub average_latency: f64,
    /// Largest deviation of any packet's latency from the average.
    pub jitter: f64,
}

impl LeafStats {
    pub fn from_latencies(destination: DeviceId, latencies: Vec<f64>) -> Self {
        let n = latencies.len().max(1) as f64;
        let average_latency = latencies.iter().sum::<f64>() / n;
        let jitter = latencies
            .iter()
            .map(|l| (l - average_latency).abs())
            .fold(0.0, f64::max);
        Self {
            destination,
            latencies,
            average_latency,
            jitter,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Flow {
    pub id: FlowId,
    pub name: String,
    pub source: DeviceId,
    pub tree: PathTree,
    pub period: f64,
    pub packet_size: f64,
    /// Fixed first-send offset; `None` lets the solver choose.
    pub first_send: Option<f64>,
    pub fixed_priority: Option<u8>,
    pub max_jitter: Option<f64>,
    pub max_latency: Option<f64>,
    pub state: EntityState,
    pub fragments: Vec<FragmentId>,
    pub solved_first_send: Option<f64>,
    pub stats: Vec<LeafStats>,
}

impl Flow {
    /// First-send offset in effect: the fixed one, else the solved one.
    pub fn effective_first_send(&self) -> Option<f64> {
        self.first_send.or(self.solved_first_send)
    }
}

// ── Fragmentation ─────────────────────────────────────────────────────────────

struct PlannedFragment {
    hop: PathNodeId,
    port: PortId,
    ingress: PortId,
    prev: Option<usize>,
    priority: Option<u8>,
}

impl Network {
    fn lanes_check(&self, flow: &str, port: PortId, priority: Option<u8>) -> Result<(), ModelError> {
        let p = &self.ports[port.0];
        match priority {
            Some(prio) if usize::from(prio) >= p.priority_lanes => Err(ModelError::InvalidPriority {
                flow: flow.to_string(),
                port: p.name.clone(),
                priority: prio,
                lanes: p.priority_lanes,
            }),
            _ => Ok(()),
        }
    }

    fn plan_switch(
        &self,
        flow: &str,
        tree: &PathTree,
        at: PathNodeId,
        prev: Option<usize>,
        ingress: PortId,
        fixed_priority: Option<u8>,
        plan: &mut Vec<PlannedFragment>,
    ) -> Result<(), ModelError> {
        let node = tree.node(at);
        let NodeRef::Switch(sw) = node.node else {
            return Ok(());
        };
        let priority = node.priority.or(fixed_priority);
        if node.children.is_empty() {
            return Err(ModelError::PathGap {
                flow: flow.to_string(),
                from: self.node_name(node.node).to_string(),
                to: "<no destination>".to_string(),
            });
        }
        for &child in &node.children {
            let target = tree.node(child).node;
            let port = self.port_between(sw, target).ok_or_else(|| ModelError::PathGap {
                flow: flow.to_string(),
                from: self.node_name(node.node).to_string(),
                to: self.node_name(target).to_string(),
            })?;
            self.lanes_check(flow, port, priority)?;
            let index = plan.len();
            plan.push(PlannedFragment {
                hop: at,
                port,
                ingress,
                prev,
                priority,
            });
            match target {
                NodeRef::Switch(_) => {
                    self.plan_switch(flow, tree, child, Some(index), port, fixed_priority, plan)?
                }
                NodeRef::Device(_) => {
                    if let Some(&beyond) = tree.children(child).first() {
                        return Err(ModelError::PathGap {
                            flow: flow.to_string(),
                            from: self.node_name(target).to_string(),
                            to: self.node_name(tree.node(beyond).node).to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Plan every fragment of a flow without touching the network.
    fn plan_fragments(
        &self,
        flow: &str,
        source: DeviceId,
        tree: &PathTree,
        fixed_priority: Option<u8>,
    ) -> Result<Vec<PlannedFragment>, ModelError> {
        let root = tree.root();
        if tree.children(root).is_empty() {
            return Err(ModelError::EmptyPath(flow.to_string()));
        }
        if let Some(node) = tree.find_loop() {
            return Err(ModelError::PathLoop {
                flow: flow.to_string(),
                node: self.node_name(tree.node(node).node).to_string(),
            });
        }
        let source_ref = NodeRef::Device(source);
        let mut plan = Vec::new();
        for &first in tree.children(root) {
            let target = tree.node(first).node;
            let gap = || ModelError::PathGap {
                flow: flow.to_string(),
                from: self.node_name(source_ref).to_string(),
                to: self.node_name(target).to_string(),
            };
            let sw = target.as_switch().ok_or_else(gap)?;
            let ingress = self.port_between(sw, source_ref).ok_or_else(gap)?;
            self.plan_switch(flow, tree, first, None, ingress, fixed_priority, &mut plan)?;
        }
        Ok(plan)
    }

    fn build_tree(&self, spec: &FlowSpec) -> Result<PathTree, ModelError> {
        let root = NodeRef::Device(spec.source);
        let paths: Vec<Vec<(NodeRef, Option<u8>)>> = match &spec.route {
            Route::Destinations(dests) => dests
                .iter()
                .map(|&d| {
                    if d.0 >= self.devices.len() {
                        return Err(ModelError::UnknownDevice(d.to_string()));
                    }
                    self.route(spec.source, d)
                        .map(|r| r.into_iter().map(|n| (n, None)).collect())
                        .ok_or_else(|| ModelError::PathGap {
                            flow: spec.name.clone(),
                            from: self.devices[spec.source.0].name.clone(),
                            to: self.devices[d.0].name.clone(),
                        })
                })
                .collect::<Result<_, _>>()?,
            Route::Paths(paths) => paths
                .iter()
                .map(|p| p.iter().map(|h| (h.node, h.priority)).collect())
                .collect(),
        };
        if paths.iter().all(Vec::is_empty) {
            return Err(ModelError::EmptyPath(spec.name.clone()));
        }
        Ok(PathTree::from_paths(root, &paths))
    }

    /// Add a flow and fragment it over its route.
    ///
    /// # Errors
    /// Any [`ModelError`]; on error the network is left unchanged.
    pub fn add_flow(&mut self, spec: FlowSpec) -> Result<FlowId, ModelError> {
        if self.flow_names.contains_key(&spec.name) {
            return Err(ModelError::DuplicateName(spec.name));
        }
        let device = self
            .devices
            .get(spec.source.0)
            .ok_or_else(|| ModelError::UnknownDevice(spec.source.to_string()))?;
        let period = spec.period.unwrap_or(device.period);
        if !(period > 0.0) {
            return Err(ModelError::InvalidPeriod {
                name: spec.name,
                period,
            });
        }
        let packet_size = spec.packet_size.unwrap_or(device.packet_size);
        let first_send = spec.first_send.or(device.first_send);
        let max_latency = spec.max_latency.or(device.hard_latency);

        let mut tree = self.build_tree(&spec)?;
        let plan = self.plan_fragments(&spec.name, spec.source, &tree, spec.priority)?;

        // ── Commit ────────────────────────────────────────────────────────────
        let id = FlowId(self.flows.len());
        let base = self.fragments.len();
        let ids: Vec<FragmentId> = (0..plan.len()).map(|i| FragmentId(base + i)).collect();
        for (i, p) in plan.iter().enumerate() {
            let fid = ids[i];
            self.fragments.push(FlowFragment {
                id: fid,
                flow: id,
                hop: p.hop,
                port: p.port,
                ingress: p.ingress,
                prev: p.prev.map(|j| ids[j]),
                next: Vec::new(),
                fixed_priority: p.priority,
                period,
                packet_size,
                packet_count: 1,
                solved: None,
                previous: None,
            });
            if let Some(j) = p.prev {
                self.fragments[ids[j].0].next.push(fid);
            }
            self.ports[p.port.0].fragments.push(fid);
            tree.attach_fragment(p.hop, fid);
        }

        info!(
            flow = %spec.name,
            fragments = ids.len(),
            leaves = tree.leaves().len(),
            period,
            packet_size,
            "added flow"
        );

        self.flow_names.insert(spec.name.clone(), id);
        self.flows.push(Flow {
            id,
            name: spec.name,
            source: spec.source,
            tree,
            period,
            packet_size,
            first_send,
            fixed_priority: spec.priority,
            max_jitter: spec.max_jitter,
            max_latency,
            state: EntityState::Unbound,
            fragments: ids,
            solved_first_send: None,
            stats: Vec::new(),
        });
        Ok(id)
    }

    /// Apply `edit` to a flow and its fragments.
    ///
    /// Timing values are not touched; the caller decides what to reset.
    pub fn update_flow(&mut self, flow: FlowId, edit: &FlowEdit) -> Result<(), ModelError> {
        let f = &self.flows[flow.0];
        if let Some(period) = edit.period {
            if !(period > 0.0) {
                return Err(ModelError::InvalidPeriod {
                    name: f.name.clone(),
                    period,
                });
            }
        }
        if let Some(prio) = edit.priority {
            for frag in &f.fragments {
                let hop_priority = f.tree.node(self.fragments[frag.0].hop).priority;
                if hop_priority.is_none() {
                    self.lanes_check(&f.name, self.fragments[frag.0].port, Some(prio))?;
                }
            }
        }

        let f = &mut self.flows[flow.0];
        if let Some(p) = edit.period {
            f.period = p;
        }
        if let Some(s) = edit.packet_size {
            f.packet_size = s;
        }
        if edit.max_latency.is_some() {
            f.max_latency = edit.max_latency;
        }
        if edit.max_jitter.is_some() {
            f.max_jitter = edit.max_jitter;
        }
        if edit.priority.is_some() {
            f.fixed_priority = edit.priority;
        }
        let (period, size, fixed) = (f.period, f.packet_size, f.fixed_priority);
        let hops: Vec<(FragmentId, Option<u8>)> = f
            .fragments
            .iter()
            .map(|&id| (id, f.tree.node(self.fragments[id.0].hop).priority))
            .collect();
        for (id, hop_priority) in hops {
            let frag = &mut self.fragments[id.0];
            frag.period = period;
            frag.packet_size = size;
            frag.fixed_priority = hop_priority.or(fixed);
        }
        debug!(flow = %f.name, period, size, "flow updated");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceSpec, SwitchSpec};

    /// d0 ── s0 ── s1 ── d1
    ///        └─── s2 ── d2
    fn tree_net() -> Network {
        let mut net = Network::new();
        for d in ["d0", "d1", "d2"] {
            net.add_device(DeviceSpec::new(d).period(100.0).packet_size(125.0)).unwrap();
        }
        for s in ["s0", "s1", "s2"] {
            net.add_switch(SwitchSpec::new(s).speed(125.0).priority_lanes(2)).unwrap();
        }
        for (a, b) in [("d0", "s0"), ("s0", "s1"), ("s0", "s2"), ("s1", "d1"), ("s2", "d2")] {
            net.connect_by_name(a, b).unwrap();
        }
        net
    }

    fn dev(net: &Network, name: &str) -> DeviceId {
        net.device_by_name(name).unwrap()
    }

    #[test]
    fn unicast_flow_is_chained() {
        let mut net = tree_net();
        let (d0, d1) = (dev(&net, "d0"), dev(&net, "d1"));
        let id = net
            .add_flow(FlowSpec::new("f", d0, Route::Destinations(vec![d1])))
            .unwrap();
        let flow = net.flow(id);
        assert_eq!(flow.fragments.len(), 2);
        assert_eq!(flow.period, 100.0);
        let first = net.fragment(flow.fragments[0]);
        let second = net.fragment(flow.fragments[1]);
        assert_eq!(net.port(first.port).name, "s0->s1");
        assert_eq!(net.port(first.ingress).name, "s0->d0");
        assert_eq!(net.port(second.port).name, "s1->d1");
        assert_eq!(second.prev, Some(first.id));
        assert_eq!(first.next, vec![second.id]);
        assert_eq!(second.ingress, first.port);
        assert!(second.is_leaf());
    }

    #[test]
    fn multicast_flow_branches_at_shared_switch() {
        let mut net = tree_net();
        let (d0, d1, d2) = (dev(&net, "d0"), dev(&net, "d1"), dev(&net, "d2"));
        let id = net
            .add_flow(FlowSpec::new("m", d0, Route::Destinations(vec![d1, d2])))
            .unwrap();
        assert_eq!(net.flow(id).fragments.len(), 4);
        assert_eq!(net.first_hop_fragments(id).len(), 2);
        let leaves = net.leaf_fragments(id);
        assert_eq!(leaves.len(), 2);
        for leaf in leaves {
            assert_eq!(net.chain_to(leaf).len(), 2);
        }
        assert!(!net.flow(id).tree.is_unicast());
    }

    #[test]
    fn explicit_path_with_gap_is_rejected_atomically() {
        let mut net = tree_net();
        let d0 = dev(&net, "d0");
        let s1 = NodeRef::Switch(net.switch_by_name("s1").unwrap());
        let d1 = NodeRef::Device(dev(&net, "d1"));
        // d0 is not attached to s1
        let err = net
            .add_flow(FlowSpec::new("g", d0, Route::Paths(vec![vec![Hop::new(s1), Hop::new(d1)]])))
            .unwrap_err();
        assert!(matches!(err, ModelError::PathGap { .. }));
        assert!(net.flows().is_empty());
        assert!(net.fragments().is_empty());
        assert!(net.ports().iter().all(|p| p.fragments.is_empty()));
    }

    #[test]
    fn hop_priority_overrides_flow_priority() {
        let mut net = tree_net();
        let d0 = dev(&net, "d0");
        let s0 = NodeRef::Switch(net.switch_by_name("s0").unwrap());
        let s1 = NodeRef::Switch(net.switch_by_name("s1").unwrap());
        let d1 = NodeRef::Device(dev(&net, "d1"));
        let id = net
            .add_flow(
                FlowSpec::new(
                    "p",
                    d0,
                    Route::Paths(vec![vec![Hop::with_priority(s0, 1), Hop::new(s1), Hop::new(d1)]]),
                )
                .priority(0),
            )
            .unwrap();
        let f = net.flow(id);
        assert_eq!(net.fragment(f.fragments[0]).fixed_priority, Some(1));
        assert_eq!(net.fragment(f.fragments[1]).fixed_priority, Some(0));
    }

    #[test]
    fn priority_beyond_lanes_is_rejected() {
        let mut net = tree_net();
        let (d0, d1) = (dev(&net, "d0"), dev(&net, "d1"));
        let err = net
            .add_flow(FlowSpec::new("f", d0, Route::Destinations(vec![d1])).priority(2))
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidPriority { lanes: 2, .. }));
    }

    #[test]
    fn zero_period_is_rejected() {
        let mut net = tree_net();
        let (d0, d1) = (dev(&net, "d0"), dev(&net, "d1"));
        let err = net
            .add_flow(FlowSpec::new("f", d0, Route::Destinations(vec![d1])).period(0.0))
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidPeriod { .. }));
    }

    #[test]
    fn update_flow_propagates_to_fragments() {
        let mut net = tree_net();
        let (d0, d1) = (dev(&net, "d0"), dev(&net, "d1"));
        let id = net
            .add_flow(FlowSpec::new("f", d0, Route::Destinations(vec![d1])))
            .unwrap();
        net.update_flow(
            id,
            &FlowEdit {
                period: Some(250.0),
                priority: Some(1),
                ..Default::default()
            },
        )
        .unwrap();
        for f in &net.flow(id).fragments {
            assert_eq!(net.fragment(*f).period, 250.0);
            assert_eq!(net.fragment(*f).fixed_priority, Some(1));
        }
    }

    #[test]
    fn leaf_stats_average_and_jitter() {
        let s = LeafStats::from_latencies(DeviceId(0), vec![10.0, 14.0]);
        assert_eq!(s.average_latency, 12.0);
        assert_eq!(s.jitter, 2.0);
    }
}
