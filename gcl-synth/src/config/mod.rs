/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Network description loading.
//!
//! The expected YAML structure is:
//! ```yaml
//! scheduler:
//!   timeout: 5s
//!   default_max_jitter: 20us
//! devices:
//!   - { name: cam, period: 1ms, packet_size: 1500B, hard_latency: 500us }
//!   - { name: ecu }
//! switches:
//!   - name: sw0
//!     speed: 1Gbit/s
//!     propagation_delay: 1us
//!     sizing: microcycle
//!     ports:
//!       - { target: ecu, guard_band: 2us, reset_policy: carry-on-cycle }
//! links:
//!   - [cam, sw0]
//!   - [sw0, ecu]
//! flows:
//!   - name: video
//!     source: cam
//!     destinations: [ecu]
//!   - name: control
//!     source: cam
//!     path: [{ node: sw0, priority: 3 }, ecu]
//! ```
//!
//! Times, sizes and speeds take a bare number in µs, bytes and bytes/µs or
//! a string with a unit (see [`crate::units`]).  Ports are created from the
//! `ports` lists first; `links` then adds default ports for the remaining
//! switch ends.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::hyperperiod::{LanePolicy, SizingPolicy};
use crate::model::{
    DeviceSpec, FlowSpec, Hop, Network, NodeRef, PortSpec, ResetPolicy, Route, SwitchSpec,
};
use crate::scheduler::SchedulerOptions;
use crate::units::Quantity;

// ── Private YAML deserialization types ────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NetworkFile {
    #[serde(default)]
    scheduler: SchedulerEntry,
    #[serde(default)]
    devices: Vec<DeviceEntry>,
    #[serde(default)]
    switches: Vec<SwitchEntry>,
    #[serde(default)]
    links: Vec<(String, String)>,
    #[serde(default)]
    flows: Vec<FlowEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchedulerEntry {
    timeout: Option<Quantity>,
    node_limit: Option<usize>,
    default_max_jitter: Option<Quantity>,
    interframe_gap: Option<Quantity>,
    wrap: Option<bool>,
    best_effort_fraction: Option<f64>,
    lane_policy: Option<LanePolicy>,
    diagnose_infeasibility: Option<bool>,
    hypercycle_limit: Option<Quantity>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceEntry {
    name: String,
    period: Option<Quantity>,
    packet_size: Option<Quantity>,
    first_send: Option<Quantity>,
    hard_latency: Option<Quantity>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct SwitchEntry {
    name: String,
    speed: Option<Quantity>,
    propagation_delay: Option<Quantity>,
    guard_band: Option<Quantity>,
    #[serde(default)]
    sizing: SizingPolicy,
    priority_lanes: Option<usize>,
    #[serde(default)]
    lane_policy: LanePolicy,
    min_cycle: Option<Quantity>,
    max_cycle: Option<Quantity>,
    max_slot_duration: Option<Quantity>,
    #[serde(default)]
    ports: Vec<PortEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct PortEntry {
    target: String,
    speed: Option<Quantity>,
    propagation_delay: Option<Quantity>,
    guard_band: Option<Quantity>,
    sizing: Option<SizingPolicy>,
    max_slot_duration: Option<Quantity>,
    #[serde(default)]
    reset_policy: ResetPolicy,
}

/// A hop is a bare node name or a name with a fixed priority.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum HopEntry {
    Name(String),
    Detailed { node: String, priority: Option<u8> },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct FlowEntry {
    name: String,
    source: String,
    #[serde(default)]
    destinations: Vec<String>,
    /// Unicast hop list after the source.
    #[serde(default)]
    path: Vec<HopEntry>,
    /// Multicast hop lists after the source.
    #[serde(default)]
    paths: Vec<Vec<HopEntry>>,
    period: Option<Quantity>,
    packet_size: Option<Quantity>,
    first_send: Option<Quantity>,
    priority: Option<u8>,
    max_jitter: Option<Quantity>,
    max_latency: Option<Quantity>,
}

// ── Conversion helpers ────────────────────────────────────────────────────────

fn time(q: &Option<Quantity>, what: &str) -> Result<Option<f64>> {
    q.as_ref()
        .map(|q| q.to_time_us().with_context(|| format!("Invalid time for {what}")))
        .transpose()
}

fn size(q: &Option<Quantity>, what: &str) -> Result<Option<f64>> {
    q.as_ref()
        .map(|q| q.to_bytes().with_context(|| format!("Invalid size for {what}")))
        .transpose()
}

fn speed(q: &Option<Quantity>, what: &str) -> Result<Option<f64>> {
    q.as_ref()
        .map(|q| q.to_bytes_per_us().with_context(|| format!("Invalid speed for {what}")))
        .transpose()
}

fn node(net: &Network, name: &str) -> Result<NodeRef> {
    net.node_by_name(name)
        .with_context(|| format!("Unknown node '{name}'"))
}

fn hop(net: &Network, entry: &HopEntry) -> Result<Hop> {
    Ok(match entry {
        HopEntry::Name(n) => Hop::new(node(net, n)?),
        HopEntry::Detailed { node: n, priority } => Hop {
            node: node(net, n)?,
            priority: *priority,
        },
    })
}

// ── NetworkConfigManager ──────────────────────────────────────────────────────

/// Loads a network description and turns it into a [`Network`].
#[derive(Debug, Default)]
pub struct NetworkConfigManager {
    file: NetworkFile,

    /// Set to `true` after a successful load.
    loaded: bool,
}

impl NetworkConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `path`, replacing anything loaded before.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or if the YAML is
    /// structurally invalid.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Loading network description from: {}", path.display());
        self.loaded = false;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open network description: {}", path.display()))?;
        self.load_from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))
    }

    /// Parses a description held in memory.
    pub fn load_from_str(&mut self, yaml: &str) -> Result<()> {
        self.loaded = false;
        let file: NetworkFile = serde_yaml::from_str(yaml).context("Invalid network description")?;
        if file.devices.is_empty() && file.switches.is_empty() {
            warn!("Network description declares no devices and no switches");
        }
        info!(
            devices = file.devices.len(),
            switches = file.switches.len(),
            links = file.links.len(),
            flows = file.flows.len(),
            "Network description loaded"
        );
        self.file = file;
        self.loaded = true;
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Scheduler options, defaults where the file is silent.
    pub fn scheduler_options(&self) -> Result<SchedulerOptions> {
        let s = &self.file.scheduler;
        let mut options = SchedulerOptions::default();
        if let Some(t) = time(&s.timeout, "scheduler.timeout")? {
            if t < 0.0 {
                bail!("scheduler.timeout must not be negative, got {t} us");
            }
            options.timeout = Some(Duration::from_secs_f64(t / 1_000_000.0));
        }
        if let Some(n) = s.node_limit {
            options.node_limit = n;
        }
        options.default_max_jitter = time(&s.default_max_jitter, "scheduler.default_max_jitter")?;
        if let Some(gap) = time(&s.interframe_gap, "scheduler.interframe_gap")? {
            options.interframe_gap = gap;
        }
        if let Some(wrap) = s.wrap {
            options.wrap = wrap;
        }
        if let Some(f) = s.best_effort_fraction {
            if !(0.0..1.0).contains(&f) {
                bail!("scheduler.best_effort_fraction must be in [0, 1), got {f}");
            }
            options.best_effort_fraction = f;
        }
        options.lane_policy = s.lane_policy;
        if let Some(d) = s.diagnose_infeasibility {
            options.diagnose_infeasibility = d;
        }
        if let Some(limit) = time(&s.hypercycle_limit, "scheduler.hypercycle_limit")? {
            options.hypercycle_limit_us = limit;
        }
        Ok(options)
    }

    /// Build the network: devices, switches and their ports, links, flows.
    ///
    /// # Errors
    /// The first entry that cannot be converted or added, with its name in
    /// the context chain.
    pub fn build_network(&self) -> Result<Network> {
        if !self.loaded {
            bail!("No network description loaded");
        }
        let mut net = Network::new();

        for d in &self.file.devices {
            let what = format!("device '{}'", d.name);
            let mut spec = DeviceSpec::new(&d.name);
            if let Some(p) = time(&d.period, &what)? {
                spec = spec.period(p);
            }
            if let Some(s) = size(&d.packet_size, &what)? {
                spec = spec.packet_size(s);
            }
            if let Some(o) = time(&d.first_send, &what)? {
                spec = spec.first_send(o);
            }
            if let Some(l) = time(&d.hard_latency, &what)? {
                spec = spec.hard_latency(l);
            }
            net.add_device(spec).with_context(|| format!("Cannot add {what}"))?;
        }

        for s in &self.file.switches {
            let what = format!("switch '{}'", s.name);
            let mut spec = SwitchSpec::new(&s.name)
                .sizing(s.sizing)
                .lane_policy(s.lane_policy)
                .cycle_bounds(time(&s.min_cycle, &what)?, time(&s.max_cycle, &what)?);
            if let Some(v) = speed(&s.speed, &what)? {
                spec = spec.speed(v);
            }
            if let Some(v) = time(&s.propagation_delay, &what)? {
                spec = spec.propagation_delay(v);
            }
            if let Some(v) = time(&s.guard_band, &what)? {
                spec = spec.guard_band(v);
            }
            if let Some(lanes) = s.priority_lanes {
                spec = spec.priority_lanes(lanes);
            }
            spec.max_slot_duration = time(&s.max_slot_duration, &what)?;
            net.add_switch(spec).with_context(|| format!("Cannot add {what}"))?;
        }

        for s in &self.file.switches {
            let Some(sw) = net.switch_by_name(&s.name) else {
                continue;
            };
            for p in &s.ports {
                let what = format!("port '{}->{}'", s.name, p.target);
                let spec = PortSpec {
                    propagation_delay: time(&p.propagation_delay, &what)?,
                    speed: speed(&p.speed, &what)?,
                    guard_band: time(&p.guard_band, &what)?,
                    sizing: p.sizing,
                    max_slot_duration: time(&p.max_slot_duration, &what)?,
                    reset_policy: p.reset_policy,
                };
                let target = node(&net, &p.target).with_context(|| format!("Cannot add {what}"))?;
                net.add_port(sw, target, spec)
                    .with_context(|| format!("Cannot add {what}"))?;
            }
        }

        for (a, b) in &self.file.links {
            net.connect_by_name(a, b)
                .with_context(|| format!("Cannot link '{a}' and '{b}'"))?;
        }

        for f in &self.file.flows {
            let spec = self
                .flow_spec(&net, f)
                .with_context(|| format!("Invalid flow '{}'", f.name))?;
            net.add_flow(spec)
                .with_context(|| format!("Cannot add flow '{}'", f.name))?;
        }

        info!(
            devices = net.devices().len(),
            switches = net.switches().len(),
            ports = net.ports().len(),
            flows = net.flows().len(),
            fragments = net.fragments().len(),
            "Network built"
        );
        Ok(net)
    }

    fn flow_spec(&self, net: &Network, f: &FlowEntry) -> Result<FlowSpec> {
        let what = format!("flow '{}'", f.name);
        let source = net
            .device_by_name(&f.source)
            .with_context(|| format!("Unknown source device '{}'", f.source))?;

        let forms = [!f.destinations.is_empty(), !f.path.is_empty(), !f.paths.is_empty()];
        if forms.iter().filter(|&&set| set).count() != 1 {
            bail!("exactly one of destinations, path and paths must be given");
        }
        let route = if !f.destinations.is_empty() {
            let dests = f
                .destinations
                .iter()
                .map(|d| {
                    net.device_by_name(d)
                        .with_context(|| format!("Unknown destination device '{d}'"))
                })
                .collect::<Result<Vec<_>>>()?;
            Route::Destinations(dests)
        } else {
            let lists: Vec<&Vec<HopEntry>> = if f.path.is_empty() {
                f.paths.iter().collect()
            } else {
                vec![&f.path]
            };
            let paths = lists
                .into_iter()
                .map(|l| l.iter().map(|h| hop(net, h)).collect::<Result<Vec<_>>>())
                .collect::<Result<Vec<_>>>()?;
            Route::Paths(paths)
        };

        let mut spec = FlowSpec::new(&f.name, source, route);
        if let Some(v) = time(&f.period, &what)? {
            spec = spec.period(v);
        }
        if let Some(v) = size(&f.packet_size, &what)? {
            spec = spec.packet_size(v);
        }
        if let Some(v) = time(&f.first_send, &what)? {
            spec = spec.first_send(v);
        }
        if let Some(p) = f.priority {
            spec = spec.priority(p);
        }
        if let Some(v) = time(&f.max_jitter, &what)? {
            spec = spec.max_jitter(v);
        }
        if let Some(v) = time(&f.max_latency, &what)? {
            spec = spec.max_latency(v);
        }
        debug!(flow = %f.name, source = %f.source, "flow entry converted");
        Ok(spec)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    const LINE: &str = r#"
scheduler:
  timeout: 2s
  default_max_jitter: 5us
  lane_policy: max-capacity
devices:
  - { name: d0, period: 200us, packet_size: 1250B, hard_latency: 1ms }
  - { name: d1 }
switches:
  - name: s0
    speed: 1Gbit/s
    propagation_delay: 1us
    priority_lanes: 2
    ports:
      - { target: d1, guard_band: 500ns, reset_policy: soft-reset }
links:
  - [d0, s0]
  - [s0, d1]
flows:
  - name: f
    source: d0
    destinations: [d1]
  - name: g
    source: d0
    period: 400
    path: [{ node: s0, priority: 1 }, d1]
"#;

    #[test]
    fn load_line_network() {
        let f = yaml_tempfile(LINE);
        let mut mgr = NetworkConfigManager::new();
        mgr.load_from_file(f.path()).unwrap();
        assert!(mgr.is_loaded());

        let net = mgr.build_network().unwrap();
        assert_eq!(net.devices().len(), 2);
        assert_eq!(net.ports().len(), 2);

        let port = net.port(net.port_by_name("s0->d1").unwrap());
        assert_eq!(port.speed, 125.0);
        assert!((port.guard_band - 0.5).abs() < 1e-12);
        assert_eq!(port.propagation_delay, 1.0);
        assert_eq!(port.reset_policy, ResetPolicy::SoftReset);

        let f = net.flow(net.flow_by_name("f").unwrap());
        assert_eq!(f.period, 200.0);
        assert_eq!(f.packet_size, 1250.0);
        assert_eq!(f.max_latency, Some(1000.0));

        let g = net.flow(net.flow_by_name("g").unwrap());
        assert_eq!(g.period, 400.0);
        assert_eq!(net.fragment(g.fragments[0]).fixed_priority, Some(1));
    }

    #[test]
    fn scheduler_section_sets_options() {
        let mut mgr = NetworkConfigManager::new();
        mgr.load_from_str(LINE).unwrap();
        let options = mgr.scheduler_options().unwrap();
        assert_eq!(options.timeout, Some(Duration::from_secs(2)));
        assert_eq!(options.default_max_jitter, Some(5.0));
        assert_eq!(options.lane_policy, Some(LanePolicy::MaxCapacity));
        assert!(options.diagnose_infeasibility);
    }

    #[test]
    fn unknown_destination_names_the_flow() {
        let yaml = r#"
devices: [{ name: d0, period: 100, packet_size: 10 }]
switches: [{ name: s0 }]
links: [[d0, s0]]
flows: [{ name: lost, source: d0, destinations: [nowhere] }]
"#;
        let mut mgr = NetworkConfigManager::new();
        mgr.load_from_str(yaml).unwrap();
        let err = mgr.build_network().unwrap_err();
        let chain = format!("{err:#}");
        assert!(chain.contains("lost"), "{chain}");
        assert!(chain.contains("nowhere"), "{chain}");
    }

    #[test]
    fn flow_needs_exactly_one_route_form() {
        let yaml = r#"
devices: [{ name: d0, period: 100, packet_size: 10 }, { name: d1 }]
switches: [{ name: s0 }]
links: [[d0, s0], [s0, d1]]
flows: [{ name: both, source: d0, destinations: [d1], path: [s0, d1] }]
"#;
        let mut mgr = NetworkConfigManager::new();
        mgr.load_from_str(yaml).unwrap();
        assert!(mgr.build_network().is_err());
    }

    #[test]
    fn out_of_range_best_effort_is_rejected() {
        let mut mgr = NetworkConfigManager::new();
        mgr.load_from_str("scheduler: { best_effort_fraction: 1.5 }\n").unwrap();
        assert!(mgr.scheduler_options().is_err());
    }

    #[test]
    fn missing_file_returns_error() {
        let mut mgr = NetworkConfigManager::new();
        let result = mgr.load_from_file(Path::new("/nonexistent/path/network.yaml"));
        assert!(result.is_err());
        assert!(!mgr.is_loaded());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("devices: { this is: not: a list");
        let mut mgr = NetworkConfigManager::new();
        assert!(mgr.load_from_file(f.path()).is_err());
        assert!(!mgr.is_loaded());
        assert!(mgr.build_network().is_err());
    }
}
